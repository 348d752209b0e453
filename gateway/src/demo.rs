// The canned workflows run by `agentic-gateway demo`.

pub struct DemoWorkflow {
    pub name: &'static str,
    pub task: &'static str,
}

pub const WORKFLOWS: [DemoWorkflow; 5] = [
    DemoWorkflow {
        name: "Data Analysis Workflow",
        task: "Perform a data analysis on sorting algorithm performance. \
               1. Generate sample timings for Bubble, Quick, Merge, Heap and Radix sort \
               at input sizes 100, 1000, 10000 and 100000 with realistic complexity patterns. \
               2. Create a line chart of time vs input size, a bar chart at the largest size, \
               and a heatmap of relative performance. \
               3. Compute mean, standard deviation and efficiency ratios. \
               4. Write a short summary report with recommendations.",
    },
    DemoWorkflow {
        name: "Web Research Workflow",
        task: "Research the current state of large language models: recent architecture \
               developments, benchmark results, cost and efficiency comparisons, and open vs \
               proprietary trends. Compile the findings into a structured markdown report, \
               chart the comparison data, and save the report to a file.",
    },
    DemoWorkflow {
        name: "Code Project Workflow",
        task: "Create a small Python task management project: design the structure, implement \
               Task, Project, User and TaskManager classes with JSON persistence, add a CLI, \
               unit tests, a README and example usage. Save every file you write.",
    },
    DemoWorkflow {
        name: "Multi-Step Analysis",
        task: "Analyse programming language popularity: create synthetic yearly data for ten \
               languages over five years (repository counts, job postings, survey results), \
               compute growth rates and correlations, project the next year, visualise the \
               trends, and export the results as CSV and JSON files.",
    },
    DemoWorkflow {
        name: "Problem Solving Workflow",
        task: "Design a delivery routing system for a food delivery service. Generate a city \
               grid with restaurants and addresses, compare Dijkstra, A* and a greedy heuristic \
               under traffic, capacity and delivery-time constraints, chart the route costs, \
               and recommend an approach.",
    },
];

// Tool-free prompts run by `agentic-gateway coding`.
pub const CODING_TASKS: [DemoWorkflow; 6] = [
    DemoWorkflow {
        name: "Algorithm Implementation",
        task: "Find the longest palindromic substring of a string using Manacher's algorithm \
               in O(n) time. Include unit tests, comments explaining the algorithm, handling \
               of edge cases such as empty and single-character input, and a time and space \
               complexity analysis.",
    },
    DemoWorkflow {
        name: "Data Structure Implementation",
        task: "Implement a thread-safe generic LRU cache with O(1) get and put, a configurable \
               capacity, optional per-entry TTL and hit/miss statistics. Include documentation, \
               usage examples and unit tests covering concurrent access.",
    },
    DemoWorkflow {
        name: "Code Debugging",
        task: "Find every bug and inefficiency in these functions, explain each one, and give \
               corrected versions with error handling, unit tests and before/after complexity:\n\
               \n\
               def binary_search(arr, target):\n\
               \x20   left, right = 0, len(arr)\n\
               \x20   while left < right:\n\
               \x20       mid = (left + right) // 2\n\
               \x20       if arr[mid] == target:\n\
               \x20           return mid\n\
               \x20       elif arr[mid] < target:\n\
               \x20           left = mid\n\
               \x20       else:\n\
               \x20           right = mid - 1\n\
               \x20   return -1\n\
               \n\
               def fibonacci(n):\n\
               \x20   if n <= 1:\n\
               \x20       return n\n\
               \x20   return fibonacci(n-1) + fibonacci(n-2)\n",
    },
    DemoWorkflow {
        name: "Competitive Programming",
        task: "Given an array of n integers (n up to 10^5, values up to 10^9 in magnitude) and \
               k up to min(n, 100), delete at most k elements and return the maximum sum of a \
               contiguous subarray. Give an efficient DP solution, its complexity, edge cases \
               and test cases. Example: [-1, 3, -2, 4, -5] with k = 2 gives 7.",
    },
    DemoWorkflow {
        name: "ML Implementation",
        task: "Implement a multi-layer perceptron from scratch with NumPy only: forward and \
               backward propagation, ReLU/Sigmoid/Tanh activations, batching, learning-rate \
               scheduling, L1/L2 regularization, early stopping, Xavier/He initialization and \
               gradient checking. Train it on XOR and include unit tests.",
    },
    DemoWorkflow {
        name: "System Design Implementation",
        task: "Design and implement a distributed rate limiter supporting token bucket and \
               sliding window algorithms, with Redis for shared state, per-user/IP/API-key limits, \
               graceful degradation when Redis is unavailable, metrics, a REST configuration API, \
               a Dockerfile, and unit and integration tests.",
    },
];
