//! Isolated code execution on top of wasmtime.
//!
//! Snippets never run in the host process. They are handed as argv to a WASI
//! command module (typically a WASI build of an interpreter) that runs with
//! no environment, no sockets, read-only preopened directories only, a memory
//! cap, a fuel budget and a wall-clock deadline.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

/// How much fuel the guest burns between cooperative yields to tokio.
const FUEL_YIELD_INTERVAL: u64 = 100_000;

/// A host directory exposed read-only to the guest.
#[derive(Debug, Clone, PartialEq)]
pub struct Preopen {
    pub host: PathBuf,
    pub guest: String,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// WASI command module to run. Without one, code execution is disabled.
    pub interpreter: Option<PathBuf>,
    /// Leading argv; the snippet is appended as the final argument.
    pub interpreter_args: Vec<String>,
    pub fuel: u64,
    pub timeout: Duration,
    pub max_memory_bytes: usize,
    /// Capacity of each of the stdout/stderr capture buffers.
    pub max_output_bytes: usize,
    pub preopens: Vec<Preopen>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            interpreter_args: vec!["python".to_string(), "-c".to_string()],
            fuel: 20_000_000_000,
            timeout: Duration::from_secs(10),
            max_memory_bytes: 256 << 20,
            max_output_bytes: 1 << 20,
            preopens: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("code execution is not configured (set SANDBOX_INTERPRETER)")]
    NotConfigured,
    #[error("failed to load interpreter module: {0}")]
    Load(String),
    #[error("sandbox setup failed: {0}")]
    Setup(String),
    #[error("execution exceeded its fuel budget")]
    OutOfFuel,
    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),
    #[error("guest trapped: {0}")]
    Trap(String),
}

fn setup(err: impl std::fmt::Display) -> SandboxError {
    SandboxError::Setup(err.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl SandboxOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

// Per-execution host state: WASI context plus the resource limiter.
struct SandboxState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// The engine and compiled interpreter persist across executions; every
/// execution gets a fresh store.
pub struct Sandbox {
    engine: Engine,
    module: Option<Module>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let engine = Self::engine()?;
        let module = match &config.interpreter {
            Some(path) => {
                info!("Compiling sandbox interpreter from {}", path.display());
                let module = Module::from_file(&engine, path)
                    .map_err(|e| SandboxError::Load(format!("{}: {e}", path.display())))?;
                Some(module)
            }
            None => {
                warn!("No sandbox interpreter configured; execute-code will report failures");
                None
            }
        };
        Ok(Self { engine, module, config })
    }

    /// Build a sandbox around an in-memory module (binary or text format).
    pub fn with_module(config: SandboxConfig, wasm: impl AsRef<[u8]>) -> Result<Self, SandboxError> {
        let engine = Self::engine()?;
        let module = Module::new(&engine, wasm).map_err(|e| SandboxError::Load(e.to_string()))?;
        Ok(Self {
            engine,
            module: Some(module),
            config,
        })
    }

    fn engine() -> Result<Engine, SandboxError> {
        let mut config = Config::new();
        config.async_support(true);
        config.consume_fuel(true);
        Engine::new(&config).map_err(setup)
    }

    pub fn is_configured(&self) -> bool {
        self.module.is_some()
    }

    pub async fn execute(&self, code: &str) -> Result<SandboxOutcome, SandboxError> {
        let module = self.module.as_ref().ok_or(SandboxError::NotConfigured)?;

        // A. Guest context: argv, captured stdio, whitelisted directories
        let stdout = MemoryOutputPipe::new(self.config.max_output_bytes);
        let stderr = MemoryOutputPipe::new(self.config.max_output_bytes);
        let mut argv = self.config.interpreter_args.clone();
        argv.push(code.to_string());

        let mut builder = WasiCtxBuilder::new();
        builder.args(&argv[..]).stdout(stdout.clone()).stderr(stderr.clone());
        for dir in &self.config.preopens {
            builder
                .preopened_dir(&dir.host, &dir.guest, DirPerms::READ, FilePerms::READ)
                .map_err(setup)?;
        }

        // B. Store with memory cap and fuel budget
        let state = SandboxState {
            wasi: builder.build_p1(),
            limits: StoreLimitsBuilder::new()
                .memory_size(self.config.max_memory_bytes)
                .build(),
        };
        let mut store = Store::new(&self.engine, state);
        store.limiter(|s| &mut s.limits);
        store.set_fuel(self.config.fuel).map_err(setup)?;
        store
            .fuel_async_yield_interval(Some(FUEL_YIELD_INTERVAL))
            .map_err(setup)?;

        let mut linker: Linker<SandboxState> = Linker::new(&self.engine);
        preview1::add_to_linker_async(&mut linker, |s| &mut s.wasi).map_err(setup)?;

        // C. Boot the guest and run its entry point under the deadline
        let run = async {
            let instance = linker.instantiate_async(&mut store, module).await?;
            let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
            start.call_async(&mut store, ()).await
        };

        let exit_code = match tokio::time::timeout(self.config.timeout, run).await {
            Err(_) => return Err(SandboxError::TimedOut(self.config.timeout)),
            Ok(Ok(())) => 0,
            Ok(Err(err)) => exit_code_of(err)?,
        };

        let outcome = SandboxOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout.contents()).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.contents()).into_owned(),
        };
        debug!(
            exit_code,
            stdout_bytes = outcome.stdout.len(),
            stderr_bytes = outcome.stderr.len(),
            "sandbox execution finished"
        );
        Ok(outcome)
    }
}

// `proc_exit` surfaces as an error carrying the exit status; anything else is
// a genuine fault.
fn exit_code_of(err: anyhow::Error) -> Result<i32, SandboxError> {
    if let Some(exit) = err.downcast_ref::<I32Exit>() {
        return Ok(exit.0);
    }
    if err.downcast_ref::<Trap>() == Some(&Trap::OutOfFuel) {
        return Err(SandboxError::OutOfFuel);
    }
    Err(SandboxError::Trap(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 8) "hello\n")
          (func (export "_start")
            (i32.store (i32.const 0) (i32.const 8))
            (i32.store (i32.const 4) (i32.const 6))
            (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))))
    "#;

    const EXIT_THREE: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
          (memory (export "memory") 1)
          (func (export "_start") (call $exit (i32.const 3))))
    "#;

    const SPIN: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start") (loop $l (br $l))))
    "#;

    const UNREACHABLE: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start") unreachable))
    "#;

    #[tokio::test]
    async fn unconfigured_sandbox_refuses() {
        let sandbox = Sandbox::new(SandboxConfig::default()).unwrap();
        assert!(!sandbox.is_configured());
        assert!(matches!(
            sandbox.execute("print(1)").await,
            Err(SandboxError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn captures_guest_stdout() {
        let sandbox = Sandbox::with_module(SandboxConfig::default(), HELLO).unwrap();
        let outcome = sandbox.execute("ignored").await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout, "hello\n");
        assert!(outcome.stderr.is_empty());
    }

    #[tokio::test]
    async fn reports_proc_exit_status() {
        let sandbox = Sandbox::with_module(SandboxConfig::default(), EXIT_THREE).unwrap();
        let outcome = sandbox.execute("").await.unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn fuel_bounds_runaway_loops() {
        let config = SandboxConfig {
            fuel: 1_000_000,
            ..SandboxConfig::default()
        };
        let sandbox = Sandbox::with_module(config, SPIN).unwrap();
        assert!(matches!(
            sandbox.execute("").await,
            Err(SandboxError::OutOfFuel)
        ));
    }

    #[tokio::test]
    async fn deadline_bounds_wall_clock() {
        let config = SandboxConfig {
            fuel: u64::MAX,
            timeout: Duration::from_millis(200),
            ..SandboxConfig::default()
        };
        let sandbox = Sandbox::with_module(config, SPIN).unwrap();
        assert!(matches!(
            sandbox.execute("").await,
            Err(SandboxError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn traps_are_reported() {
        let sandbox = Sandbox::with_module(SandboxConfig::default(), UNREACHABLE).unwrap();
        assert!(matches!(sandbox.execute("").await, Err(SandboxError::Trap(_))));
    }
}
