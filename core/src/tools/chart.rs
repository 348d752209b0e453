//! Tabular data parsing and chart rendering for `visualize-data`.

use anyhow::{anyhow, bail, ensure, Context, Result};
use serde_json::Value;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Histogram,
    Heatmap,
}

impl ChartKind {
    pub const NAMES: [&'static str; 5] = ["line", "bar", "scatter", "histogram", "heatmap"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "line" => Some(ChartKind::Line),
            "bar" => Some(ChartKind::Bar),
            "scatter" => Some(ChartKind::Scatter),
            "histogram" => Some(ChartKind::Histogram),
            "heatmap" => Some(ChartKind::Heatmap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Numeric columns plus an optional label column (the first non-numeric one).
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub labels: Option<Vec<String>>,
    pub series: Vec<Series>,
}

impl DataTable {
    /// Accepts JSON (records, an object of columns, or a bare number array)
    /// or delimited text with a header row.
    pub fn parse(data: &str) -> Result<Self> {
        let trimmed = data.trim();
        ensure!(!trimmed.is_empty(), "No data provided");

        let columns = if trimmed.starts_with('[') || trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed).context("Data looks like JSON but does not parse")?;
            json_columns(value)?
        } else {
            delimited_columns(trimmed)?
        };
        Self::from_columns(columns)
    }

    fn from_columns(columns: Vec<(String, Vec<String>)>) -> Result<Self> {
        let mut labels = None;
        let mut series = Vec::new();

        for (name, cells) in columns {
            let numeric: Option<Vec<f64>> = cells
                .iter()
                .map(|c| if is_missing(c) { Some(f64::NAN) } else { c.trim().parse::<f64>().ok() })
                .collect();
            match numeric {
                Some(values) if values.iter().any(|v| !v.is_nan()) => series.push(Series { name, values }),
                _ if labels.is_none() => labels = Some(cells),
                _ => {}
            }
        }

        ensure!(!series.is_empty(), "No numeric columns found in data");
        Ok(Self { labels, series })
    }

    pub fn row_count(&self) -> usize {
        self.series.first().map(|s| s.values.len()).unwrap_or(0)
    }
}

// Blank cells and the usual null spellings count as missing values.
fn is_missing(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "" | "na" | "n/a" | "nan" | "null" | "none"
    )
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_columns(value: Value) -> Result<Vec<(String, Vec<String>)>> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_number) => {
            Ok(vec![("value".to_string(), items.iter().map(cell_text).collect())])
        }
        Value::Array(items) => {
            let mut columns: Vec<(String, Vec<String>)> = Vec::new();
            for (row, item) in items.iter().enumerate() {
                let record = item
                    .as_object()
                    .ok_or_else(|| anyhow!("Row {} is not an object", row + 1))?;
                for (key, value) in record {
                    if !columns.iter().any(|(name, _)| name == key) {
                        columns.push((key.clone(), vec![String::new(); row]));
                    }
                    if let Some((_, cells)) = columns.iter_mut().find(|(name, _)| name == key) {
                        cells.push(cell_text(value));
                    }
                }
                for (_, cells) in columns.iter_mut() {
                    cells.resize(row + 1, String::new());
                }
            }
            Ok(columns)
        }
        Value::Object(map) => {
            let columns: Vec<(String, Vec<String>)> = map
                .into_iter()
                .map(|(name, column)| match column {
                    Value::Array(cells) => Ok((name, cells.iter().map(cell_text).collect())),
                    _ => Err(anyhow!("Column '{name}' is not an array")),
                })
                .collect::<Result<_>>()?;
            if let Some((_, first)) = columns.first() {
                ensure!(
                    columns.iter().all(|(_, cells)| cells.len() == first.len()),
                    "Columns have different lengths"
                );
            }
            Ok(columns)
        }
        _ => bail!("JSON data must be an array or an object"),
    }
}

fn delimited_columns(text: &str) -> Result<Vec<(String, Vec<String>)>> {
    let header = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("No header row"))?;
    let delimiter = [b'|', b';', b'\t', b',']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .unwrap_or(b',');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut columns: Vec<(String, Vec<String>)> = reader
        .headers()
        .context("Could not read header row")?
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect();

    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Could not read row {}", index + 2))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        ensure!(
            record.len() == columns.len(),
            "Row {} has {} fields, expected {}",
            index + 2,
            record.len(),
            columns.len()
        );
        for ((_, column), cell) in columns.iter_mut().zip(record.iter()) {
            column.push(cell.to_string());
        }
    }
    Ok(columns)
}

/// Turns a table into an image document.
pub trait ChartRenderer: Send + Sync {
    /// File extension of the produced document.
    fn extension(&self) -> &str;

    fn render(&self, kind: ChartKind, table: &DataTable, title: Option<&str>) -> Result<String>;
}

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];
const HISTOGRAM_BINS: usize = 10;

/// Dependency-free SVG output.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 480.0,
            margin: 60.0,
        }
    }
}

#[derive(Clone, Copy)]
struct Scale {
    min: f64,
    max: f64,
    from: f64,
    to: f64,
}

impl Scale {
    fn over(values: impl Iterator<Item = f64>, from: f64, to: f64) -> Self {
        let (min, max) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min > max {
            return Self { min: 0.0, max: 1.0, from, to };
        }
        Self { min, max, from, to }
    }

    fn including_zero(mut self) -> Self {
        self.min = self.min.min(0.0);
        self.max = self.max.max(0.0);
        self
    }

    fn map(&self, v: f64) -> f64 {
        if self.max == self.min {
            (self.from + self.to) / 2.0
        } else {
            self.from + (v - self.min) / (self.max - self.min) * (self.to - self.from)
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl SvgRenderer {
    fn left(&self) -> f64 {
        self.margin
    }
    fn right(&self) -> f64 {
        self.width - self.margin
    }
    fn top(&self) -> f64 {
        self.margin
    }
    fn bottom(&self) -> f64 {
        self.height - self.margin
    }

    fn axes(&self, out: &mut String, x: Option<Scale>, y: Scale) -> Result<()> {
        let (l, r, t, b) = (self.left(), self.right(), self.top(), self.bottom());
        writeln!(out, r##"<line x1="{l}" y1="{b}" x2="{r}" y2="{b}" stroke="#333"/>"##)?;
        writeln!(out, r##"<line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="#333"/>"##)?;
        writeln!(
            out,
            r#"<text x="{}" y="{}" font-size="11" text-anchor="end">{}</text>"#,
            l - 6.0,
            b,
            fmt_num(y.min)
        )?;
        writeln!(
            out,
            r#"<text x="{}" y="{}" font-size="11" text-anchor="end">{}</text>"#,
            l - 6.0,
            t + 4.0,
            fmt_num(y.max)
        )?;
        if let Some(x) = x {
            writeln!(out, r#"<text x="{l}" y="{}" font-size="11">{}</text>"#, b + 16.0, fmt_num(x.min))?;
            writeln!(
                out,
                r#"<text x="{r}" y="{}" font-size="11" text-anchor="end">{}</text>"#,
                b + 16.0,
                fmt_num(x.max)
            )?;
        }
        Ok(())
    }

    fn legend(&self, out: &mut String, names: &[&str]) -> Result<()> {
        for (i, name) in names.iter().enumerate() {
            let y = self.top() + 14.0 * i as f64;
            let x = self.right() + 8.0;
            writeln!(
                out,
                r#"<rect x="{x}" y="{}" width="10" height="10" fill="{}"/>"#,
                y - 9.0,
                PALETTE[i % PALETTE.len()]
            )?;
            writeln!(out, r#"<text x="{}" y="{y}" font-size="11">{}</text>"#, x + 14.0, escape(name))?;
        }
        Ok(())
    }

    fn line(&self, out: &mut String, table: &DataTable) -> Result<()> {
        let rows = table.row_count();
        let x = Scale::over([0.0, rows.saturating_sub(1) as f64].into_iter(), self.left(), self.right());
        let y = Scale::over(
            table.series.iter().flat_map(|s| s.values.iter().copied()),
            self.bottom(),
            self.top(),
        );
        self.axes(out, Some(x), y)?;
        for (i, series) in table.series.iter().enumerate() {
            let points: Vec<String> = series
                .values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(n, v)| format!("{:.2},{:.2}", x.map(n as f64), y.map(*v)))
                .collect();
            writeln!(
                out,
                r#"<polyline fill="none" stroke="{}" stroke-width="2" points="{}"/>"#,
                PALETTE[i % PALETTE.len()],
                points.join(" ")
            )?;
        }
        self.legend(out, &table.series.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
    }

    fn bar(&self, out: &mut String, table: &DataTable) -> Result<()> {
        let rows = table.row_count().max(1);
        let y = Scale::over(
            table.series.iter().flat_map(|s| s.values.iter().copied()),
            self.bottom(),
            self.top(),
        )
        .including_zero();
        self.axes(out, None, y)?;

        let group = (self.right() - self.left()) / rows as f64;
        let bar = group * 0.8 / table.series.len() as f64;
        let zero = y.map(0.0);
        for (i, series) in table.series.iter().enumerate() {
            for (n, v) in series.values.iter().enumerate().filter(|(_, v)| v.is_finite()) {
                let x = self.left() + group * n as f64 + group * 0.1 + bar * i as f64;
                let top = y.map(*v).min(zero);
                let height = (y.map(*v) - zero).abs();
                writeln!(
                    out,
                    r#"<rect x="{x:.2}" y="{top:.2}" width="{bar:.2}" height="{height:.2}" fill="{}"/>"#,
                    PALETTE[i % PALETTE.len()]
                )?;
            }
        }
        if let Some(labels) = &table.labels {
            for (n, label) in labels.iter().enumerate() {
                writeln!(
                    out,
                    r#"<text x="{:.2}" y="{}" font-size="11" text-anchor="middle">{}</text>"#,
                    self.left() + group * (n as f64 + 0.5),
                    self.bottom() + 16.0,
                    escape(label)
                )?;
            }
        }
        self.legend(out, &table.series.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
    }

    fn scatter(&self, out: &mut String, table: &DataTable) -> Result<()> {
        let [xs, ys] = match table.series.as_slice() {
            [xs, ys, ..] => [xs, ys],
            _ => bail!("Scatter plots need at least two numeric columns"),
        };
        let x = Scale::over(xs.values.iter().copied(), self.left(), self.right());
        let y = Scale::over(ys.values.iter().copied(), self.bottom(), self.top());
        self.axes(out, Some(x), y)?;
        for (a, b) in xs.values.iter().zip(&ys.values).filter(|(a, b)| a.is_finite() && b.is_finite()) {
            writeln!(
                out,
                r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}"/>"#,
                x.map(*a),
                y.map(*b),
                PALETTE[0]
            )?;
        }
        writeln!(
            out,
            r#"<text x="{}" y="{}" font-size="12" text-anchor="middle">{} vs {}</text>"#,
            self.width / 2.0,
            self.height - 12.0,
            escape(&ys.name),
            escape(&xs.name)
        )?;
        Ok(())
    }

    fn histogram(&self, out: &mut String, table: &DataTable) -> Result<()> {
        let all = Scale::over(
            table.series.iter().flat_map(|s| s.values.iter().copied()),
            self.left(),
            self.right(),
        );
        let width = (all.max - all.min) / HISTOGRAM_BINS as f64;
        let counts: Vec<Vec<usize>> = table
            .series
            .iter()
            .map(|s| {
                let mut bins = vec![0usize; HISTOGRAM_BINS];
                for v in s.values.iter().filter(|v| v.is_finite()) {
                    let bin = if width > 0.0 {
                        (((v - all.min) / width) as usize).min(HISTOGRAM_BINS - 1)
                    } else {
                        0
                    };
                    bins[bin] += 1;
                }
                bins
            })
            .collect();

        let y = Scale::over(
            counts.iter().flatten().map(|c| *c as f64),
            self.bottom(),
            self.top(),
        )
        .including_zero();
        self.axes(out, Some(all), y)?;

        let slot = (self.right() - self.left()) / HISTOGRAM_BINS as f64;
        for (i, bins) in counts.iter().enumerate() {
            for (n, count) in bins.iter().enumerate() {
                let top = y.map(*count as f64);
                writeln!(
                    out,
                    r#"<rect x="{:.2}" y="{top:.2}" width="{:.2}" height="{:.2}" fill="{}" fill-opacity="0.6"/>"#,
                    self.left() + slot * n as f64,
                    slot - 1.0,
                    self.bottom() - top,
                    PALETTE[i % PALETTE.len()]
                )?;
            }
        }
        self.legend(out, &table.series.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
    }

    fn heatmap(&self, out: &mut String, table: &DataTable) -> Result<()> {
        ensure!(
            table.series.len() >= 2,
            "Heatmaps need at least two numeric columns"
        );
        let n = table.series.len();
        let cell = ((self.right() - self.left()).min(self.bottom() - self.top())) / n as f64;
        for (i, a) in table.series.iter().enumerate() {
            for (j, b) in table.series.iter().enumerate() {
                let r = correlation(&a.values, &b.values);
                let x = self.left() + cell * j as f64;
                let y = self.top() + cell * i as f64;
                writeln!(
                    out,
                    r#"<rect x="{x:.2}" y="{y:.2}" width="{cell:.2}" height="{cell:.2}" fill="{}"/>"#,
                    diverging(r)
                )?;
                writeln!(
                    out,
                    r#"<text x="{:.2}" y="{:.2}" font-size="11" text-anchor="middle">{r:.2}</text>"#,
                    x + cell / 2.0,
                    y + cell / 2.0 + 4.0
                )?;
            }
            writeln!(
                out,
                r#"<text x="{:.2}" y="{:.2}" font-size="11" text-anchor="end">{}</text>"#,
                self.left() - 6.0,
                self.top() + cell * (i as f64 + 0.5),
                escape(&a.name)
            )?;
        }
        Ok(())
    }
}

impl ChartRenderer for SvgRenderer {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(&self, kind: ChartKind, table: &DataTable, title: Option<&str>) -> Result<String> {
        let mut out = String::new();
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}" font-family="sans-serif">"#,
            self.width, self.height, self.width, self.height
        )?;
        writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            writeln!(
                out,
                r#"<text x="{}" y="{}" font-size="16" text-anchor="middle">{}</text>"#,
                self.width / 2.0,
                self.margin / 2.0,
                escape(title)
            )?;
        }

        match kind {
            ChartKind::Line => self.line(&mut out, table)?,
            ChartKind::Bar => self.bar(&mut out, table)?,
            ChartKind::Scatter => self.scatter(&mut out, table)?,
            ChartKind::Histogram => self.histogram(&mut out, table)?,
            ChartKind::Heatmap => self.heatmap(&mut out, table)?,
        }

        writeln!(out, "</svg>")?;
        Ok(out)
    }
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e12 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

// Pearson correlation over the rows where both values are present.
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    let n = pairs.len();
    if n < 2 {
        return 0.0;
    }
    let ma = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mb = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (da, db) = (x - ma, y - mb);
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    let denom = (va * vb).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

// Blue (-1) through white (0) to red (+1).
fn diverging(r: f64) -> String {
    let r = r.clamp(-1.0, 1.0);
    let fade = |t: f64| (255.0 * (1.0 - t.abs())).round() as u8;
    if r >= 0.0 {
        format!("rgb(255,{},{})", fade(r), fade(r))
    } else {
        format!("rgb({},{},255)", fade(r), fade(r))
    }
}
