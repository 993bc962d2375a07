// ============================================================
// Layer 6 — Metrics Loggers
// ============================================================
// Two MetricsLogger implementations the trainer writes through.
//
// CsvLogger — one directory per run:
//
//   <save_dir>/<name>/version_<n>/
//     hparams.yaml    ← the resolved run config
//     metrics.csv     ← one row per log_metrics() call
//
//   Different calls log different metrics (train_loss_step every
//   few steps, val_loss once per epoch), so the header is the
//   union of every key seen so far and the file is rewritten
//   whenever a new row arrives. Cells for metrics a row does not
//   have stay empty:
//
//     step,train_loss_step,val_acc,val_loss
//     50,1.982311,,
//     63,,0.412500,1.730112
//
// TracingLogger — emits each metrics map as one `info` event on
// the `metrics` target, JSON-encoded so it can be grepped out of
// the log file.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::{
    collections::BTreeSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{metrics::MetricMap, traits::MetricsLogger};

// ─── CsvLogger ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvLoggerArgs {
    pub save_dir: PathBuf,
    pub name:     String,
    /// Next free version_<n> when absent.
    pub version:  Option<usize>,
}

impl Default for CsvLoggerArgs {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("logs"),
            name:     "csv".to_string(),
            version:  None,
        }
    }
}

pub struct CsvLogger {
    name:    String,
    log_dir: PathBuf,
    columns: BTreeSet<String>,
    rows:    Vec<(usize, MetricMap)>,
}

impl CsvLogger {
    pub fn new(args: CsvLoggerArgs) -> Result<Self> {
        let root = args.save_dir.join(&args.name);
        let version = match args.version {
            Some(v) => v,
            None => next_version(&root),
        };
        let log_dir = root.join(format!("version_{version}"));
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Cannot create logger directory '{}'", log_dir.display()))?;

        tracing::debug!("CsvLogger writing to '{}'", log_dir.display());
        Ok(Self {
            name: args.name,
            log_dir,
            columns: BTreeSet::new(),
            rows: Vec::new(),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn csv_path(&self) -> PathBuf {
        self.log_dir.join("metrics.csv")
    }

    fn write_csv(&self) -> Result<()> {
        let path = self.csv_path();
        let mut f = fs::File::create(&path)
            .with_context(|| format!("Cannot write metrics to '{}'", path.display()))?;

        let header: Vec<&str> = std::iter::once("step")
            .chain(self.columns.iter().map(String::as_str))
            .collect();
        writeln!(f, "{}", header.join(","))?;

        for (step, metrics) in &self.rows {
            let cells: Vec<String> = std::iter::once(step.to_string())
                .chain(self.columns.iter().map(|c| {
                    metrics.get(c).map(|v| format!("{v:.6}")).unwrap_or_default()
                }))
                .collect();
            writeln!(f, "{}", cells.join(","))?;
        }
        Ok(())
    }
}

/// One past the highest existing `version_<n>` under `root`.
fn next_version(root: &Path) -> usize {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("version_"))
                .and_then(|n| n.parse::<usize>().ok())
        })
        .max()
        .map_or(0, |v| v + 1)
}

impl MetricsLogger for CsvLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn log_hyperparams(&mut self, params: &Value) -> Result<()> {
        let path = self.log_dir.join("hparams.yaml");
        let yaml = serde_yaml::to_string(params)?;
        fs::write(&path, yaml)
            .with_context(|| format!("Cannot write hyper-parameters to '{}'", path.display()))?;
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()> {
        self.columns.extend(metrics.keys().cloned());
        self.rows.push((step, metrics.clone()));
        self.write_csv()
    }

    fn finalize(&mut self, status: &str) -> Result<()> {
        tracing::debug!("CsvLogger finalized ({status}): {} rows", self.rows.len());
        self.write_csv()
    }
}

// ─── TracingLogger ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingLoggerArgs {
    pub name: String,
}

impl Default for TracingLoggerArgs {
    fn default() -> Self {
        Self { name: "tracing".to_string() }
    }
}

pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    pub fn new(args: TracingLoggerArgs) -> Self {
        Self { name: args.name }
    }
}

impl MetricsLogger for TracingLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn log_hyperparams(&mut self, params: &Value) -> Result<()> {
        tracing::debug!(target: "metrics", logger = %self.name, "hparams: {}", serde_json::to_string(params)?);
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()> {
        tracing::info!(target: "metrics", logger = %self.name, step, "{}", serde_json::to_string(metrics)?);
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn logger(dir: &Path) -> CsvLogger {
        CsvLogger::new(CsvLoggerArgs {
            save_dir: dir.to_path_buf(),
            name:     "run".into(),
            version:  None,
        })
        .unwrap()
    }

    #[test]
    fn csv_header_is_union_of_metric_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = logger(dir.path());
        csv.log_metrics(&MetricMap::from([("train_loss_step".into(), 2.0)]), 50).unwrap();
        csv.log_metrics(
            &MetricMap::from([("val_loss".into(), 1.5), ("val_acc".into(), 0.25)]),
            63,
        )
        .unwrap();

        let text = fs::read_to_string(csv.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,train_loss_step,val_acc,val_loss");
        assert_eq!(lines[1], "50,2.000000,,");
        assert_eq!(lines[2], "63,,0.250000,1.500000");
    }

    #[test]
    fn versions_do_not_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let first = logger(dir.path());
        let second = logger(dir.path());
        assert!(first.log_dir().ends_with("version_0"));
        assert!(second.log_dir().ends_with("version_1"));
    }

    #[test]
    fn hyperparams_are_written_as_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = logger(dir.path());
        let params: Value = serde_yaml::from_str("model:\n  lr: 0.01\n").unwrap();
        csv.log_hyperparams(&params).unwrap();
        let written: Value =
            serde_yaml::from_str(&fs::read_to_string(csv.log_dir().join("hparams.yaml")).unwrap()).unwrap();
        assert_eq!(written, params);
    }
}
