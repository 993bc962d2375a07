// ============================================================
// Layer 6 — Logging
// ============================================================
// Every line, on stdout and in the run's log file, looks like:
//
//   [2024-05-01 12:00:03,417][breed_classifier::application::train_use_case][INFO] - Instantiating model <ImageClassifier>
//
// Two ways to install it:
//   init_global()          process-wide stdout subscriber, set once in main
//   LoggingContext::open() stdout + <log_dir>/<name>.log for one entry
//                          point; restores the previous subscriber on drop
//
// RUST_LOG is honoured by both; the default level is `info`.

use std::{
    fmt,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{subscriber::DefaultGuard, Event, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    EnvFilter, Registry,
};

// ─── Line format ──────────────────────────────────────────────────────────────
/// `[timestamp][target][LEVEL] - message`
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketFormat;

impl<S, N> FormatEvent<S, N> for BracketFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "[{}][{}][{}] - ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            meta.target(),
            meta.level(),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the process-wide stdout subscriber.
pub fn init_global() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .event_format(BracketFormat)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Cannot install the global logger: {e}"))
}

// ─── LoggingContext ───────────────────────────────────────────────────────────
/// Logging for one entry point: stdout plus an appended log file.
/// The subscriber is active on this thread until the context is dropped.
pub struct LoggingContext {
    log_file: PathBuf,
    _guard:   DefaultGuard,
}

impl LoggingContext {
    /// Creates the parent directory of `log_file` if needed.
    pub fn open(log_file: &Path) -> Result<Self> {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create log directory '{}'", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Cannot open log file '{}'", log_file.display()))?;

        let subscriber = Registry::default()
            .with(env_filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(BracketFormat)
                    .with_writer(std::io::stdout),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(BracketFormat)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            );

        let guard = tracing::subscriber::set_default(subscriber);
        tracing::debug!("Logging to '{}'", log_file.display());
        Ok(Self { log_file: log_file.to_path_buf(), _guard: guard })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

// ─── Task wrapper ─────────────────────────────────────────────────────────────
/// Run `task`, logging its start, its duration, and its error if any.
/// Errors are returned unchanged.
pub fn task_wrapper<T>(name: &str, task: impl FnOnce() -> Result<T>) -> Result<T> {
    tracing::info!("Starting task '{name}'");
    let start = Instant::now();
    match task() {
        Ok(value) => {
            tracing::info!("Task '{name}' finished in {:.2}s", start.elapsed().as_secs_f64());
            Ok(value)
        }
        Err(e) => {
            tracing::error!("Task '{name}' failed after {:.2}s: {e:#}", start.elapsed().as_secs_f64());
            Err(e)
        }
    }
}

// ─── Test support ─────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod capture {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing::subscriber::DefaultGuard;

    use super::BracketFormat;

    #[derive(Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Route this thread's events into memory until the guard drops.
    pub(crate) fn capture_logs() -> (DefaultGuard, Captured) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(BracketFormat)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        (tracing::subscriber::set_default(subscriber), captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_gets_bracketed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("train_log.log");
        {
            let _ctx = LoggingContext::open(&path).unwrap();
            tracing::info!("hello from the run");
        }
        let text = fs::read_to_string(&path).unwrap();
        let line = text.lines().find(|l| l.contains("hello from the run")).unwrap();
        assert!(line.starts_with('['), "{line}");
        assert!(line.contains("][INFO] - hello from the run"), "{line}");
    }

    #[test]
    fn task_wrapper_passes_errors_through_and_logs_them() {
        let (_guard, logs) = capture::capture_logs();
        let result: Result<()> = task_wrapper("train", || anyhow::bail!("boom"));
        assert_eq!(result.unwrap_err().to_string(), "boom");
        let text = logs.text();
        assert!(text.contains("Starting task 'train'"));
        assert!(text.contains("Task 'train' failed after"));

        assert_eq!(task_wrapper("ok", || Ok(7)).unwrap(), 7);
    }
}
