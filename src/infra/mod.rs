// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs — Saving and loading model weights
//                   Burn's CompactRecorder, written according
//                   to a CheckpointPolicy (directory + filename
//                   strategy) and loaded with strict checks.
//
//   logging.rs    — The `[time][target][LEVEL] - message` log
//                   format, the per-run LoggingContext that also
//                   writes <log_dir>/<name>.log, and the task
//                   wrapper that times train/test.
//
//   metrics.rs    — MetricsLogger implementations: CSV files
//                   on disk, or tracing events.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Log format, per-run log files, task timing
pub mod logging;

/// CSV and tracing metrics loggers
pub mod metrics;
