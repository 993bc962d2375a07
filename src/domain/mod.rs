// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits shared across layers.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Metric maps, lifecycle stages, monitor modes, predictions
pub mod metrics;

// Logger abstraction the trainer writes through
pub mod traits;
