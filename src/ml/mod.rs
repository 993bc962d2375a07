// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The Burn-specific half of the harness.
//
//   model.rs      — The image classifier
//                   conv blocks (conv → batch norm → ReLU → pool),
//                   global average pooling, MLP head; plus the
//                   Adam settings read from the same config node.
//
//   trainer.rs    — Lightning-style Trainer
//                   fit / test / predict over a DataModule,
//                   driving callbacks and metrics loggers.
//
//   inferencer.rs — Single-image classification
//                   one unbatched [C, H, W] tensor in,
//                   (label, raw score) out.
//
//   backend.rs    — Which Burn backend an `accelerator` name
//                   selects.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Accelerator name → Burn backend
pub mod backend;

/// CNN image classifier and optimizer settings
pub mod model;

/// Training, validation, test and predict loops
pub mod trainer;

/// Single-image inference
pub mod inferencer;
