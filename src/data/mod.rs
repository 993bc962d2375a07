// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a folder of images to tensor batches:
//
//   data_dir/<class>/*.jpg
//       │
//       ▼
//   ImageFolderDataModule → scans classes, drops unreadable files
//       │
//       ▼
//   split_by_fractions    → seeded train / val / test split
//       │
//       ▼
//   ImageDataset          → Burn Dataset, decodes one image per get()
//       │
//       ▼
//   ImageTransform        → resize, normalise, CHW layout
//       │
//       ▼
//   ImageBatcher          → stacks items into [N, C, H, W] + [N]
//       │
//       ▼
//   DataLoader            → built by the trainer from LoaderSettings
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// The DataModule trait and the loader settings it exposes
pub mod datamodule;

/// One-directory-per-class image datamodule
pub mod image_folder;

/// Implements Burn's Dataset trait over image files
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded shuffle-and-split
pub mod splitter;

/// Resize / normalise / channel-major conversion
pub mod transform;
