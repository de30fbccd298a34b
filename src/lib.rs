/*!
 * Patchbay - content-patch delivery engine
 *
 * Plans and runs the download or unpack of content-addressed asset bundles:
 * - Work lists by all bundles, by tags, or by asset paths with dependency closure
 * - Bounded-concurrency batches with FIFO admission
 * - Per-bundle retry with a fixed cool-down and progress-based timeouts
 * - Primary/fallback host rotation
 * - BLAKE3 verification of downloaded bundles
 *
 * Version: 0.3.0
 */

pub mod bundle;
pub mod cli_progress;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod query;
pub mod service;
pub mod transport;

// Re-export commonly used types
pub use bundle::{BundleInfo, LoadMode};
pub use config::{BatchDefaults, LogLevel, PatchConfig};
pub use core::batch::{BatchKind, BatchOperation, BatchOptions, BatchOutcome, BatchProgress};
pub use core::fetch::{FetchState, FetchUnit, UnitError};
pub use core::progress::{PatchEvent, ProgressPublisher, ProgressSubscriber};
pub use core::worklist::WorkListBuilder;
pub use error::{PatchError, Result};
pub use patchbay_core_manifest::{AssetEntry, AssetInfo, BundleDescriptor, Manifest};
pub use query::{BuildinQuery, CacheQuery, FsBuildin, FsCache};
pub use service::{DownloadSelection, PatchService, PatchServiceBuilder, UnpackSelection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
