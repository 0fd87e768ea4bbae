//! Video library indexer with metadata caching and range streaming
//!
//! This library scans local video collections into an aggregated tree,
//! enriches files with probed metadata through a persisted cache, and
//! serves files over HTTP with byte-range support.

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod server;
pub mod sort;
pub mod stream;

pub use cache::{cache_key, MetadataCache};
pub use config::{LibraryRoot, MetadataMode, PathMode, ScanConfig};
pub use error::{CacheError, ProbeError, ScanError, ScanErrorKind, StreamError};
pub use index::{LibraryIndex, LibrarySnapshot, SubscriptionId, VideoLocator};
pub use models::{
    AudioInfo, DirectoryEntry, FileEntry, LibraryNode, MediaMetadata, NodeEntry, ScanReport,
    VideoInfo,
};
pub use probe::{FfprobeProber, MediaProber};
pub use progress::{ProgressReporter, ProgressUpdate, ScanPhase};
pub use scanner::TreeScanner;
pub use server::{router, serve, VideoLibrary};
pub use stream::{parse_range, ByteRange, VideoStream};
