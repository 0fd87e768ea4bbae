//! Configuration for the video library

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default max depth for recursive scanning
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default prober executable
pub const DEFAULT_FFPROBE: &str = "ffprobe";

/// Default progress reporting interval in milliseconds
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// One library root: a display name and the path to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub name: String,
    pub path: PathBuf,
}

impl LibraryRoot {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Parse `NAME=PATH`, or a bare path named after its last component
    pub fn parse(arg: &str) -> Self {
        if let Some((name, path)) = arg.split_once('=') {
            if !name.is_empty() && !path.is_empty() {
                return Self::new(name, path);
            }
        }
        let path = PathBuf::from(arg);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| arg.to_string());
        Self { name, path }
    }
}

/// Which metadata is extracted and cached for each video file.
///
/// Chosen once at startup; the cached value shape follows the mode
/// (a bare duration number, or a full stream record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// No probing at all
    Disabled,
    /// Duration only
    #[default]
    Duration,
    /// Duration plus first video and audio stream details
    Full,
}

impl MetadataMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, MetadataMode::Disabled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataMode::Disabled => "disabled",
            MetadataMode::Duration => "duration",
            MetadataMode::Full => "full",
        }
    }
}

/// How clients address a video for streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Files get a random identifier; paths never leave the server
    #[default]
    Opaque,
    /// Clients send filesystem paths directly.
    ///
    /// Less secure: any readable file can be requested.
    Direct,
}

/// Configuration for the scanner and the streaming index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Library roots to scan, in display order
    pub roots: Vec<LibraryRoot>,

    /// Video file extensions (lowercase, without dot)
    pub extensions: HashSet<String>,

    /// Directory names to ignore besides hidden ones
    pub ignore_dirs: HashSet<String>,

    /// What metadata to probe for
    pub metadata_mode: MetadataMode,

    /// How streamed files are addressed
    pub path_mode: PathMode,

    /// Number of threads for directory traversal
    /// 0 means auto-detect (CPU cores × 2)
    pub num_threads: usize,

    /// Upper bound on concurrently running probes
    /// 0 means auto-detect (CPU cores)
    pub max_concurrent_probes: usize,

    /// Maximum directory depth below each root
    pub max_depth: usize,

    /// Whether symlinks are followed
    pub follow_links: bool,

    /// Metadata cache file; no persistence when unset
    pub cache_path: Option<PathBuf>,

    /// Evict least-recently-used cache entries beyond this count
    pub cache_max_entries: Option<usize>,

    /// Prober executable
    pub ffprobe_path: PathBuf,

    /// Whether progress lines are written to stderr
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: Self::default_video_extensions(),
            ignore_dirs: Self::default_ignore_dirs(),
            metadata_mode: MetadataMode::default(),
            path_mode: PathMode::default(),
            num_threads: 0,
            max_concurrent_probes: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            follow_links: true,
            cache_path: None,
            cache_max_entries: None,
            ffprobe_path: PathBuf::from(DEFAULT_FFPROBE),
            show_progress: false,
        }
    }
}

impl ScanConfig {
    /// Create a new config with the given roots
    pub fn new(roots: Vec<LibraryRoot>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Get the default video extensions
    pub fn default_video_extensions() -> HashSet<String> {
        ["mp4", "webm", "mkv", "avi", "mov"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Get the default directories to ignore
    pub fn default_ignore_dirs() -> HashSet<String> {
        ["$RECYCLE.BIN", "System Volume Information", "@eaDir"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Check whether a path names a recognized video file
    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Check if an entry should be skipped before it is visited
    pub fn should_ignore(&self, name: &str, is_dir: bool) -> bool {
        if is_hidden(name) {
            return true;
        }
        is_dir && self.ignore_dirs.contains(name)
    }

    /// Get the effective number of traversal threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get() * 2)
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }

    /// Get the effective probe concurrency
    pub fn effective_probe_limit(&self) -> usize {
        if self.max_concurrent_probes == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(2)
        } else {
            self.max_concurrent_probes
        }
    }
}

/// Names starting with `.` are hidden
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Expand a leading `~` and make the path absolute
pub fn resolve_path(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the library roots
    pub fn roots(mut self, roots: Vec<LibraryRoot>) -> Self {
        self.config.roots = roots;
        self
    }

    /// Add a library root
    pub fn add_root(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.config.roots.push(LibraryRoot::new(name, path));
        self
    }

    /// Set the extensions whitelist
    pub fn extensions(mut self, extensions: HashSet<String>) -> Self {
        self.config.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Add a directory to ignore
    pub fn add_ignore_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.ignore_dirs.insert(dir.into());
        self
    }

    pub fn metadata_mode(mut self, mode: MetadataMode) -> Self {
        self.config.metadata_mode = mode;
        self
    }

    pub fn path_mode(mut self, mode: PathMode) -> Self {
        self.config.path_mode = mode;
        self
    }

    /// Set the number of traversal threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Set the probe concurrency limit
    pub fn max_concurrent_probes(mut self, limit: usize) -> Self {
        self.config.max_concurrent_probes = limit;
        self
    }

    /// Set the maximum depth for recursive scanning
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.config.follow_links = enabled;
        self
    }

    /// Set the metadata cache file
    pub fn cache_path(mut self, path: PathBuf) -> Self {
        self.config.cache_path = Some(path);
        self
    }

    pub fn cache_max_entries(mut self, max: Option<usize>) -> Self {
        self.config.cache_max_entries = max;
        self
    }

    pub fn ffprobe_path(mut self, path: PathBuf) -> Self {
        self.config.ffprobe_path = path;
        self
    }

    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
