//! Scanner module - builds the aggregated library tree
//!
//! Scanning runs in two phases. The structural pass walks every root on
//! a traversal pool, producing file nodes with sizes and counts. The
//! enrichment pass then resolves metadata for each file through the
//! cache, falling back to the prober on a separately bounded pool.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::cache::{cache_key, decode_metadata, encode_metadata, MetadataCache};
use crate::config::{is_hidden, resolve_path, ScanConfig};
use crate::error::ScanError;
use crate::models::{LibraryNode, NodeEntry, ScanReport};
use crate::probe::MediaProber;
use crate::progress::{ProgressReporter, ProgressUpdate, ScanPhase};
use crate::sort::sort_siblings;

/// Shared per-scan state
#[derive(Default)]
struct ScanContext {
    files: AtomicU64,
    dirs: AtomicU64,
    enriched: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    depth_limited: AtomicU64,
    errors: Mutex<Vec<ScanError>>,
}

/// Walks library roots and produces aggregated trees
pub struct TreeScanner {
    config: ScanConfig,
    cache: Arc<MetadataCache>,
    prober: Arc<dyn MediaProber>,
    progress: Arc<ProgressReporter>,
}

impl TreeScanner {
    pub fn new(
        config: ScanConfig,
        cache: Arc<MetadataCache>,
        prober: Arc<dyn MediaProber>,
    ) -> Self {
        let progress = Arc::new(ProgressReporter::new(
            config.show_progress,
            crate::config::DEFAULT_PROGRESS_INTERVAL_MS,
        ));
        Self {
            config,
            cache,
            prober,
            progress,
        }
    }

    /// Replace the progress reporter
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    /// Scan one path. Returns `None` when it holds no videos.
    pub fn scan(&self, root: &Path) -> Option<LibraryNode> {
        let report = self.run(vec![(None, resolve_path(root))]);
        report.roots.into_iter().next()
    }

    /// Scan every configured root
    pub fn scan_roots(&self) -> ScanReport {
        let targets = self
            .config
            .roots
            .iter()
            .map(|root| (Some(root.name.clone()), resolve_path(&root.path)))
            .collect();
        self.run(targets)
    }

    fn run(&self, targets: Vec<(Option<String>, PathBuf)>) -> ScanReport {
        let start = Instant::now();
        let ctx = ScanContext::default();
        self.progress.reset();
        log::info!("Scanning {} library path(s)...", targets.len());

        let traversal_pool = build_pool(self.config.effective_threads(), "scan");
        let mut roots: Vec<LibraryNode> = install(traversal_pool.as_ref(), || {
            targets
                .into_iter()
                .filter_map(|(name, path)| {
                    if !path.exists() {
                        self.record(&ctx, ScanError::not_found(path));
                        return None;
                    }
                    let mut node = self.visit(&ctx, &path, 0, &[])?;
                    if let Some(name) = name {
                        node.name = name;
                    }
                    Some(node)
                })
                .collect()
        });
        drop(traversal_pool);
        log::debug!(
            "Structural pass found {} videos in {:?}",
            ctx.files.load(Ordering::Relaxed),
            start.elapsed()
        );

        if self.config.metadata_mode.is_enabled() {
            self.enrich_all(&ctx, &mut roots);
            if let Err(e) = self.cache.flush() {
                log::warn!("Failed to save cache: {}", e);
            }
        }

        let report = ScanReport {
            roots,
            total_files: ctx.files.load(Ordering::Relaxed),
            total_dirs: ctx.dirs.load(Ordering::Relaxed),
            enriched_files: ctx.enriched.load(Ordering::Relaxed),
            cache_hits: ctx.cache_hits.load(Ordering::Relaxed),
            cache_misses: ctx.cache_misses.load(Ordering::Relaxed),
            depth_limited: ctx.depth_limited.load(Ordering::Relaxed),
            errors: ctx.errors.into_inner().unwrap_or_else(|e| e.into_inner()),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        log::info!(
            "Scanned {} videos in {} directories in {}.",
            report.total_files,
            report.total_dirs,
            format_elapsed(start.elapsed())
        );
        if let Some(rate) = report.cache_hit_rate() {
            log::info!("Cache hit rate: {:.2}%", rate);
        }
        if report.depth_limited > 0 {
            log::info!(
                "Skipped {} directories below max depth {}",
                report.depth_limited,
                self.config.max_depth
            );
        }
        self.progress.report_done(&report);
        report
    }

    /// Structural pass over one entry
    fn visit(
        &self,
        ctx: &ScanContext,
        path: &Path,
        depth: usize,
        ancestors: &[PathBuf],
    ) -> Option<LibraryNode> {
        let name = entry_name(path);
        if is_hidden(&name) {
            return None;
        }

        let metadata = match self.stat(path) {
            Ok(m) => m,
            Err(e) => {
                self.record(ctx, ScanError::from_io(path.to_path_buf(), &e));
                return None;
            }
        };

        if metadata.is_file() {
            if !self.config.is_video_file(path) {
                return None;
            }
            let files = ctx.files.fetch_add(1, Ordering::Relaxed) + 1;
            self.progress.report(
                ProgressUpdate {
                    phase: ScanPhase::Scan,
                    processed: files,
                    total: 0,
                    current_item: path.to_string_lossy().to_string(),
                },
                false,
            );
            return Some(LibraryNode::file(
                name,
                path.to_path_buf(),
                metadata.len(),
                modified_at(&metadata),
            ));
        }

        if !metadata.is_dir() || self.config.should_ignore(&name, true) {
            return None;
        }
        if depth > self.config.max_depth {
            log::debug!(
                "Skipping {:?}: deeper than max depth {}",
                path,
                self.config.max_depth
            );
            ctx.depth_limited.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let canonical = match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                self.record(ctx, ScanError::from_io(path.to_path_buf(), &e));
                return None;
            }
        };
        if ancestors.contains(&canonical) {
            self.record(ctx, ScanError::symlink_loop(path.to_path_buf()));
            return None;
        }
        let mut chain = ancestors.to_vec();
        chain.push(canonical);

        ctx.dirs.fetch_add(1, Ordering::Relaxed);
        let entries = self.list_dir(ctx, path);

        let mut children: Vec<LibraryNode> = entries
            .par_iter()
            .filter_map(|entry| self.visit(ctx, entry, depth + 1, &chain))
            .collect();
        if children.is_empty() {
            return None;
        }
        sort_siblings(&mut children);

        Some(LibraryNode::directory(
            name,
            path.to_path_buf(),
            modified_at(&metadata),
            children,
        ))
    }

    fn stat(&self, path: &Path) -> std::io::Result<Metadata> {
        if self.config.follow_links {
            std::fs::metadata(path)
        } else {
            std::fs::symlink_metadata(path)
        }
    }

    /// Immediate children of `dir`, hidden names excluded
    fn list_dir(&self, ctx: &ScanContext, dir: &Path) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.config.follow_links);
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_name().to_str().is_some_and(is_hidden) {
                        continue;
                    }
                    entries.push(entry.into_path());
                }
                Err(e) => self.record(ctx, ScanError::from(e)),
            }
        }
        entries
    }

    /// Enrichment pass over every file node
    fn enrich_all(&self, ctx: &ScanContext, roots: &mut [LibraryNode]) {
        let mut files = Vec::new();
        for root in roots.iter_mut() {
            root.files_mut(&mut files);
        }
        let total = files.len() as u64;
        self.progress.report(
            ProgressUpdate {
                phase: ScanPhase::Enrich,
                processed: 0,
                total,
                current_item: String::new(),
            },
            true,
        );

        let probe_pool = build_pool(self.config.effective_probe_limit(), "probe");
        install(probe_pool.as_ref(), || {
            files
                .par_iter_mut()
                .for_each(|node| self.enrich(ctx, node, total));
        });

        for root in roots.iter_mut() {
            root.recompute_totals();
        }
    }

    fn enrich(&self, ctx: &ScanContext, node: &mut LibraryNode, total: u64) {
        let Some(path) = node.absolute_path.clone() else {
            return;
        };
        let mode = self.config.metadata_mode;
        let key = cache_key(&path, node.modified_at.timestamp_millis());

        let cached = self
            .cache
            .get(&key)
            .and_then(|value| decode_metadata(&value, mode));
        let metadata = match cached {
            Some(meta) => {
                ctx.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(meta)
            }
            None => {
                ctx.cache_misses.fetch_add(1, Ordering::Relaxed);
                match self.prober.probe(&path) {
                    Ok(meta) => {
                        if let Some(value) = encode_metadata(&meta, mode) {
                            self.cache.set(key, value);
                        }
                        Some(meta)
                    }
                    Err(e) => {
                        log::warn!("Could not get metadata for {:?}: {}", path, e);
                        None
                    }
                }
            }
        };

        if let NodeEntry::File(file) = &mut node.entry {
            file.metadata = metadata;
        }

        let enriched = ctx.enriched.fetch_add(1, Ordering::Relaxed) + 1;
        self.progress.report(
            ProgressUpdate {
                phase: ScanPhase::Enrich,
                processed: enriched,
                total,
                current_item: path.to_string_lossy().to_string(),
            },
            enriched == total,
        );
    }

    fn record(&self, ctx: &ScanContext, error: ScanError) {
        log::warn!("Error scanning {:?}: {}", error.path, error.message);
        self.progress.report_error(&error);
        ctx.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error);
    }
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn modified_at(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn build_pool(threads: usize, name: &'static str) -> Option<ThreadPool> {
    match ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{name}-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::error!("Failed to build {} pool, using the global pool: {}", name, e);
            None
        }
    }
}

fn install<R: Send>(pool: Option<&ThreadPool>, f: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Format an elapsed time as "1 m 2.345 s" or "2.345 s"
fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms >= 60_000 {
        format!("{} m {}.{:03} s", ms / 60_000, (ms % 60_000) / 1000, ms % 1000)
    } else {
        format!("{}.{:03} s", ms / 1000, ms % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataMode;
    use crate::error::ProbeError;
    use crate::models::MediaMetadata;
    use crate::sort::sibling_cmp;
    use proptest::prelude::*;
    use std::cmp::Ordering as CmpOrdering;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Reports the file size as duration; fails for names containing "broken"
    #[derive(Default)]
    struct StubProber {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_ms: u64,
    }

    impl MediaProber for StubProber {
        fn probe(&self, path: &Path) -> Result<MediaMetadata, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.delay_ms));
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if path.to_string_lossy().contains("broken") {
                return Err(ProbeError::MissingDuration);
            }
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            Ok(MediaMetadata::with_duration(size as f64))
        }
    }

    /// The default `.tmp` prefix would make every root hidden
    fn tempdir() -> TempDir {
        tempfile::Builder::new().prefix("library").tempdir().unwrap()
    }

    fn touch(root: &Path, rel: &str, bytes: usize) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![0u8; bytes]).unwrap();
    }

    fn scanner(config: ScanConfig, prober: Arc<StubProber>) -> TreeScanner {
        TreeScanner::new(config, Arc::new(MetadataCache::in_memory(None)), prober)
    }

    fn names(node: &LibraryNode) -> Vec<&str> {
        node.children().iter().map(|c| c.name.as_str()).collect()
    }

    fn assert_tree_invariants(node: &LibraryNode) {
        if let NodeEntry::Directory(dir) = &node.entry {
            assert!(!dir.children.is_empty(), "empty directory {}", node.name);
            let count: u64 = dir.children.iter().map(|c| c.video_count()).sum();
            let size: u64 = dir.children.iter().map(|c| c.total_size()).sum();
            let duration: f64 = dir.children.iter().map(|c| c.total_duration()).sum();
            assert_eq!(dir.video_count, count);
            assert_eq!(dir.total_size, size);
            assert!((dir.total_duration - duration).abs() < 1e-6);
            for pair in dir.children.windows(2) {
                assert_ne!(sibling_cmp(&pair[0], &pair[1]), CmpOrdering::Greater);
            }
            for child in &dir.children {
                assert_tree_invariants(child);
            }
        }
        assert!(!is_hidden(&node.name));
    }

    #[test]
    fn test_prunes_directories_without_videos() {
        let dir = tempdir();
        touch(dir.path(), "shows/a.mp4", 10);
        touch(dir.path(), "docs/readme.txt", 10);
        std::fs::create_dir_all(dir.path().join("empty/nested/deeper")).unwrap();

        let tree = scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .unwrap();
        assert_eq!(names(&tree), ["shows"]);
        assert_tree_invariants(&tree);
    }

    #[test]
    fn test_no_videos_returns_none() {
        let dir = tempdir();
        touch(dir.path(), "notes.txt", 3);
        assert!(scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .is_none());
    }

    #[test]
    fn test_hidden_entries_excluded_at_any_depth() {
        let dir = tempdir();
        touch(dir.path(), ".hidden/a.mp4", 1);
        touch(dir.path(), "visible/.secret.mp4", 1);
        touch(dir.path(), "visible/deep/.cache/b.mp4", 1);
        touch(dir.path(), "visible/deep/c.mp4", 1);

        let tree = scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .unwrap();
        let mut seen = Vec::new();
        tree.walk(&mut |n| seen.push(n.name.clone()));
        assert!(seen.iter().all(|n| !n.starts_with('.')), "{seen:?}");
        assert_eq!(tree.video_count(), 1);
    }

    #[test]
    fn test_sibling_order_and_aggregates() {
        let dir = tempdir();
        touch(dir.path(), "Episode 10.mp4", 10);
        touch(dir.path(), "Episode 2.mkv", 20);
        touch(dir.path(), "Season B/x.mp4", 30);
        touch(dir.path(), "season a/y.MOV", 40);

        let tree = scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .unwrap();
        assert_eq!(
            names(&tree),
            ["season a", "Season B", "Episode 2.mkv", "Episode 10.mp4"]
        );
        assert_eq!(tree.video_count(), 4);
        assert_eq!(tree.total_size(), 100);
        assert!((tree.total_duration() - 100.0).abs() < 1e-9);
        assert_tree_invariants(&tree);
    }

    #[test]
    fn test_probe_failure_keeps_node() {
        let dir = tempdir();
        touch(dir.path(), "broken.mp4", 7);
        touch(dir.path(), "good.mp4", 5);

        let tree = scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .unwrap();
        let broken = &tree.children()[0];
        assert_eq!(broken.name, "broken.mp4");
        assert!(broken.metadata().is_none());
        assert_eq!(broken.total_size(), 7);
        assert_eq!(tree.video_count(), 2);
        assert!((tree.total_duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_avoids_reprobing() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4", 3);
        touch(dir.path(), "b.mp4", 4);
        let prober = Arc::new(StubProber::default());
        let scanner = scanner(ScanConfig::default(), prober.clone());

        let first = scanner.scan(dir.path()).unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        let second = scanner.scan(dir.path()).unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.total_duration(), second.total_duration());
    }

    #[test]
    fn test_mtime_change_triggers_reprobe() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4", 3);
        let prober = Arc::new(StubProber::default());
        let scanner = scanner(ScanConfig::default(), prober.clone());

        scanner.scan(dir.path()).unwrap();
        let file = std::fs::File::options()
            .write(true)
            .open(dir.path().join("a.mp4"))
            .unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
            .unwrap();
        scanner.scan(dir.path()).unwrap();

        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_mode_never_probes() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4", 3);
        let prober = Arc::new(StubProber::default());
        let config = ScanConfig::builder()
            .metadata_mode(MetadataMode::Disabled)
            .build();

        let tree = scanner(config, prober.clone()).scan(dir.path()).unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert!(tree.children()[0].metadata().is_none());
        assert_eq!(tree.total_duration(), 0.0);
    }

    #[test]
    fn test_probe_concurrency_is_bounded() {
        let dir = tempdir();
        for i in 0..12 {
            touch(dir.path(), &format!("d{}/v{i}.mp4", i % 3), 1);
        }
        let prober = Arc::new(StubProber {
            delay_ms: 20,
            ..Default::default()
        });
        let config = ScanConfig::builder()
            .num_threads(8)
            .max_concurrent_probes(2)
            .build();

        scanner(config, prober.clone()).scan(dir.path()).unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 12);
        assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_isolated() {
        let dir = tempdir();
        touch(dir.path(), "ok/a.mp4", 1);
        std::os::unix::fs::symlink(dir.path().join("missing.mp4"), dir.path().join("ok/b.mp4"))
            .unwrap();

        let config = ScanConfig::builder()
            .add_root("Library", dir.path())
            .build();
        let report = scanner(config, Arc::default()).scan_roots();

        assert_eq!(report.roots[0].video_count(), 1);
        assert!(!report.errors.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() {
        let dir = tempdir();
        touch(dir.path(), "a/v.mp4", 1);
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("a/again")).unwrap();

        let tree = scanner(ScanConfig::default(), Arc::default())
            .scan(dir.path())
            .unwrap();
        assert_eq!(tree.video_count(), 1);
    }

    #[test]
    fn test_scan_roots_names_and_missing_roots() {
        let dir = tempdir();
        touch(dir.path(), "movies/a.mp4", 1);
        let config = ScanConfig::builder()
            .add_root("Movies", dir.path().join("movies"))
            .add_root("Gone", dir.path().join("does-not-exist"))
            .build();

        let report = scanner(config, Arc::default()).scan_roots();
        assert_eq!(report.roots.len(), 1);
        assert_eq!(report.roots[0].name, "Movies");
        assert_eq!(report.total_files, 1);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.cache_misses, 1);
    }

    #[test]
    fn test_cache_flushed_after_scan() {
        let dir = tempdir();
        touch(dir.path(), "lib/a.mp4", 9);
        let cache_path = dir.path().join("cache.json");
        let cache = Arc::new(MetadataCache::open(&cache_path, None));
        let scanner = TreeScanner::new(
            ScanConfig::default(),
            cache,
            Arc::new(StubProber::default()),
        );

        scanner.scan(&dir.path().join("lib")).unwrap();
        let persisted = MetadataCache::load(&cache_path).unwrap();
        assert_eq!(persisted.len(), 1);
        let value = persisted.values().next().unwrap();
        assert_eq!(value.as_f64(), Some(9.0));
    }

    #[test]
    fn test_progress_phases() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4", 1);
        touch(dir.path(), "b.mp4", 1);
        let reporter = Arc::new(ProgressReporter::silent());
        let rx = reporter.subscribe();
        let scanner = scanner(ScanConfig::default(), Arc::default()).with_progress(reporter);

        scanner.scan(dir.path()).unwrap();
        let updates: Vec<ProgressUpdate> = rx.try_iter().collect();
        assert!(updates.iter().any(|u| u.phase == ScanPhase::Scan));
        let enrich: Vec<_> = updates.iter().filter(|u| u.phase == ScanPhase::Enrich).collect();
        assert_eq!(enrich.first().unwrap().processed, 0);
        assert_eq!(enrich.last().unwrap().processed, 2);
        assert!(enrich.iter().all(|u| u.total == 2));
        assert_eq!(updates.last().unwrap().phase, ScanPhase::Done);
    }

    #[test]
    fn test_hidden_root_returns_none() {
        let dir = tempdir();
        touch(dir.path(), ".hidden/a.mp4", 1);
        touch(dir.path(), ".hidden/sub/b.mp4", 1);

        let prober = Arc::new(StubProber::default());
        let scanner = scanner(ScanConfig::default(), prober.clone());
        assert!(scanner.scan(&dir.path().join(".hidden")).is_none());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_depth_limit_is_counted() {
        let dir = tempdir();
        touch(dir.path(), "lib/top.mp4", 1);
        touch(dir.path(), "lib/a/mid.mp4", 1);
        touch(dir.path(), "lib/a/b/deep.mp4", 1);
        let config = ScanConfig::builder()
            .add_root("Library", dir.path().join("lib"))
            .max_depth(1)
            .build();

        let report = scanner(config, Arc::default()).scan_roots();
        assert_eq!(report.roots[0].video_count(), 2);
        assert_eq!(report.depth_limited, 1);
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn test_rescan_reports_done_after_shrinking() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4", 1);
        touch(dir.path(), "b.mp4", 1);
        let reporter = Arc::new(ProgressReporter::silent());
        let rx = reporter.subscribe();
        let config = ScanConfig::builder()
            .metadata_mode(MetadataMode::Disabled)
            .build();
        let scanner = scanner(config, Arc::default()).with_progress(reporter);

        scanner.scan(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("a.mp4")).unwrap();
        std::fs::remove_file(dir.path().join("b.mp4")).unwrap();
        assert!(scanner.scan(dir.path()).is_none());

        let done: Vec<u64> = rx
            .try_iter()
            .filter(|u| u.phase == ScanPhase::Done)
            .map(|u| u.processed)
            .collect();
        assert_eq!(done, [2, 0]);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2345)), "2.345 s");
        assert_eq!(format_elapsed(Duration::from_millis(62_005)), "1 m 2.005 s");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_scanned_tree_is_consistent(
            files in proptest::collection::vec(
                (
                    proptest::collection::vec("[a-c.]{1,2}", 0..3),
                    "[a-c.]{1,2}",
                    prop_oneof![Just("mp4"), Just("txt")],
                    0usize..64,
                ),
                0..16,
            )
        ) {
            let dir = tempdir();
            let mut expected = std::collections::HashSet::new();
            for (segments, stem, ext, bytes) in &files {
                let mut rel = PathBuf::new();
                for s in segments {
                    rel.push(format!("{s}x"));
                }
                rel.push(format!("{stem}.{ext}"));
                let target = dir.path().join(&rel);
                if target.exists() {
                    continue;
                }
                std::fs::create_dir_all(target.parent().unwrap()).unwrap();
                std::fs::write(&target, vec![1u8; *bytes]).unwrap();
                let hidden = rel
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
                if *ext == "mp4" && !hidden {
                    expected.insert(rel);
                }
            }

            let tree = scanner(ScanConfig::default(), Arc::default()).scan(dir.path());
            match tree {
                None => prop_assert!(expected.is_empty()),
                Some(tree) => {
                    assert_tree_invariants(&tree);
                    prop_assert_eq!(tree.video_count(), expected.len() as u64);
                }
            }
        }
    }
}
