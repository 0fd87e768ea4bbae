//! Video Library CLI
//!
//! Scans video collections and streams them over HTTP.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use video_library::{
    FfprobeProber, LibraryRoot, MetadataCache, MetadataMode, PathMode, ScanConfig, TreeScanner,
    VideoLibrary,
};

const ABOUT: &str = r#"
Video Library - index and stream local video collections

Examples:
  video_library scan -r Movies=~/Movies                 scan one root
  video_library scan -r ~/Movies -r Shows=/srv/tv --json print the tree as JSON
  video_library serve -r Movies=~/Movies -l 0.0.0.0:3000 serve over HTTP
"#;

#[derive(Parser)]
#[command(name = "video_library")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan library roots and print a summary or the tree
    Scan {
        #[command(flatten)]
        library: LibraryArgs,

        /// Print the scanned tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan library roots and serve them over HTTP
    Serve {
        #[command(flatten)]
        library: LibraryArgs,

        /// Address to listen on
        #[arg(short = 'l', long, default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },
}

#[derive(Args)]
struct LibraryArgs {
    /// Library root as NAME=PATH, or a bare PATH (repeatable)
    #[arg(short = 'r', long = "root", required = true)]
    roots: Vec<String>,

    /// Metadata to probe for each video
    #[arg(short = 'm', long, value_enum, default_value_t = MetadataMode::Duration)]
    metadata: MetadataMode,

    /// How clients address videos (direct exposes filesystem paths)
    #[arg(long, value_enum, default_value_t = PathMode::Opaque)]
    path_mode: PathMode,

    /// Metadata cache file
    #[arg(short = 'c', long)]
    cache: Option<PathBuf>,

    /// Evict least-recently-used cache entries beyond this count
    #[arg(long)]
    cache_max_entries: Option<usize>,

    /// Traversal threads (0 = auto)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,

    /// Concurrent probes (0 = auto)
    #[arg(short = 'p', long, default_value = "0")]
    probes: usize,

    /// Maximum directory depth below each root
    #[arg(long, default_value_t = video_library::config::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Do not follow symbolic links
    #[arg(long)]
    no_follow_links: bool,

    /// ffprobe executable
    #[arg(long, default_value = video_library::config::DEFAULT_FFPROBE)]
    ffprobe: PathBuf,

    /// Write progress lines to stderr
    #[arg(long)]
    progress: bool,
}

impl LibraryArgs {
    fn config(&self) -> ScanConfig {
        let mut builder = ScanConfig::builder()
            .roots(self.roots.iter().map(|r| LibraryRoot::parse(r)).collect())
            .metadata_mode(self.metadata)
            .path_mode(self.path_mode)
            .num_threads(self.threads)
            .max_concurrent_probes(self.probes)
            .max_depth(self.max_depth)
            .follow_links(!self.no_follow_links)
            .cache_max_entries(self.cache_max_entries)
            .ffprobe_path(self.ffprobe.clone())
            .show_progress(self.progress);
        if let Some(cache) = &self.cache {
            builder = builder.cache_path(cache.clone());
        }
        builder.build()
    }
}

fn build_scanner(config: ScanConfig) -> TreeScanner {
    let cache = match &config.cache_path {
        Some(path) => MetadataCache::open(path, config.cache_max_entries),
        None => MetadataCache::in_memory(config.cache_max_entries),
    };
    let prober = FfprobeProber::new(config.ffprobe_path.clone(), config.metadata_mode);
    TreeScanner::new(config, Arc::new(cache), Arc::new(prober))
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { library, json } => {
            let config = library.config();
            info!("Roots: {:?}", config.roots);
            info!("Metadata: {}", config.metadata_mode.as_str());
            let scanner = build_scanner(config);
            let report = scanner.scan_roots();

            if json {
                match serde_json::to_string_pretty(&report.roots) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        error!("Failed to serialize tree: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                println!("Scan completed:");
                println!("  Roots: {}", report.roots.len());
                println!("  Videos: {}", report.total_files);
                println!("  Directories: {}", report.total_dirs);
                println!("  Enriched: {}", report.enriched_files);
                println!("  Errors: {}", report.error_count());
                println!("  Duration: {}ms", report.duration_ms);
            }
        }
        Commands::Serve { library, listen } => {
            let library = Arc::new(VideoLibrary::new(build_scanner(library.config())));
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to start runtime: {}", e);
                    std::process::exit(1);
                }
            };

            let result = runtime.block_on(async move {
                let initial = Arc::clone(&library);
                tokio::task::spawn_blocking(move || initial.rescan());
                video_library::serve(library, listen).await
            });
            if let Err(e) = result {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
