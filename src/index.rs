//! Published library snapshots
//!
//! [`LibraryIndex`] holds the tree that request handlers see. Each scan
//! produces a new [`LibrarySnapshot`] which replaces the previous one in
//! a single pointer swap, so readers always observe one complete scan.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::config::PathMode;
use crate::models::{LibraryNode, NodeEntry};

/// How a client names the video it wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoLocator {
    Id(String),
    Path(String),
}

/// Immutable view of one completed scan
#[derive(Debug, Clone)]
pub struct LibrarySnapshot {
    roots: Vec<LibraryNode>,
    ids: HashMap<String, PathBuf>,
    mode: PathMode,
    generated_at: DateTime<Utc>,
}

impl LibrarySnapshot {
    pub fn empty(mode: PathMode) -> Self {
        Self {
            roots: Vec::new(),
            ids: HashMap::new(),
            mode,
            generated_at: Utc::now(),
        }
    }

    /// Strip absolute paths from `roots`, assigning fresh identifiers in opaque mode
    pub fn build(mut roots: Vec<LibraryNode>, mode: PathMode) -> Self {
        let mut ids = HashMap::new();
        for root in &mut roots {
            secure_node(root, mode, &mut ids);
        }
        Self {
            roots,
            ids,
            mode,
            generated_at: Utc::now(),
        }
    }

    /// The published tree; never carries absolute paths in opaque mode
    pub fn roots(&self) -> &[LibraryNode] {
        &self.roots
    }

    pub fn mode(&self) -> PathMode {
        self.mode
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn video_count(&self) -> u64 {
        self.roots.iter().map(|r| r.video_count()).sum()
    }

    /// Look up the file behind an opaque identifier
    pub fn resolve(&self, id: &str) -> Option<&Path> {
        self.ids.get(id).map(PathBuf::as_path)
    }

    /// Resolve a client locator according to the path mode.
    ///
    /// Direct paths are trusted as given: any file the process can read
    /// is reachable in that mode.
    pub fn locate(&self, locator: &VideoLocator) -> Option<PathBuf> {
        match (self.mode, locator) {
            (PathMode::Opaque, VideoLocator::Id(id)) => self.resolve(id).map(Path::to_path_buf),
            (PathMode::Direct, VideoLocator::Path(path)) if !path.is_empty() => {
                Some(PathBuf::from(path))
            }
            _ => None,
        }
    }
}

fn secure_node(node: &mut LibraryNode, mode: PathMode, ids: &mut HashMap<String, PathBuf>) {
    let absolute = node.absolute_path.take();
    match &mut node.entry {
        NodeEntry::File(_) => match (mode, absolute) {
            (PathMode::Opaque, Some(path)) => {
                let id = Uuid::new_v4().to_string();
                ids.insert(id.clone(), path);
                node.id = Some(id);
            }
            (PathMode::Direct, Some(path)) => {
                node.path = Some(path.to_string_lossy().to_string());
            }
            (_, None) => {}
        },
        NodeEntry::Directory(dir) => {
            for child in &mut dir.children {
                secure_node(child, mode, ids);
            }
        }
    }
}

/// Handle returned by [`LibraryIndex::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Arc<LibrarySnapshot>) + Send + Sync>;

/// The current library snapshot plus update listeners
pub struct LibraryIndex {
    mode: PathMode,
    current: RwLock<Arc<LibrarySnapshot>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl LibraryIndex {
    pub fn new(mode: PathMode) -> Self {
        Self {
            mode,
            current: RwLock::new(Arc::new(LibrarySnapshot::empty(mode))),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> PathMode {
        self.mode
    }

    pub fn current_snapshot(&self) -> Arc<LibrarySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the published snapshot and notify listeners
    pub fn publish(&self, roots: Vec<LibraryNode>) -> Arc<LibrarySnapshot> {
        let snapshot = Arc::new(LibrarySnapshot::build(roots, self.mode));
        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = Arc::clone(&snapshot);
        }
        log::info!(
            "Published library snapshot with {} videos",
            snapshot.video_count()
        );

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
        snapshot
    }

    /// Call `listener` after every publish
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<LibrarySnapshot>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Resolve an opaque identifier against the current snapshot
    pub fn resolve(&self, id: &str) -> Option<PathBuf> {
        self.current_snapshot().resolve(id).map(Path::to_path_buf)
    }

    pub fn locate(&self, locator: &VideoLocator) -> Option<PathBuf> {
        self.current_snapshot().locate(locator)
    }
}
