//! Core data models for the video library

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ScanError;

/// First video stream details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// First audio stream details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    pub codec: String,
    pub channels: u32,
    pub sample_rate: u32,
}

/// Media metadata reported by the prober
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioInfo>,
}

impl MediaMetadata {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            video: None,
            audio: None,
        }
    }
}

/// File-only fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File size in bytes
    pub size: u64,
    /// Absent when probing failed or is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
}

/// Directory-only fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Directories first, then files, each in natural name order
    pub children: Vec<LibraryNode>,
    pub video_count: u64,
    pub total_size: u64,
    pub total_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeEntry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

/// A directory or video file in the scanned tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryNode {
    /// Display name
    pub name: String,
    /// Absolute path; cleared by the index before the tree is published
    #[serde(skip)]
    pub absolute_path: Option<PathBuf>,
    /// Opaque streaming identifier (file nodes, opaque mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Streaming path (file nodes, direct mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub modified_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: NodeEntry,
}

impl LibraryNode {
    /// Create a file node without metadata
    pub fn file(name: String, path: PathBuf, size: u64, modified_at: DateTime<Utc>) -> Self {
        Self {
            name,
            absolute_path: Some(path),
            id: None,
            path: None,
            modified_at,
            entry: NodeEntry::File(FileEntry {
                size,
                metadata: None,
            }),
        }
    }

    /// Create a directory node and compute its aggregates
    pub fn directory(
        name: String,
        path: PathBuf,
        modified_at: DateTime<Utc>,
        children: Vec<LibraryNode>,
    ) -> Self {
        let mut node = Self {
            name,
            absolute_path: Some(path),
            id: None,
            path: None,
            modified_at,
            entry: NodeEntry::Directory(DirectoryEntry {
                children,
                ..Default::default()
            }),
        };
        node.recompute_totals();
        node
    }

    pub fn is_file(&self) -> bool {
        matches!(self.entry, NodeEntry::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.entry, NodeEntry::Directory(_))
    }

    /// Number of videos (1 for a file)
    pub fn video_count(&self) -> u64 {
        match &self.entry {
            NodeEntry::File(_) => 1,
            NodeEntry::Directory(dir) => dir.video_count,
        }
    }

    /// Size in bytes (sum over children for directories)
    pub fn total_size(&self) -> u64 {
        match &self.entry {
            NodeEntry::File(file) => file.size,
            NodeEntry::Directory(dir) => dir.total_size,
        }
    }

    /// Duration in seconds; files without metadata count as zero
    pub fn total_duration(&self) -> f64 {
        match &self.entry {
            NodeEntry::File(file) => file.metadata.as_ref().map(|m| m.duration).unwrap_or(0.0),
            NodeEntry::Directory(dir) => dir.total_duration,
        }
    }

    pub fn metadata(&self) -> Option<&MediaMetadata> {
        match &self.entry {
            NodeEntry::File(file) => file.metadata.as_ref(),
            NodeEntry::Directory(_) => None,
        }
    }

    pub fn children(&self) -> &[LibraryNode] {
        match &self.entry {
            NodeEntry::File(_) => &[],
            NodeEntry::Directory(dir) => &dir.children,
        }
    }

    /// Recompute directory aggregates bottom-up over the whole subtree
    pub fn recompute_totals(&mut self) {
        if let NodeEntry::Directory(dir) = &mut self.entry {
            let (mut count, mut size, mut duration) = (0u64, 0u64, 0.0f64);
            for child in &mut dir.children {
                child.recompute_totals();
                count += child.video_count();
                size += child.total_size();
                duration += child.total_duration();
            }
            dir.video_count = count;
            dir.total_size = size;
            dir.total_duration = duration;
        }
    }

    /// Visit every node depth-first, parents before children
    pub fn walk<F: FnMut(&LibraryNode)>(&self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Collect mutable references to every file node in the subtree
    pub fn files_mut<'a>(&'a mut self, out: &mut Vec<&'a mut LibraryNode>) {
        if self.is_file() {
            out.push(self);
            return;
        }
        if let NodeEntry::Directory(dir) = &mut self.entry {
            for child in &mut dir.children {
                child.files_mut(out);
            }
        }
    }
}

/// Result of scanning all configured roots
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// One node per root that contained videos
    pub roots: Vec<LibraryNode>,
    /// Video files found
    pub total_files: u64,
    /// Directories traversed
    pub total_dirs: u64,
    /// Files that received metadata
    pub enriched_files: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Directories skipped for exceeding the depth limit
    pub depth_limited: u64,
    /// Per-entry errors encountered during scanning
    #[serde(skip)]
    pub errors: Vec<ScanError>,
    /// Total scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Percentage of metadata lookups served by the cache
    pub fn cache_hit_rate(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return None;
        }
        Some(self.cache_hits as f64 * 100.0 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64, duration: Option<f64>) -> LibraryNode {
        let mut node = LibraryNode::file(
            name.to_string(),
            PathBuf::from(format!("/lib/{name}")),
            size,
            Utc::now(),
        );
        if let NodeEntry::File(f) = &mut node.entry {
            f.metadata = duration.map(MediaMetadata::with_duration);
        }
        node
    }

    #[test]
    fn test_directory_aggregates() {
        let inner = LibraryNode::directory(
            "inner".into(),
            PathBuf::from("/lib/inner"),
            Utc::now(),
            vec![file("a.mp4", 100, Some(10.0)), file("b.mp4", 50, None)],
        );
        let root = LibraryNode::directory(
            "lib".into(),
            PathBuf::from("/lib"),
            Utc::now(),
            vec![inner, file("c.mp4", 25, Some(2.5))],
        );

        assert_eq!(root.video_count(), 3);
        assert_eq!(root.total_size(), 175);
        assert!((root.total_duration() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_serialization_shape() {
        let root = LibraryNode::directory(
            "lib".into(),
            PathBuf::from("/lib"),
            Utc::now(),
            vec![file("a.mp4", 100, Some(10.0))],
        );
        let json = serde_json::to_value(&root).unwrap();

        assert_eq!(json["type"], "directory");
        assert_eq!(json["videoCount"], 1);
        assert_eq!(json["totalSize"], 100);
        assert_eq!(json["children"][0]["type"], "file");
        assert_eq!(json["children"][0]["metadata"]["duration"], 10.0);
        assert!(json.get("absolutePath").is_none());
        assert!(json["children"][0].get("absolutePath").is_none());
    }

    #[test]
    fn test_file_without_metadata_omits_field() {
        let json = serde_json::to_value(file("a.mp4", 1, None)).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["size"], 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let mut report = ScanReport::new();
        assert_eq!(report.cache_hit_rate(), None);
        report.cache_hits = 3;
        report.cache_misses = 1;
        assert_eq!(report.cache_hit_rate(), Some(75.0));
    }
}
