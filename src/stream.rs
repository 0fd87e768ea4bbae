//! Byte-range video delivery
//!
//! [`VideoStream`] opens a file, applies an optional `Range` header and
//! exposes a reader limited to the requested window. The reader owns the
//! file handle; dropping it (for example on client disconnect) closes it.

use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::error::StreamError;

/// Content type sent for every video response
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Inclusive byte window within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_size)
    }
}

/// Parse a single-range `Range` header against a file of `file_size` bytes.
///
/// Accepts `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. An `end`
/// past the file is clamped to the last byte.
pub fn parse_range(header: &str, file_size: u64) -> Result<ByteRange, StreamError> {
    let invalid = || StreamError::InvalidRange(header.to_string());

    let ranges = header.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
    if ranges.contains(',') {
        return Err(invalid());
    }
    let (start, end) = ranges.split_once('-').ok_or_else(invalid)?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix = parse_offset(end).ok_or_else(invalid)?;
        if suffix == 0 || file_size == 0 {
            return Err(StreamError::Unsatisfiable { size: file_size });
        }
        return Ok(ByteRange {
            start: file_size.saturating_sub(suffix),
            end: file_size - 1,
        });
    }

    let start = parse_offset(start).ok_or_else(invalid)?;
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_offset(end).ok_or_else(invalid)?)
    };
    if end.is_some_and(|end| end < start) {
        return Err(invalid());
    }
    if start >= file_size {
        return Err(StreamError::Unsatisfiable { size: file_size });
    }

    let last = file_size - 1;
    Ok(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    })
}

fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// An opened video, positioned at the start of the requested window
#[derive(Debug)]
pub struct VideoStream {
    file_size: u64,
    range: Option<ByteRange>,
    reader: Take<File>,
}

impl VideoStream {
    /// Open `path` for streaming the window named by `range_header`
    pub async fn open(path: &Path, range_header: Option<&str>) -> Result<Self, StreamError> {
        let mut file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamError::NotFound,
            _ => StreamError::Io(e),
        })?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StreamError::NotFound);
        }
        let file_size = metadata.len();

        let range = range_header
            .map(|header| parse_range(header, file_size))
            .transpose()?;
        let length = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                range.len()
            }
            None => file_size,
        };

        Ok(Self {
            file_size,
            range,
            reader: file.take(length),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }

    /// Bytes this stream will yield
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.file_size, |r| r.len())
    }

    pub fn content_range(&self) -> Option<String> {
        self.range.map(|r| r.content_range(self.file_size))
    }

    pub fn into_reader(self) -> Take<File> {
        self.reader
    }
}
