// Media data model
//
// - MediaKind / MediaFile: one candidate file and its fetched tags
// - scan: directory enumeration feeding a batch
// - naming: output file names and collision handling

pub mod naming;
pub mod scan;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use naming::*;
pub use scan::*;

/// Tag name -> value, as returned by the metadata provider
pub type TagMap = BTreeMap<String, String>;

/// Tag names read from candidates
pub mod tags {
    pub const CONTENT_IDENTIFIER: &str = "ContentIdentifier";
    pub const CREATE_DATE: &str = "CreateDate";
    pub const LIVE_PHOTO_VIDEO_INDEX: &str = "LivePhotoVideoIndex";
    pub const RUN_TIME_SCALE: &str = "RunTimeScale";
    pub const MICRO_VIDEO_OFFSET: &str = "MicroVideoOffset";

    /// Tags requested in the batch read
    pub const BATCH_READ: [&str; 5] = [
        "FileName",
        CONTENT_IDENTIFIER,
        CREATE_DATE,
        LIVE_PHOTO_VIDEO_INDEX,
        RUN_TIME_SCALE,
    ];
}

const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "heic"];
const VIDEO_EXTENSIONS: [&str; 2] = ["mov", "mp4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify by extension, case-insensitive. `None` means "not a candidate".
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// One file under consideration in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub metadata: TagMap,
}

impl MediaFile {
    pub fn new(path: PathBuf, kind: MediaKind, metadata: TagMap) -> Self {
        Self { path, kind, metadata }
    }

    /// Build from a path, classifying by extension
    pub fn from_path(path: PathBuf, metadata: TagMap) -> Option<Self> {
        let kind = MediaKind::from_path(&path)?;
        Some(Self::new(path, kind, metadata))
    }

    /// Non-empty, trimmed tag value
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn content_identifier(&self) -> Option<&str> {
        self.tag(tags::CONTENT_IDENTIFIER)
    }

    /// File name without the final extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_heic(&self) -> bool {
        is_heic(&self.path)
    }
}

/// True for the high-efficiency image container
pub fn is_heic(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("heic"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("IMG_1.JPG")), Some(MediaKind::Photo));
        assert_eq!(MediaKind::from_path(Path::new("a/IMG_1.heic")), Some(MediaKind::Photo));
        assert_eq!(MediaKind::from_path(Path::new("IMG_1.png")), Some(MediaKind::Photo));
        assert_eq!(MediaKind::from_path(Path::new("IMG_1.MOV")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("IMG_1.mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("IMG_1.AAE")), None);
        assert_eq!(MediaKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_blank_tags_count_as_missing() {
        let mut metadata = TagMap::new();
        metadata.insert(tags::CONTENT_IDENTIFIER.to_string(), "   ".to_string());
        let file = MediaFile::new("IMG_1.JPG".into(), MediaKind::Photo, metadata);
        assert_eq!(file.content_identifier(), None);
        assert_eq!(file.stem(), "IMG_1");
    }
}
