use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Result, MuxError};
use crate::media::{is_heic, tags, TagMap};
use crate::metadata::MetadataProvider;

/// XMP tags that mark a file as a Motion Photo
pub mod motion_tags {
    pub const MICRO_VIDEO: &str = "XMP-GCamera:MicroVideo";
    pub const MICRO_VIDEO_VERSION: &str = "XMP-GCamera:MicroVideoVersion";
    pub const MICRO_VIDEO_OFFSET: &str = "XMP-GCamera:MicroVideoOffset";
    pub const MICRO_VIDEO_PRESENTATION_TIMESTAMP: &str = "XMP-GCamera:MicroVideoPresentationTimestampUs";
}

/// How the motion tags ended up in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Annotation {
    Applied,
    /// The tool reported failure but the tags were verified in the file
    AppliedWithWarning(String),
}

/// Values written into a muxed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTags {
    pub video_offset_bytes: u64,
    pub presentation_timestamp_us: u64,
}

impl MotionTags {
    pub fn assignments(&self) -> Vec<(String, String)> {
        vec![
            (motion_tags::MICRO_VIDEO.to_string(), "1".to_string()),
            (motion_tags::MICRO_VIDEO_VERSION.to_string(), "1".to_string()),
            (motion_tags::MICRO_VIDEO_OFFSET.to_string(), self.video_offset_bytes.to_string()),
            (
                motion_tags::MICRO_VIDEO_PRESENTATION_TIMESTAMP.to_string(),
                self.presentation_timestamp_us.to_string(),
            ),
        ]
    }
}

/// `floor(LivePhotoVideoIndex / RunTimeScale * 1_000_000)` from the source photo's tags
pub fn presentation_timestamp_us(photo_metadata: &TagMap) -> Result<u64> {
    let index = integer_tag(photo_metadata, tags::LIVE_PHOTO_VIDEO_INDEX)?;
    let scale = integer_tag(photo_metadata, tags::RUN_TIME_SCALE)?;
    if scale == 0 {
        return Err(MuxError::Metadata(format!("{} is zero", tags::RUN_TIME_SCALE)));
    }

    let micros = u128::from(index) * 1_000_000 / u128::from(scale);
    u64::try_from(micros).map_err(|_| {
        MuxError::Metadata(format!("presentation timestamp out of range: {}", micros))
    })
}

fn integer_tag(metadata: &TagMap, name: &str) -> Result<u64> {
    let raw = metadata
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MuxError::Metadata(format!("{} is missing", name)))?;

    // exiftool -n may render integral values as "6.0"
    let integral = match raw.split_once('.') {
        Some((whole, fraction)) if fraction.bytes().all(|b| b == b'0') => whole,
        _ => raw,
    };
    integral
        .parse::<u64>()
        .map_err(|_| MuxError::Metadata(format!("{} is not a non-negative integer: {:?}", name, raw)))
}

/// Writes the Motion Photo tags through a metadata provider
pub struct MetadataWriter<'a> {
    provider: &'a dyn MetadataProvider,
}

impl<'a> MetadataWriter<'a> {
    pub fn new(provider: &'a dyn MetadataProvider) -> Self {
        Self { provider }
    }

    /// Derive and write the motion tags into `muxed_file`.
    ///
    /// Nothing is written when the timestamp cannot be derived.
    pub async fn annotate(
        &self,
        muxed_file: &Path,
        photo_metadata: &TagMap,
        video_offset_bytes: u64,
    ) -> Result<(MotionTags, Annotation)> {
        let motion = MotionTags {
            video_offset_bytes,
            presentation_timestamp_us: presentation_timestamp_us(photo_metadata)?,
        };
        info!(
            "Adding metadata to {}: offset {}, timestamp {}us",
            muxed_file.display(),
            motion.video_offset_bytes,
            motion.presentation_timestamp_us
        );

        let written = self.provider.write_tags(muxed_file, &motion.assignments()).await;

        if !is_heic(muxed_file) {
            written?;
            return Ok((motion, Annotation::Applied));
        }

        // exiftool may report failure on HEIC while still applying the tags
        self.verify_offset(muxed_file, video_offset_bytes).await.map_err(|verify_error| match &written {
            Err(write_error) => MuxError::ExternalTool(format!(
                "{}; verification: {}",
                write_error, verify_error
            )),
            Ok(()) => verify_error,
        })?;

        match written {
            Ok(()) => Ok((motion, Annotation::Applied)),
            Err(e) => {
                warn!(
                    "Tag write reported failure for {} but tags are present: {}",
                    muxed_file.display(),
                    e
                );
                Ok((motion, Annotation::AppliedWithWarning(e.to_string())))
            }
        }
    }

    async fn verify_offset(&self, path: &Path, expected: u64) -> Result<()> {
        let read_back = self
            .provider
            .read_tags(path, &[tags::MICRO_VIDEO_OFFSET.to_string()])
            .await?;

        match read_back.get(tags::MICRO_VIDEO_OFFSET).map(|v| v.trim()) {
            Some(value) if value == expected.to_string() => Ok(()),
            Some(value) => Err(MuxError::ExternalTool(format!(
                "{} reads back as {} in {}, expected {}",
                tags::MICRO_VIDEO_OFFSET,
                value,
                path.display(),
                expected
            ))),
            None => Err(MuxError::ExternalTool(format!(
                "{} missing from {} after write",
                tags::MICRO_VIDEO_OFFSET,
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MockMetadataProvider;

    fn photo_tags(index: &str, scale: &str) -> TagMap {
        let mut metadata = TagMap::new();
        metadata.insert(tags::LIVE_PHOTO_VIDEO_INDEX.to_string(), index.to_string());
        metadata.insert(tags::RUN_TIME_SCALE.to_string(), scale.to_string());
        metadata
    }

    fn offset_tags(value: &str) -> TagMap {
        let mut metadata = TagMap::new();
        metadata.insert(tags::MICRO_VIDEO_OFFSET.to_string(), value.to_string());
        metadata
    }

    #[test]
    fn test_presentation_timestamp_floors() {
        assert_eq!(presentation_timestamp_us(&photo_tags("2", "6")).unwrap(), 333_333);
        assert_eq!(presentation_timestamp_us(&photo_tags("600", "600")).unwrap(), 1_000_000);
        assert_eq!(presentation_timestamp_us(&photo_tags("6.0", "600")).unwrap(), 10_000);
        assert_eq!(presentation_timestamp_us(&photo_tags("0", "600")).unwrap(), 0);
    }

    #[test]
    fn test_presentation_timestamp_requires_integer_tags() {
        assert!(matches!(presentation_timestamp_us(&TagMap::new()), Err(MuxError::Metadata(_))));
        assert!(matches!(presentation_timestamp_us(&photo_tags("2", "")), Err(MuxError::Metadata(_))));
        assert!(matches!(presentation_timestamp_us(&photo_tags("abc", "6")), Err(MuxError::Metadata(_))));
        assert!(matches!(presentation_timestamp_us(&photo_tags("2.5", "6")), Err(MuxError::Metadata(_))));
        assert!(matches!(presentation_timestamp_us(&photo_tags("-2", "6")), Err(MuxError::Metadata(_))));
        assert!(matches!(presentation_timestamp_us(&photo_tags("2", "0")), Err(MuxError::Metadata(_))));
    }

    #[tokio::test]
    async fn test_annotate_writes_four_tags() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_write_tags()
            .withf(|path, assignments| {
                path.to_path_buf() == Path::new("/out/IMG_1.MP.JPG")
                    && assignments.to_vec()
                        == vec![
                            ("XMP-GCamera:MicroVideo".to_string(), "1".to_string()),
                            ("XMP-GCamera:MicroVideoVersion".to_string(), "1".to_string()),
                            ("XMP-GCamera:MicroVideoOffset".to_string(), "4096".to_string()),
                            (
                                "XMP-GCamera:MicroVideoPresentationTimestampUs".to_string(),
                                "333333".to_string(),
                            ),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        provider.expect_read_tags().never();

        let writer = MetadataWriter::new(&provider);
        let (motion, annotation) = writer
            .annotate(Path::new("/out/IMG_1.MP.JPG"), &photo_tags("2", "6"), 4096)
            .await
            .unwrap();

        assert_eq!(motion.presentation_timestamp_us, 333_333);
        assert_eq!(annotation, Annotation::Applied);
    }

    #[tokio::test]
    async fn test_missing_tags_fail_before_any_write() {
        let mut provider = MockMetadataProvider::new();
        provider.expect_write_tags().never();

        let writer = MetadataWriter::new(&provider);
        let err = writer
            .annotate(Path::new("/out/IMG_1.MP.JPG"), &TagMap::new(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::Metadata(_)));
    }

    #[tokio::test]
    async fn test_jpeg_write_failure_is_fatal() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_write_tags()
            .returning(|_, _| Err(MuxError::ExternalTool("exit 1".to_string())));

        let writer = MetadataWriter::new(&provider);
        let err = writer
            .annotate(Path::new("/out/IMG_1.MP.JPG"), &photo_tags("2", "6"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::ExternalTool(_)));
    }

    #[tokio::test]
    async fn test_heic_write_failure_with_verified_tags_is_a_warning() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_write_tags()
            .returning(|_, _| Err(MuxError::ExternalTool("HEIC not supported".to_string())));
        provider
            .expect_read_tags()
            .times(1)
            .returning(|_, _| Ok(offset_tags("10")));

        let writer = MetadataWriter::new(&provider);
        let (_, annotation) = writer
            .annotate(Path::new("/out/IMG_1.HEIC"), &photo_tags("2", "6"), 10)
            .await
            .unwrap();
        assert!(matches!(annotation, Annotation::AppliedWithWarning(ref m) if m.contains("HEIC")));
    }

    #[tokio::test]
    async fn test_heic_success_is_still_verified() {
        let mut provider = MockMetadataProvider::new();
        provider.expect_write_tags().returning(|_, _| Ok(()));
        provider
            .expect_read_tags()
            .times(1)
            .returning(|_, _| Ok(offset_tags("99")));

        let writer = MetadataWriter::new(&provider);
        let err = writer
            .annotate(Path::new("/out/IMG_1.heic"), &photo_tags("2", "6"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::ExternalTool(ref m) if m.contains("expected 10")));
    }

    #[tokio::test]
    async fn test_heic_failure_without_tags_is_fatal() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_write_tags()
            .returning(|_, _| Err(MuxError::ExternalTool("exit 1".to_string())));
        provider.expect_read_tags().returning(|_, _| Ok(TagMap::new()));

        let writer = MetadataWriter::new(&provider);
        let err = writer
            .annotate(Path::new("/out/IMG_1.HEIC"), &photo_tags("2", "6"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::ExternalTool(ref m) if m.contains("missing")));
    }
}
