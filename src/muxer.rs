use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, MuxError};
use crate::identity::MotionPhotoGroup;
use crate::media::{motion_photo_file_name, unique_destination, STAGING_PREFIX};

/// Concatenated photo and video, staged next to its final destination.
///
/// The staged file is deleted when the result is dropped without [`MuxResult::commit`].
#[derive(Debug)]
pub struct MuxResult {
    destination: PathBuf,
    staged: TempPath,
    photo_bytes: u64,
    video_offset_bytes: u64,
}

impl MuxResult {
    /// Where the Motion Photo lands on commit
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Current location of the muxed bytes
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    pub fn photo_bytes(&self) -> u64 {
        self.photo_bytes
    }

    /// Byte length of the appended video, counted from the end of the photo
    pub fn video_offset_bytes(&self) -> u64 {
        self.video_offset_bytes
    }

    /// Atomically move the staged file onto its destination
    pub fn commit(self) -> Result<PathBuf> {
        let MuxResult { destination, staged, .. } = self;
        staged.persist(&destination).map_err(|e| MuxError::Io(e.error))?;
        info!("Committed {}", destination.display());
        Ok(destination)
    }
}

/// Stream the photo then the video into a new file inside `output_dir`.
pub async fn mux(group: &MotionPhotoGroup, output_dir: &Path) -> Result<MuxResult> {
    let photo = group.photo();
    let video = group.video();
    info!("Merging {} and {}", photo.path.display(), video.path.display());

    let name = motion_photo_file_name(&photo.path).ok_or_else(|| {
        MuxError::Input(format!("Invalid photo file name: {}", photo.path.display()))
    })?;

    fs::create_dir_all(output_dir).await?;
    let destination = unique_destination(output_dir, &name, Some(&photo.path));

    // Keep the extension so the tag writer recognises the container
    let suffix = photo
        .path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let (staged_file, staged) = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(&suffix)
        .tempfile_in(output_dir)?
        .into_parts();

    let mut output = fs::File::from_std(staged_file);
    let mut photo_in = fs::File::open(&photo.path).await?;
    let mut video_in = fs::File::open(&video.path).await?;

    tokio::io::copy(&mut photo_in, &mut output).await?;
    tokio::io::copy(&mut video_in, &mut output).await?;
    output.flush().await?;
    output.sync_all().await?;
    drop(output);

    // Sizes come from the file system after the write, never from buffer lengths
    let photo_bytes = fs::metadata(&photo.path).await?.len();
    let video_bytes = fs::metadata(&video.path).await?.len();
    let merged_bytes = fs::metadata(&staged).await?.len();

    let video_offset_bytes = merged_bytes.checked_sub(photo_bytes).ok_or_else(|| {
        short_write(&staged, merged_bytes, photo_bytes + video_bytes)
    })?;
    if video_offset_bytes != video_bytes {
        return Err(short_write(&staged, merged_bytes, photo_bytes + video_bytes));
    }

    debug!(
        "Staged {} ({} bytes, video offset {})",
        staged.display(),
        merged_bytes,
        video_offset_bytes
    );

    Ok(MuxResult {
        destination,
        staged,
        photo_bytes,
        video_offset_bytes,
    })
}

fn short_write(path: &Path, actual: u64, expected: u64) -> MuxError {
    MuxError::Io(std::io::Error::other(format!(
        "{} holds {} bytes, expected {}",
        path.display(),
        actual,
        expected
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MatchStrategy;
    use crate::media::{MediaFile, TagMap};

    fn group(dir: &Path, photo: &str, photo_bytes: &[u8], video: &str, video_bytes: &[u8]) -> MotionPhotoGroup {
        let photo_path = dir.join(photo);
        let video_path = dir.join(video);
        std::fs::write(&photo_path, photo_bytes).unwrap();
        std::fs::write(&video_path, video_bytes).unwrap();
        MotionPhotoGroup::new(
            MediaFile::from_path(photo_path, TagMap::new()).unwrap(),
            MediaFile::from_path(video_path, TagMap::new()).unwrap(),
            MatchStrategy::Explicit,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_output_splits_back_into_photo_and_video() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let photo: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let video: Vec<u8> = (0..12345u32).map(|i| (i % 13) as u8).collect();
        let pair = group(input.path(), "IMG_1.JPG", &photo, "IMG_1.MP4", &video);

        let result = mux(&pair, output.path()).await.unwrap();
        assert_eq!(result.video_offset_bytes(), video.len() as u64);
        assert_eq!(result.photo_bytes(), photo.len() as u64);

        let path = result.commit().unwrap();
        assert_eq!(path, output.path().join("IMG_1.MP.JPG"));

        let merged = std::fs::read(&path).unwrap();
        assert_eq!(merged.len(), photo.len() + video.len());
        assert_eq!(&merged[..photo.len()], photo.as_slice());
        assert_eq!(&merged[photo.len()..], video.as_slice());

        // sources untouched
        assert_eq!(std::fs::read(input.path().join("IMG_1.JPG")).unwrap(), photo);
        assert_eq!(std::fs::read(input.path().join("IMG_1.MP4")).unwrap(), video);
    }

    #[tokio::test]
    async fn test_creates_missing_output_directory() {
        let input = tempfile::tempdir().unwrap();
        let pair = group(input.path(), "IMG_2.jpeg", b"photo", "IMG_2.mov", b"video");
        let output = input.path().join("nested/out");

        let result = mux(&pair, &output).await.unwrap();
        assert!(result.staged_path().starts_with(&output));
        assert_eq!(result.destination(), output.join("IMG_2.MP.jpeg"));
    }

    #[tokio::test]
    async fn test_dropping_uncommitted_result_removes_staged_file() {
        let input = tempfile::tempdir().unwrap();
        let pair = group(input.path(), "IMG_3.JPG", b"photo", "IMG_3.MP4", b"video");

        let result = mux(&pair, input.path()).await.unwrap();
        let staged = result.staged_path().to_path_buf();
        assert!(staged.exists());
        drop(result);

        assert!(!staged.exists());
        assert!(!input.path().join("IMG_3.MP.JPG").exists());
    }

    #[tokio::test]
    async fn test_heic_in_place_replaces_photo_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let pair = group(dir.path(), "IMG_4.HEIC", b"heic", "IMG_4.MOV", b"mov");

        let result = mux(&pair, dir.path()).await.unwrap();
        assert_eq!(result.destination(), dir.path().join("IMG_4.HEIC"));
        assert_eq!(std::fs::read(dir.path().join("IMG_4.HEIC")).unwrap(), b"heic");

        result.commit().unwrap();
        assert_eq!(std::fs::read(dir.path().join("IMG_4.HEIC")).unwrap(), b"heicmov");
    }

    #[tokio::test]
    async fn test_existing_output_is_not_overwritten() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(output.path().join("IMG_5.MP.JPG"), b"older").unwrap();
        let pair = group(input.path(), "IMG_5.JPG", b"photo", "IMG_5.MP4", b"video");

        let path = mux(&pair, output.path()).await.unwrap().commit().unwrap();
        assert_eq!(path, output.path().join("IMG_5_1.MP.JPG"));
        assert_eq!(std::fs::read(output.path().join("IMG_5.MP.JPG")).unwrap(), b"older");
    }

    #[tokio::test]
    async fn test_unreadable_video_is_io_error() {
        let input = tempfile::tempdir().unwrap();
        let pair = group(input.path(), "IMG_6.JPG", b"photo", "IMG_6.MP4", b"video");
        std::fs::remove_file(input.path().join("IMG_6.MP4")).unwrap();

        let err = mux(&pair, input.path()).await.unwrap_err();
        assert!(matches!(err, MuxError::Io(_)));
        assert!(!input.path().join("IMG_6.MP.JPG").exists());
    }
}
