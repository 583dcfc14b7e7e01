use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ErrorKind, MuxError, Result};
use crate::identity::{resolve, MatchStrategy, MotionPhotoGroup, Resolution};
use crate::media::{
    enumerate_candidates, is_heic, same_file, unique_destination, MediaFile, MediaKind, ScanOptions,
    TagMap,
};
use crate::metadata::{MetadataProvider, MetadataProviderFactory};
use crate::muxer::mux;
use crate::progress::{pair_percentage, Progress};
use crate::transcode::{ImageTranscoder, TranscodeSummary, TranscoderFactory};
use crate::writer::{Annotation, MetadataWriter};

/// Options for a directory batch
#[derive(Debug, Clone, Default)]
pub struct DirectoryOptions {
    pub recursive: bool,
    /// Defaults to the input directory
    pub output_dir: Option<PathBuf>,
    pub transcode_heic: bool,
}

/// Options for an explicit photo + video pair
#[derive(Debug, Clone, Default)]
pub struct PairOptions {
    /// Defaults to the photo's directory
    pub output_dir: Option<PathBuf>,
    pub transcode_heic: bool,
    /// Mux even when the identity checks do not match
    pub force: bool,
}

/// A committed Motion Photo
#[derive(Debug, Clone, Serialize)]
pub struct MuxedPair {
    pub photo: PathBuf,
    pub video: PathBuf,
    pub output: PathBuf,
    pub strategy: MatchStrategy,
    pub video_offset_bytes: u64,
    pub presentation_timestamp_us: u64,
    pub warnings: Vec<String>,
}

/// A pair that could not be muxed; its sources were preserved
#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub files: Vec<PathBuf>,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResidualReason {
    UnmatchedPhoto,
    UnmatchedVideo,
    FailedPair,
}

/// A residual moved (or left) untouched in the output location
#[derive(Debug, Clone, Serialize)]
pub struct Relocation {
    pub from: PathBuf,
    pub to: PathBuf,
    pub reason: ResidualReason,
}

/// Everything a batch did
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub muxed: Vec<MuxedPair>,
    pub failures: Vec<PairFailure>,
    pub relocated: Vec<Relocation>,
    pub transcode: Option<TranscodeSummary>,
}

impl BatchReport {
    fn new(input: &Path, output_dir: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            started_at: Utc::now(),
            finished_at: None,
            candidates: 0,
            muxed: Vec::new(),
            failures: Vec::new(),
            relocated: Vec::new(),
            transcode: None,
        }
    }

    pub fn residuals(&self, reason: ResidualReason) -> impl Iterator<Item = &Relocation> {
        self.relocated.iter().filter(move |r| r.reason == reason)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub struct Workflow {
    provider: Box<dyn MetadataProvider>,
    transcoder: Box<dyn ImageTranscoder>,
    progress: Progress,
}

impl Workflow {
    pub fn new(config: Config, progress: Progress) -> Self {
        let provider = MetadataProviderFactory::create_provider(config.exiftool.clone());
        let transcoder = TranscoderFactory::create_transcoder(config.transcoder.clone());
        Self::with_components(provider, transcoder, progress)
    }

    pub fn with_components(
        provider: Box<dyn MetadataProvider>,
        transcoder: Box<dyn ImageTranscoder>,
        progress: Progress,
    ) -> Self {
        Self {
            provider,
            transcoder,
            progress,
        }
    }

    /// Check the external tools a run will need
    pub async fn check_availability(&self, needs_transcoder: bool) -> Result<()> {
        self.provider.check_availability().await?;
        if needs_transcoder {
            self.transcoder.check_availability().await?;
        }
        Ok(())
    }

    /// Pair and mux every live photo in a directory
    pub async fn process_directory<P: AsRef<Path>>(
        &self,
        input_dir: P,
        options: &DirectoryOptions,
    ) -> Result<BatchReport> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(MuxError::Input(format!(
                "The directory '{}' does not exist or is not a valid directory",
                input_dir.display()
            )));
        }

        let output_dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| input_dir.to_path_buf());
        fs::create_dir_all(&output_dir).await?;
        let mut report = BatchReport::new(input_dir, &output_dir);

        if options.transcode_heic {
            self.progress.stage("Converting HEIC to JPG...", 5.0);
            report.transcode = Some(
                self.transcoder
                    .prepare_directory(input_dir, options.recursive)
                    .await?,
            );
        }

        let candidates = enumerate_candidates(
            input_dir,
            &ScanOptions {
                recursive: options.recursive,
                exclude: Some(output_dir.clone()),
            },
        )?;
        if candidates.is_empty() {
            return Err(MuxError::Input(format!(
                "No photos or videos found in '{}'",
                input_dir.display()
            )));
        }
        report.candidates = candidates.len();
        info!("Found {} candidate files", candidates.len());

        self.progress.stage("Extracting metadata...", 10.0);
        // Paths are already expanded, no need for the tool to recurse
        let files = self.fetch_media(&candidates).await?;

        self.progress.stage("Grouping files...", 40.0);
        let resolution = resolve(files);

        self.run_batch(resolution, &output_dir, &mut report).await;
        Ok(report)
    }

    /// Mux one explicitly given photo and video
    pub async fn process_pair<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        photo_path: P,
        video_path: Q,
        options: &PairOptions,
    ) -> Result<BatchReport> {
        let mut photo_path = photo_path.as_ref().to_path_buf();
        let video_path = video_path.as_ref().to_path_buf();

        validate_media(&photo_path, &video_path)?;

        if options.transcode_heic && is_heic(&photo_path) {
            self.progress.stage("Converting HEIC to JPG...", 5.0);
            photo_path = self.transcoder.convert(&photo_path).await?;
        }

        let output_dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => photo_path
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| MuxError::Input("Cannot determine output directory".to_string()))?,
        };
        fs::create_dir_all(&output_dir).await?;

        let input = photo_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut report = BatchReport::new(&input, &output_dir);
        report.candidates = 2;

        self.progress.stage("Extracting metadata...", 10.0);
        let mut files = self
            .fetch_media(&[photo_path.clone(), video_path.clone()])
            .await?;

        self.progress.stage("Grouping files...", 40.0);
        let resolution = if options.force {
            let video = files.pop().ok_or_else(|| MuxError::Input("Missing video".to_string()))?;
            let photo = files.pop().ok_or_else(|| MuxError::Input("Missing photo".to_string()))?;
            Resolution {
                pairs: vec![MotionPhotoGroup::new(photo, video, MatchStrategy::Explicit)?],
                ..Default::default()
            }
        } else {
            resolve(files)
        };

        self.run_batch(resolution, &output_dir, &mut report).await;
        Ok(report)
    }

    /// One batch metadata call for all candidates
    async fn fetch_media(&self, paths: &[PathBuf]) -> Result<Vec<MediaFile>> {
        let mut metadata = self.provider.read_batch(paths, false).await?;

        Ok(paths
            .iter()
            .filter_map(|path| {
                let tags = metadata.remove(path).unwrap_or_else(|| {
                    debug!("No metadata returned for {}", path.display());
                    TagMap::new()
                });
                MediaFile::from_path(path.clone(), tags)
            })
            .collect())
    }

    async fn run_batch(&self, resolution: Resolution, output_dir: &Path, report: &mut BatchReport) {
        let Resolution {
            pairs,
            unmatched_photos,
            unmatched_videos,
        } = resolution;
        info!(
            "Found {} pairs, {} unmatched photos, {} unmatched videos",
            pairs.len(),
            unmatched_photos.len(),
            unmatched_videos.len()
        );

        let mut residuals: Vec<(PathBuf, ResidualReason)> = Vec::new();
        let total = pairs.len();

        for (index, group) in pairs.into_iter().enumerate() {
            self.progress.stage(
                &format!("Processing pair {} of {}...", index + 1, total),
                pair_percentage(index, total),
            );

            match self.process_group(&group, output_dir).await {
                Ok(muxed) => {
                    info!("Created {}", muxed.output.display());
                    self.progress.log(&format!("Created {}", muxed.output.display()));
                    report.muxed.push(muxed);
                }
                Err(e) => {
                    warn!(
                        "Failed to create Motion Photo from {} and {}: {}",
                        group.photo().path.display(),
                        group.video().path.display(),
                        e
                    );
                    let (photo, video) = group.into_files();
                    report.failures.push(PairFailure {
                        files: vec![photo.path.clone(), video.path.clone()],
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    residuals.push((photo.path, ResidualReason::FailedPair));
                    residuals.push((video.path, ResidualReason::FailedPair));
                }
            }
        }

        self.progress.stage("Processing unmatched files...", 95.0);
        residuals.extend(
            unmatched_photos
                .into_iter()
                .map(|f| (f.path, ResidualReason::UnmatchedPhoto)),
        );
        residuals.extend(
            unmatched_videos
                .into_iter()
                .map(|f| (f.path, ResidualReason::UnmatchedVideo)),
        );

        for (path, reason) in residuals {
            match relocate(&path, output_dir).await {
                Ok(to) => {
                    self.progress.log(&format!("Moved {:?} file to: {}", reason, to.display()));
                    report.relocated.push(Relocation {
                        from: path,
                        to,
                        reason,
                    });
                }
                Err(e) => {
                    warn!("Failed to move {}: {}", path.display(), e);
                    report.failures.push(PairFailure {
                        files: vec![path],
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report.finished_at = Some(Utc::now());
        self.progress.finish("Complete!");
    }

    /// Mux, annotate, commit, and only then delete the sources
    async fn process_group(&self, group: &MotionPhotoGroup, output_dir: &Path) -> Result<MuxedPair> {
        let photo = group.photo();
        let video = group.video();

        let result = mux(group, output_dir).await?;

        // A failed annotation drops `result`, which removes the staged file
        let writer = MetadataWriter::new(self.provider.as_ref());
        let (motion, annotation) = writer
            .annotate(result.staged_path(), &photo.metadata, result.video_offset_bytes())
            .await?;

        let output = result.commit()?;

        let mut warnings = Vec::new();
        if let Annotation::AppliedWithWarning(reason) = annotation {
            warnings.push(reason);
        }
        for source in [&photo.path, &video.path] {
            if same_file(source, &output) {
                // replaced in place by the commit
                continue;
            }
            if let Err(e) = fs::remove_file(source).await {
                warn!("Could not delete {}: {}", source.display(), e);
                warnings.push(format!("could not delete {}: {}", source.display(), e));
            }
        }

        Ok(MuxedPair {
            photo: photo.path.clone(),
            video: video.path.clone(),
            output,
            strategy: group.strategy(),
            video_offset_bytes: motion.video_offset_bytes,
            presentation_timestamp_us: motion.presentation_timestamp_us,
            warnings,
        })
    }
}

/// Reject pair inputs that are missing or of the wrong kind
pub fn validate_media(photo: &Path, video: &Path) -> Result<()> {
    if !photo.is_file() {
        return Err(MuxError::Input(format!(
            "The photo file '{}' does not exist or is not a valid file",
            photo.display()
        )));
    }
    if !video.is_file() {
        return Err(MuxError::Input(format!(
            "The video file '{}' does not exist or is not a valid file",
            video.display()
        )));
    }
    if MediaKind::from_path(photo) != Some(MediaKind::Photo) {
        return Err(MuxError::Input(format!(
            "Photo isn't a JPEG, PNG or HEIC: {}",
            photo.display()
        )));
    }
    if MediaKind::from_path(video) != Some(MediaKind::Video) {
        return Err(MuxError::Input(format!(
            "Video isn't a MOV or MP4: {}",
            video.display()
        )));
    }
    Ok(())
}

/// Move a residual into `output_dir` without altering its bytes
pub async fn relocate(path: &Path, output_dir: &Path) -> Result<PathBuf> {
    if path.parent().is_some_and(|parent| same_file(parent, output_dir)) {
        return Ok(path.to_path_buf());
    }

    let name = path
        .file_name()
        .ok_or_else(|| MuxError::Input(format!("Invalid file name: {}", path.display())))?
        .to_os_string();
    fs::create_dir_all(output_dir).await?;
    let destination = unique_destination(output_dir, &name, None);

    if fs::rename(path, &destination).await.is_ok() {
        return Ok(destination);
    }

    // Different file system: copy, verify, then remove the source
    let expected = fs::metadata(path).await?.len();
    let copied = match fs::copy(path, &destination).await {
        Ok(copied) => copied,
        Err(e) => {
            let _ = fs::remove_file(&destination).await;
            return Err(e.into());
        }
    };
    if copied != expected {
        let _ = fs::remove_file(&destination).await;
        return Err(MuxError::Io(std::io::Error::other(format!(
            "copied {} of {} bytes to {}",
            copied,
            expected,
            destination.display()
        ))));
    }
    let source_meta = fs::metadata(path).await?;
    filetime::set_file_mtime(&destination, FileTime::from_last_modification_time(&source_meta))?;
    fs::remove_file(path).await?;

    Ok(destination)
}
