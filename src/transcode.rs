// HEIC -> JPEG pre-pass
//
// The conversion itself is delegated to a platform encoder (sips on macOS,
// ImageMagick elsewhere). Sources are removed only after the JPEG exists.

use async_trait::async_trait;
use filetime::FileTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::command::ToolCommand;
use crate::config::{TranscoderBackend, TranscoderConfig};
use crate::error::{Result, MuxError};
use crate::media::{is_heic, MediaKind};

/// Outcome of preparing a directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscodeSummary {
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub converted: Vec<(PathBuf, PathBuf)>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Converts high-efficiency images into JPEG
#[async_trait]
pub trait ImageTranscoder: Send + Sync {
    /// Convert one HEIC file, removing it on success. Returns the JPEG path.
    async fn convert(&self, heic: &Path) -> Result<PathBuf>;

    /// Check that the encoder can be executed
    async fn check_availability(&self) -> Result<()>;

    /// Disambiguate colliding names, then convert every HEIC under `dir`
    async fn prepare_directory(&self, dir: &Path, recursive: bool) -> Result<TranscodeSummary> {
        let mut summary = TranscodeSummary {
            renamed: rename_colliding_heic(dir, recursive)?,
            ..Default::default()
        };

        for heic in heic_files(dir, recursive) {
            match self.convert(&heic).await {
                Ok(jpeg) => summary.converted.push((heic, jpeg)),
                Err(e) => {
                    warn!("Failed to convert {}: {}", heic.display(), e);
                    summary.failures.push((heic, e.to_string()));
                }
            }
        }

        info!(
            "Converted {} HEIC files ({} renamed, {} failed)",
            summary.converted.len(),
            summary.renamed.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}

/// Factory for creating transcoders
pub struct TranscoderFactory;

impl TranscoderFactory {
    pub fn create_transcoder(config: TranscoderConfig) -> Box<dyn ImageTranscoder> {
        Box::new(CommandTranscoder::new(config))
    }
}

/// Transcoder driving an external encoder binary
pub struct CommandTranscoder {
    config: TranscoderConfig,
}

impl CommandTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Build the conversion command for the configured backend
    pub fn convert_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let quality = self.config.quality.to_string();
        let cmd = ToolCommand::new(&self.config.binary_path, "HEIC conversion")
            .timeout(self.config.timeout());

        match self.config.backend {
            TranscoderBackend::Sips => cmd
                .args(["-s", "format", "jpeg", "-s", "formatOptions"])
                .arg(quality)
                .path(input)
                .arg("--out")
                .path(output),
            TranscoderBackend::ImageMagick => cmd
                .path(input)
                .arg("-quality")
                .arg(quality)
                .path(output),
        }
    }

    fn version_command(&self) -> ToolCommand {
        let cmd = ToolCommand::new(&self.config.binary_path, "Version check")
            .timeout(self.config.timeout());
        match self.config.backend {
            TranscoderBackend::Sips => cmd.arg("--help"),
            TranscoderBackend::ImageMagick => cmd.arg("-version"),
        }
    }
}

#[async_trait]
impl ImageTranscoder for CommandTranscoder {
    async fn convert(&self, heic: &Path) -> Result<PathBuf> {
        if !heic.is_file() || !is_heic(heic) {
            return Err(MuxError::Input(format!("Not a HEIC file: {}", heic.display())));
        }
        let jpeg = heic.with_extension("JPG");
        if jpeg.exists() {
            return Err(MuxError::Input(format!(
                "Refusing to overwrite existing {}",
                jpeg.display()
            )));
        }

        self.convert_command(heic, &jpeg).execute().await?;

        let written = std::fs::metadata(&jpeg).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            let _ = std::fs::remove_file(&jpeg);
            return Err(MuxError::ExternalTool(format!(
                "Encoder produced no output for {}",
                heic.display()
            )));
        }

        let source_meta = std::fs::metadata(heic)?;
        filetime::set_file_mtime(&jpeg, FileTime::from_last_modification_time(&source_meta))?;
        std::fs::remove_file(heic)?;

        info!("File converted: {}", jpeg.display());
        Ok(jpeg)
    }

    async fn check_availability(&self) -> Result<()> {
        self.version_command().execute().await.map_err(|e| {
            MuxError::ExternalTool(format!("Image encoder not usable: {}", e))
        })?;
        Ok(())
    }
}

fn walk(dir: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

fn heic_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    walk(dir, recursive).filter(|p| is_heic(p)).collect()
}

/// Rename HEIC files whose base name is shared with another photo in the same
/// directory to `<stem>_<n>.<ext>`, so conversion never clobbers an existing JPEG.
pub fn rename_colliding_heic(dir: &Path, recursive: bool) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut groups: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();
    for path in walk(dir, recursive) {
        if MediaKind::from_path(&path) != Some(MediaKind::Photo) {
            continue;
        }
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        groups.entry((parent, stem)).or_default().push(path);
    }

    let mut renamed = Vec::new();
    for ((parent, stem), files) in groups {
        if files.len() < 2 {
            continue;
        }
        let mut counter = 1u32;
        for heic in files.iter().filter(|p| is_heic(p)) {
            let ext = heic
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = loop {
                let candidate = parent.join(format!("{}_{}.{}", stem, counter, ext));
                counter += 1;
                if !candidate.exists() && !candidate.with_extension("JPG").exists() {
                    break candidate;
                }
            };
            std::fs::rename(heic, &target)?;
            info!("Renamed {} -> {}", heic.display(), target.display());
            renamed.push((heic.clone(), target));
        }
    }
    Ok(renamed)
}
