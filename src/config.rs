use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, MuxError};

fn default_exiftool_timeout() -> u64 {
    120
}

fn default_transcoder_timeout() -> u64 {
    60
}

fn default_quality() -> u8 {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exiftool: ExifToolConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExifToolConfig {
    /// Path to the exiftool binary
    pub binary_path: String,
    /// Tag ruleset passed with `-config`; must define the XMP-GCamera namespace
    pub config_path: PathBuf,
    /// Upper bound for a single exiftool invocation
    #[serde(default = "default_exiftool_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Which HEIC encoder to drive
    pub backend: TranscoderBackend,
    /// Path to the encoder binary (sips or magick)
    pub binary_path: String,
    /// JPEG quality, 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Upper bound for a single conversion
    #[serde(default = "default_transcoder_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscoderBackend {
    /// macOS `sips`, keeps the P3 colour profile
    Sips,
    /// ImageMagick 7 `magick`
    ImageMagick,
}

impl Default for ExifToolConfig {
    fn default() -> Self {
        Self {
            binary_path: "exiftool".to_string(),
            config_path: PathBuf::from("exiftool/google_camera.config"),
            timeout_secs: default_exiftool_timeout(),
        }
    }
}

impl ExifToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            backend: TranscoderBackend::Sips,
            binary_path: "sips".to_string(),
            quality: default_quality(),
            timeout_secs: default_transcoder_timeout(),
        }
    }
}

impl TranscoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MuxError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| MuxError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MuxError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MuxError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.transcoder.quality == 0 || self.transcoder.quality > 100 {
            return Err(MuxError::Config(format!(
                "transcoder.quality must be within 1-100, got {}",
                self.transcoder.quality
            )));
        }
        if self.exiftool.timeout_secs == 0 || self.transcoder.timeout_secs == 0 {
            return Err(MuxError::Config("timeouts must be at least one second".to_string()));
        }
        Ok(())
    }
}
