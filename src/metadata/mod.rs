// Metadata provider abstraction
//
// - MetadataProvider: batch tag reads, in-place tag writes, verification reads
// - exiftool: the process-backed implementation

pub mod exiftool;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use exiftool::*;

use crate::config::ExifToolConfig;
use crate::error::Result;
use crate::media::TagMap;

/// Reads and writes the tags the pipeline depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch tags for every path in a single external call.
    /// A path missing from the result has no readable metadata.
    async fn read_batch(&self, paths: &[PathBuf], recursive: bool) -> Result<HashMap<PathBuf, TagMap>>;

    /// Read specific tags from one file
    async fn read_tags(&self, path: &Path, tags: &[String]) -> Result<TagMap>;

    /// Write tags into `path` in place, overwriting the file
    async fn write_tags(&self, path: &Path, tags: &[(String, String)]) -> Result<()>;

    /// Check that the backing tool can be executed
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating metadata providers
pub struct MetadataProviderFactory;

impl MetadataProviderFactory {
    /// Create the default provider (exiftool-based)
    pub fn create_provider(config: ExifToolConfig) -> Box<dyn MetadataProvider> {
        Box::new(ExifTool::new(config))
    }
}
