use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::MetadataProvider;
use crate::command::ToolCommand;
use crate::config::ExifToolConfig;
use crate::error::{Result, MuxError};
use crate::media::{tags, TagMap};

/// Builder for the exiftool invocations the pipeline needs
pub struct ExifToolCommandBuilder {
    config: ExifToolConfig,
}

impl ExifToolCommandBuilder {
    pub fn new(config: ExifToolConfig) -> Self {
        Self { config }
    }

    fn base(&self, description: &str) -> ToolCommand {
        let cmd = ToolCommand::new(&self.config.binary_path, description)
            .timeout(self.config.timeout());

        // -config is only honoured as the very first argument
        if self.config.config_path.is_file() {
            cmd.arg("-config").path(&self.config.config_path)
        } else {
            debug!(
                "Tag ruleset {} not found, relying on built-in tag tables",
                self.config.config_path.display()
            );
            cmd
        }
    }

    /// JSON read of the batch tags for every path listed in `arg_file`
    pub fn read_batch(&self, arg_file: &Path, recursive: bool) -> ToolCommand {
        let mut cmd = self.base("Metadata batch read").args(["-json", "-n"]);
        for tag in tags::BATCH_READ {
            cmd = cmd.arg(format!("-{}", tag));
        }
        if recursive {
            cmd = cmd.arg("-r");
        }
        cmd.arg("-@").path(arg_file)
    }

    /// JSON read of selected tags from one file
    pub fn read_tags(&self, path: &Path, names: &[String]) -> ToolCommand {
        let mut cmd = self.base("Metadata read").args(["-json", "-n"]);
        for name in names {
            cmd = cmd.arg(format!("-{}", name));
        }
        cmd.path(path)
    }

    /// In-place tag write
    pub fn write_tags(&self, path: &Path, assignments: &[(String, String)]) -> ToolCommand {
        let mut cmd = self
            .base("Metadata write")
            .args(["-overwrite_original", "-m", "-q"]);
        for (name, value) in assignments {
            cmd = cmd.arg(format!("-{}={}", name, value));
        }
        cmd.path(path)
    }

    pub fn version_check(&self) -> ToolCommand {
        ToolCommand::new(&self.config.binary_path, "Version check")
            .timeout(self.config.timeout())
            .arg("-ver")
    }
}

/// exiftool-backed metadata provider
pub struct ExifTool {
    command_builder: ExifToolCommandBuilder,
}

impl ExifTool {
    pub fn new(config: ExifToolConfig) -> Self {
        Self {
            command_builder: ExifToolCommandBuilder::new(config),
        }
    }

    async fn run_json(&self, command: ToolCommand) -> Result<HashMap<PathBuf, TagMap>> {
        let output = command.run().await?;
        let stdout = output.stdout_lossy();

        // exiftool exits non-zero when any single file fails but still reports the rest
        if stdout.trim().is_empty() {
            if output.success() {
                return Ok(HashMap::new());
            }
            return Err(MuxError::ExternalTool(format!(
                "{} failed ({}): {}",
                command.description,
                output.status,
                output.stderr_lossy()
            )));
        }
        if !output.success() {
            warn!("{} reported problems: {}", command.description, output.stderr_lossy());
        }

        parse_json_output(&stdout)
    }
}

#[async_trait]
impl MetadataProvider for ExifTool {
    async fn read_batch(&self, paths: &[PathBuf], recursive: bool) -> Result<HashMap<PathBuf, TagMap>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        info!("Reading metadata for {} paths in one exiftool call", paths.len());

        // An argument file keeps the command line bounded for large batches
        let mut arg_file = tempfile::Builder::new()
            .prefix("photomux-args-")
            .suffix(".txt")
            .tempfile()?;
        write_arg_file(&mut arg_file, paths)?;

        let command = self.command_builder.read_batch(arg_file.path(), recursive);
        let metadata = self.run_json(command).await?;

        debug!("exiftool returned metadata for {} files", metadata.len());
        for path in paths.iter().filter(|p| !metadata.contains_key(*p)) {
            warn!("No metadata returned for {}", path.display());
        }
        Ok(metadata)
    }

    async fn read_tags(&self, path: &Path, names: &[String]) -> Result<TagMap> {
        let command = self.command_builder.read_tags(path, names);
        let mut metadata = self.run_json(command).await?;

        Ok(metadata
            .remove(path)
            .or_else(|| metadata.into_values().next())
            .unwrap_or_default())
    }

    async fn write_tags(&self, path: &Path, assignments: &[(String, String)]) -> Result<()> {
        debug!("Writing {} tags into {}", assignments.len(), path.display());
        self.command_builder
            .write_tags(path, assignments)
            .execute()
            .await?;
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        let output = self.command_builder.version_check().execute().await?;
        let version = output.stdout_lossy().trim().to_string();
        info!("exiftool {} is available", version);
        Ok(version)
    }
}

/// One path per line, written as raw bytes so non-UTF-8 names survive
pub fn write_arg_file<W: Write>(out: &mut W, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            out.write_all(path.as_os_str().as_bytes())?;
        }
        #[cfg(not(unix))]
        out.write_all(path.to_string_lossy().as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Parse `exiftool -json` output into per-file tag maps keyed by `SourceFile`
pub fn parse_json_output(stdout: &str) -> Result<HashMap<PathBuf, TagMap>> {
    let records: Vec<serde_json::Map<String, Value>> = serde_json::from_str(stdout)?;

    let mut by_path = HashMap::with_capacity(records.len());
    for record in records {
        let Some(source) = record.get("SourceFile").and_then(Value::as_str) else {
            warn!("Skipping exiftool record without SourceFile");
            continue;
        };
        let source = PathBuf::from(source);

        let tags: TagMap = record
            .iter()
            .filter(|(key, _)| key.as_str() != "SourceFile")
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect();
        by_path.insert(source, tags);
    }
    Ok(by_path)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_ruleset() -> ExifToolConfig {
        ExifToolConfig {
            binary_path: "exiftool".to_string(),
            config_path: PathBuf::from("/nonexistent/google_camera.config"),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_parse_json_output_keys_by_source_file() {
        let stdout = r#"[
            {"SourceFile": "/in/IMG_1.JPG", "FileName": "IMG_1.JPG",
             "ContentIdentifier": "ABC123", "CreateDate": "2023:05:01 10:00:00",
             "LivePhotoVideoIndex": 2, "RunTimeScale": 6},
            {"SourceFile": "/in/IMG_1.MP4", "ContentIdentifier": "ABC123",
             "Nested": {"ignored": true}, "List": [1, 2]}
        ]"#;

        let parsed = parse_json_output(stdout).unwrap();
        assert_eq!(parsed.len(), 2);

        let photo = &parsed[Path::new("/in/IMG_1.JPG")];
        assert_eq!(photo["ContentIdentifier"], "ABC123");
        assert_eq!(photo["LivePhotoVideoIndex"], "2");
        assert_eq!(photo["RunTimeScale"], "6");
        assert!(!photo.contains_key("SourceFile"));

        let video = &parsed[Path::new("/in/IMG_1.MP4")];
        assert!(!video.contains_key("Nested"));
        assert!(!video.contains_key("List"));
    }

    #[cfg(unix)]
    #[test]
    fn test_arg_file_keeps_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let odd = PathBuf::from(OsStr::from_bytes(b"/in/IMG_\xff1.JPG"));
        let mut out = Vec::new();
        write_arg_file(&mut out, &[PathBuf::from("/in/IMG_1.MOV"), odd]).unwrap();

        assert_eq!(out, b"/in/IMG_1.MOV\n/in/IMG_\xff1.JPG\n".to_vec());
    }

    #[test]
    fn test_parse_json_output_rejects_garbage() {
        assert!(matches!(parse_json_output("not json"), Err(MuxError::Json(_))));
    }

    #[test]
    fn test_write_command_layout() {
        let builder = ExifToolCommandBuilder::new(config_without_ruleset());
        let cmd = builder.write_tags(
            Path::new("/out/IMG_1.MP.JPG"),
            &[("XMP-GCamera:MicroVideo".to_string(), "1".to_string())],
        );

        let args: Vec<String> = cmd.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-overwrite_original",
                "-m",
                "-q",
                "-XMP-GCamera:MicroVideo=1",
                "/out/IMG_1.MP.JPG"
            ]
        );
    }

    #[test]
    fn test_ruleset_comes_first_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let ruleset = dir.path().join("google_camera.config");
        std::fs::write(&ruleset, "1;").unwrap();

        let builder = ExifToolCommandBuilder::new(ExifToolConfig {
            config_path: ruleset.clone(),
            ..config_without_ruleset()
        });
        let cmd = builder.read_batch(Path::new("/tmp/args.txt"), true);

        assert_eq!(cmd.args[0], "-config");
        assert_eq!(cmd.args[1].as_os_str(), ruleset.as_os_str());
        assert!(cmd.args.iter().any(|a| a == "-r"));
        assert!(cmd.args.iter().any(|a| a == "-ContentIdentifier"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_batch_passes_paths_through_argument_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // Stand-in tool: echo each listed path back as a JSON record
        let script = dir.path().join("fake-exiftool");
        std::fs::write(
            &script,
            r#"#!/bin/sh
while [ "$1" != "-@" ]; do shift; done
printf '['
sep=''
while IFS= read -r line; do
  printf '%s{"SourceFile":"%s","ContentIdentifier":"ID"}' "$sep" "$line"
  sep=','
done < "$2"
printf ']'
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = ExifTool::new(ExifToolConfig {
            binary_path: script.to_string_lossy().into_owned(),
            ..config_without_ruleset()
        });
        let paths = vec![dir.path().join("IMG_1.JPG"), dir.path().join("IMG_1.MP4")];
        let metadata = provider.read_batch(&paths, false).await.unwrap();

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[&paths[1]]["ContentIdentifier"], "ID");
    }
}
