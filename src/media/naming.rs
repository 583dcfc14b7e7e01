use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::is_heic;

/// Marker viewers look for in Motion Photo file names
pub const MOTION_MARKER: &str = ".MP";

/// Prefix of hidden staging files written next to the final output
pub const STAGING_PREFIX: &str = ".photomux-";

/// `IMG_0001.JPG` -> `IMG_0001.MP.JPG`. HEIC keeps its name unmarked.
pub fn motion_photo_file_name(photo: &Path) -> Option<OsString> {
    let file_name = photo.file_name()?;
    if is_heic(photo) {
        return Some(file_name.to_os_string());
    }

    let stem = photo.file_stem()?;
    let mut name = stem.to_os_string();
    name.push(MOTION_MARKER);
    if let Some(ext) = photo.extension() {
        name.push(".");
        name.push(ext);
    }
    Some(name)
}

/// Pick `dir/name`, or `dir/<stem>_<n>.<ext>` when that is taken.
/// A Motion Photo name keeps its marker last: `IMG_1.MP.JPG` -> `IMG_1_1.MP.JPG`.
///
/// `reusable` names a path that may be replaced rather than avoided, used when the
/// destination is the very photo being consumed.
pub fn unique_destination(dir: &Path, name: &OsString, reusable: Option<&Path>) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() || reusable.is_some_and(|r| same_file(r, &candidate)) {
        return candidate;
    }

    let template = Path::new(name);
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = template.extension().map(|e| e.to_string_lossy().into_owned());
    let (base, marker) = match (&ext, stem.strip_suffix(MOTION_MARKER)) {
        (Some(_), Some(base)) if !base.is_empty() => (base.to_string(), MOTION_MARKER),
        _ => (stem, ""),
    };

    let mut counter = 1u32;
    loop {
        let numbered = match &ext {
            Some(ext) => format!("{}_{}{}.{}", base, counter, marker, ext),
            None => format!("{}_{}", base, counter),
        };
        let candidate = dir.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Compare two paths by identity when both exist, lexically otherwise
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
