//! Pairing of photos with their companion videos.
//!
//! Every video is tried against the photos that are still unclaimed, first by
//! `ContentIdentifier`, then by base file name plus capture day. Candidates are
//! visited in the order they were given, so the same input always produces the
//! same pairing.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Result, MuxError};
use crate::media::{tags, MediaFile, MediaKind};

/// How a pair was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStrategy {
    ContentIdentifier,
    FilenameAndDate,
    /// Paired by the caller without identity checks
    Explicit,
}

/// Exactly one photo and one video
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPhotoGroup {
    photo: MediaFile,
    video: MediaFile,
    strategy: MatchStrategy,
}

impl MotionPhotoGroup {
    pub fn new(photo: MediaFile, video: MediaFile, strategy: MatchStrategy) -> Result<Self> {
        if photo.kind != MediaKind::Photo {
            return Err(MuxError::Input(format!("Not a photo: {}", photo.path.display())));
        }
        if video.kind != MediaKind::Video {
            return Err(MuxError::Input(format!("Not a video: {}", video.path.display())));
        }
        Ok(Self { photo, video, strategy })
    }

    pub fn photo(&self) -> &MediaFile {
        &self.photo
    }

    pub fn video(&self) -> &MediaFile {
        &self.video
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn into_files(self) -> (MediaFile, MediaFile) {
        (self.photo, self.video)
    }
}

/// Per-file result of resolution
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(MotionPhotoGroup),
    UnmatchedPhoto(MediaFile),
    UnmatchedVideo(MediaFile),
}

/// Partition of a batch into pairs and residuals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub pairs: Vec<MotionPhotoGroup>,
    pub unmatched_photos: Vec<MediaFile>,
    pub unmatched_videos: Vec<MediaFile>,
}

impl Resolution {
    pub fn into_outcomes(self) -> Vec<MatchOutcome> {
        self.pairs
            .into_iter()
            .map(MatchOutcome::Matched)
            .chain(self.unmatched_photos.into_iter().map(MatchOutcome::UnmatchedPhoto))
            .chain(self.unmatched_videos.into_iter().map(MatchOutcome::UnmatchedVideo))
            .collect()
    }
}

/// Pair every video with at most one photo.
pub fn resolve(files: Vec<MediaFile>) -> Resolution {
    let (photos, videos): (Vec<MediaFile>, Vec<MediaFile>) =
        files.into_iter().partition(|f| f.kind == MediaKind::Photo);

    let mut claimed = vec![false; photos.len()];
    let mut assignment: Vec<Option<(usize, MatchStrategy)>> = vec![None; videos.len()];

    // Pass 1: content identifier
    for (v, video) in videos.iter().enumerate() {
        let Some(id) = video.content_identifier() else {
            continue;
        };
        let found = photos
            .iter()
            .enumerate()
            .find(|(p, photo)| !claimed[*p] && photo.content_identifier() == Some(id));
        if let Some((p, _)) = found {
            claimed[p] = true;
            assignment[v] = Some((p, MatchStrategy::ContentIdentifier));
        }
    }

    // Pass 2: base name and capture day
    for (v, video) in videos.iter().enumerate() {
        if assignment[v].is_some() {
            continue;
        }
        let Some(video_day) = capture_day(video) else {
            continue;
        };
        let video_stem = video.stem();
        let found = photos.iter().enumerate().find(|(p, photo)| {
            !claimed[*p]
                && stems_match(&photo.stem(), &video_stem)
                && capture_day(photo).as_ref() == Some(&video_day)
        });
        if let Some((p, _)) = found {
            claimed[p] = true;
            assignment[v] = Some((p, MatchStrategy::FilenameAndDate));
        }
    }

    let mut photos: Vec<Option<MediaFile>> = photos.into_iter().map(Some).collect();
    let mut resolution = Resolution::default();

    for (video, assigned) in videos.into_iter().zip(assignment) {
        match assigned.and_then(|(p, strategy)| photos[p].take().map(|photo| (photo, strategy))) {
            Some((photo, strategy)) => resolution.pairs.push(MotionPhotoGroup {
                photo,
                video,
                strategy,
            }),
            None => resolution.unmatched_videos.push(video),
        }
    }
    resolution.unmatched_photos = photos.into_iter().flatten().collect();

    resolution
}

/// `IMG_1001` and `IMG_1001_1` match video `IMG_1001`; `IMG_E1001` does not.
fn stems_match(photo_stem: &str, video_stem: &str) -> bool {
    let photo_stem = photo_stem.to_ascii_lowercase();
    let video_stem = video_stem.to_ascii_lowercase();
    if video_stem.is_empty() {
        return false;
    }
    if photo_stem == video_stem {
        return true;
    }
    photo_stem
        .strip_prefix(video_stem.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Date portion of `CreateDate`, ignoring the time of day
fn capture_day(file: &MediaFile) -> Option<NaiveDate> {
    let token = file.tag(tags::CREATE_DATE)?.split_whitespace().next()?;
    // unset dates (0000:00:00) fail to parse as well
    ["%Y:%m:%d", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}
