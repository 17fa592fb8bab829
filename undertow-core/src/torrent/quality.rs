//! Quality attributes inferred from release names.
//!
//! Every category is an ordered enum whose `Unknown` sentinel has rank 0 and
//! sorts below all known values. Inference picks the highest-ranked match.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Video resolution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Resolution {
    #[default]
    Unknown = 0,
    Sd480 = 1,
    Hd720 = 2,
    Hd1080 = 3,
    Qhd1440 = 4,
    Uhd4k = 5,
}

/// Source the release was ripped from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RipType {
    #[default]
    Unknown = 0,
    Cam = 1,
    Telesync = 2,
    Telecine = 3,
    Screener = 4,
    DvdScreener = 5,
    DvdRip = 6,
    Hdtv = 7,
    WebDl = 8,
    BluRay = 9,
}

/// Video codec.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VideoCodec {
    #[default]
    Unknown = 0,
    Xvid = 1,
    H264 = 2,
    H265 = 3,
}

/// Audio codec.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AudioCodec {
    #[default]
    Unknown = 0,
    Mp3 = 1,
    Aac = 2,
    Ac3 = 3,
    Dts = 4,
    DtsHd = 5,
    DtsHdMa = 6,
}

/// Scene status of a release.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SceneRating {
    #[default]
    Unknown = 0,
    Proper = 1,
    Nuked = 2,
}

macro_rules! patterns {
    ($($variant:expr => $re:literal),+ $(,)?) => {
        LazyLock::new(|| {
            [$(($variant, concat!("(?i)", $re))),+]
                .into_iter()
                .filter_map(|(value, re)| Regex::new(re).ok().map(|re| (value, re)))
                .collect()
        })
    };
}

// Highest rank first so the first match wins.
static RESOLUTION_PATTERNS: LazyLock<Vec<(Resolution, Regex)>> = patterns![
    Resolution::Uhd4k => r"\b(2160p|4k|uhd)\b",
    Resolution::Qhd1440 => r"\b1440p\b",
    Resolution::Hd1080 => r"\b(1080p|1080i|fullhd|fhd)\b",
    Resolution::Hd720 => r"\b(720p|hdrip)\b",
    Resolution::Sd480 => r"\b(480p|576p|xvid|dvd|sd)\b",
];

static RIP_PATTERNS: LazyLock<Vec<(RipType, Regex)>> = patterns![
    RipType::BluRay => r"\b(blu-?ray|b[dr]rip|bdremux|bd25|bd50)\b",
    RipType::WebDl => r"\b(web-?dl|webrip|web)\b",
    RipType::Hdtv => r"\b(hdtv|pdtv|hdtvrip)\b",
    RipType::DvdRip => r"\b(dvd-?rip|dvd9|dvd5)\b",
    RipType::DvdScreener => r"\b(dvd-?scr|dvdscreener)\b",
    RipType::Screener => r"\b(screener|scr)\b",
    RipType::Telecine => r"\b(telecine|tc)\b",
    RipType::Telesync => r"\b(telesync|ts|hdts)\b",
    RipType::Cam => r"\b(cam|camrip|hdcam)\b",
];

static VIDEO_PATTERNS: LazyLock<Vec<(VideoCodec, Regex)>> = patterns![
    VideoCodec::H265 => r"\b([hx]\.?265|hevc)\b",
    VideoCodec::H264 => r"\b([hx]\.?264|avc)\b",
    VideoCodec::Xvid => r"\b(xvid|divx)\b",
];

static AUDIO_PATTERNS: LazyLock<Vec<(AudioCodec, Regex)>> = patterns![
    AudioCodec::DtsHdMa => r"\bdts[-. ]?hd[-. ]?ma\b",
    AudioCodec::DtsHd => r"\bdts[-. ]?hd\b",
    AudioCodec::Dts => r"\bdts\b",
    AudioCodec::Ac3 => r"\b(ac3|dd5\.?1|dd\+?)\b",
    AudioCodec::Aac => r"\baac\b",
    AudioCodec::Mp3 => r"\bmp3\b",
];

static SCENE_PATTERNS: LazyLock<Vec<(SceneRating, Regex)>> = patterns![
    SceneRating::Nuked => r"\bnuked\b",
    SceneRating::Proper => r"\b(proper|repack)\b",
];

fn best_match<T: Copy + Default>(patterns: &[(T, Regex)], name: &str) -> T {
    patterns
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map(|(value, _)| *value)
        .unwrap_or_default()
}

/// Quality attributes of one release.
///
/// Derived from the name and never authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityTags {
    pub resolution: Resolution,
    pub rip_type: RipType,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub scene_rating: SceneRating,
}

impl QualityTags {
    /// Infers tags from a release name, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        // Word boundaries do not split on underscores, so treat them as separators.
        let name = name.replace('_', " ");
        Self {
            resolution: best_match(&RESOLUTION_PATTERNS, &name),
            rip_type: best_match(&RIP_PATTERNS, &name),
            video_codec: best_match(&VIDEO_PATTERNS, &name),
            audio_codec: best_match(&AUDIO_PATTERNS, &name),
            scene_rating: best_match(&SCENE_PATTERNS, &name),
        }
    }

    /// Element-wise maximum of both records.
    pub fn merged(self, other: Self) -> Self {
        Self {
            resolution: self.resolution.max(other.resolution),
            rip_type: self.rip_type.max(other.rip_type),
            video_codec: self.video_codec.max(other.video_codec),
            audio_codec: self.audio_codec.max(other.audio_codec),
            scene_rating: self.scene_rating.max(other.scene_rating),
        }
    }

    /// Replaces only the tags still at their unknown sentinel.
    pub fn fill_unknown(&mut self, inferred: Self) {
        fn fill<T: Copy + Default + PartialEq>(slot: &mut T, value: T) {
            if *slot == T::default() {
                *slot = value;
            }
        }
        fill(&mut self.resolution, inferred.resolution);
        fill(&mut self.rip_type, inferred.rip_type);
        fill(&mut self.video_codec, inferred.video_codec);
        fill(&mut self.audio_codec, inferred.audio_codec);
        fill(&mut self.scene_rating, inferred.scene_rating);
    }

    /// True when any category is still unknown.
    pub fn has_unknown(&self) -> bool {
        self.resolution == Resolution::Unknown
            || self.rip_type == RipType::Unknown
            || self.video_codec == VideoCodec::Unknown
            || self.audio_codec == AudioCodec::Unknown
            || self.scene_rating == SceneRating::Unknown
    }
}
