//! Filename parser for scene-style release names
//!
//! Parses names like:
//! - "The.Matrix.1999.1080p.BluRay.x264-GROUP"
//! - "Blade Runner 2049 2017 2160p UHD BluRay REMUX HDR HEVC Atmos"
//! - "Severance S01 1080p ATVP WEB-DL DDP5 1 H 264"

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid regex"));

/// Tokens that end the title portion of a release name
static RELEASE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(2160p|1080p|1080i|720p|576p|480p|4k|uhd|bluray|blu-ray|bdrip|brrip|remux|web-?dl|webrip|hdtv|dvdrip|hdrip|x264|x265|h ?264|h ?265|hevc|avc|xvid|proper|repack|extended|unrated|s\d{1,2}e\d{1,3}|s\d{1,2})\b",
    )
    .expect("valid regex")
});

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(2160p|1080p|720p|480p|4K|UHD)").expect("valid regex"));

static GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)(?:\.[A-Za-z0-9]+)?$").expect("valid regex"));

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Parsed release information from a file or folder name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelease {
    pub title: Option<String>,
    pub year: Option<String>,
    pub quality: ParsedQuality,
    pub release_group: Option<String>,
    pub is_remux: bool,
}

/// Quality information extracted from filename
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuality {
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub codec: Option<String>,
    pub hdr: Option<String>,
    pub audio: Option<String>,
}

/// Split a release name into title and year, plus quality details
pub fn parse_release(name: &str) -> ParsedRelease {
    let cleaned = SPACES_RE
        .replace_all(&name.replace(['.', '_'], " "), " ")
        .trim()
        .to_string();

    // The title ends at the first year or release token that is not at the very start
    let year = YEAR_RE
        .find_iter(&cleaned)
        .find(|m| m.start() > 0)
        .map(|m| (m.start(), m.as_str().to_string()));
    let token_start = RELEASE_TOKEN_RE
        .find_iter(&cleaned)
        .find(|m| m.start() > 0)
        .map(|m| m.start());

    let cut = match (&year, token_start) {
        (Some((y, _)), Some(t)) => Some((*y).min(t)),
        (Some((y, _)), None) => Some(*y),
        (None, t) => t,
    };

    let title = cut
        .map(|end| &cleaned[..end])
        .unwrap_or(&cleaned)
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '(' || c == '[')
        .to_string();

    let result = ParsedRelease {
        title: (!title.is_empty()).then_some(title),
        year: year.map(|(_, y)| y),
        quality: parse_quality(name),
        release_group: GROUP_RE
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        is_remux: name.to_uppercase().contains("REMUX"),
    };

    debug!(
        name = name,
        title = ?result.title,
        year = ?result.year,
        "Parsed release name"
    );

    result
}

/// Whether the name carries any release-style tokens worth parsing away
pub fn has_release_tokens(name: &str) -> bool {
    RELEASE_TOKEN_RE.is_match(&name.replace(['.', '_'], " "))
}

/// Parse quality information from a filename
pub fn parse_quality(filename: &str) -> ParsedQuality {
    let upper = filename.to_uppercase();
    let mut quality = ParsedQuality::default();

    if let Some(m) = RESOLUTION_RE.find(filename) {
        let res = m.as_str().to_uppercase();
        quality.resolution = Some(match res.as_str() {
            "4K" | "UHD" => "2160p".to_string(),
            other => other.to_lowercase(),
        });
    }

    // Source
    if upper.contains("REMUX") {
        quality.source = Some("Remux".to_string());
    } else if upper.contains("BLURAY") || upper.contains("BDRIP") || upper.contains("BLU-RAY") {
        quality.source = Some("BluRay".to_string());
    } else if upper.contains("WEB-DL") || upper.contains("WEBDL") {
        quality.source = Some("WEB-DL".to_string());
    } else if upper.contains("WEBRIP") || upper.contains("WEB RIP") {
        quality.source = Some("WEBRip".to_string());
    } else if upper.contains("DVDRIP") || upper.contains("DVD") {
        quality.source = Some("DVD".to_string());
    } else if upper.contains("HDTV") {
        quality.source = Some("HDTV".to_string());
    }

    // Codec
    if upper.contains("X265") || upper.contains("H265") || upper.contains("H.265") || upper.contains("HEVC") {
        quality.codec = Some("HEVC".to_string());
    } else if upper.contains("X264") || upper.contains("H264") || upper.contains("H.264") || upper.contains("AVC") {
        quality.codec = Some("H.264".to_string());
    } else if upper.contains("AV1") {
        quality.codec = Some("AV1".to_string());
    }

    // HDR
    if upper.contains("DOLBY VISION") || upper.contains("DOLBYVISION") || upper.contains("DOVI") || has_word(&upper, "DV") {
        quality.hdr = Some("Dolby Vision".to_string());
    } else if upper.contains("HDR10+") || upper.contains("HDR10PLUS") {
        quality.hdr = Some("HDR10+".to_string());
    } else if upper.contains("HDR") {
        quality.hdr = Some("HDR10".to_string());
    } else if upper.contains("HLG") {
        quality.hdr = Some("HLG".to_string());
    }

    // Audio
    if upper.contains("ATMOS") {
        quality.audio = Some("Atmos".to_string());
    } else if upper.contains("TRUEHD") {
        quality.audio = Some("TrueHD".to_string());
    } else if upper.contains("DTS-HD") || upper.contains("DTSHD") {
        quality.audio = Some("DTS-HD".to_string());
    } else if upper.contains("DTS") {
        quality.audio = Some("DTS".to_string());
    } else if upper.contains("DDP") || upper.contains("DD+") {
        quality.audio = Some("DD+".to_string());
    } else if upper.contains("AAC") {
        quality.audio = Some("AAC".to_string());
    }

    quality
}

fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| part == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scene_movie() {
        let result = parse_release("The.Matrix.1999.1080p.BluRay.x264-GROUP");
        assert_eq!(result.title.as_deref(), Some("The Matrix"));
        assert_eq!(result.year.as_deref(), Some("1999"));
        assert_eq!(result.quality.resolution.as_deref(), Some("1080p"));
        assert_eq!(result.quality.source.as_deref(), Some("BluRay"));
        assert_eq!(result.quality.codec.as_deref(), Some("H.264"));
        assert_eq!(result.release_group.as_deref(), Some("GROUP"));
    }

    #[test]
    fn test_year_at_start_is_part_of_title() {
        let result = parse_release("2001 A Space Odyssey 1968 2160p");
        assert_eq!(result.title.as_deref(), Some("2001 A Space Odyssey"));
        assert_eq!(result.year.as_deref(), Some("1968"));
    }

    #[test]
    fn test_series_without_year() {
        let result = parse_release("Severance S01 1080p ATVP WEB-DL DDP5 1 H 264");
        assert_eq!(result.title.as_deref(), Some("Severance"));
        assert_eq!(result.year, None);
        assert_eq!(result.quality.audio.as_deref(), Some("DD+"));
    }

    #[test]
    fn test_parse_quality() {
        let quality = parse_quality("Dune 2021 2160p UHD BluRay REMUX DV HDR HEVC TrueHD Atmos");
        assert_eq!(quality.resolution.as_deref(), Some("2160p"));
        assert_eq!(quality.source.as_deref(), Some("Remux"));
        assert_eq!(quality.codec.as_deref(), Some("HEVC"));
        assert_eq!(quality.hdr.as_deref(), Some("Dolby Vision"));
        assert_eq!(quality.audio.as_deref(), Some("Atmos"));
    }

    #[test]
    fn test_release_tokens() {
        assert!(has_release_tokens("Show.Name.S02.720p"));
        assert!(!has_release_tokens("Brooklyn Nine-Nine"));
    }
}
