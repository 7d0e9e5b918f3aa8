//! Technical probing of video files for automatic badges
//!
//! Uses ffprobe (command-line) and its JSON output. The facts gathered for a
//! title are stored in a probe record next to the media (`rpdb.json` in the
//! folder, or `{stem}-rpdb.json` beside a standalone file) and reused on later
//! scans unless re-probing is forced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::DefaultBadges;
use crate::error::ProbeError;
use crate::media::{WorkItem, file_name_lossy};
use crate::services::filename_parser::parse_quality;

/// Filename tags that mark HDR content when the stream metadata does not
const HDR_NAME_TAGS: &[&str] = &["[hdr]", "[hdr10]", "[hdr10+]", "{hdr}", "{hdr10}", "{hdr10+}"];

/// Facts about one video file, persisted as the probe record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeFacts {
    pub filename: String,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub audio_languages: Vec<String>,
    pub subtitle_languages: Vec<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub audio_channels: Option<String>,
    pub is_hdr: bool,
    pub is_dolby_vision: bool,
    /// Release source from the filename, e.g. Remux, BluRay, WEB-DL
    pub source: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
    /// The IMDb id came from the file's own metadata tags
    pub matched_imdb_in_file: bool,
}

impl ProbeFacts {
    /// An IMDb id embedded in the file itself
    pub fn in_file_imdb_id(&self) -> Option<&str> {
        self.imdb_id.as_deref().filter(|_| self.matched_imdb_in_file)
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, video: &Path) -> Result<ProbeFacts, ProbeError>;
}

/// FFprobe JSON output structures
mod ffprobe {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub tags: Option<HashMap<String, String>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub codec_tag_string: Option<String>,

        // Video specific
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub color_transfer: Option<String>,
        pub color_primaries: Option<String>,

        // Audio specific
        pub channels: Option<u16>,

        pub tags: Option<HashMap<String, String>>,

        // Side data for Dolby Vision detection
        pub side_data_list: Option<Vec<SideData>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SideData {
        pub side_data_type: Option<String>,
    }
}

/// Prober backed by the ffprobe executable
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Check if ffprobe is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, video: &Path) -> Result<ProbeFacts, ProbeError> {
        debug!(path = %video.display(), "Probing video file with ffprobe");

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(video)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                path: video.to_path_buf(),
                message: if stderr.is_empty() {
                    "no error output".to_string()
                } else {
                    stderr.trim().to_string()
                },
            });
        }

        let parsed: ffprobe::FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let facts = facts_from_output(&file_name_lossy(video), parsed).ok_or_else(|| ProbeError::Failed {
            path: video.to_path_buf(),
            message: "no video stream".to_string(),
        })?;

        info!(
            path = %video.display(),
            width = ?facts.video_width,
            height = ?facts.video_height,
            hdr = facts.is_hdr,
            dolby_vision = facts.is_dolby_vision,
            "Video probe complete"
        );
        Ok(facts)
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn tag<'a>(tags: &'a Option<HashMap<String, String>>, key: &str) -> Option<&'a str> {
    tags.as_ref()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Reduce ffprobe output to probe facts; `None` when there is no video stream
fn facts_from_output(filename: &str, output: ffprobe::FfprobeOutput) -> Option<ProbeFacts> {
    let mut facts = ProbeFacts {
        filename: filename.to_string(),
        ..ProbeFacts::default()
    };
    let mut has_video = false;
    let mut max_channels = 0u16;

    for stream in output.streams.unwrap_or_default() {
        let language = tag(&stream.tags, "language").map(normalize_language);
        match stream.codec_type.as_deref() {
            Some("video") => {
                has_video = true;
                if let Some(codec) = &stream.codec_name {
                    push_unique(&mut facts.video_codecs, codec.to_lowercase());
                }
                if let (Some(w), Some(h)) = (stream.width, stream.height)
                    && w > facts.video_width.unwrap_or(0)
                    && h > facts.video_height.unwrap_or(0)
                {
                    facts.video_width = Some(w);
                    facts.video_height = Some(h);
                }
                if is_dolby_vision(&stream) {
                    facts.is_dolby_vision = true;
                }
                let bt2020 = stream.color_primaries.as_deref().is_some_and(|p| p.contains("bt2020"));
                let pq_or_hlg = stream
                    .color_transfer
                    .as_deref()
                    .is_some_and(|t| t.contains("smpte2084") || t.contains("arib-std-b67"));
                if bt2020 && pq_or_hlg {
                    facts.is_hdr = true;
                }
            }
            Some("audio") => {
                if let Some(codec) = &stream.codec_name {
                    push_unique(&mut facts.audio_codecs, codec.to_lowercase());
                }
                if let Some(language) = language {
                    push_unique(&mut facts.audio_languages, language);
                }
                max_channels = max_channels.max(stream.channels.unwrap_or(0));
            }
            Some("subtitle") => {
                if let Some(language) = language {
                    push_unique(&mut facts.subtitle_languages, language);
                }
            }
            _ => {}
        }
    }

    if !has_video {
        return None;
    }

    let format_tags = output.format.and_then(|f| f.tags);
    if let Some(imdb) = tag(&format_tags, "imdb").filter(|v| v.starts_with("tt")) {
        facts.imdb_id = Some(imdb.to_string());
        facts.matched_imdb_in_file = true;
    } else if let Some(tmdb) = tag(&format_tags, "tmdb") {
        facts.tmdb_id = Some(tmdb.to_string());
    }

    facts.audio_channels = match max_channels {
        2 => Some("2.0".to_string()),
        6 => Some("5.1".to_string()),
        8 => Some("7.1".to_string()),
        _ => None,
    };
    facts.source = parse_quality(filename).source;

    let lower = filename.to_lowercase();
    if !facts.is_hdr && HDR_NAME_TAGS.iter().any(|t| lower.contains(t)) {
        facts.is_hdr = true;
    }

    Some(facts)
}

fn is_dolby_vision(stream: &ffprobe::Stream) -> bool {
    let tagged = [&stream.codec_name, &stream.codec_tag_string]
        .into_iter()
        .flatten()
        .any(|c| c.contains("dvhe") || c.contains("dvh1"));
    tagged
        || stream
            .side_data_list
            .iter()
            .flatten()
            .filter_map(|sd| sd.side_data_type.as_deref())
            .any(|t| t.contains("Dolby Vision") || t.contains("DOVI"))
}

/// ISO 639-2 codes reported by containers, mapped to the two-letter codes badges use
fn normalize_language(code: &str) -> String {
    let code = code.to_lowercase();
    let short = match code.as_str() {
        "eng" => "en",
        "fre" | "fra" => "fr",
        "ger" | "deu" => "de",
        "spa" => "es",
        "ita" => "it",
        "jpn" => "ja",
        "kor" => "ko",
        "chi" | "zho" => "zh",
        "rus" => "ru",
        "por" => "pt",
        "dut" | "nld" => "nl",
        "swe" => "sv",
        "nor" | "nob" => "no",
        "dan" => "da",
        "fin" => "fi",
        "pol" => "pl",
        "tur" => "tr",
        "hin" => "hi",
        "ara" => "ar",
        "heb" => "he",
        "gre" | "ell" => "el",
        "cze" | "ces" => "cs",
        "hun" => "hu",
        "rum" | "ron" => "ro",
        "tha" => "th",
        "ukr" => "uk",
        "vie" => "vi",
        other => return other.to_string(),
    };
    short.to_string()
}

/// Which badges to derive, parsed from a folder or item query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoBadgeRules {
    pub video_quality: bool,
    pub color_range: bool,
    pub video_codec: bool,
    pub audio_channels: bool,
    pub video_source: bool,
    /// `{language}_{country}`, e.g. `en_us`
    pub country_flag: Option<String>,
    /// `audio`, `sub`, or both when unset
    pub country_flag_where: Option<String>,
}

impl AutoBadgeRules {
    pub fn parse(query: &str) -> Self {
        let mut rules = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let on = !value.is_empty() && value != "0" && value != "false";
            match key.as_ref() {
                "videoQuality" => rules.video_quality = on,
                "colorRange" => rules.color_range = on,
                "videoCodec" => rules.video_codec = on,
                "audioChannels" => rules.audio_channels = on,
                "videoSource" => rules.video_source = on,
                "countryFlag" if on => rules.country_flag = Some(value.into_owned()),
                "countryFlagWhere" if on => rules.country_flag_where = Some(value.into_owned()),
                _ => {}
            }
        }
        rules
    }
}

struct Resolution {
    name: &'static str,
    width: u32,
    height: u32,
}

const RESOLUTIONS: &[Resolution] = &[
    Resolution { name: "480p", width: 852, height: 480 },
    Resolution { name: "720p", width: 1280, height: 720 },
    Resolution { name: "1080p", width: 1920, height: 1080 },
    Resolution { name: "2k", width: 2048, height: 1080 },
    Resolution { name: "4k", width: 3840, height: 2160 },
    Resolution { name: "5k", width: 5120, height: 2880 },
    Resolution { name: "8k", width: 7680, height: 4320 },
];

/// Name a resolution, tolerating letterboxed and pillarboxed encodes
pub fn find_resolution(width: u32, height: u32) -> Option<&'static str> {
    let between = |value: u32, idx: usize, dim: fn(&Resolution) -> u32| {
        let here = dim(&RESOLUTIONS[idx]);
        let next = RESOLUTIONS.get(idx + 1).map(dim);
        let prev = idx.checked_sub(1).map(|i| dim(&RESOLUTIONS[i]));
        value == here
            || (value > here && next.is_none_or(|n| value < n))
            || (value < here && prev.is_none_or(|p| value > p))
    };

    let exact = RESOLUTIONS.iter().enumerate().find(|(idx, res)| {
        (res.height == height && between(width, *idx, |r| r.width))
            || (res.width == width && between(height, *idx, |r| r.height))
    });
    if let Some((_, res)) = exact {
        return Some(res.name);
    }

    RESOLUTIONS
        .iter()
        .enumerate()
        .find(|(idx, res)| {
            height <= res.height && idx.checked_sub(1).is_none_or(|p| height > RESOLUTIONS[p].height)
        })
        .map(|(_, res)| res.name)
}

/// Badge string for the image service, e.g. `4k,dolbyvision,h265,audio51`
pub fn derive_badges(facts: &ProbeFacts, rules: &AutoBadgeRules, defaults: &DefaultBadges, video: &Path) -> Option<String> {
    let mut badges: Vec<String> = Vec::new();

    if rules.video_quality
        && let (Some(w), Some(h)) = (facts.video_width, facts.video_height)
        && let Some(name) = find_resolution(w, h)
    {
        badges.push(name.to_string());
    }

    if rules.color_range {
        if facts.is_dolby_vision {
            badges.push(defaults.dolbyvision.clone());
        } else if facts.is_hdr {
            badges.push(defaults.hdr.clone());
        }
    }

    if rules.video_codec {
        let has = |names: &[&str]| facts.video_codecs.iter().any(|c| names.contains(&c.as_str()));
        if has(&["h265", "x265", "hevc"]) {
            badges.push("h265".to_string());
        } else if has(&["h264", "x264", "avc"]) {
            badges.push("h264".to_string());
        }
    }

    if rules.audio_channels
        && let Some(channels) = &facts.audio_channels
    {
        badges.push(format!("audio{}", channels.replace('.', "")));
    }

    if rules.video_source
        && let Some(source) = source_badge(facts, defaults)
    {
        badges.push(source);
    }

    if let Some((language, country)) = rules.country_flag.as_deref().and_then(|f| f.split_once('_')) {
        let check_audio = rules.country_flag_where.as_deref() != Some("sub");
        let check_subs = rules.country_flag_where.as_deref() != Some("audio");
        let found = (check_audio && facts.audio_languages.iter().any(|l| l == language))
            || (check_subs
                && (facts.subtitle_languages.iter().any(|l| l == language)
                    || sidecar_subtitle_languages(video).iter().any(|l| l == language)));
        if found {
            badges.push(format!("country.{}", country.replace('-', "_").to_lowercase()));
        }
    }

    (!badges.is_empty()).then(|| badges.join(","))
}

fn source_badge(facts: &ProbeFacts, defaults: &DefaultBadges) -> Option<String> {
    let source = facts.source.as_deref()?.to_lowercase();
    let badge = if source == "remux" {
        defaults.remux.as_str()
    } else if source == "bluray" {
        "bluray"
    } else if source.contains("dvd") {
        "dvd"
    } else if source.contains("web") {
        "web"
    } else {
        return None;
    };
    Some(badge.to_string())
}

/// Languages of subtitle files named `{video stem}.{lang}.{ext}`
fn sidecar_subtitle_languages(video: &Path) -> Vec<String> {
    const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "vtt", "idx"];
    let (Some(dir), Some(stem)) = (video.parent(), video.file_stem().map(|s| s.to_string_lossy().into_owned()))
    else {
        return Vec::new();
    };
    crate::media::list_entries(dir)
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SUBTITLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .filter_map(|p| {
            let sub_stem = p.file_stem()?.to_string_lossy().into_owned();
            let lang = sub_stem.strip_prefix(&stem)?.strip_prefix('.')?.to_lowercase();
            match lang.len() {
                2 => Some(lang),
                3 => Some(normalize_language(&lang)),
                _ => None,
            }
        })
        .collect()
}

/// Location of the probe record for an item
pub fn record_path(item: &WorkItem, target_folder: &Path) -> PathBuf {
    if item.is_file {
        let stem = Path::new(&item.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.name.clone());
        item.folder.join(format!("{}-rpdb.json", stem))
    } else {
        target_folder.join("rpdb.json")
    }
}

pub async fn read_record(path: &Path) -> Option<ProbeFacts> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(facts) => Some(facts),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable probe record");
            None
        }
    }
}

/// Probe through the record: reuse it when it matches the video, else probe and rewrite it
pub async fn probe_with_record(
    prober: &dyn Prober,
    video: &Path,
    record: &Path,
    overwrite: bool,
    known_imdb_id: Option<&str>,
) -> Result<ProbeFacts, ProbeError> {
    let filename = file_name_lossy(video);
    if !overwrite
        && let Some(facts) = read_record(record).await
        && facts.filename == filename
    {
        debug!(path = %record.display(), "Reusing probe record");
        return Ok(facts);
    }

    let mut facts = prober.probe(video).await?;
    if facts.imdb_id.is_none()
        && let Some(id) = known_imdb_id
    {
        facts.imdb_id = Some(id.to_string());
        facts.matched_imdb_in_file = false;
    }

    match serde_json::to_vec_pretty(&facts) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(record, json).await {
                warn!(path = %record.display(), error = %e, "Could not write probe record");
            }
        }
        Err(e) => warn!(path = %record.display(), error = %e, "Could not encode probe record"),
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_find_resolution() {
        assert_eq!(find_resolution(1920, 1080), Some("1080p"));
        assert_eq!(find_resolution(1920, 800), Some("1080p"));
        assert_eq!(find_resolution(3840, 1600), Some("4k"));
        assert_eq!(find_resolution(1280, 720), Some("720p"));
        assert_eq!(find_resolution(2048, 1080), Some("2k"));
        assert_eq!(find_resolution(720, 576), Some("720p"));
        assert_eq!(find_resolution(10000, 5000), None);
    }

    #[test]
    fn test_parse_rules() {
        let rules = AutoBadgeRules::parse("videoQuality=1&colorRange=true&videoCodec=0&countryFlag=en_us");
        assert!(rules.video_quality);
        assert!(rules.color_range);
        assert!(!rules.video_codec);
        assert_eq!(rules.country_flag.as_deref(), Some("en_us"));
    }

    fn ffprobe_json() -> &'static str {
        r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 1604,
                 "color_primaries": "bt2020", "color_transfer": "smpte2084",
                 "side_data_list": [{"side_data_type": "DOVI configuration record"}]},
                {"codec_type": "audio", "codec_name": "truehd", "channels": 8, "tags": {"language": "eng"}},
                {"codec_type": "audio", "codec_name": "ac3", "channels": 6, "tags": {"language": "ger"}},
                {"codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "fre"}}
            ],
            "format": {"tags": {"IMDB": "tt1856101"}}
        }"#
    }

    #[test]
    fn test_facts_from_ffprobe_output() {
        let output: ffprobe::FfprobeOutput = serde_json::from_str(ffprobe_json()).unwrap();
        let facts = facts_from_output("Blade.Runner.2049.2017.2160p.UHD.BluRay.REMUX.mkv", output).unwrap();

        assert_eq!(facts.video_codecs, vec!["hevc"]);
        assert_eq!(facts.video_width, Some(3840));
        assert!(facts.is_hdr);
        assert!(facts.is_dolby_vision);
        assert_eq!(facts.audio_channels.as_deref(), Some("7.1"));
        assert_eq!(facts.audio_languages, vec!["en", "de"]);
        assert_eq!(facts.subtitle_languages, vec!["fr"]);
        assert_eq!(facts.source.as_deref(), Some("Remux"));
        assert_eq!(facts.in_file_imdb_id(), Some("tt1856101"));
    }

    #[test]
    fn test_audio_only_is_not_a_video() {
        let output: ffprobe::FfprobeOutput =
            serde_json::from_str(r#"{"streams":[{"codec_type":"audio","channels":2}]}"#).unwrap();
        assert!(facts_from_output("track.mkv", output).is_none());
    }

    #[test]
    fn test_derive_badges() {
        let output: ffprobe::FfprobeOutput = serde_json::from_str(ffprobe_json()).unwrap();
        let facts = facts_from_output("Blade.Runner.2049.REMUX.mkv", output).unwrap();
        let rules = AutoBadgeRules::parse(
            "videoQuality=1&colorRange=1&videoCodec=1&audioChannels=1&videoSource=1&countryFlag=de_de&countryFlagWhere=audio",
        );
        let badges = derive_badges(&facts, &rules, &DefaultBadges::default(), Path::new("/nowhere/x.mkv"));
        assert_eq!(
            badges.as_deref(),
            Some("4k,dolbyvision,h265,audio71,remuxgold,country.de")
        );

        let none = derive_badges(&facts, &AutoBadgeRules::default(), &DefaultBadges::default(), Path::new("x.mkv"));
        assert_eq!(none, None);
    }

    #[test]
    fn test_country_flag_from_sidecar_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Heat.1995.mkv");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("Heat.1995.spa.srt"), b"").unwrap();

        let facts = ProbeFacts {
            filename: "Heat.1995.mkv".to_string(),
            ..ProbeFacts::default()
        };
        let rules = AutoBadgeRules::parse("countryFlag=es_mx");
        assert_eq!(
            derive_badges(&facts, &rules, &DefaultBadges::default(), &video).as_deref(),
            Some("country.mx")
        );
    }

    #[test]
    fn test_record_path() {
        let file_item = WorkItem::file(Path::new("/media/movies/Heat.1995.mkv"), MediaType::Movie);
        assert_eq!(
            record_path(&file_item, Path::new("/media/movies")),
            PathBuf::from("/media/movies/Heat.1995-rpdb.json")
        );
        let folder_item = WorkItem::folder("/media/movies/Heat (1995)", MediaType::Movie);
        assert_eq!(
            record_path(&folder_item, Path::new("/media/movies/Heat (1995)")),
            PathBuf::from("/media/movies/Heat (1995)/rpdb.json")
        );
    }

    struct CountingProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, video: &Path) -> Result<ProbeFacts, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeFacts {
                filename: file_name_lossy(video),
                video_codecs: vec!["h264".to_string()],
                ..ProbeFacts::default()
            })
        }
    }

    #[tokio::test]
    async fn test_record_is_reused_until_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Heat.mkv");
        let record = dir.path().join("rpdb.json");
        let prober = CountingProber {
            calls: AtomicUsize::new(0),
        };

        let first = probe_with_record(&prober, &video, &record, false, Some("tt0113277")).await.unwrap();
        assert_eq!(first.imdb_id.as_deref(), Some("tt0113277"));
        assert_eq!(first.in_file_imdb_id(), None);
        assert!(record.exists());

        let second = probe_with_record(&prober, &video, &record, false, None).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        probe_with_record(&prober, &video, &record, true, None).await.unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
    }
}
