//! Title normalization and identifier extraction from folder names

use once_cell::sync::Lazy;
use regex::Regex;

use super::filename_parser::{has_release_tokens, parse_release};
use crate::media::{MediaType, is_video_file};

static LITERAL_IMDB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d+$").expect("valid regex"));

static YEAR_IN_PARENS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \((\d{4}|\d{4}-\d{4})\)$").expect("valid regex"));
static YEAR_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" (\d{4}|\d{4}-\d{4})$").expect("valid regex"));
static YEAR_IN_BRACKETS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \[(\d{4}|\d{4}-\d{4})\]$").expect("valid regex"));

static MARVEL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^marvel ?'?s ").expect("valid regex"));

static IMDB_IN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[\s\[\{(=:-])(tt\d{7,})(?:$|[\s\]\})])").expect("valid regex"));
static IMDB_IN_INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(tt\d{7,})\b").expect("valid regex"));
static TMDB_IN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\{\[]tmdb[-:=](\d+)[\}\]]").expect("valid regex"));
static TVDB_IN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\{\[]tvdb[-:=](\d+)[\}\]]").expect("valid regex"));

/// Trailing id tags and noise that never help a title search
static ID_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[\{\[](?:imdb|tmdb|tvdb)[-:=][a-z0-9]+[\}\]]").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A search-ready title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTitle {
    pub name: String,
    pub year: Option<String>,
}

impl NormalizedTitle {
    /// First year of the captured value; ranges like 2008-2013 yield 2008
    pub fn year_number(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.get(..4)).and_then(|y| y.parse().ok())
    }
}

/// True for a bare IMDb id such as `tt0068646`
pub fn is_literal_id(name: &str) -> bool {
    LITERAL_IMDB_RE.is_match(name)
}

/// Remove id tags and collapse whitespace; dotted names become spaced
pub fn clean_folder_name(name: &str) -> String {
    let stripped = ID_TAG_RE.replace_all(name, "");
    let spaced = if stripped.contains(' ') {
        stripped.into_owned()
    } else {
        stripped.replace(['.', '_'], " ")
    };
    SPACES_RE.replace_all(&spaced, " ").trim().to_string()
}

/// Names without release tokens are already plain titles and should be kept whole
pub fn should_not_parse_name(name: &str) -> bool {
    !has_release_tokens(name)
}

/// Turn a folder or file name into a lower-cased title and an optional year
pub fn normalize_title(raw: &str, media_type: MediaType) -> NormalizedTitle {
    let without_ext = if is_video_file(std::path::Path::new(raw)) {
        match raw.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => raw,
        }
    } else {
        raw
    };
    let cleaned = clean_folder_name(without_ext);

    let mut year = None;
    let mut name = None;

    for re in [&*YEAR_IN_PARENS_RE, &*YEAR_BARE_RE, &*YEAR_IN_BRACKETS_RE] {
        if let Some(caps) = re.captures(&cleaned) {
            year = caps.get(1).map(|m| m.as_str().to_string());
            name = Some(re.replace(&cleaned, "").into_owned());
            break;
        }
    }

    if name.is_none() {
        let parsed = parse_release(&cleaned);
        if let Some(title) = parsed.title {
            if parsed.year.is_some() {
                year = parsed.year;
                name = Some(title);
            } else if should_not_parse_name(&cleaned) {
                name = Some(cleaned.clone());
            } else {
                name = Some(title);
            }
        }
    }

    let mut name = name.unwrap_or(cleaned).to_lowercase();

    if media_type == MediaType::Series && name.starts_with("marvel") {
        name = MARVEL_PREFIX_RE.replace(&name, "").into_owned();
    }

    NormalizedTitle { name, year }
}

/// IMDb id embedded in a folder name, e.g. `Heat (1995) [tt0113277]`
pub fn imdb_id_in_name(name: &str) -> Option<String> {
    IMDB_IN_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// IMDb id from user input: a bare id or a title page URL
pub fn imdb_id_from_input(input: &str) -> Option<String> {
    IMDB_IN_INPUT_RE
        .captures(input.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// TMDB id in a `{tmdb-123}` or `[tmdb=123]` tag
pub fn tmdb_id_in_name(name: &str) -> Option<String> {
    TMDB_IN_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// TVDB id in a `{tvdb-123}` or `[tvdb:123]` tag
pub fn tvdb_id_in_name(name: &str) -> Option<String> {
    TVDB_IN_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `year` is within one year of `current_year`
pub fn within_proximity(year: i32, current_year: i32) -> bool {
    year >= current_year - 1 && year <= current_year + 1
}
