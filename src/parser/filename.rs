use crate::models::release::{ParsedReleaseInfo, Release};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use thiserror::Error;

/// Why a release name cannot take part in per-episode reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ParseRejected {
    #[error("no episode number could be found")]
    NoEpisode,

    #[error("release bundles several episodes")]
    Batch,

    #[error("episode {0} is not a whole episode")]
    FractionalEpisode(f32),
}

impl ParseRejected {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoEpisode => "no_episode",
            Self::Batch => "batch",
            Self::FractionalEpisode(_) => "fractional_episode",
        }
    }
}

/// Turns a raw release name into the metadata the filter works with.
///
/// Batches are rejected before any pattern runs. Season detection only looks
/// at an explicit `SxxEyy` marker or a trailing `S<n>` / `Season <n>` token
/// on the title.
pub fn parse_release(raw_name: &str) -> Result<ParsedReleaseInfo, ParseRejected> {
    if is_batch(raw_name) {
        return Err(ParseRejected::Batch);
    }

    let release = parse_filename(raw_name).ok_or(ParseRejected::NoEpisode)?;

    if release.episode_number.fract() != 0.0 || release.episode_number < 0.0 {
        return Err(ParseRejected::FractionalEpisode(release.episode_number));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let episode_number = release.episode_number as u32;

    Ok(ParsedReleaseInfo {
        anime_title: release.title,
        episode_number,
        season_number: release.season,
        release_group: release.group,
        resolution: release.resolution,
        is_batch: false,
    })
}

/// One filename layout. Patterns capture `title` and `episode`, and may
/// capture `group`, `season`, `tags`/`tags_paren` and `rest`.
struct Layout {
    pattern: &'static str,
    /// Words are joined by dots instead of spaces.
    dotted: bool,
}

/// Tried in order; the first match wins.
const LAYOUTS: [Layout; 5] = [
    // [Group] Title - 01v2 [1080p]
    Layout {
        pattern: r"^\[(?P<group>[^\]]+)\]\s*(?P<title>.+?)\s*-\s*(?P<episode>\d+(?:\.\d+)?)\s*(?:v\d+)?\s*(?:(?:\[(?P<tags>[^\]]*)\])|(?:\((?P<tags_paren>[^)]*)\)))?.*$",
        dotted: false,
    },
    // [Group] Title - S02E05 [1080p]
    Layout {
        pattern: r"^\[(?P<group>[^\]]+)\]\s*(?P<title>.+?)\s*-?\s*S(?P<season>\d+)E(?P<episode>\d+(?:\.\d+)?)\s*(?:v\d+)?\s*(?:\[(?P<tags>[^\]]*)\])?.*$",
        dotted: false,
    },
    // Title (2023) - S02E05 - Name 1080p-Group
    Layout {
        pattern: r"^(?P<title>.+?)\s*(?:\(\d{4}\))?\s*-\s*S(?P<season>\d+)E(?P<episode>\d+(?:\.\d+)?)(?P<rest>.*)$",
        dotted: false,
    },
    // Title.S02E05.1080p.WEB.x264-Group
    Layout {
        pattern: r"^(?P<title>.+?)\.S(?P<season>\d+)E(?P<episode>\d+(?:\.\d+)?)\.(?P<rest>.+)$",
        dotted: true,
    },
    // Title - 05 (1080p) [Group]
    Layout {
        pattern: r"^(?P<title>.+?)\s*-\s*(?P<episode>\d+(?:\.\d+)?)\s*(?:v\d+)?\s*(?:\((?P<tags>[^)]*)\))?\s*\[(?P<group>[^\]]+)\].*$",
        dotted: false,
    },
];

fn layouts() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        LAYOUTS
            .iter()
            .map(|l| Regex::new(l.pattern).expect("Invalid regex pattern defined in code"))
            .collect()
    })
}

#[must_use]
pub fn parse_filename(filename: &str) -> Option<Release> {
    layouts()
        .iter()
        .zip(LAYOUTS.iter())
        .find_map(|(re, layout)| {
            let caps = re.captures(filename)?;
            from_layout(&caps, filename, layout.dotted)
        })
        .or_else(|| parse_fallback(filename))
}

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

#[must_use]
pub fn is_batch(name: &str) -> bool {
    static KEYWORDS: OnceLock<Regex> = OnceLock::new();
    static BRACKETED_RANGE: OnceLock<Regex> = OnceLock::new();
    static TILDE_RANGE: OnceLock<Regex> = OnceLock::new();
    static DASH_RANGE: OnceLock<Regex> = OnceLock::new();

    let keywords = get_regex(
        &KEYWORDS,
        r"(?i)\b(?:batch|complete\s+series|complete|bd[-\s]?box)\b",
    );
    if keywords.is_match(name) {
        return true;
    }

    let ranges = [
        get_regex(&BRACKETED_RANGE, r"[\[(](\d{1,4})\s?[-~]\s?(\d{1,4})[\])]"),
        get_regex(&TILDE_RANGE, r"\b(\d{2,4})\s?~\s?(\d{2,4})\b"),
        get_regex(&DASH_RANGE, r"\s-\s(\d{2,4})-(\d{2,4})\b"),
    ];

    ranges.iter().any(|re| {
        re.captures_iter(name).any(|caps| {
            let start = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let end = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            matches!((start, end), (Some(s), Some(e)) if e > s)
        })
    })
}

/// Season asserted by a trailing `S<n>` or `Season <n>` token.
#[must_use]
pub fn trailing_season(title: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"(?i)(?:^|\s)(?:S(\d{1,3})|Season\s+(\d{1,3}))$");

    let caps = re.captures(title.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_fallback(filename: &str) -> Option<Release> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let name = strip_extension(filename);

    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(
                r"-\s*(?P<episode>\d{1,4}(?:\.\d+)?)\s*(?:v\d+)?(?:\s|$|\[|\()",
            )
            .expect("Invalid Regex"),
            Regex::new(
                r"[Ee](?:p(?:isode)?)?\s*(?P<episode>\d{1,4}(?:\.\d+)?)\s*(?:v\d+)?",
            )
            .expect("Invalid Regex"),
            Regex::new(r"[_\s](?P<episode>\d{1,3}(?:\.\d+)?)\s*(?:v\d+)?[_\s\[\(]")
                .expect("Invalid Regex"),
        ]
    });

    for pattern in patterns {
        if let Some(caps) = pattern.captures_iter(name).last() {
            let episode_str = caps.name("episode")?.as_str();
            let episode_number = episode_str.parse::<f32>().ok()?;

            // Years and resolutions are not episodes.
            #[allow(clippy::cast_possible_truncation)]
            let ep_int = episode_number as i32;
            if (1990..=2099).contains(&ep_int) || [720, 1080, 2160, 480].contains(&ep_int) {
                continue;
            }

            let title = extract_title_before_episode(name, episode_str)
                .unwrap_or_else(|| "Unknown".to_string());

            return Some(Release {
                original_filename: filename.to_string(),
                season: trailing_season(&clean_title(&title)),
                title: clean_title(&title),
                episode_number,
                group: extract_bracket_group(filename),
                resolution: extract_resolution(filename),
            });
        }
    }
    None
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if ext.len() <= 4 && !ext.is_empty() && ext.chars().all(char::is_alphanumeric) =>
        {
            stem
        }
        _ => filename,
    }
}

fn from_layout(caps: &Captures, filename: &str, dotted: bool) -> Option<Release> {
    let raw_title = caps.name("title")?.as_str();
    let title = if dotted {
        clean_title(&raw_title.replace('.', " "))
    } else {
        clean_title(raw_title)
    };
    let episode_number = caps.name("episode")?.as_str().parse::<f32>().ok()?;
    let rest = caps.name("rest").map(|m| m.as_str());

    // Layouts without a bracketed group carry it at the end of the name.
    let group = caps
        .name("group")
        .map(|m| m.as_str().trim().to_string())
        .or_else(|| extract_group_from_rest(rest.unwrap_or(filename)));

    let season = caps
        .name("season")
        .and_then(|m| m.as_str().parse().ok())
        .or_else(|| trailing_season(&title));

    let resolution = caps
        .name("tags")
        .or_else(|| caps.name("tags_paren"))
        .map(|m| m.as_str())
        .or(rest)
        .and_then(extract_resolution)
        .or_else(|| extract_resolution(filename));

    Some(Release {
        original_filename: filename.to_string(),
        title,
        episode_number,
        season,
        group,
        resolution,
    })
}

fn extract_resolution(s: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"(?i)(4K|2160p|1080p|720p|480p|576p)");

    re.find(s).map(|m| {
        let res = m.as_str();
        if res.eq_ignore_ascii_case("4K") {
            "4K".to_string()
        } else {
            res.to_lowercase()
        }
    })
}

fn extract_bracket_group(s: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"^\[([^\]]+)\]");

    re.captures(s)
        .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
}

fn extract_group_from_rest(s: &str) -> Option<String> {
    let pos = s.rfind('-')?;
    let rest = s[pos + 1..].trim();
    let stem = strip_extension(rest);

    if stem.contains('[') && stem.contains(']') {
        static RE_BRACKETS: OnceLock<Regex> = OnceLock::new();
        let re = get_regex(&RE_BRACKETS, r"\[([^\]]+)\]");

        let found = re
            .captures_iter(stem)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
            .filter(|v| !is_metadata(v))
            .last();
        if let Some(val) = found {
            return Some(val.to_string());
        }
    }

    if !stem.is_empty() && !stem.starts_with('[') && !is_metadata(stem) {
        return Some(stem.to_string());
    }
    None
}

fn is_metadata(s: &str) -> bool {
    if extract_resolution(s).is_some() {
        return true;
    }
    let upper = s.to_uppercase();
    [
        "X264", "X265", "HEVC", "AV1", "AAC", "FLAC", "AC3", "EAC3", "DTS", "OPUS", "H.264",
        "H.265", "10BIT", "HDR", "WEB", "WEB-DL", "BD",
    ]
    .contains(&upper.as_str())
}

fn extract_title_before_episode(filename: &str, episode_str: &str) -> Option<String> {
    let pos = filename.rfind(episode_str)?;
    let before = filename[..pos]
        .trim_end_matches(|c: char| c == '-' || c == '_' || c.is_whitespace());

    let title = if before.starts_with('[') {
        before.find(']').map_or(before, |end| before[end + 1..].trim())
    } else {
        before
    };

    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[must_use]
pub fn clean_title(title: &str) -> String {
    let mut title = title.trim().trim_end_matches(['-', '_']).trim();

    if let Some(idx) = title.rfind('(')
        && let Some(end) = title.rfind(')')
        && end > idx
    {
        let inside = &title[idx + 1..end];
        if inside.len() == 4 && inside.chars().all(|c| c.is_ascii_digit()) {
            title = title[..idx].trim();
        }
    }

    title
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips season and year suffixes so seasons of one show share a key.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    static NORMALIZE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    let patterns = NORMALIZE_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)\s*\d+(?:st|nd|rd|th)\s+Season\s*$").expect("Invalid Regex"),
            Regex::new(r"(?i)\s*(?:Season|S)\s*\d+\s*$").expect("Invalid Regex"),
            Regex::new(r"\s*\(\d{4}\)\s*$").expect("Invalid Regex"),
            Regex::new(r"\s*[:–—-]\s*$").expect("Invalid Regex"),
        ]
    });

    let mut result = clean_title(title);
    for pattern in patterns {
        result = pattern.replace_all(&result, "").to_string();
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
