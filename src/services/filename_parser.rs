//! Filename parser for scene-style release names
//!
//! Turns a raw filename into a best-effort [`Guess`]:
//! - "Movie.Name.2020.1080p.BluRay.x264-GROUP.mkv" → movie "Movie Name" (2020)
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL" → episode "Chicago Fire" 14x08
//! - "[Group] Show 1x02 - Pilot.mkv" → episode "Show" 1x02
//!
//! Parsing never fails; fields that cannot be recovered are left unset.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::db::MediaKind;

/// Best-effort structured parse of a filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    pub kind: MediaKind,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
}

impl Default for Guess {
    fn default() -> Self {
        Self {
            kind: MediaKind::Movie,
            title: None,
            year: None,
            season: None,
            episode: None,
        }
    }
}

static BRACKETED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Episode cues, tried in order
static SXXEYY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bs(\d{1,2})\s?e(\d{1,3})").unwrap());
static NXNN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap());
static VERBOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bseason\s*(\d{1,2})\s*[,-]?\s*episode\s*(\d{1,3})\b").unwrap()
});

static YEAR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?((?:19|20)\d{2})\)?$").unwrap());
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(?((?:19|20)\d{2})\)?$").unwrap());

// Release-tag noise: resolution, source, codec, audio, HDR and edition flags
static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^(?:
            \d{3,4}[pi] | 4k | uhd |
            bluray | blu-ray | bdrip | brrip | bdremux | remux | web | webrip | webdl | web-dl |
            hdtv | hdrip | dvdrip | dvdscr | dvd | amzn | nf | hulu | dsnp | hmax | atvp |
            x264 | x265 | h264 | h265 | hevc | avc | xvid | divx | av1 | 10bit | 8bit |
            aac\d? | ac3 | eac3 | dts | dts-hd | truehd | atmos | flac | ddp?\d? | ddp5 | dd5 |
            hdr | hdr10 | hdr10plus | dv | dovi | hlg | sdr |
            proper | repack | extended | unrated | remastered | internal | limited |
            uncut | imax | multi | dubbed | subbed
        )$",
    )
    .unwrap()
});

/// Parse a filename into a guess
pub fn parse(filename: &str) -> Guess {
    let normalized = normalize(strip_extension(filename));

    let guess = match find_episode_cue(&normalized) {
        Some((start, season, episode)) => parse_episode_title(&normalized[..start], season, episode),
        None => parse_movie(&normalized),
    };

    trace!(
        filename = filename,
        kind = %guess.kind,
        title = ?guess.title,
        year = ?guess.year,
        season = ?guess.season,
        episode = ?guess.episode,
        "Parsed filename"
    );

    guess
}

/// Drop a trailing container extension such as ".mkv"
fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.starts_with(|c: char| c.is_ascii_alphabetic())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => filename,
    }
}

/// Remove bracketed tags, turn separators into spaces, collapse whitespace
fn normalize(name: &str) -> String {
    let without_tags = BRACKETED_RE.replace_all(name, " ");
    let spaced = without_tags.replace(['.', '_'], " ");
    SPACE_RE.replace_all(&spaced, " ").trim().to_string()
}

/// Locate the first episode cue; returns (byte offset of the cue, season, episode)
fn find_episode_cue(name: &str) -> Option<(usize, i32, i32)> {
    [&*SXXEYY_RE, &*NXNN_RE, &*VERBOSE_RE]
        .into_iter()
        .find_map(|re| {
            let caps = re.captures(name)?;
            let season = caps.get(1)?.as_str().parse().ok()?;
            let episode = caps.get(2)?.as_str().parse().ok()?;
            Some((caps.get(0)?.start(), season, episode))
        })
}

fn parse_episode_title(prefix: &str, season: i32, episode: i32) -> Guess {
    let tokens: Vec<&str> = prefix.split_whitespace().collect();
    let end = noise_start(&tokens);
    let mut title = trim_separators(&tokens[..end].join(" ")).to_string();

    let trailing_year = TRAILING_YEAR_RE.captures(&title).and_then(|caps| {
        let start = caps.get(0)?.start();
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        (start > 0).then_some((start, year))
    });

    let mut year = None;
    if let Some((start, found)) = trailing_year {
        year = Some(found);
        title = trim_separators(&title[..start]).to_string();
    }

    Guess {
        kind: MediaKind::Episode,
        title: non_empty(title),
        year,
        season: Some(season),
        episode: Some(episode),
    }
}

fn parse_movie(name: &str) -> Guess {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let noise_at = noise_start(&tokens);

    // A parenthesized year is explicit; otherwise take the last year token
    // before the release noise so titles like "2001" or "Blade Runner 2049" survive
    let year_at = tokens[..noise_at]
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, t)| t.starts_with('(') && YEAR_TOKEN_RE.is_match(t))
        .or_else(|| {
            tokens[..noise_at]
                .iter()
                .enumerate()
                .skip(1)
                .rev()
                .find(|(_, t)| YEAR_TOKEN_RE.is_match(t))
        })
        .map(|(i, _)| i);

    let (title_end, year) = match year_at {
        Some(i) => (i, year_from_token(tokens[i])),
        None => (noise_at, None),
    };

    Guess {
        kind: MediaKind::Movie,
        title: non_empty(trim_separators(&tokens[..title_end].join(" ")).to_string()),
        year,
        season: None,
        episode: None,
    }
}

/// Index of the first release-noise token. A noise word leading the name
/// ("Uncut Gems", "Limited Partners") is part of the title unless only
/// noise follows it.
fn noise_start(tokens: &[&str]) -> usize {
    let after_first = tokens
        .iter()
        .skip(1)
        .position(|t| is_noise(t))
        .map_or(tokens.len(), |i| i + 1);

    match tokens.first() {
        Some(first) if after_first == 1 && is_noise(first) => 0,
        _ => after_first,
    }
}

fn is_noise(token: &str) -> bool {
    if NOISE_RE.is_match(token) {
        return true;
    }
    // "h264-GROUP", "WEB-DL": a noise tag glued to a release group
    match token.split_once('-') {
        Some((head, _)) if !head.is_empty() => NOISE_RE.is_match(head),
        _ => false,
    }
}

fn year_from_token(token: &str) -> Option<i32> {
    YEAR_TOKEN_RE
        .captures(token)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '(' || c == ')')
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sxxeyy() {
        let guess = parse("Chicago Fire S14E08 1080p WEB h264-ETHEL.mkv");
        assert_eq!(guess.kind, MediaKind::Episode);
        assert_eq!(guess.title.as_deref(), Some("Chicago Fire"));
        assert_eq!(guess.season, Some(14));
        assert_eq!(guess.episode, Some(8));
    }

    #[test]
    fn test_title_s01e02_always_episode() {
        for title in ["Title", "Show", "Breaking Bad", "The Expanse"] {
            for ext in ["mkv", "mp4", "avi"] {
                let filename = format!("{}.S01E02.720p.HDTV.{}", title.replace(' ', "."), ext);
                let guess = parse(&filename);
                assert_eq!(guess.kind, MediaKind::Episode, "{}", filename);
                assert_eq!(guess.season, Some(1), "{}", filename);
                assert_eq!(guess.episode, Some(2), "{}", filename);
                assert_eq!(guess.title.as_deref(), Some(title), "{}", filename);
            }
        }
    }

    #[test]
    fn test_episode_cue_variants() {
        let lower = parse("show_name_s1e2.mkv");
        assert_eq!(lower.title.as_deref(), Some("show name"));
        assert_eq!((lower.season, lower.episode), (Some(1), Some(2)));

        let dotted = parse("Show.S01.E02.mkv");
        assert_eq!((dotted.season, dotted.episode), (Some(1), Some(2)));

        let cross = parse("[Group] Show 1x02 - Pilot.mkv");
        assert_eq!(cross.kind, MediaKind::Episode);
        assert_eq!(cross.title.as_deref(), Some("Show"));
        assert_eq!((cross.season, cross.episode), (Some(1), Some(2)));

        let verbose = parse("Show Season 2 Episode 5.avi");
        assert_eq!(verbose.title.as_deref(), Some("Show"));
        assert_eq!((verbose.season, verbose.episode), (Some(2), Some(5)));
    }

    #[test]
    fn test_episode_trailing_year() {
        let guess = parse("Doctor.Who.2005.S01E01.mkv");
        assert_eq!(guess.title.as_deref(), Some("Doctor Who"));
        assert_eq!(guess.year, Some(2005));
    }

    #[test]
    fn test_parse_movie() {
        let guess = parse("Movie.Name.2020.1080p.mkv");
        assert_eq!(
            guess,
            Guess {
                kind: MediaKind::Movie,
                title: Some("Movie Name".to_string()),
                year: Some(2020),
                season: None,
                episode: None,
            }
        );
    }

    #[test]
    fn test_movie_year_like_titles() {
        let guess = parse("Blade.Runner.2049.2017.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(guess.title.as_deref(), Some("Blade Runner 2049"));
        assert_eq!(guess.year, Some(2017));

        let guess = parse("2012.mkv");
        assert_eq!(guess.title.as_deref(), Some("2012"));
        assert_eq!(guess.year, None);
    }

    #[test]
    fn test_movie_brackets_and_parentheses() {
        let guess = parse("[Group] Movie Name (2020) [1080p].mkv");
        assert_eq!(guess.kind, MediaKind::Movie);
        assert_eq!(guess.title.as_deref(), Some("Movie Name"));
        assert_eq!(guess.year, Some(2020));
    }

    #[test]
    fn test_hyphenated_titles_survive() {
        let guess = parse("Spider-Man.Homecoming.2017.mkv");
        assert_eq!(guess.title.as_deref(), Some("Spider-Man Homecoming"));
        assert_eq!(guess.year, Some(2017));
    }

    #[test]
    fn test_noise_terminates_title() {
        let guess = parse("Some.Movie.PROPER.720p.WEB-DL.mkv");
        assert_eq!(guess.title.as_deref(), Some("Some Movie"));
        assert_eq!(guess.year, None);
    }

    #[test]
    fn test_leading_noise_word_is_title() {
        let guess = parse("Uncut.Gems.2019.mkv");
        assert_eq!(guess.title.as_deref(), Some("Uncut Gems"));
        assert_eq!(guess.year, Some(2019));

        let guess = parse("Web.Therapy.S01E02.720p.mkv");
        assert_eq!(guess.kind, MediaKind::Episode);
        assert_eq!(guess.title.as_deref(), Some("Web Therapy"));

        let guess = parse("Limited.Partners.1080p.mkv");
        assert_eq!(guess.title.as_deref(), Some("Limited Partners"));

        assert_eq!(parse("1080p.x264.mkv").title, None);
    }

    #[test]
    fn test_degenerate_names() {
        assert_eq!(parse(""), Guess::default());
        let guess = parse("1080p.mkv");
        assert_eq!(guess.kind, MediaKind::Movie);
        assert_eq!(guess.title, None);
    }

    #[test]
    fn test_no_cue_is_movie() {
        for name in ["Heat.1995.mkv", "random_home_video.mp4", "Show Special.mkv", "1920x1080 demo.mkv"] {
            assert_eq!(parse(name).kind, MediaKind::Movie, "{}", name);
        }
    }
}
