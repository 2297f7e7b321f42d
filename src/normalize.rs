//! Text normalization applied before comparing local tags with catalog names.
//!
//! Local tags and catalog metadata disagree on casing, diacritics, edition
//! suffixes and featured-artist credits far more often than on the actual
//! song. Both sides go through the same functions here before similarity
//! scoring, so only the meaningful part of each name is compared.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Title cleanup patterns (applied in order).
pub static TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Remaster variants: "- Remastered 2021", "(2021 Remaster)", "/ 1997 Remastered"
        Regex::new(r"(?i)\s*[-–—/]\s*(?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?)").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?remaster(?:ed)?)[\)\]]").unwrap(),
        // Live/acoustic: "(Live at Wembley)", "- Acoustic Version"
        Regex::new(r"(?i)\s*[\(\[](?:live(?:\s+(?:at|from|in)\s+[^)\]]+)?|acoustic(?:\s+version)?|unplugged)[\)\]]").unwrap(),
        // Mix/version variants: "(Radio Edit)", "[Album Version]", "(Mono)"
        Regex::new(r"(?i)\s*[\(\[](?:radio\s+edit|single\s+version|album\s+version|extended(?:\s+(?:mix|version))?|original\s+mix|mono|stereo)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*(?:radio\s+edit|single\s+version|album\s+version|mono|stereo)\s*$").unwrap(),
        // Content variants: "(Explicit)", "[Clean]"
        Regex::new(r"(?i)\s*[\(\[](?:explicit|clean|censored)[\)\]]").unwrap(),
        // Year suffix: "- 2021", "- 1997 Version"
        Regex::new(r"(?i)\s*[-–—]\s*\d{4}(?:\s+(?:version|mix|edit))?$").unwrap(),
        // Featured artists: "(feat. Artist)", "[ft. Someone]", "Song feat. Artist"
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+[^)\]]+[\)\]]").unwrap(),
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.+$").unwrap(),
        // Bonus track markers: "(Bonus Track)", "[Bonus]"
        Regex::new(r"(?i)\s*[\(\[](?:bonus(?:\s+track)?|hidden\s+track)[\)\]]").unwrap(),
    ]
});

/// Album edition markers: "(Deluxe Edition)", "[Remastered]", "- 25th Anniversary Edition"
pub static ALBUM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s*[\(\[][^)\]]*(?:deluxe|expanded|anniversary|edition|remaster(?:ed)?|bonus\s+tracks?|special|collector'?s?)[^)\]]*[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—:]\s*[^-–—:]*(?:deluxe|anniversary|edition|remaster(?:ed)?)[^-–—:]*$").unwrap(),
        // Disc/CD markers: "(Disc 1)", "[CD 2]"
        Regex::new(r"(?i)\s*[\(\[](?:disc|cd)\s*\d+[\)\]]").unwrap(),
    ]
});

/// Matches track number prefixes like "03 - ", "Track 5 - ", "01. ", etc.
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)^(?:track\s*)?\d{1,4}\s*[-–—._]\s*").unwrap()
);

/// Matches file extensions left in titles by taggers that copy the filename
pub static FILE_EXTENSION: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\.(flac|mp3|wav|m4a|ogg|opus|aac)$").unwrap()
);

/// Matches year suffix like (1964), (2009), etc.
pub static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"\s*\(\d{4}\)\s*$").unwrap()
);

/// Artist cleanup patterns
pub static ARTIST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.*").unwrap(),
    ]
});

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

pub fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strip diacritics, transliterate remaining non-ASCII and lowercase.
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Unify typographic quotes and the ampersand spelling.
pub fn normalize_punctuation(s: &str) -> String {
    s.replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2010}', '\u{2011}', '\u{2012}'], "-")
        .replace(" & ", " and ")
}

fn finish(s: &str) -> String {
    MULTI_SPACE.replace_all(&fold_to_ascii(s), " ").trim().to_string()
}

/// Normalize a track title: strip numbering, extensions and version suffixes.
pub fn normalize_title(title: &str) -> String {
    let mut result = normalize_punctuation(title.trim());

    result = FILE_EXTENSION.replace(&result, "").to_string();
    result = TRACK_NUMBER_PREFIX.replace(&result, "").to_string();
    result = YEAR_SUFFIX.replace(&result, "").to_string();

    for pattern in TITLE_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut normalized = finish(&result);

    // "The Sound of Silence" vs "Sound of Silence"
    if normalized.starts_with("the ") && normalized.len() > 6 {
        normalized = normalized[4..].to_string();
    }

    normalized
}

/// Normalize an artist name: drop featured credits and "The" prefix/suffix.
pub fn normalize_artist(artist: &str) -> String {
    let mut result = normalize_punctuation(artist.trim());
    for pattern in ARTIST_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut normalized = finish(&result);

    if normalized.starts_with("the ") {
        normalized = normalized[4..].to_string();
    }
    // "Scorpions, The"
    if normalized.ends_with(", the") {
        normalized.truncate(normalized.len() - 5);
    }

    normalized
}

/// Normalize an album name: drop edition and disc markers.
pub fn normalize_album(album: &str) -> String {
    let mut result = normalize_punctuation(album.trim());
    for pattern in ALBUM_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }
    finish(&result)
}

/// Apply `normalizer`, falling back to plain folding when it strips the
/// whole string (e.g. a title that is nothing but "(Live)").
pub fn normalize_or_fold(raw: &str, normalizer: fn(&str) -> String) -> String {
    let normalized = normalizer(raw);
    if normalized.is_empty() {
        finish(&normalize_punctuation(raw))
    } else {
        normalized
    }
}

// ============================================================================
// TESTS
// ============================================================================
