//! Similarity scoring between local tracks and catalog hits.
//!
//! This module contains:
//! - Directional gestalt (Ratcliff/Obershelp) ratio
//! - Symmetric string similarity
//! - Weighted composite similarity across tag fields, optionally on
//!   normalized values

use crate::catalog::RawHit;
use crate::error::ScoreError;
use crate::models::{FieldWeight, HitField, LocalField, LocalTrack};
use crate::normalize::{normalize_album, normalize_artist, normalize_or_fold, normalize_title};

// ============================================================================
// Default Weights
// ============================================================================

/// Title counts double relative to artist and album. Album is scored but
/// not sent as a search filter: local album names are too often edition
/// variants of the catalog's.
pub fn default_field_weights() -> Vec<FieldWeight> {
    vec![
        FieldWeight {
            local: LocalField::Title,
            hit: HitField::Track,
            weight: 1.0,
            query_key: Some("track".to_string()),
        },
        FieldWeight {
            local: LocalField::Artist,
            hit: HitField::Artist,
            weight: 0.5,
            query_key: Some("artist".to_string()),
        },
        FieldWeight {
            local: LocalField::Album,
            hit: HitField::Album,
            weight: 0.5,
            query_key: None,
        },
    ]
}

// ============================================================================
// Gestalt Ratio
// ============================================================================

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as
/// `(start_a, start_b, len)`. The first maximal block found scanning `a`
/// left to right wins, which is what makes the ratio directional.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    // prev[x] = length of the common run ending at a[i-1], b[blo + x - 1]
    let mut prev = vec![0usize; bhi - blo + 1];
    let mut cur = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let x = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[x - 1] + 1;
                cur[x] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                cur[x] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

/// Total characters covered by recursively matched common blocks.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        pending.push((alo, i, blo, j));
        pending.push((i + k, ahi, j + k, bhi));
    }
    total
}

/// Directional sequence-overlap ratio: `2 * matched / (len(a) + len(b))`.
/// Two empty strings are identical.
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

// ============================================================================
// Similarity
// ============================================================================

/// Symmetric similarity in [0, 1]: the mean of both directional ratios.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    (gestalt_ratio(a, b) + gestalt_ratio(b, a)) / 2.0
}

fn normalize_for(field: LocalField, raw: &str) -> String {
    match field {
        LocalField::Title => normalize_or_fold(raw, normalize_title),
        LocalField::Artist => normalize_or_fold(raw, normalize_artist),
        LocalField::Album => normalize_or_fold(raw, normalize_album),
    }
}

/// Weighted similarity between a local track and a catalog hit:
/// `sum(weight * similarity) / sum(weight)` over the field pairs where both
/// sides are present. Values are compared trimmed as tagged; the hit's
/// artist is its credited artist line.
///
/// With `normalize_fields`, both sides of a pair first go through the local
/// field's normalizer, so edition suffixes and diacritics stop counting.
///
/// Returns [`ScoreError::NoComparableFields`] when every pair was skipped.
pub fn composite_similarity(
    local: &LocalTrack,
    hit: &RawHit,
    weights: &[FieldWeight],
    normalize_fields: bool,
) -> Result<f64, ScoreError> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for pair in weights {
        let Some(local_value) = local.field(pair.local) else {
            continue;
        };
        let Some(hit_value) = hit.value(pair.hit) else {
            continue;
        };

        let similarity = if normalize_fields {
            string_similarity(
                &normalize_for(pair.local, local_value),
                &normalize_for(pair.local, &hit_value),
            )
        } else {
            string_similarity(local_value, &hit_value)
        };

        numerator += pair.weight * similarity;
        denominator += pair.weight;
    }

    if denominator == 0.0 {
        return Err(ScoreError::NoComparableFields);
    }
    Ok(numerator / denominator)
}
