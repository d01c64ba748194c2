//! Token-set and edit-distance similarity.

use std::collections::HashSet;

fn token_set(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Jaccard similarity of the lower-cased, whitespace-separated token sets.
///
/// Returns a value between 0.0 and 1.0, and 0.0 when either side has no
/// tokens.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let a = token_set(a);
    let b = token_set(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();

    intersection as f32 / union as f32
}

/// Classic Levenshtein edit distance over chars.
///
/// Case-sensitive; callers normalise case and whitespace first.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let insertion = current[j] + 1;
            let deletion = previous[j + 1] + 1;
            current[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Edit distance scaled to 0.0..=1.0 by the longer input's length.
pub fn levenshtein_similarity(a: &str, b: &str) -> f32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f32 / longest as f32
}
