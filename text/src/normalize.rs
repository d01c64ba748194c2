//! Whitespace normalisation and sentence segmentation.

/// Segments at or below this many characters (after trimming) are not
/// treated as sentences.
pub const MIN_SENTENCE_CHARS: usize = 10;

/// Collapse every run of whitespace (spaces, tabs, newlines) into a single
/// space and trim both ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-case and whitespace-normalise a string for comparison.
pub fn normalize_for_match(s: &str) -> String {
    normalize_whitespace(&s.to_lowercase())
}

/// Split text into sentences on `.`, `!` and `?`.
///
/// Segments whose trimmed length is `MIN_SENTENCE_CHARS` characters or
/// fewer are dropped; they are too short to match against usefully.
pub fn extract_sentences(s: &str) -> Vec<String> {
    s.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|segment| segment.chars().count() > MIN_SENTENCE_CHARS)
        .map(String::from)
        .collect()
}

/// Number of whitespace-separated words.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Find `needle` in `haystack` ignoring case and return the matching slice
/// of `haystack` with its original casing.
pub fn find_case_insensitive<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    'start: for (start, _) in haystack.char_indices() {
        let mut matched = 0;
        for (offset, c) in haystack[start..].char_indices() {
            for lower in c.to_lowercase() {
                if needle.get(matched) != Some(&lower) {
                    continue 'start;
                }
                matched += 1;
            }
            if matched == needle.len() {
                return Some(&haystack[start..start + offset + c.len_utf8()]);
            }
        }
        // The rest of the haystack is shorter than the needle.
        return None;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  Recruitment \n\t is   the\r\nprocess  "),
            "Recruitment is the process"
        );
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(normalize_for_match("The  HR\nTeam"), "the hr team");
    }

    #[test]
    fn test_extract_sentences_drops_short_fragments() {
        let text = "Recruitment is the process of attracting talent. Yes! \
                    Why does onboarding matter so much? Ok.";
        let sentences = extract_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "Recruitment is the process of attracting talent".to_string(),
                "Why does onboarding matter so much".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_sentences_boundary_length() {
        // Exactly ten characters is dropped, eleven is kept.
        assert!(extract_sentences("abcdefghij.").is_empty());
        assert_eq!(extract_sentences("abcdefghijk."), vec!["abcdefghijk".to_string()]);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one  two\nthree"), 3);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_find_case_insensitive_keeps_original_case() {
        let chunk = "Recruitment is the process of attracting talent.";
        assert_eq!(
            find_case_insensitive(chunk, "RECRUITMENT IS THE PROCESS"),
            Some("Recruitment is the process")
        );
        assert_eq!(
            find_case_insensitive(chunk, "attracting TALENT"),
            Some("attracting talent")
        );
        assert_eq!(find_case_insensitive(chunk, "retention"), None);
        assert_eq!(find_case_insensitive(chunk, ""), None);
    }

    #[test]
    fn test_find_case_insensitive_non_ascii() {
        assert_eq!(
            find_case_insensitive("Die Straße ist ÖFFENTLICH", "öffentlich"),
            Some("ÖFFENTLICH")
        );
    }
}
