//! # Text
//!
//! Pure string utilities used to ground generated flashcards in their
//! source material.
//!
//! - **Normalisation**: whitespace collapsing and case folding
//! - **Segmentation**: sentence extraction for sentence-level matching
//! - **Similarity**: token-set (Jaccard) and edit-distance (Levenshtein)
//!
//! Every function here is deterministic; verification results must be
//! reproducible for identical inputs.

pub mod normalize;
pub mod similarity;

pub use normalize::{
    extract_sentences, find_case_insensitive, normalize_for_match, normalize_whitespace,
    word_count, MIN_SENTENCE_CHARS,
};
pub use similarity::{jaccard_similarity, levenshtein_distance, levenshtein_similarity};
