//! Post-processing of verified cards: answer length limits, near-duplicate
//! removal and a difficulty balance report.

use deckgen_text::{jaccard_similarity, normalize_whitespace, word_count};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Difficulty, FlashcardItem};

const ELLIPSIS: &str = "...";

/// Target share of each difficulty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyMix {
    pub easy: f32,
    pub medium: f32,
    pub hard: f32,
}

impl Default for DifficultyMix {
    fn default() -> Self {
        Self {
            easy: 0.3,
            medium: 0.5,
            hard: 0.2,
        }
    }
}

impl DifficultyMix {
    pub fn share(&self, difficulty: Difficulty) -> f32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

/// Settings for [`PostProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessSettings {
    #[serde(default = "default_max_answer_words")]
    pub max_answer_words: usize,

    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,

    /// Question similarity above which a later card is dropped.
    #[serde(default = "default_dedupe_threshold")]
    pub dedupe_threshold: f32,

    #[serde(default)]
    pub difficulty_target: DifficultyMix,

    /// Allowed deviation, in cards, from the expected bucket size.
    #[serde(default = "default_balance_tolerance")]
    pub balance_tolerance: usize,
}

fn default_max_answer_words() -> usize {
    40
}

fn default_max_answer_chars() -> usize {
    300
}

fn default_dedupe_threshold() -> f32 {
    0.85
}

fn default_balance_tolerance() -> usize {
    2
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            max_answer_words: default_max_answer_words(),
            max_answer_chars: default_max_answer_chars(),
            dedupe_threshold: default_dedupe_threshold(),
            difficulty_target: DifficultyMix::default(),
            balance_tolerance: default_balance_tolerance(),
        }
    }
}

/// Output of [`PostProcessor::process`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcessReport {
    pub cards: Vec<FlashcardItem>,
    pub warnings: Vec<String>,
    /// Answers shortened.
    pub truncated: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessor {
    settings: PostProcessSettings,
}

impl PostProcessor {
    pub fn new(settings: PostProcessSettings) -> Self {
        Self { settings }
    }

    /// Truncate answers, drop duplicates, then report on the difficulty mix.
    pub fn process(&self, cards: Vec<FlashcardItem>) -> PostProcessReport {
        let mut truncated = 0;
        let cards: Vec<FlashcardItem> = cards
            .into_iter()
            .map(|mut card| {
                if let Some(answer) = self.truncate_answer(&card.answer) {
                    debug!("Truncated answer of {}", card.card_id);
                    card.answer = answer;
                    truncated += 1;
                }
                card
            })
            .collect();

        let (cards, duplicates_removed) = self.dedupe(cards);

        let mut warnings = Vec::new();
        if duplicates_removed > 0 {
            warnings.push(format!("removed {duplicates_removed} duplicate card(s)"));
        }
        warnings.extend(self.check_balance(&cards));

        PostProcessReport {
            cards,
            warnings,
            truncated,
            duplicates_removed,
        }
    }

    /// Shorten an answer that exceeds the word or character limit.
    ///
    /// Returns `None` when the answer already fits.
    pub fn truncate_answer(&self, answer: &str) -> Option<String> {
        let mut result = None;

        let max_words = self.settings.max_answer_words;
        if word_count(answer) > max_words
            && let Some(end) = end_of_word(answer, max_words)
        {
            result = Some(format!("{}{ELLIPSIS}", &answer[..end]));
        }

        let current = result.as_deref().unwrap_or(answer);
        let max_chars = self.settings.max_answer_chars;
        if current.chars().count() > max_chars {
            let keep = max_chars.saturating_sub(ELLIPSIS.len());
            let prefix: String = current.chars().take(keep).collect();
            result = Some(format!("{}{ELLIPSIS}", prefix.trim_end()));
        }

        result
    }

    /// Drop cards whose question is too similar to an earlier one.
    ///
    /// The first occurrence is kept. Returns the surviving cards and the
    /// number removed.
    pub fn dedupe(&self, cards: Vec<FlashcardItem>) -> (Vec<FlashcardItem>, usize) {
        let mut seen: Vec<String> = Vec::with_capacity(cards.len());
        let mut kept = Vec::with_capacity(cards.len());
        let mut removed = 0;

        for card in cards {
            let question = normalize_question(&card.question);
            let duplicate = seen
                .iter()
                .any(|prior| jaccard_similarity(prior, &question) > self.settings.dedupe_threshold);
            if duplicate {
                debug!("Dropping duplicate card {}", card.card_id);
                removed += 1;
            } else {
                seen.push(question);
                kept.push(card);
            }
        }

        (kept, removed)
    }

    /// Warnings for each difficulty bucket outside the tolerance.
    pub fn check_balance(&self, cards: &[FlashcardItem]) -> Vec<String> {
        if cards.is_empty() {
            return Vec::new();
        }

        let total = cards.len() as f32;
        let tolerance = self.settings.balance_tolerance as f32;

        Difficulty::ALL
            .iter()
            .filter_map(|&difficulty| {
                let observed = cards.iter().filter(|c| c.difficulty == difficulty).count();
                let expected = self.settings.difficulty_target.share(difficulty) * total;
                ((observed as f32 - expected).abs() > tolerance).then(|| {
                    format!(
                        "difficulty imbalance: {observed} {difficulty} card(s), expected about {expected:.1}"
                    )
                })
            })
            .collect()
    }
}

/// Normalise a question for duplicate detection: lower-case, keep only
/// alphanumerics, underscores and whitespace, collapse whitespace.
pub fn normalize_question(question: &str) -> String {
    let kept: String = question
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    normalize_whitespace(&kept)
}

/// Byte offset just past the `n`th whitespace-separated word.
fn end_of_word(s: &str, n: usize) -> Option<usize> {
    let mut count = 0;
    let mut in_word = false;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if in_word {
                count += 1;
                if count == n {
                    return Some(i);
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    (in_word && count + 1 == n).then_some(s.len())
}
