//! Evidence verification.
//!
//! Every evidence excerpt a card cites is checked against the text of the
//! chunk it names. An excerpt is accepted as-is when it appears verbatim
//! (modulo whitespace), replaced with the matching source text when it
//! appears with different casing or only approximately, and flagged as
//! missing otherwise. The per-card result is a two-valued confidence so
//! downstream consumers can threshold on it.

use std::collections::HashMap;

use deckgen_text::{
    extract_sentences, find_case_insensitive, jaccard_similarity, levenshtein_distance,
    levenshtein_similarity, normalize_for_match, normalize_whitespace,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ContentChunk, Evidence, FlashcardItem};

/// Options for [`EvidenceVerifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierOptions {
    /// Sentence-level Jaccard score an excerpt must exceed to be corrected.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Largest case-folded edit distance accepted between an excerpt and a
    /// whole sentence.
    #[serde(default = "default_max_levenshtein_distance")]
    pub max_levenshtein_distance: usize,

    /// Confidence assigned to fully verified cards.
    #[serde(default = "default_verified_confidence")]
    pub verified_confidence: f32,

    /// Confidence assigned to cards with missing evidence.
    #[serde(default = "default_unverified_confidence")]
    pub unverified_confidence: f32,
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_max_levenshtein_distance() -> usize {
    3
}

fn default_verified_confidence() -> f32 {
    0.95
}

fn default_unverified_confidence() -> f32 {
    0.4
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            max_levenshtein_distance: default_max_levenshtein_distance(),
            verified_confidence: default_verified_confidence(),
            unverified_confidence: default_unverified_confidence(),
        }
    }
}

/// Verdict for one evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionStatus {
    Ok,
    Corrected,
    Missing,
}

/// Per-evidence verification detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub evidence_index: usize,
    pub status: CorrectionStatus,
    /// Replacement excerpt taken from the chunk text.
    pub corrected_excerpt: Option<String>,
    pub reason: String,
    pub similarity_score: Option<f32>,
}

impl Correction {
    fn ok(evidence_index: usize) -> Self {
        Self {
            evidence_index,
            status: CorrectionStatus::Ok,
            corrected_excerpt: None,
            reason: "exact match".to_string(),
            similarity_score: Some(1.0),
        }
    }

    fn corrected(
        evidence_index: usize,
        excerpt: impl Into<String>,
        reason: &str,
        similarity: f32,
    ) -> Self {
        Self {
            evidence_index,
            status: CorrectionStatus::Corrected,
            corrected_excerpt: Some(excerpt.into()),
            reason: reason.to_string(),
            similarity_score: Some(similarity),
        }
    }

    fn missing(evidence_index: usize, reason: &str) -> Self {
        Self {
            evidence_index,
            status: CorrectionStatus::Missing,
            corrected_excerpt: None,
            reason: reason.to_string(),
            similarity_score: None,
        }
    }
}

/// Verification result for one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub card_id: String,
    pub verified: bool,
    pub confidence: f32,
    pub corrections: Vec<Correction>,
}

/// Aggregate over a batch of cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub verified: usize,
    pub failed: usize,
    pub average_confidence: f32,
}

/// Outcomes for every card of a batch, in card order, plus their summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub outcomes: Vec<VerificationOutcome>,
    pub summary: VerificationSummary,
}

/// Checks card evidence against source chunks.
#[derive(Debug, Clone, Default)]
pub struct EvidenceVerifier {
    options: VerifierOptions,
}

impl EvidenceVerifier {
    pub fn new(options: VerifierOptions) -> Self {
        Self { options }
    }

    /// Verify a single card.
    pub fn verify(&self, card: &FlashcardItem, chunks: &[ContentChunk]) -> VerificationOutcome {
        self.verify_indexed(card, &index_chunks(chunks))
    }

    /// Verify every card. Never stops early.
    pub fn verify_all(&self, cards: &[FlashcardItem], chunks: &[ContentChunk]) -> VerificationReport {
        let index = index_chunks(chunks);
        let outcomes: Vec<VerificationOutcome> = cards
            .iter()
            .map(|card| self.verify_indexed(card, &index))
            .collect();

        let total = outcomes.len();
        let verified = outcomes.iter().filter(|o| o.verified).count();
        let average_confidence = if total == 0 {
            0.0
        } else {
            outcomes.iter().map(|o| o.confidence).sum::<f32>() / total as f32
        };

        VerificationReport {
            outcomes,
            summary: VerificationSummary {
                total,
                verified,
                failed: total - verified,
                average_confidence,
            },
        }
    }

    fn verify_indexed(
        &self,
        card: &FlashcardItem,
        index: &HashMap<&str, &ContentChunk>,
    ) -> VerificationOutcome {
        let corrections: Vec<Correction> = card
            .evidence
            .iter()
            .enumerate()
            .map(|(i, evidence)| match index.get(evidence.chunk_id.as_str()) {
                Some(chunk) => self.check_excerpt(i, evidence, chunk),
                None => Correction::missing(i, "chunk not found"),
            })
            .collect();

        // A card that cites nothing is not grounded.
        let verified = !corrections.is_empty()
            && corrections
                .iter()
                .all(|c| c.status != CorrectionStatus::Missing);

        if !verified {
            debug!("Card {} failed verification", card.card_id);
        }

        VerificationOutcome {
            card_id: card.card_id.clone(),
            verified,
            confidence: if verified {
                self.options.verified_confidence
            } else {
                self.options.unverified_confidence
            },
            corrections,
        }
    }

    fn check_excerpt(&self, index: usize, evidence: &Evidence, chunk: &ContentChunk) -> Correction {
        let text = normalize_whitespace(&chunk.text);
        let excerpt = normalize_whitespace(&evidence.excerpt);
        if excerpt.is_empty() {
            return Correction::missing(index, "empty excerpt");
        }

        if text.contains(&excerpt) {
            return Correction::ok(index);
        }

        let sentences = extract_sentences(&chunk.text);

        if let Some(span) = find_case_insensitive(&text, &excerpt) {
            let sentence = sentences
                .iter()
                .map(|s| normalize_whitespace(s))
                .find(|s| s.contains(span))
                .unwrap_or_else(|| span.to_string());
            return Correction::corrected(index, sentence, "excerpt case adjusted to match chunk", 1.0);
        }

        let best_jaccard = sentences
            .iter()
            .map(|s| (s, jaccard_similarity(s, &excerpt)))
            .fold(None::<(&String, f32)>, |best, (s, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((s, score)),
            });
        if let Some((sentence, score)) = best_jaccard
            && score > self.options.min_similarity
        {
            return Correction::corrected(
                index,
                normalize_whitespace(sentence),
                "excerpt adjusted to match chunk",
                score,
            );
        }

        let folded_excerpt = normalize_for_match(&excerpt);
        let closest = sentences
            .iter()
            .map(|s| {
                let folded = normalize_for_match(s);
                let distance = levenshtein_distance(&folded, &folded_excerpt);
                (s, folded, distance)
            })
            .min_by_key(|(_, _, distance)| *distance);
        if let Some((sentence, folded, distance)) = closest
            && distance <= self.options.max_levenshtein_distance
        {
            return Correction::corrected(
                index,
                normalize_whitespace(sentence),
                "excerpt adjusted to match chunk (edit distance)",
                levenshtein_similarity(&folded, &folded_excerpt),
            );
        }

        Correction::missing(index, "no matching text found in chunk")
    }
}

fn index_chunks(chunks: &[ContentChunk]) -> HashMap<&str, &ContentChunk> {
    chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect()
}

/// Fold verification outcomes into their cards.
///
/// Corrected excerpts replace the originals, the outcome's confidence
/// becomes the card's confidence, and unverified cards are flagged for
/// review. A review flag is never cleared. Applying the same outcomes
/// twice yields the same cards.
pub fn apply_corrections(
    cards: Vec<FlashcardItem>,
    outcomes: &[VerificationOutcome],
) -> Vec<FlashcardItem> {
    let by_id: HashMap<&str, &VerificationOutcome> =
        outcomes.iter().map(|o| (o.card_id.as_str(), o)).collect();

    cards
        .into_iter()
        .map(|mut card| {
            let Some(outcome) = by_id.get(card.card_id.as_str()) else {
                return card;
            };
            for correction in &outcome.corrections {
                if let Some(excerpt) = &correction.corrected_excerpt
                    && let Some(evidence) = card.evidence.get_mut(correction.evidence_index)
                {
                    evidence.excerpt.clone_from(excerpt);
                }
            }
            card.confidence_score = outcome.confidence;
            if !outcome.verified {
                card.review_required = true;
            }
            card
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BloomLevel, Difficulty, SourceRef};
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, text: &str) -> ContentChunk {
        ContentChunk::new(id, "hr.pdf", text)
    }

    fn card(id: &str, evidence: &[(&str, &str)]) -> FlashcardItem {
        FlashcardItem {
            card_id: id.to_string(),
            question: "What is recruitment?".to_string(),
            answer: "Attracting talent.".to_string(),
            difficulty: Difficulty::Easy,
            bloom_level: BloomLevel::Remember,
            evidence: evidence
                .iter()
                .map(|(chunk_id, excerpt)| Evidence {
                    chunk_id: chunk_id.to_string(),
                    source_file: "hr.pdf".to_string(),
                    location: "p1".to_string(),
                    start_sec: None,
                    end_sec: None,
                    excerpt: excerpt.to_string(),
                })
                .collect(),
            sources: vec![SourceRef {
                kind: "pdf".to_string(),
                file: "hr.pdf".to_string(),
                location: "p1".to_string(),
            }],
            confidence_score: 0.8,
            rationale: String::new(),
            review_required: false,
            recovered: false,
        }
    }

    fn recruitment() -> Vec<ContentChunk> {
        vec![chunk("c1", "Recruitment is the process of attracting talent.")]
    }

    #[test]
    fn test_exact_excerpt_is_ok() {
        let verifier = EvidenceVerifier::default();
        let outcome = verifier.verify(
            &card("M1_C1", &[("c1", "Recruitment is the process of attracting talent")]),
            &recruitment(),
        );

        assert!(outcome.verified);
        assert_eq!(outcome.confidence, 0.95);
        assert_eq!(outcome.corrections[0].status, CorrectionStatus::Ok);
        assert_eq!(outcome.corrections[0].corrected_excerpt, None);
    }

    #[test]
    fn test_whitespace_differences_are_ok() {
        let verifier = EvidenceVerifier::default();
        let chunks = vec![chunk("c1", "Recruitment  is\nthe process of\tattracting talent.")];
        let outcome = verifier.verify(
            &card("M1_C1", &[("c1", "Recruitment is the   process of attracting")]),
            &chunks,
        );
        assert_eq!(outcome.corrections[0].status, CorrectionStatus::Ok);
    }

    #[test]
    fn test_case_difference_is_corrected_with_source_sentence() {
        let verifier = EvidenceVerifier::default();
        let outcome = verifier.verify(
            &card("M1_C1", &[("c1", "RECRUITMENT IS THE PROCESS")]),
            &recruitment(),
        );

        assert!(outcome.verified);
        let correction = &outcome.corrections[0];
        assert_eq!(correction.status, CorrectionStatus::Corrected);
        assert_eq!(
            correction.corrected_excerpt.as_deref(),
            Some("Recruitment is the process of attracting talent")
        );
    }

    #[test]
    fn test_paraphrase_is_corrected_by_sentence_similarity() {
        let verifier = EvidenceVerifier::default();
        let chunks = vec![chunk(
            "c1",
            "Onboarding starts on day one. Recruitment is the process of attracting qualified talent to the company.",
        )];
        let outcome = verifier.verify(
            &card("M1_C1", &[("c1", "recruitment is the process of attracting talent to a company")]),
            &chunks,
        );

        let correction = &outcome.corrections[0];
        assert_eq!(correction.status, CorrectionStatus::Corrected);
        assert_eq!(correction.reason, "excerpt adjusted to match chunk");
        assert_eq!(
            correction.corrected_excerpt.as_deref(),
            Some("Recruitment is the process of attracting qualified talent to the company")
        );
        assert!(correction.similarity_score.unwrap() > 0.5);
    }

    #[test]
    fn test_small_typo_is_corrected_by_edit_distance() {
        let verifier = EvidenceVerifier::default();
        let chunks = vec![chunk("c1", "Payroll runs monthly.")];
        // Token overlap is too low for the sentence search.
        let outcome = verifier.verify(&card("M1_C1", &[("c1", "Payrol run monthly")]), &chunks);

        let correction = &outcome.corrections[0];
        assert_eq!(correction.status, CorrectionStatus::Corrected);
        assert_eq!(correction.corrected_excerpt.as_deref(), Some("Payroll runs monthly"));
    }

    #[test]
    fn test_unrelated_excerpt_is_missing() {
        let verifier = EvidenceVerifier::default();
        let outcome = verifier.verify(
            &card("M1_C1", &[("c1", "Quarterly tax filings are due in April")]),
            &recruitment(),
        );

        assert!(!outcome.verified);
        assert_eq!(outcome.confidence, 0.4);
        assert_eq!(outcome.corrections[0].status, CorrectionStatus::Missing);
        assert_eq!(outcome.corrections[0].reason, "no matching text found in chunk");
    }

    #[test]
    fn test_unknown_chunk_is_missing() {
        let verifier = EvidenceVerifier::default();
        let outcome = verifier.verify(
            &card(
                "M1_C1",
                &[
                    ("c1", "Recruitment is the process"),
                    ("c9", "Recruitment is the process"),
                ],
            ),
            &recruitment(),
        );

        assert!(!outcome.verified);
        assert_eq!(outcome.corrections[0].status, CorrectionStatus::Ok);
        assert_eq!(outcome.corrections[1].status, CorrectionStatus::Missing);
        assert_eq!(outcome.corrections[1].reason, "chunk not found");
    }

    #[test]
    fn test_verify_all_checks_every_card() {
        let verifier = EvidenceVerifier::default();
        let cards = vec![
            card("M1_C1", &[("c9", "Recruitment is the process")]),
            card("M1_C2", &[("c1", "Recruitment is the process")]),
            card("M1_C3", &[("c1", "the process of attracting talent")]),
        ];
        let report = verifier.verify_all(&cards, &recruitment());

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.verified, 2);
        assert_eq!(report.summary.failed, 1);
        let expected = (0.4 + 0.95 + 0.95) / 3.0;
        assert!((report.summary.average_confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn test_verify_all_empty() {
        let report = EvidenceVerifier::default().verify_all(&[], &recruitment());
        assert_eq!(report.summary, VerificationSummary::default());
    }

    #[test]
    fn test_apply_corrections_is_idempotent() {
        let verifier = EvidenceVerifier::default();
        let cards = vec![
            card("M1_C1", &[("c1", "RECRUITMENT IS THE PROCESS")]),
            card("M1_C2", &[("c1", "Quarterly tax filings are due in April")]),
        ];
        let report = verifier.verify_all(&cards, &recruitment());

        let once = apply_corrections(cards, &report.outcomes);
        assert_eq!(
            once[0].evidence[0].excerpt,
            "Recruitment is the process of attracting talent"
        );
        assert_eq!(once[0].confidence_score, 0.95);
        assert!(!once[0].review_required);
        assert_eq!(once[1].confidence_score, 0.4);
        assert!(once[1].review_required);

        let twice = apply_corrections(once.clone(), &report.outcomes);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_apply_corrections_never_clears_review_flag() {
        let mut flagged = card("M1_C1", &[("c1", "Recruitment is the process")]);
        flagged.review_required = true;
        let report = EvidenceVerifier::default().verify_all(&[flagged.clone()], &recruitment());
        assert!(report.outcomes[0].verified);

        let cards = apply_corrections(vec![flagged], &report.outcomes);
        assert!(cards[0].review_required);
    }

    #[test]
    fn test_options_from_partial_config() {
        let options: VerifierOptions =
            serde_json::from_value(serde_json::json!({ "min_similarity": 0.7 })).unwrap();
        assert_eq!(options.min_similarity, 0.7);
        assert_eq!(options.max_levenshtein_distance, 3);
        assert_eq!(options.verified_confidence, 0.95);
    }
}
