//! Output schemas for the generation stages.
//!
//! A schema turns an extracted JSON value into a typed stage output or a
//! list of issues. Stage B's schema can additionally salvage individually
//! valid cards from a batch that fails validation as a whole; salvaging
//! uses [`RelaxedCardSchema`], a separate and looser schema, and tags every
//! salvaged card as `recovered`.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{
    BloomLevel, CardBatch, Difficulty, Evidence, FlashcardItem, SourceRef, TopicSummary,
};

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// JSON path of the offending value.
    pub path: String,

    /// What is wrong with it.
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Render issues as a single line, keeping at most `limit` of them.
pub fn describe_issues(issues: &[SchemaIssue], limit: usize) -> String {
    let mut parts: Vec<String> = issues.iter().take(limit).map(ToString::to_string).collect();
    if issues.len() > limit {
        parts.push(format!("and {} more", issues.len() - limit));
    }
    parts.join("; ")
}

/// Output salvaged from an invalid response.
#[derive(Debug, Clone)]
pub struct Recovered<T> {
    pub output: T,
    pub kept: usize,
    pub total: usize,
    pub warnings: Vec<String>,
}

/// Validates a stage's JSON output.
pub trait OutputSchema: Send + Sync {
    /// Typed output of the stage.
    type Output: Send;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Validate the full output.
    fn validate(&self, value: &Value) -> Result<Self::Output, Vec<SchemaIssue>>;

    /// Salvage what can be salvaged after `validate` failed.
    fn recover(&self, _value: &Value) -> Option<Recovered<Self::Output>> {
        None
    }
}

fn deserialize<T: for<'de> Deserialize<'de>>(
    value: &Value,
    path: &str,
) -> Result<T, Vec<SchemaIssue>> {
    T::deserialize(value).map_err(|e| vec![SchemaIssue::new(path, e.to_string())])
}

/// Schema for Stage A's [`TopicSummary`].
#[derive(Debug, Clone)]
pub struct TopicSummarySchema {
    pub min_points: usize,
    pub max_points: usize,
    pub min_topics: usize,
    pub max_topics: usize,
}

impl Default for TopicSummarySchema {
    fn default() -> Self {
        Self {
            min_points: 6,
            max_points: 10,
            min_topics: 6,
            max_topics: 12,
        }
    }
}

impl OutputSchema for TopicSummarySchema {
    type Output = TopicSummary;

    fn name(&self) -> &str {
        "topic_summary"
    }

    fn validate(&self, value: &Value) -> Result<TopicSummary, Vec<SchemaIssue>> {
        let summary: TopicSummary = deserialize(value, "$")?;
        let mut issues = Vec::new();

        let points = summary.summary_points.len();
        if !(self.min_points..=self.max_points).contains(&points) {
            issues.push(SchemaIssue::new(
                "summary_points",
                format!(
                    "expected {}-{} items, got {points}",
                    self.min_points, self.max_points
                ),
            ));
        }

        let topics = summary.key_topics.len();
        if !(self.min_topics..=self.max_topics).contains(&topics) {
            issues.push(SchemaIssue::new(
                "key_topics",
                format!(
                    "expected {}-{} items, got {topics}",
                    self.min_topics, self.max_topics
                ),
            ));
        }

        for (i, point) in summary.summary_points.iter().enumerate() {
            if point.point.trim().is_empty() {
                issues.push(SchemaIssue::new(
                    format!("summary_points[{i}].point"),
                    "must not be empty",
                ));
            }
        }
        for (i, topic) in summary.key_topics.iter().enumerate() {
            if topic.topic.trim().is_empty() {
                issues.push(SchemaIssue::new(
                    format!("key_topics[{i}].topic"),
                    "must not be empty",
                ));
            }
        }

        if issues.is_empty() {
            Ok(summary)
        } else {
            Err(issues)
        }
    }
}

/// Bounds applied to every evidence excerpt by the strict card schema.
pub const MIN_EXCERPT_CHARS: usize = 10;
pub const MAX_EXCERPT_CHARS: usize = 500;
pub const MAX_EVIDENCE_PER_CARD: usize = 3;

/// Strict schema for Stage B's [`CardBatch`], with partial recovery.
#[derive(Debug, Clone, Default)]
pub struct CardBatchSchema {
    relaxed: RelaxedCardSchema,
}

impl CardBatchSchema {
    fn check_card(card: &FlashcardItem, path: &str, issues: &mut Vec<SchemaIssue>) {
        if card.question.trim().is_empty() {
            issues.push(SchemaIssue::new(format!("{path}.question"), "must not be empty"));
        }
        if card.answer.trim().is_empty() {
            issues.push(SchemaIssue::new(format!("{path}.answer"), "must not be empty"));
        }
        if card.evidence.is_empty() || card.evidence.len() > MAX_EVIDENCE_PER_CARD {
            issues.push(SchemaIssue::new(
                format!("{path}.evidence"),
                format!(
                    "expected 1-{MAX_EVIDENCE_PER_CARD} items, got {}",
                    card.evidence.len()
                ),
            ));
        }
        for (j, evidence) in card.evidence.iter().enumerate() {
            let chars = evidence.excerpt.chars().count();
            if !(MIN_EXCERPT_CHARS..=MAX_EXCERPT_CHARS).contains(&chars) {
                issues.push(SchemaIssue::new(
                    format!("{path}.evidence[{j}].excerpt"),
                    format!(
                        "expected {MIN_EXCERPT_CHARS}-{MAX_EXCERPT_CHARS} characters, got {chars}"
                    ),
                ));
            }
            if evidence.chunk_id.trim().is_empty() {
                issues.push(SchemaIssue::new(
                    format!("{path}.evidence[{j}].chunk_id"),
                    "must not be empty",
                ));
            }
        }
        if card.sources.is_empty() {
            issues.push(SchemaIssue::new(
                format!("{path}.sources"),
                "expected at least one source",
            ));
        }
        if !(0.0..=1.0).contains(&card.confidence_score) {
            issues.push(SchemaIssue::new(
                format!("{path}.confidence_score"),
                format!("expected 0-1, got {}", card.confidence_score),
            ));
        }
    }
}

impl OutputSchema for CardBatchSchema {
    type Output = CardBatch;

    fn name(&self) -> &str {
        "card_batch"
    }

    fn validate(&self, value: &Value) -> Result<CardBatch, Vec<SchemaIssue>> {
        let batch: CardBatch = deserialize(value, "$")?;
        let mut issues = Vec::new();

        if batch.cards.is_empty() {
            issues.push(SchemaIssue::new("cards", "expected at least one card"));
        }
        for (i, card) in batch.cards.iter().enumerate() {
            Self::check_card(card, &format!("cards[{i}]"), &mut issues);
        }

        if issues.is_empty() {
            Ok(batch)
        } else {
            Err(issues)
        }
    }

    fn recover(&self, value: &Value) -> Option<Recovered<CardBatch>> {
        let raw_cards = value.get("cards").and_then(Value::as_array)?;
        let total = raw_cards.len();

        let cards: Vec<FlashcardItem> = raw_cards
            .iter()
            .filter_map(|raw| self.relaxed.validate(raw).ok())
            .map(|mut card| {
                card.review_required = true;
                card.recovered = true;
                card
            })
            .collect();

        if cards.is_empty() {
            return None;
        }

        let kept = cards.len();
        let module_title = value
            .get("module_title")
            .and_then(Value::as_str)
            .map(String::from);

        Some(Recovered {
            output: CardBatch {
                cards,
                module_title,
                notes: None,
            },
            kept,
            total,
            warnings: vec![format!("partial recovery: kept {kept} of {total} cards")],
        })
    }
}

#[derive(Debug, Deserialize)]
struct RelaxedEvidence {
    chunk_id: String,
    excerpt: String,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start_sec: Option<f64>,
    #[serde(default)]
    end_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RelaxedCard {
    #[serde(default)]
    card_id: Option<String>,
    question: String,
    answer: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    bloom_level: Option<String>,
    #[serde(default)]
    evidence: Vec<RelaxedEvidence>,
    #[serde(default)]
    sources: Option<Vec<SourceRef>>,
    #[serde(default)]
    confidence_score: Option<f32>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Looser per-card schema used for partial recovery.
///
/// Requires only a question, an answer and one evidence item with a chunk
/// id and excerpt; every other field is defaulted.
#[derive(Debug, Clone, Default)]
pub struct RelaxedCardSchema;

impl OutputSchema for RelaxedCardSchema {
    type Output = FlashcardItem;

    fn name(&self) -> &str {
        "relaxed_card"
    }

    fn validate(&self, value: &Value) -> Result<FlashcardItem, Vec<SchemaIssue>> {
        let raw: RelaxedCard = deserialize(value, "$")?;

        let mut issues = Vec::new();
        if raw.question.trim().is_empty() {
            issues.push(SchemaIssue::new("question", "must not be empty"));
        }
        if raw.answer.trim().is_empty() {
            issues.push(SchemaIssue::new("answer", "must not be empty"));
        }

        let evidence: Vec<Evidence> = raw
            .evidence
            .into_iter()
            .filter(|e| !e.chunk_id.trim().is_empty() && !e.excerpt.trim().is_empty())
            .take(MAX_EVIDENCE_PER_CARD)
            .map(|e| Evidence {
                chunk_id: e.chunk_id,
                source_file: e.source_file.unwrap_or_default(),
                location: e.location.unwrap_or_default(),
                start_sec: e.start_sec,
                end_sec: e.end_sec,
                excerpt: e.excerpt,
            })
            .collect();
        if evidence.is_empty() {
            issues.push(SchemaIssue::new(
                "evidence",
                "expected at least one item with chunk_id and excerpt",
            ));
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        let sources = match raw.sources {
            Some(sources) if !sources.is_empty() => sources,
            _ => evidence
                .iter()
                .map(|e| SourceRef {
                    kind: "chunk".to_string(),
                    file: e.source_file.clone(),
                    location: e.location.clone(),
                })
                .collect(),
        };

        Ok(FlashcardItem {
            card_id: raw.card_id.unwrap_or_default(),
            question: raw.question,
            answer: raw.answer,
            difficulty: raw
                .difficulty
                .and_then(|d| d.parse().ok())
                .unwrap_or(Difficulty::Medium),
            bloom_level: raw
                .bloom_level
                .and_then(|b| b.parse().ok())
                .unwrap_or(BloomLevel::Understand),
            evidence,
            sources,
            confidence_score: raw.confidence_score.unwrap_or(0.5).clamp(0.0, 1.0),
            rationale: raw.rationale.unwrap_or_default(),
            review_required: false,
            recovered: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn summary_json(points: usize, topics: usize) -> Value {
        json!({
            "summary_points": (0..points)
                .map(|i| json!({ "point": format!("point {i}"), "supports": ["c1"] }))
                .collect::<Vec<_>>(),
            "key_topics": (0..topics)
                .map(|i| json!({ "topic": format!("topic {i}"), "supports": ["c1"] }))
                .collect::<Vec<_>>(),
        })
    }

    fn card_json(question: &str) -> Value {
        json!({
            "card_id": "M1_C1",
            "question": question,
            "answer": "The process of attracting talent.",
            "difficulty": "easy",
            "bloom_level": "Remember",
            "evidence": [{
                "chunk_id": "c1",
                "source_file": "hr.pdf",
                "location": "p1",
                "excerpt": "Recruitment is the process of attracting talent"
            }],
            "sources": [{ "type": "pdf", "file": "hr.pdf", "location": "p1" }],
            "confidence_score": 0.9,
            "rationale": "Definition from the lecture."
        })
    }

    #[test]
    fn test_topic_summary_bounds() {
        let schema = TopicSummarySchema::default();
        assert!(schema.validate(&summary_json(6, 6)).is_ok());
        assert!(schema.validate(&summary_json(10, 12)).is_ok());

        let issues = schema.validate(&summary_json(5, 13)).unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["summary_points", "key_topics"]);
    }

    #[test]
    fn test_topic_summary_coverage_optional() {
        let mut value = summary_json(6, 6);
        value["coverage"] = json!([
            { "heading": "Intro", "status": "Covered", "supports": ["c1"] },
            { "heading": "Law", "status": "NotCovered" }
        ]);
        let summary = TopicSummarySchema::default().validate(&value).unwrap();
        assert_eq!(summary.coverage.len(), 2);
    }

    #[test]
    fn test_card_batch_valid() {
        let value = json!({ "cards": [card_json("What is recruitment?")] });
        let batch = CardBatchSchema::default().validate(&value).unwrap();
        assert_eq!(batch.cards.len(), 1);
        assert!(!batch.cards[0].review_required);
    }

    #[test]
    fn test_card_batch_rejects_short_excerpt() {
        let mut card = card_json("What is recruitment?");
        card["evidence"][0]["excerpt"] = json!("too short");
        let issues = CardBatchSchema::default()
            .validate(&json!({ "cards": [card] }))
            .unwrap_err();
        assert_eq!(issues[0].path, "cards[0].evidence[0].excerpt");
    }

    #[test]
    fn test_card_batch_rejects_empty() {
        let issues = CardBatchSchema::default()
            .validate(&json!({ "cards": [] }))
            .unwrap_err();
        assert_eq!(issues[0].path, "cards");
    }

    #[test]
    fn test_partial_recovery_keeps_valid_cards() {
        let mut broken = card_json("What is onboarding?");
        broken["difficulty"] = json!("impossible");
        broken["sources"] = json!([]);
        let garbage = json!({ "question": "No answer here" });

        let value = json!({ "cards": [card_json("What is recruitment?"), broken, garbage] });
        let schema = CardBatchSchema::default();
        assert!(schema.validate(&value).is_err());

        let recovered = schema.recover(&value).unwrap();
        assert_eq!(recovered.kept, 2);
        assert_eq!(recovered.total, 3);
        assert_eq!(
            recovered.warnings,
            vec!["partial recovery: kept 2 of 3 cards".to_string()]
        );
        assert!(
            recovered
                .output
                .cards
                .iter()
                .all(|c| c.review_required && c.recovered)
        );

        let salvaged = &recovered.output.cards[1];
        assert_eq!(salvaged.difficulty, Difficulty::Medium);
        assert_eq!(salvaged.sources.len(), 1);
        assert_eq!(salvaged.sources[0].file, "hr.pdf");
    }

    #[test]
    fn test_partial_recovery_with_no_survivors() {
        let value = json!({ "cards": [{ "question": "q" }, 7] });
        assert!(CardBatchSchema::default().recover(&value).is_none());
        assert!(CardBatchSchema::default().recover(&json!({ "other": 1 })).is_none());
    }

    #[test]
    fn test_describe_issues_limit() {
        let issues = vec![
            SchemaIssue::new("a", "x"),
            SchemaIssue::new("b", "y"),
            SchemaIssue::new("c", "z"),
        ];
        assert_eq!(describe_issues(&issues, 2), "a: x; b: y; and 1 more");
    }
}
