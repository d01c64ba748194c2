//! Data model shared by every pipeline stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retrieved fragment of course material.
///
/// Owned by the retrieval collaborator; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Identifier, unique within a module.
    pub chunk_id: String,

    /// File the fragment came from.
    pub source_file: String,

    /// Page, slide or timestamp range.
    #[serde(default)]
    pub location: Option<String>,

    /// Start of the fragment in a recording, in seconds.
    #[serde(default)]
    pub start_sec: Option<f64>,

    /// End of the fragment in a recording, in seconds.
    #[serde(default)]
    pub end_sec: Option<f64>,

    /// Section heading the fragment sits under.
    #[serde(default)]
    pub heading: Option<String>,

    /// The fragment text.
    pub text: String,

    /// Estimated token count; 0 means "estimate from the text".
    #[serde(default)]
    pub tokens_estimate: usize,
}

impl ContentChunk {
    /// Create a new chunk and estimate its tokens.
    pub fn new(
        chunk_id: impl Into<String>,
        source_file: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let tokens_estimate = estimate_tokens(&text);
        Self {
            chunk_id: chunk_id.into(),
            source_file: source_file.into(),
            location: None,
            start_sec: None,
            end_sec: None,
            heading: None,
            text,
            tokens_estimate,
        }
    }

    /// Set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the heading.
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    /// Set the time range.
    pub fn with_time_range(mut self, start_sec: f64, end_sec: f64) -> Self {
        self.start_sec = Some(start_sec);
        self.end_sec = Some(end_sec);
        self
    }

    /// Token estimate, computed from the text when none was supplied.
    pub fn tokens(&self) -> usize {
        if self.tokens_estimate > 0 {
            self.tokens_estimate
        } else {
            estimate_tokens(&self.text)
        }
    }
}

/// Rough approximation: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// One point of the Stage A summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPoint {
    pub point: String,
    #[serde(default)]
    pub supports: Vec<String>,
}

/// A key topic identified by Stage A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyTopic {
    pub topic: String,
    #[serde(default)]
    pub supports: Vec<String>,
}

/// Whether a heading of the source material was covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStatus {
    Covered,
    NotCovered,
    PartiallyCovered,
}

/// Coverage of one source heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub heading: String,
    pub status: CoverageStatus,
    #[serde(default)]
    pub supports: Vec<String>,
}

/// Stage A output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub summary_points: Vec<SummaryPoint>,
    pub key_topics: Vec<KeyTopic>,
    #[serde(default)]
    pub coverage: Vec<CoverageEntry>,
}

/// A cited excerpt backing a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub start_sec: Option<f64>,
    #[serde(default)]
    pub end_sec: Option<f64>,
    /// Text claimed to appear verbatim in the chunk.
    pub excerpt: String,
}

/// Where a card's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub file: String,
    #[serde(default)]
    pub location: String,
}

/// Card difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// All difficulties in display order.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Bloom's taxonomy level of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl FromStr for BloomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remember" => Ok(BloomLevel::Remember),
            "understand" => Ok(BloomLevel::Understand),
            "apply" => Ok(BloomLevel::Apply),
            "analyze" | "analyse" => Ok(BloomLevel::Analyze),
            "evaluate" => Ok(BloomLevel::Evaluate),
            "create" => Ok(BloomLevel::Create),
            other => Err(format!("unknown bloom level: {other}")),
        }
    }
}

/// A generated flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardItem {
    /// `M<module_id>_C<n>`, unique within a deck.
    pub card_id: String,
    pub question: String,
    pub answer: String,
    pub difficulty: Difficulty,
    pub bloom_level: BloomLevel,
    pub evidence: Vec<Evidence>,
    pub sources: Vec<SourceRef>,
    pub confidence_score: f32,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub review_required: bool,
    /// Set when the card was salvaged from an otherwise invalid batch.
    #[serde(default)]
    pub recovered: bool,
}

/// Card id for the `n`-th card (1-based) of a module.
pub fn card_id(module_id: &str, n: usize) -> String {
    format!("M{module_id}_C{n}")
}

/// Stage B output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardBatch {
    pub cards: Vec<FlashcardItem>,
    #[serde(default)]
    pub module_title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The unit handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub module_id: String,
    pub title: String,
    pub summary: TopicSummary,
    pub cards: Vec<FlashcardItem>,
    pub created_at: DateTime<Utc>,
    /// Caller-supplied identifier stores may deduplicate on.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl Deck {
    /// Create a new deck stamped with the current time.
    pub fn new(
        module_id: impl Into<String>,
        title: impl Into<String>,
        summary: TopicSummary,
        cards: Vec<FlashcardItem>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            title: title.into(),
            summary,
            cards,
            created_at: Utc::now(),
            external_id: None,
        }
    }

    /// Attach an external identifier.
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }
}

/// Terminal status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Success,
    Partial,
    Failed,
    NeedMoreContent,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleStatus::Success => "SUCCESS",
            ModuleStatus::Partial => "PARTIAL",
            ModuleStatus::Failed => "FAILED",
            ModuleStatus::NeedMoreContent => "NEED_MORE_CONTENT",
        };
        f.write_str(s)
    }
}

/// Metrics for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub time_ms: u64,
    pub api_calls: u32,
    pub chunks_retrieved: usize,
    pub verification_rate: f32,
}

/// Terminal record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    pub module_id: String,
    pub status: ModuleStatus,
    pub generated_count: usize,
    pub verified_count: usize,
    pub warnings: Vec<String>,
    pub deck_id: Option<String>,
    pub metrics: ResultMetrics,
    pub error_message: Option<String>,
}
