//! Prompt construction for the generation stages.

use std::fmt::Write;

use crate::model::{ContentChunk, TopicSummary};

const STAGE_A_SYSTEM: &str = "You summarise course material for study purposes. \
Respond with a single JSON object and nothing else.";

const STAGE_B_SYSTEM: &str = "You write study flashcards that are strictly grounded in the \
provided course material. Every card must cite verbatim excerpts copied from the chunk it \
relies on. Respond with a single JSON object and nothing else.";

const CONTEXT_SUMMARY_SYSTEM: &str = "You condense course material without losing facts, \
definitions or terminology. Respond with plain prose.";

/// Render chunks as a numbered source listing.
pub fn render_chunks(chunks: &[ContentChunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        let _ = write!(out, "[{}] {}", chunk.chunk_id, chunk.source_file);
        if let Some(location) = &chunk.location {
            let _ = write!(out, " ({location})");
        }
        if let (Some(start), Some(end)) = (chunk.start_sec, chunk.end_sec) {
            let _ = write!(out, " [{start:.1}s-{end:.1}s]");
        }
        out.push('\n');
        if let Some(heading) = &chunk.heading {
            let _ = writeln!(out, "## {heading}");
        }
        let _ = writeln!(out, "{}\n", chunk.text.trim());
    }
    out
}

/// System and user prompt for Stage A.
pub fn stage_a(module_id: &str, chunks: &[ContentChunk]) -> (String, String) {
    let user = format!(
        "Module: {module_id}\n\n\
         Source chunks:\n\n{}\
         Return JSON of the form:\n\
         {{\"summary_points\": [{{\"point\": string, \"supports\": [chunk_id]}}] (6-10 items),\n \
         \"key_topics\": [{{\"topic\": string, \"supports\": [chunk_id]}}] (6-12 items),\n \
         \"coverage\": [{{\"heading\": string, \"status\": \"Covered\"|\"NotCovered\"|\"PartiallyCovered\", \"supports\": [chunk_id]}}]}}",
        render_chunks(chunks)
    );
    (STAGE_A_SYSTEM.to_string(), user)
}

/// System and user prompt for Stage B.
pub fn stage_b(
    module_id: &str,
    summary: &TopicSummary,
    chunks: &[ContentChunk],
    target_cards: usize,
) -> (String, String) {
    let mut outline = String::new();
    for point in &summary.summary_points {
        let _ = writeln!(outline, "- {} [{}]", point.point, point.supports.join(", "));
    }
    let topics: Vec<&str> = summary.key_topics.iter().map(|t| t.topic.as_str()).collect();

    let user = format!(
        "Module: {module_id}\n\
         Write {target_cards} flashcards.\n\n\
         Summary:\n{outline}\n\
         Key topics: {}\n\n\
         Source chunks:\n\n{}\
         Rules: answers at most 40 words; 1-3 evidence items per card; each excerpt \
         copied verbatim (10-500 characters) from the cited chunk.\n\
         Return JSON of the form:\n\
         {{\"module_title\": string, \"cards\": [{{\"card_id\": \"M{module_id}_C<n>\", \
         \"question\": string, \"answer\": string, \"difficulty\": \"easy\"|\"medium\"|\"hard\", \
         \"bloom_level\": \"Remember\"|\"Understand\"|\"Apply\"|\"Analyze\"|\"Evaluate\"|\"Create\", \
         \"evidence\": [{{\"chunk_id\": string, \"source_file\": string, \"location\": string, \
         \"excerpt\": string}}], \"sources\": [{{\"type\": string, \"file\": string, \
         \"location\": string}}], \"confidence_score\": number, \"rationale\": string}}]}}",
        topics.join(", "),
        render_chunks(chunks)
    );
    (STAGE_B_SYSTEM.to_string(), user)
}

/// System and user prompt for condensing one part of an oversized context.
pub fn context_summary(part: usize, chunks: &[ContentChunk]) -> (String, String) {
    let user = format!(
        "Condense part {part} of the course material below. Keep the chunk id in \
         brackets after every fact you keep.\n\n{}",
        render_chunks(chunks)
    );
    (CONTEXT_SUMMARY_SYSTEM.to_string(), user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_chunks_includes_ids_and_metadata() {
        let chunks = vec![
            ContentChunk::new("c1", "hr.pdf", "Recruitment attracts talent.")
                .with_location("p3")
                .with_heading("Recruitment"),
        ];
        let rendered = render_chunks(&chunks);
        assert!(rendered.starts_with("[c1] hr.pdf (p3)\n## Recruitment\n"));
        assert!(rendered.contains("Recruitment attracts talent."));
    }

    #[test]
    fn test_render_chunks_includes_recording_time_range() {
        let chunks = vec![
            ContentChunk::new("c9", "lecture.mp4", "Retention depends on onboarding.")
                .with_time_range(62.0, 95.5),
        ];
        let rendered = render_chunks(&chunks);
        assert!(rendered.starts_with("[c9] lecture.mp4 [62.0s-95.5s]\n"));
    }

    #[test]
    fn test_stage_b_mentions_target_and_card_format() {
        let summary = TopicSummary {
            summary_points: Vec::new(),
            key_topics: Vec::new(),
            coverage: Vec::new(),
        };
        let (_, user) = stage_b("7", &summary, &[], 15);
        assert!(user.contains("Write 15 flashcards"));
        assert!(user.contains("M7_C<n>"));
    }
}
