//! Normalizing raw provider output into round schemas
//!
//! Each parser first looks for a JSON object (fenced or bare) matching the
//! round's schema. When that fails it falls back to best-effort extraction
//! from labelled lines (`Recommendation:`, `Risks:`, ...) and flags the
//! result `partial`. Only output with nothing recoverable is a parse error.
//!
//! | Function | Round | Schema |
//! |----------|-------|--------|
//! | [`parse_opinion`] | R1 | `{recommendation, rationale, risks[], assumptions[], confidence}` |
//! | [`parse_review`] | R2 | `{critiques: [{target, assessment, concerns[], agrees}], summary}` |
//! | [`parse_synthesis`] | R3 | free-form, optional `{synthesis, recommendation, confidence}` |

use super::context::OpinionLabels;
use super::entities::{ChairSynthesis, CouncilOpinion, CouncilReview, Critique};
use crate::core::confidence::Confidence;
use crate::core::current_timestamp;
use crate::core::error::DomainError;
use crate::core::round::Round;
use serde_json::{Map, Value};
use std::collections::HashMap;

type Object = Map<String, Value>;

/// Find a JSON object in model output.
///
/// Prefers a ```` ```json ```` fenced block, then the outermost `{...}` span.
pub fn extract_json_object(text: &str) -> Option<Object> {
    let candidates = fenced_blocks(text)
        .into_iter()
        .chain(outer_braces(text))
        .collect::<Vec<_>>();

    candidates.into_iter().find_map(|candidate| {
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    })
}

fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        // skip the info string ("json", "JSON", ...)
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        match body.find("```") {
            Some(end) => {
                blocks.push(&body[..end]);
                rest = &body[end + 3..];
            }
            None => break,
        }
    }
    blocks
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn string_field(map: &Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn list_field(map: &Object, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|key| map.get(*key)) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(obj) => {
                    string_field(obj, &["description", "risk", "text", "concern", "summary"])
                }
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn confidence_field(map: &Object) -> Option<Confidence> {
    match map.get("confidence")? {
        Value::String(s) => Confidence::parse_lenient(s),
        Value::Number(n) => n.as_f64().map(Confidence::from_score),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Recommendation,
    Rationale,
    Risks,
    Assumptions,
    Confidence,
    Summary,
}

fn field_label(line: &str) -> Option<(Field, &str)> {
    let stripped = line.trim_start_matches(|c: char| {
        c == '#' || c == '*' || c == '-' || c == '>' || c == '_' || c.is_whitespace()
    });
    let (head, rest) = stripped.split_once(':')?;
    let head = head.trim().trim_matches(|c| c == '*' || c == '_').trim();
    let field = match head.to_lowercase().as_str() {
        "recommendation" | "answer" | "verdict" | "decision" => Field::Recommendation,
        "rationale" | "reasoning" | "justification" => Field::Rationale,
        "risks" | "risk" | "key risks" => Field::Risks,
        "assumptions" | "assumption" => Field::Assumptions,
        "confidence" => Field::Confidence,
        "summary" | "overall" | "overall assessment" => Field::Summary,
        _ => return None,
    };
    Some((field, rest.trim_start_matches(['*', '_']).trim()))
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0
        && let Some(rest) = line[digits..]
            .strip_prefix(". ")
            .or_else(|| line[digits..].strip_prefix(") "))
    {
        return rest.trim();
    }
    line
}

/// Text grouped under recognized `Label:` lines
#[derive(Debug, Default)]
struct LabeledSections {
    fields: HashMap<Field, Vec<String>>,
}

impl LabeledSections {
    fn scan(text: &str) -> Self {
        let mut sections = Self::default();
        let mut current: Option<Field> = None;
        for line in text.lines() {
            if let Some((field, rest)) = field_label(line) {
                current = Some(field);
                let entry = sections.fields.entry(field).or_default();
                if !rest.is_empty() {
                    entry.push(rest.to_string());
                }
            } else if let Some(field) = current
                && !line.trim().is_empty()
            {
                sections
                    .fields
                    .entry(field)
                    .or_default()
                    .push(line.trim().to_string());
            }
        }
        sections
    }

    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn text(&self, field: Field) -> Option<String> {
        let lines = self.fields.get(&field)?;
        let joined = lines.join("\n").trim().to_string();
        (!joined.is_empty()).then_some(joined)
    }

    fn items(&self, field: Field) -> Vec<String> {
        self.fields
            .get(&field)
            .map(|lines| {
                lines
                    .iter()
                    .map(|l| strip_bullet(l).to_string())
                    .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("none"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_failure(round: Round, reason: impl Into<String>) -> DomainError {
    DomainError::Parse {
        round: round.as_str().to_string(),
        reason: reason.into(),
    }
}

/// Normalize R1 output into a [`CouncilOpinion`].
pub fn parse_opinion(content: &str, provider: &str, model: &str) -> Result<CouncilOpinion, DomainError> {
    if content.trim().is_empty() {
        return Err(parse_failure(Round::Independent, "empty response"));
    }

    let mut opinion = CouncilOpinion {
        provider: provider.to_string(),
        model: model.to_string(),
        round: Round::Independent,
        timestamp: current_timestamp(),
        recommendation: String::new(),
        rationale: String::new(),
        risks: Vec::new(),
        assumptions: Vec::new(),
        confidence: Confidence::Medium,
        partial: false,
    };

    let json = extract_json_object(content);
    if let Some(map) = &json
        && let Some(recommendation) = string_field(map, &["recommendation", "answer"])
    {
        opinion.recommendation = recommendation;
        opinion.rationale = string_field(map, &["rationale", "reasoning"]).unwrap_or_default();
        opinion.risks = list_field(map, &["risks"]);
        opinion.assumptions = list_field(map, &["assumptions"]);
        opinion.confidence = confidence_field(map).unwrap_or_default();
        return Ok(opinion);
    }

    // best-effort: partial JSON fields, then labelled lines, then prose
    opinion.partial = true;
    let sections = LabeledSections::scan(content);
    let json = json.unwrap_or_default();
    // unstructured prose: first paragraph is the answer, the rest its rationale
    let prose = if sections.is_empty() && json.is_empty() {
        paragraphs(content)
    } else {
        Vec::new()
    };

    opinion.recommendation = sections
        .text(Field::Recommendation)
        .or_else(|| prose.first().cloned())
        .unwrap_or_default();
    opinion.rationale = string_field(&json, &["rationale", "reasoning"])
        .or_else(|| sections.text(Field::Rationale))
        .unwrap_or_else(|| prose.iter().skip(1).cloned().collect::<Vec<_>>().join("\n\n"));
    opinion.risks = match list_field(&json, &["risks"]) {
        risks if !risks.is_empty() => risks,
        _ => sections.items(Field::Risks),
    };
    opinion.assumptions = match list_field(&json, &["assumptions"]) {
        assumptions if !assumptions.is_empty() => assumptions,
        _ => sections.items(Field::Assumptions),
    };
    opinion.confidence = confidence_field(&json)
        .or_else(|| {
            sections
                .text(Field::Confidence)
                .and_then(|c| Confidence::parse_lenient(&c))
        })
        .unwrap_or_default();

    if opinion.recommendation.is_empty() {
        return Err(parse_failure(
            Round::Independent,
            "no recommendation could be recovered",
        ));
    }
    Ok(opinion)
}

fn critique_from(value: &Value, labels: &OpinionLabels, reviewable: &[&str]) -> Option<Critique> {
    let obj = value.as_object()?;
    let written = string_field(obj, &["target", "response", "label", "provider"])?;
    let provider = labels.provider_for(&written)?;
    if !reviewable.contains(&provider) {
        return None;
    }
    let agrees = ["agrees", "agree"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_bool));
    Some(Critique {
        target: provider.to_string(),
        assessment: string_field(obj, &["assessment", "critique", "comment"]).unwrap_or_default(),
        concerns: list_field(obj, &["concerns", "issues", "weaknesses"]),
        agrees,
    })
}

/// Normalize R2 output into a [`CouncilReview`].
///
/// Critique targets are mapped back from display labels to provider names.
/// Critiques whose target is not among `reviewable` are dropped, though
/// still counted in `critique_count`.
pub fn parse_review(
    content: &str,
    provider: &str,
    model: &str,
    labels: &OpinionLabels,
    reviewable: &[&str],
) -> Result<CouncilReview, DomainError> {
    if content.trim().is_empty() {
        return Err(parse_failure(Round::CrossReview, "empty response"));
    }

    let mut review = CouncilReview {
        provider: provider.to_string(),
        model: model.to_string(),
        round: Round::CrossReview,
        timestamp: current_timestamp(),
        critiques: Vec::new(),
        summary: String::new(),
        critique_count: 0,
        partial: false,
    };

    let json = extract_json_object(content);
    if let Some(map) = &json
        && let Some(Value::Array(items)) = map.get("critiques").or_else(|| map.get("reviews"))
    {
        review.critique_count = items.len();
        review.critiques = items
            .iter()
            .filter_map(|item| critique_from(item, labels, reviewable))
            .collect();
        review.summary = string_field(map, &["summary", "overall"]).unwrap_or_default();
        return Ok(review);
    }

    // best-effort: recover the summary and how many opinions were addressed
    review.partial = true;
    let sections = LabeledSections::scan(content);
    review.summary = json
        .as_ref()
        .and_then(|map| string_field(map, &["summary", "overall"]))
        .or_else(|| sections.text(Field::Summary))
        .or_else(|| paragraphs(content).into_iter().next())
        .unwrap_or_default();

    let lower = content.to_lowercase();
    review.critique_count = labels
        .iter()
        .filter(|(label, provider)| reviewable.contains(provider) && lower.contains(&label.to_lowercase()))
        .count();

    if review.summary.is_empty() && review.critique_count == 0 {
        return Err(parse_failure(
            Round::CrossReview,
            "no critiques or summary could be recovered",
        ));
    }
    Ok(review)
}

/// Normalize R3 output into a [`ChairSynthesis`].
pub fn parse_synthesis(content: &str, provider: &str, model: &str) -> Result<ChairSynthesis, DomainError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(parse_failure(Round::Synthesis, "empty response"));
    }

    let json = extract_json_object(trimmed);
    let sections = LabeledSections::scan(trimmed);

    let (body, recommendation, confidence) = match &json {
        Some(map) if string_field(map, &["synthesis", "content"]).is_some() => (
            string_field(map, &["synthesis", "content"]).unwrap_or_default(),
            string_field(map, &["recommendation"]),
            confidence_field(map),
        ),
        _ => (
            trimmed.to_string(),
            sections.text(Field::Recommendation),
            sections
                .text(Field::Confidence)
                .and_then(|c| Confidence::parse_lenient(&c)),
        ),
    };

    Ok(ChairSynthesis {
        provider: provider.to_string(),
        model: model.to_string(),
        round: Round::Synthesis,
        timestamp: current_timestamp(),
        content: body,
        recommendation,
        confidence: confidence.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewMode;

    // ==================== JSON extraction ====================

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"recommendation\": \"Ship\"}\n```\nThanks";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["recommendation"], "Ship");
    }

    #[test]
    fn test_extract_bare_json() {
        let map = extract_json_object("noise {\"a\": {\"b\": 1}} trailing").unwrap();
        assert_eq!(map["a"]["b"], 1);
        assert!(extract_json_object("no braces").is_none());
        assert!(extract_json_object("{not json}").is_none());
    }

    // ==================== Opinions ====================

    #[test]
    fn test_parse_opinion_json() {
        let content = r#"{"recommendation":"Use Postgres","rationale":"ACID","risks":["ops load",{"description":"cost"}],"assumptions":"single region","confidence":0.9}"#;
        let opinion = parse_opinion(content, "claude", "sonnet").unwrap();
        assert_eq!(opinion.recommendation, "Use Postgres");
        assert_eq!(opinion.risks, vec!["ops load", "cost"]);
        assert_eq!(opinion.assumptions, vec!["single region"]);
        assert_eq!(opinion.confidence, Confidence::High);
        assert!(!opinion.partial);
        assert_eq!(opinion.completeness(), 3);
    }

    #[test]
    fn test_parse_opinion_labelled_lines() {
        let content = "**Recommendation:** Use SQLite\n\n## Rationale:\nSmall data set.\n\nRisks:\n- write contention\n- no replication\n\nConfidence: medium-high";
        let opinion = parse_opinion(content, "gemini", "pro").unwrap();
        assert!(opinion.partial);
        assert_eq!(opinion.recommendation, "Use SQLite");
        assert_eq!(opinion.rationale, "Small data set.");
        assert_eq!(opinion.risks, vec!["write contention", "no replication"]);
        assert_eq!(opinion.confidence, Confidence::Medium);
    }

    #[test]
    fn test_parse_opinion_prose() {
        let content = "Go with the queue.\n\nIt decouples producers.";
        let opinion = parse_opinion(content, "codex", "gpt").unwrap();
        assert!(opinion.partial);
        assert_eq!(opinion.recommendation, "Go with the queue.");
        assert_eq!(opinion.rationale, "It decouples producers.");
        assert_eq!(opinion.completeness(), 2);
    }

    #[test]
    fn test_parse_opinion_empty_is_error() {
        let err = parse_opinion("   \n", "codex", "gpt").unwrap_err();
        assert!(matches!(err, DomainError::Parse { .. }));
    }

    #[test]
    fn test_parse_opinion_json_without_recommendation() {
        // structured but missing the core field, and no labelled fallback
        let err = parse_opinion(r#"{"rationale": "because"}"#, "codex", "gpt").unwrap_err();
        assert!(matches!(err, DomainError::Parse { .. }));
    }

    // ==================== Reviews ====================

    fn labels() -> OpinionLabels {
        OpinionLabels::assign(["claude", "codex", "gemini"], ReviewMode::Anonymized)
    }

    #[test]
    fn test_parse_review_maps_labels() {
        let content = r#"```json
{"critiques": [
  {"target": "Response A", "assessment": "Solid", "concerns": [], "agrees": true},
  {"target": "Response C", "assessment": "Weak", "concerns": ["ignores cost"]},
  {"target": "Response Q", "assessment": "??"}
], "summary": "A is best"}
```"#;
        let review =
            parse_review(content, "codex", "gpt", &labels(), &["claude", "codex", "gemini"])
                .unwrap();
        assert_eq!(review.critique_count, 3);
        assert_eq!(review.critiques.len(), 2);
        assert_eq!(review.critiques[0].target, "claude");
        assert_eq!(review.critiques[0].agrees, Some(true));
        assert_eq!(review.critiques[1].target, "gemini");
        assert!(review.has_objections());
        assert_eq!(review.summary, "A is best");
    }

    #[test]
    fn test_parse_review_drops_unreviewable_targets() {
        let content = r#"{"critiques":[{"target":"Response B","assessment":"mine"},{"target":"Response A","assessment":"ok"}],"summary":""}"#;
        let review = parse_review(content, "codex", "gpt", &labels(), &["claude", "gemini"]).unwrap();
        assert_eq!(review.critiques.len(), 1);
        assert_eq!(review.critiques[0].target, "claude");
    }

    #[test]
    fn test_parse_review_partial() {
        let content = "Response A is thorough. Response C misses the migration cost.\n\nSummary: prefer A.";
        let review =
            parse_review(content, "codex", "gpt", &labels(), &["claude", "gemini"]).unwrap();
        assert!(review.partial);
        assert!(review.critiques.is_empty());
        assert_eq!(review.critique_count, 2);
        assert_eq!(review.summary, "prefer A.");
    }

    // ==================== Synthesis ====================

    #[test]
    fn test_parse_synthesis_free_form() {
        let content = "The council converges on Postgres.\n\nRecommendation: Use Postgres\nConfidence: high";
        let synthesis = parse_synthesis(content, "claude", "opus").unwrap();
        assert!(synthesis.content.starts_with("The council"));
        assert_eq!(synthesis.recommendation.as_deref(), Some("Use Postgres"));
        assert_eq!(synthesis.confidence, Confidence::High);
    }

    #[test]
    fn test_parse_synthesis_json() {
        let content = r#"{"synthesis":"Merged view","recommendation":"Ship","confidence":"low"}"#;
        let synthesis = parse_synthesis(content, "claude", "opus").unwrap();
        assert_eq!(synthesis.content, "Merged view");
        assert_eq!(synthesis.confidence, Confidence::Low);
        assert!(parse_synthesis("", "claude", "opus").is_err());
    }
}
