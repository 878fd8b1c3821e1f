//! Default prompt text for each round

use super::budget::{BuiltPrompt, PromptSection, SectionKind};
use super::PromptBuilder;
use crate::core::round::Round;
use crate::council::context::RoundContext;
use crate::council::entities::{CouncilOpinion, CouncilReview};

/// Round prompts asking for the JSON shapes the parsers expect
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptBuilder;

impl DefaultPromptBuilder {
    /// System prompt for independent opinions
    pub fn independent_system() -> &'static str {
        r#"You are one member of a council of independent experts.
Answer on your own: you will not see the other members' answers.
Be concrete. Name the risks you see and the assumptions you rely on.
Respond with a single JSON object and nothing else."#
    }

    pub fn independent_instructions(question: &str) -> String {
        format!(
            r#"Question:
{}

Respond with JSON in exactly this shape:
{{"recommendation": "<one or two sentences>",
 "rationale": "<why>",
 "risks": ["<risk>", ...],
 "assumptions": ["<assumption>", ...],
 "confidence": "low" | "medium" | "high"}}"#,
            question
        )
    }

    /// System prompt for cross review
    pub fn review_system() -> &'static str {
        r#"You are a critical reviewer on a council of experts.
Assess each response you are shown for correctness, completeness and practicality.
Be fair but thorough. Name concrete concerns, not general impressions.
Respond with a single JSON object and nothing else."#
    }

    pub fn review_instructions(question: &str, targets: &[&str]) -> String {
        format!(
            r#"Original question:
{}

Review each of these responses: {}.

Respond with JSON in exactly this shape:
{{"critiques": [{{"target": "<label as shown>", "assessment": "<2-3 sentences>", "concerns": ["<concern>", ...], "agrees": true | false}}, ...],
 "summary": "<overall assessment>"}}"#,
            question,
            targets.join(", ")
        )
    }

    /// System prompt for chair synthesis
    pub fn synthesis_system() -> &'static str {
        r#"You chair a council of experts and write its final answer.
Identify where the members agree, weigh their disagreements using the reviews,
and synthesize the best-supported position into one coherent conclusion.
Give weight to well-reasoned arguments regardless of source."#
    }

    pub fn synthesis_instructions(question: &str, has_reviews: bool) -> String {
        let basis = if has_reviews {
            "all responses and reviews above"
        } else {
            "all responses above"
        };
        format!(
            r#"Original question:
{}

Based on {}, write the council's final answer with these parts:

1. **Conclusion**: the synthesized answer
2. **Consensus**: where members agreed
3. **Disagreements**: where they differed and which position is better supported
4. **Risks**: the risks that remain

End with two lines:
Recommendation: <one sentence>
Confidence: low | medium | high"#,
            question, basis
        )
    }

    fn render_opinion(opinion: &CouncilOpinion) -> String {
        let mut text = format!("Recommendation: {}", opinion.recommendation);
        if !opinion.rationale.is_empty() {
            text.push_str(&format!("\nRationale: {}", opinion.rationale));
        }
        if !opinion.risks.is_empty() {
            text.push_str("\nRisks:");
            for risk in &opinion.risks {
                text.push_str(&format!("\n- {}", risk));
            }
        }
        if !opinion.assumptions.is_empty() {
            text.push_str("\nAssumptions:");
            for assumption in &opinion.assumptions {
                text.push_str(&format!("\n- {}", assumption));
            }
        }
        text.push_str(&format!("\nConfidence: {}", opinion.confidence));
        text
    }

    fn render_review(review: &CouncilReview, ctx: &RoundContext<'_>) -> String {
        let mut text = String::new();
        for critique in &review.critiques {
            let label = ctx.labels.label_for(&critique.target).unwrap_or(&critique.target);
            text.push_str(&format!("On {}: {}", label, critique.assessment));
            for concern in &critique.concerns {
                text.push_str(&format!("\n  - {}", concern));
            }
            text.push('\n');
        }
        if !review.summary.is_empty() {
            text.push_str(&format!("Summary: {}", review.summary));
        }
        text.trim_end().to_string()
    }

    fn context_section(ctx: &RoundContext<'_>) -> Option<PromptSection> {
        ctx.pack
            .render_body()
            .map(|body| PromptSection::new(SectionKind::ContextPack, "Context", body))
    }

    fn opinion_sections(ctx: &RoundContext<'_>) -> Vec<PromptSection> {
        ctx.opinions
            .iter()
            .map(|o| {
                PromptSection::new(
                    SectionKind::PriorRound(Round::Independent),
                    o.label,
                    Self::render_opinion(o.opinion),
                )
            })
            .collect()
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, ctx: &RoundContext<'_>) -> BuiltPrompt {
        let question = ctx.pack.question.as_str();
        let mut sections: Vec<PromptSection> = Self::context_section(ctx).into_iter().collect();

        let system = match ctx.round {
            Round::Independent => {
                sections.push(PromptSection::new(
                    SectionKind::Instructions,
                    "",
                    Self::independent_instructions(question),
                ));
                Self::independent_system()
            }
            Round::CrossReview => {
                sections.extend(Self::opinion_sections(ctx));
                let targets: Vec<&str> = ctx.opinions.iter().map(|o| o.label).collect();
                sections.push(PromptSection::new(
                    SectionKind::Instructions,
                    "",
                    Self::review_instructions(question, &targets),
                ));
                Self::review_system()
            }
            Round::Synthesis => {
                sections.extend(Self::opinion_sections(ctx));
                for review in &ctx.reviews {
                    let title = match ctx.labels.label_for(&review.provider) {
                        Some(label) => format!("Review by the author of {}", label),
                        None => format!("Review by {}", review.provider),
                    };
                    sections.push(PromptSection::new(
                        SectionKind::PriorRound(Round::CrossReview),
                        title,
                        Self::render_review(review, ctx),
                    ));
                }
                sections.push(PromptSection::new(
                    SectionKind::Instructions,
                    "",
                    Self::synthesis_instructions(question, !ctx.reviews.is_empty()),
                ));
                Self::synthesis_system()
            }
        };

        BuiltPrompt {
            system: system.to_string(),
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewMode;
    use crate::core::confidence::Confidence;
    use crate::council::context::{ContextPack, OpinionLabels};
    use crate::council::entities::Critique;

    fn opinion(provider: &str) -> CouncilOpinion {
        CouncilOpinion {
            provider: provider.to_string(),
            model: "m".to_string(),
            round: Round::Independent,
            timestamp: 0,
            recommendation: format!("{} recommends Rust", provider),
            rationale: "Memory safety".to_string(),
            risks: vec!["Hiring".to_string()],
            assumptions: vec![],
            confidence: Confidence::High,
            partial: false,
        }
    }

    #[test]
    fn test_independent_prompt() {
        let pack = ContextPack::new("What language for the agent?");
        let labels = OpinionLabels::default();
        let prompt = DefaultPromptBuilder.build(&RoundContext::independent(&pack, &labels));
        assert_eq!(prompt.sections.len(), 1);
        assert_eq!(prompt.sections[0].kind, SectionKind::Instructions);
        let user = prompt.render_user();
        assert!(user.contains("What language for the agent?"));
        assert!(user.contains("\"recommendation\""));
    }

    #[test]
    fn test_review_prompt_uses_labels_only() {
        let pack = ContextPack::new("q").with_body(serde_json::json!("repo tree"));
        let opinions = vec![opinion("claude"), opinion("gemini")];
        let labels = OpinionLabels::assign(["claude", "gemini"], ReviewMode::Anonymized);
        let ctx = RoundContext::review(&pack, &opinions, &labels, "codex", false);
        let prompt = DefaultPromptBuilder.build(&ctx);

        assert_eq!(prompt.sections[0].kind, SectionKind::ContextPack);
        assert_eq!(prompt.sections[1].title, "Response A");
        assert_eq!(prompt.sections[2].title, "Response B");
        let user = prompt.render_user();
        assert!(user.contains("Response A, Response B"));
        assert!(user.contains("Hiring"));
    }

    #[test]
    fn test_synthesis_prompt_includes_reviews() {
        let pack = ContextPack::new("q");
        let opinions = vec![opinion("claude"), opinion("gemini")];
        let labels = OpinionLabels::assign(["claude", "gemini"], ReviewMode::Anonymized);
        let reviews = vec![CouncilReview {
            provider: "gemini".to_string(),
            model: "m".to_string(),
            round: Round::CrossReview,
            timestamp: 0,
            critiques: vec![Critique {
                target: "claude".to_string(),
                assessment: "Convincing".to_string(),
                concerns: vec!["Ignores build times".to_string()],
                agrees: Some(true),
            }],
            summary: "A is right".to_string(),
            critique_count: 1,
            partial: false,
        }];
        let ctx = RoundContext::synthesis(&pack, &opinions, &reviews, &labels);
        let prompt = DefaultPromptBuilder.build(&ctx);

        let review_section = prompt
            .sections
            .iter()
            .find(|s| s.kind == SectionKind::PriorRound(Round::CrossReview))
            .unwrap();
        assert_eq!(review_section.title, "Review by the author of Response B");
        assert!(review_section.text.contains("On Response A: Convincing"));
        assert!(prompt.render_user().contains("responses and reviews"));
        assert_eq!(prompt.system, DefaultPromptBuilder::synthesis_system());
    }
}
