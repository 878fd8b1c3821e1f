//! Prompt sections and context-window budgeting
//!
//! A prompt is a system text plus ordered sections. When the estimate
//! exceeds the budget, sections are cut in a fixed order: prior-round
//! material from the oldest round first, then the context pack.
//! Instructions and the system text are never cut.

use crate::core::round::Round;
use serde::{Deserialize, Serialize};

const TRUNCATION_MARKER: &str = "\n[... truncated to fit the context window ...]";

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "round", rename_all = "snake_case")]
pub enum SectionKind {
    /// Task, question and output schema. Never truncated.
    Instructions,
    /// Rendered context pack body
    ContextPack,
    /// Output of an earlier round
    PriorRound(Round),
}

impl SectionKind {
    /// Order in which sections are cut; `None` means never.
    fn cut_rank(&self) -> Option<u8> {
        match self {
            SectionKind::PriorRound(round) => Some(round.number()),
            SectionKind::ContextPack => Some(u8::MAX),
            SectionKind::Instructions => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub title: String,
    pub text: String,
}

impl PromptSection {
    pub fn new(kind: SectionKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        if self.title.is_empty() {
            self.text.clone()
        } else {
            format!("--- {} ---\n{}", self.title, self.text)
        }
    }
}

/// What happened to a prompt on its way into a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub estimated_tokens: usize,
    pub budget_tokens: usize,
    pub truncated: bool,
    /// Titles of sections that were shortened or dropped, in cut order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub truncated_sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system: String,
    pub sections: Vec<PromptSection>,
}

impl BuiltPrompt {
    /// Sections joined in order, empty ones skipped
    pub fn render_user(&self) -> String {
        self.sections
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(PromptSection::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.system) + estimate_tokens(&self.render_user())
    }

    /// Cut the prompt down to `budget_tokens`.
    ///
    /// Deterministic: among cuttable sections the lowest rank goes first,
    /// later sections before earlier ones within a rank. A section that
    /// only needs shortening keeps its head and gets a truncation marker.
    pub fn fit(mut self, budget_tokens: usize) -> (Self, PromptMetadata) {
        let mut metadata = PromptMetadata {
            budget_tokens,
            ..Default::default()
        };

        let mut order: Vec<usize> = (0..self.sections.len())
            .filter(|&i| self.sections[i].kind.cut_rank().is_some())
            .collect();
        order.sort_by_key(|&i| (self.sections[i].kind.cut_rank(), std::cmp::Reverse(i)));

        for index in order {
            let total = self.estimated_tokens();
            if total <= budget_tokens {
                break;
            }
            let excess_chars = (total - budget_tokens) * 4;
            let section = &mut self.sections[index];
            let len = section.text.chars().count();
            let keep = len.saturating_sub(excess_chars + TRUNCATION_MARKER.len());

            if keep == 0 {
                section.text.clear();
            } else {
                section.text = section.text.chars().take(keep).collect::<String>() + TRUNCATION_MARKER;
            }
            metadata.truncated = true;
            metadata.truncated_sections.push(section.title.clone());
        }

        metadata.estimated_tokens = self.estimated_tokens();
        (self, metadata)
    }
}
