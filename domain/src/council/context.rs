//! What a provider is shown in each round
//!
//! The context pack is built outside the council and forwarded unmodified.
//! A [`RoundContext`] pairs it with the settled results of earlier rounds,
//! already filtered to what the receiving provider may see.

use super::entities::{CouncilOpinion, CouncilReview};
use crate::config::ReviewMode;
use crate::core::round::Round;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pre-built question and project context, opaque to the council
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    pub question: String,
    #[serde(default)]
    pub body: Value,
}

impl ContextPack {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Body as prompt text: strings verbatim, anything else as pretty JSON.
    pub fn render_body(&self) -> Option<String> {
        match &self.body {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => serde_json::to_string_pretty(other).ok(),
        }
    }
}

/// Labels under which R1 opinions are shown to reviewers and the chair
///
/// In anonymized mode providers are sorted by name and labelled
/// `Response A`, `Response B`, ... so the assignment does not depend on
/// registration or completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpinionLabels {
    entries: Vec<(String, String)>,
}

fn letter_label(index: usize) -> String {
    let mut n = index;
    let mut suffix = String::new();
    loop {
        suffix.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    format!("Response {}", suffix)
}

impl OpinionLabels {
    pub fn assign<'a>(providers: impl IntoIterator<Item = &'a str>, mode: ReviewMode) -> Self {
        let mut names: Vec<&str> = providers.into_iter().collect();
        names.sort_unstable();
        names.dedup();

        let entries = names
            .into_iter()
            .enumerate()
            .map(|(i, provider)| {
                let label = match mode {
                    ReviewMode::Anonymized => letter_label(i),
                    ReviewMode::Labeled => provider.to_string(),
                };
                (label, provider.to_string())
            })
            .collect();
        Self { entries }
    }

    pub fn label_for(&self, provider: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, p)| p == provider)
            .map(|(label, _)| label.as_str())
    }

    /// Resolve a label as written by a model. Accepts the full label, the
    /// bare letter ("B"), or the provider name, case-insensitively.
    pub fn provider_for(&self, written: &str) -> Option<&str> {
        let wanted = written
            .trim()
            .trim_matches(|c: char| c == '"' || c == '*' || c == '`' || c == ':')
            .to_lowercase();
        self.entries
            .iter()
            .find(|(label, provider)| {
                let label = label.to_lowercase();
                label == wanted
                    || provider.to_lowercase() == wanted
                    || label.strip_prefix("response ") == Some(wanted.as_str())
            })
            .map(|(_, provider)| provider.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An R1 opinion together with the label it is shown under
#[derive(Debug, Clone, Copy)]
pub struct LabeledOpinion<'a> {
    pub label: &'a str,
    pub opinion: &'a CouncilOpinion,
}

/// Input to prompt building for one provider in one round
#[derive(Debug, Clone)]
pub struct RoundContext<'a> {
    pub round: Round,
    pub pack: &'a ContextPack,
    /// R1 opinions visible to the receiver, in label order
    pub opinions: Vec<LabeledOpinion<'a>>,
    /// R2 reviews, only populated for the chair
    pub reviews: Vec<&'a CouncilReview>,
    pub labels: &'a OpinionLabels,
}

impl<'a> RoundContext<'a> {
    pub fn independent(pack: &'a ContextPack, labels: &'a OpinionLabels) -> Self {
        Self {
            round: Round::Independent,
            pack,
            opinions: Vec::new(),
            reviews: Vec::new(),
            labels,
        }
    }

    /// Context for `reviewer`. With `hide_own` set, the reviewer's own
    /// opinion is left out.
    pub fn review(
        pack: &'a ContextPack,
        opinions: &'a [CouncilOpinion],
        labels: &'a OpinionLabels,
        reviewer: &str,
        hide_own: bool,
    ) -> Self {
        let visible = Self::labeled(opinions, labels)
            .into_iter()
            .filter(|o| !(hide_own && o.opinion.provider == reviewer))
            .collect();
        Self {
            round: Round::CrossReview,
            pack,
            opinions: visible,
            reviews: Vec::new(),
            labels,
        }
    }

    pub fn synthesis(
        pack: &'a ContextPack,
        opinions: &'a [CouncilOpinion],
        reviews: &'a [CouncilReview],
        labels: &'a OpinionLabels,
    ) -> Self {
        Self {
            round: Round::Synthesis,
            pack,
            opinions: Self::labeled(opinions, labels),
            reviews: reviews.iter().collect(),
            labels,
        }
    }

    fn labeled(opinions: &'a [CouncilOpinion], labels: &'a OpinionLabels) -> Vec<LabeledOpinion<'a>> {
        let mut labeled: Vec<_> = opinions
            .iter()
            .filter_map(|opinion| {
                labels
                    .label_for(&opinion.provider)
                    .map(|label| LabeledOpinion { label, opinion })
            })
            .collect();
        labeled.sort_by(|a, b| a.label.cmp(b.label));
        labeled
    }

    /// Providers whose opinions the receiver may critique
    pub fn reviewable_providers(&self) -> impl Iterator<Item = &str> {
        self.opinions.iter().map(|o| o.opinion.provider.as_str())
    }
}
