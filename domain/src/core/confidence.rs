//! Reported confidence levels

use serde::{Deserialize, Serialize};

/// Confidence reported by a provider or by the council as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// Never report more than `max`.
    pub fn capped_at(self, max: Confidence) -> Confidence {
        self.min(max)
    }

    /// Map a numeric score in `0.0..=1.0` (or a percentage) to a level.
    pub fn from_score(score: f64) -> Confidence {
        let normalized = if score > 1.0 { score / 100.0 } else { score };
        if normalized < 0.4 {
            Confidence::Low
        } else if normalized < 0.75 {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }

    /// Lenient parse of model-produced text ("High", "medium-high", "0.8", "80%").
    pub fn parse_lenient(s: &str) -> Option<Confidence> {
        let lower = s.trim().trim_end_matches('.').to_lowercase();
        if lower.is_empty() {
            return None;
        }
        if let Ok(n) = lower.trim_end_matches('%').trim().parse::<f64>() {
            return Some(Confidence::from_score(n));
        }
        // "medium-high" and friends resolve to the lower bound
        if lower.starts_with("low") {
            Some(Confidence::Low)
        } else if lower.starts_with("med") || lower.starts_with("moderate") {
            Some(Confidence::Medium)
        } else if lower.starts_with("high") || lower.starts_with("very high") {
            Some(Confidence::High)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
