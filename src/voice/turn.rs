//! Rule-based end-of-turn detection on transcribed text

use std::sync::LazyLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Whether the speaker has yielded the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    /// Speaker asked the agent to hold off
    Wait,
    /// Speaker is mid-sentence
    Unfinished,
    /// Speaker is done and expects a reply
    Finished,
}

/// Classified turn with a heuristic confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnDecision {
    pub state: TurnState,
    pub confidence: f64,
}

impl TurnDecision {
    /// Whether the agent should generate a reply
    #[must_use]
    pub const fn should_respond(&self) -> bool {
        matches!(self.state, TurnState::Finished)
    }
}

/// Requests to stop or hold off
static WAIT_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    compile(&[
        r"\bstop\b|\bwait\b|\bhold\b",
        r"\bshut up\b|\bstop talking\b",
        r"\bquiet\b|\bsilence\b",
    ])
});

/// Trailing connectives and articles
static UNFINISHED_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    compile(&[
        r"\band\s*$",
        r"\bbut\s*$",
        r"\bso\s*$",
        r",\s*$",
        r"\bi\s*$",
        r"\bthe\s*$",
        r"\ba\s*$",
    ])
});

/// Terminal punctuation, thanks, farewells and acknowledgements
static FINISHED_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    compile(&[
        r"\?$",
        r"\.$",
        r"!$",
        r"thanks?\b",
        r"\bbye\b|\bgoodbye\b",
        r"\bok\b|\bokay\b|\balright\b",
    ])
});

fn compile(patterns: &[&str]) -> RegexSet {
    RegexSet::new(patterns).expect("turn patterns are valid regexes")
}

/// Classify a transcript
///
/// Rules are checked in priority order: wait, then unfinished, then
/// finished. Text matching none of them falls back to word count. Empty
/// text is unfinished with near-zero confidence.
#[must_use]
pub fn detect_turn(text: &str) -> TurnDecision {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return TurnDecision {
            state: TurnState::Unfinished,
            confidence: 0.1,
        };
    }

    let (state, confidence) = if WAIT_PATTERNS.is_match(&normalized) {
        (TurnState::Wait, 0.9)
    } else if UNFINISHED_PATTERNS.is_match(&normalized) {
        (TurnState::Unfinished, 0.8)
    } else if FINISHED_PATTERNS.is_match(&normalized) {
        (TurnState::Finished, 0.9)
    } else if normalized.split_whitespace().count() < 3 {
        (TurnState::Unfinished, 0.6)
    } else {
        (TurnState::Finished, 0.7)
    };

    TurnDecision { state, confidence }
}
