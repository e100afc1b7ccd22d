//! Break-decision state machine
//!
//! Consumes classification results in arrival order and decides, exactly once,
//! whether the break has been verified. Side effects are left to the caller:
//! the machine only reports which transition happened.

use crate::models::{ClassificationResult, SessionState};
use serde::Serialize;
use std::fmt;

/// Minimum confidence for an accepted result
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Label fragments that count as "eyes closed"
pub const DEFAULT_CLOSED_EYE_ALIASES: &[&str] =
    &["close_eyes", "closed_eyes", "eyes_closed", "closed", "close"];

/// Case-insensitive substring matcher over a configured alias set
///
/// Labels and aliases are compared after lowercasing and folding spaces and
/// dashes to underscores, so `"Close eyes"` matches the alias `close_eyes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    patterns: Vec<String>,
}

impl LabelMatcher {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<String> = aliases
            .into_iter()
            .map(|alias| normalize(alias.as_ref()))
            .filter(|alias| !alias.is_empty())
            .collect();
        patterns.sort();
        patterns.dedup();
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, label: &str) -> bool {
        let label = normalize(label);
        self.patterns
            .iter()
            .any(|pattern| label.contains(pattern.as_str()))
    }
}

impl Default for LabelMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSED_EYE_ALIASES)
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Why a result did not verify the break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Classification failed
    Error,
    LabelMismatch,
    LowConfidence,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Error => write!(f, "error"),
            RejectReason::LabelMismatch => write!(f, "label_mismatch"),
            RejectReason::LowConfidence => write!(f, "low_confidence"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(RejectReason),
}

/// Pure accept/reject rule: alias match and `confidence >= threshold`
#[derive(Debug, Clone)]
pub struct AcceptanceRule {
    matcher: LabelMatcher,
    threshold: f32,
}

impl Default for AcceptanceRule {
    fn default() -> Self {
        Self::new(LabelMatcher::default(), DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl AcceptanceRule {
    pub fn new(matcher: LabelMatcher, threshold: f32) -> Self {
        Self { matcher, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn matcher(&self) -> &LabelMatcher {
        &self.matcher
    }

    pub fn evaluate(&self, label: &str, confidence: f32) -> Decision {
        if label == crate::models::ERROR_LABEL {
            return Decision::Reject(RejectReason::Error);
        }
        if !self.matcher.matches(label) {
            return Decision::Reject(RejectReason::LabelMismatch);
        }
        // NaN compares false and is rejected here
        if confidence >= self.threshold {
            Decision::Accept
        } else {
            Decision::Reject(RejectReason::LowConfidence)
        }
    }
}

/// Effect of feeding one result into the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Session already terminal, result discarded
    Ignored,
    Rejected(RejectReason),
    Completed { label: String, confidence: f32 },
}

/// One-shot decision state for a single break session
#[derive(Debug, Clone)]
pub struct BreakStateMachine {
    rule: AcceptanceRule,
    state: SessionState,
    consecutive_failures: u32,
    evaluated: u64,
    last_result: Option<ClassificationResult>,
}

impl BreakStateMachine {
    pub fn new(rule: AcceptanceRule) -> Self {
        Self {
            rule,
            state: SessionState::AwaitingFrames,
            consecutive_failures: 0,
            evaluated: 0,
            last_result: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Error results seen in a row since the last successful classification
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn evaluated(&self) -> u64 {
        self.evaluated
    }

    pub fn last_result(&self) -> Option<&ClassificationResult> {
        self.last_result.as_ref()
    }

    pub fn on_result(&mut self, result: ClassificationResult) -> Transition {
        if self.state.is_terminal() {
            return Transition::Ignored;
        }

        self.state = SessionState::Evaluating;
        self.evaluated += 1;
        if result.is_error() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        let decision = self.rule.evaluate(&result.label, result.confidence);
        let transition = match decision {
            Decision::Accept => {
                self.state = SessionState::Completed;
                Transition::Completed {
                    label: result.label.clone(),
                    confidence: result.confidence,
                }
            }
            Decision::Reject(reason) => {
                self.state = SessionState::AwaitingFrames;
                Transition::Rejected(reason)
            }
        };
        self.last_result = Some(result);
        transition
    }

    /// Move to `Cancelled`. Returns false if the session had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Cancelled;
        true
    }
}
