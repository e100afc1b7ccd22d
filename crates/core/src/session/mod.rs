//! Break sessions: decision logic, collaborators, and lifecycle

mod decision;
mod runner;
mod sinks;

pub use decision::{
    AcceptanceRule, BreakStateMachine, Decision, LabelMatcher, RejectReason, Transition,
    DEFAULT_CLOSED_EYE_ALIASES, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use runner::{
    BreakSession, SessionConfig, SessionDeps, SessionHandle, SessionSnapshot,
    DEFAULT_BREAK_DURATION, DEGRADED_AFTER_FAILURES,
};
pub use sinks::{
    BroadcastEventSink, CompletionStore, EventSink, FileCompletionStore, MemoryCompletionStore,
    LAST_BREAK_COMPLETED_KEY,
};
