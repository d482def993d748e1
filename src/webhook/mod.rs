//! Inbound webhooks
//!
//! Raw provider deliveries are normalized into [`InboundEvent`]s, checked
//! against the owning integration account and dispatched to one
//! [`EventHandler`] per event kind.
//!
//! # Handlers
//!
//! - [`TriageHandler`]: triage reaction on a chat message creates an issue
//! - [`ThreadHandler`]: replies in a linked thread become comments
//! - [`TrackerIssueHandler`]: edits on a linked GitHub issue update the issue

mod handlers;
mod normalize;
mod router;
pub mod signature;

pub use handlers::{
    DeclineReason, EventHandler, HandlerKey, HandlerOutcome, ThreadHandler, TrackerIssueHandler,
    TriageHandler,
};
pub use normalize::{
    normalize, Envelope, EventKind, InboundEvent, MessageEvent, ReactionEvent, TrackerIssueEvent,
};
pub use router::{EventRouter, RouteOutcome};
