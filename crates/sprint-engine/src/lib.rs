//! Sprint competition engine
//!
//! Runs build sprints on sourced leads: builders join, submit proof for each
//! milestone, scouts verify and review, and a winner is chosen either by
//! weighted scoring or by peer vote. Storage is pluggable through the traits
//! in [`store`].

pub mod admin;
pub mod brief;
pub mod clock;
pub mod engine;
pub mod lifecycle;
pub mod locks;
pub mod notifier;
pub mod scoring;
pub mod stall;
pub mod store;
pub mod view;
pub mod voting;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AuditContext, SprintEngine};
pub use notifier::{LeadSummary, LogNotifier, Notifier, WebhookNotifier};
pub use scoring::{FinalistScore, WinnerResult};
pub use stall::{find_stalled, NudgeReport, StalledBuilder};
pub use store::{MemoryStore, RedisStore, Store};
pub use view::{BuilderDetail, LeadView, SprintPhase};
pub use voting::{BuildTally, VotingOutcome, VotingState};

/// Lead status labels
pub const STATUS_QUALIFIED: &str = "qualified";
pub const STATUS_SPRINT_ACTIVE: &str = "sprint_active";
pub const STATUS_AWARDED: &str = "awarded";
pub const STATUS_TERMINATED: &str = "terminated";

