//! Shared domain types for the sprint marketplace
//!
//! Leads, builders, alumni profiles and voting records, plus the error
//! type, recency weighting and scoring policy used by every service.

pub mod error;
pub mod models;
pub mod policy;
pub mod recency;

pub use error::{Error, ErrorKind, Result};
pub use models::{
    ActiveBuilder, AlumniProfile, AuditAction, AuditEntry, Build, CheckpointState,
    CheckpointStatus, ComplaintCluster, Lead, Location, ScoutReview, Vote,
};
pub use policy::{LateCompletionPolicy, SprintPolicy};
pub use recency::{RecencyData, RecencyMetrics};
