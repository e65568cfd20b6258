//! Storage seams for leads, alumni and voting records
//!
//! Backends return `anyhow::Result`; the engine turns failures into
//! internal errors. Writes that guard an invariant (builder claims, vote
//! uniqueness, versioned lead writes) are atomic in every backend.

pub mod memory;
pub mod redis_store;

use anyhow::Result;
use async_trait::async_trait;
use sprint_common::{AlumniProfile, Build, Lead, Vote};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Durable lead/sprint records with whole-record replace semantics
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>>;

    async fn list_leads(&self) -> Result<Vec<Lead>>;

    /// Create a lead. Returns Ok(false) if the id is taken.
    async fn insert_lead(&self, lead: &Lead) -> Result<bool>;

    /// Replace a lead if the stored version still equals `expected_version`.
    /// Returns Ok(false) when another writer got there first.
    async fn put_lead(&self, lead: &Lead, expected_version: u64) -> Result<bool>;

    /// Map a builder to a lead unless they already hold a mapping.
    async fn claim_builder(&self, user_id: &str, lead_id: &str) -> Result<bool>;

    /// Drop the builder mapping if it still points at `lead_id`.
    async fn release_builder(&self, user_id: &str, lead_id: &str) -> Result<()>;

    async fn active_lead_for(&self, user_id: &str) -> Result<Option<String>>;
}

/// Builder directory
#[async_trait]
pub trait AlumniStore: Send + Sync {
    async fn get_alumni(&self, alumni_id: &str) -> Result<Option<AlumniProfile>>;

    async fn list_alumni(&self, specialty: Option<&str>) -> Result<Vec<AlumniProfile>>;

    async fn upsert_alumni(&self, profile: &AlumniProfile) -> Result<()>;

    /// Atomically add `delta` to the concurrent build count, flooring at zero.
    async fn adjust_build_count(&self, alumni_id: &str, delta: i64) -> Result<()>;

    async fn record_completed_build(&self, alumni_id: &str, lead_id: &str) -> Result<()>;
}

/// Builds and votes for the peer-voting path
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Create a build if absent. Returns Ok(false) if it already existed.
    async fn put_build(&self, build: &Build) -> Result<bool>;

    async fn get_build(&self, build_id: &str) -> Result<Option<Build>>;

    /// Builds of a lead in creation order
    async fn builds_for_lead(&self, lead_id: &str) -> Result<Vec<Build>>;

    /// Record a vote unless the voter already voted on the build.
    async fn insert_vote(&self, vote: &Vote) -> Result<bool>;

    async fn votes_for_build(&self, build_id: &str) -> Result<Vec<Vote>>;
}

/// Everything the engine needs from storage
pub trait Store: LeadStore + AlumniStore + VoteStore {}

impl<T: LeadStore + AlumniStore + VoteStore> Store for T {}

pub(crate) fn matches_specialty(profile: &AlumniProfile, specialty: Option<&str>) -> bool {
    specialty.map_or(true, |s| profile.specialty.eq_ignore_ascii_case(s))
}
