//! Sprint engine: shared state, record access and read paths
//!
//! Operations are split across modules by concern: `lifecycle` (launch,
//! join, checkpoints, reviews), `admin` (scout interventions), `scoring`
//! (winner selection), `voting` (peer-vote path) and `stall` (stall sweep
//! and nudge dispatch). All of them mutate a lead through [`SprintEngine::commit`]
//! while holding that lead's lock.

use chrono::{DateTime, Utc};
use sprint_common::{AlumniProfile, AuditAction, AuditEntry, Error, Lead, Result, SprintPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::locks::LeadLocks;
use crate::notifier::{LogNotifier, Notifier};
use crate::store::Store;
use crate::view::LeadView;

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Who performed an administrative action, and why
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor: String,
    pub reason: Option<String>,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            actor: actor.into(),
            reason,
        }
    }

    /// Default scout actor with no reason
    pub fn scout() -> Self {
        Self::new("scout", None)
    }

    pub(crate) fn entry(
        &self,
        action: AuditAction,
        details: String,
        target_user_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> AuditEntry {
        AuditEntry {
            timestamp: at,
            actor: self.actor.clone(),
            action,
            details,
            reason: self.reason.clone(),
            target_user_id: target_user_id.map(str::to_string),
        }
    }
}

/// The sprint competition engine
pub struct SprintEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: SprintPolicy,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) notify_timeout: Duration,
    pub(crate) locks: LeadLocks,
    /// Serializes joins so registry capacity checks see a stable count
    pub(crate) join_lock: Mutex<()>,
}

impl SprintEngine {
    /// Create an engine over a store with default policy and wall-clock time
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: SprintPolicy::default(),
            notifier: Arc::new(LogNotifier),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            locks: LeadLocks::new(),
            join_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: SprintPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &SprintPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- record access ----------------------------------------------------

    pub(crate) async fn load(&self, lead_id: &str) -> Result<Lead> {
        self.store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Lead not found: {}", lead_id)))
    }

    pub(crate) async fn load_alumni(&self, alumni_id: &str) -> Result<AlumniProfile> {
        self.store
            .get_alumni(alumni_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Builder not found: {}", alumni_id)))
    }

    /// Write a mutated lead back, bumping its version.
    ///
    /// Must be called while holding the lead's lock. A version mismatch
    /// means another process wrote the record since it was loaded.
    pub(crate) async fn commit(&self, mut lead: Lead) -> Result<Lead> {
        let expected = lead.version;
        lead.version += 1;

        if !self.store.put_lead(&lead, expected).await? {
            warn!("Version conflict writing lead: {}", lead.id);
            return Err(Error::conflict(format!(
                "Lead {} was modified concurrently, retry the request",
                lead.id
            )));
        }
        Ok(lead)
    }

    /// Enrich a lead for the caller
    pub(crate) async fn view(&self, lead: Lead) -> Result<LeadView> {
        let mut profiles = Vec::with_capacity(lead.active_builders.len());
        for builder in &lead.active_builders {
            if let Some(profile) = self.store.get_alumni(&builder.user_id).await? {
                profiles.push(profile);
            }
        }
        Ok(LeadView::build(lead, &profiles, self.now(), &self.policy))
    }

    /// Free the global builder slot and registry capacity of each builder
    pub(crate) async fn release_builders<'a, I>(&self, lead_id: &str, user_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for user_id in user_ids {
            self.store.release_builder(user_id, lead_id).await?;
            self.store.adjust_build_count(user_id, -1).await?;
        }
        Ok(())
    }

    // ---- lead repository --------------------------------------------------

    /// Store a newly sourced lead. Sprint state is reset to "not launched".
    pub async fn create_lead(&self, mut lead: Lead) -> Result<LeadView> {
        if lead.business_name.trim().is_empty() {
            return Err(Error::validation("business_name is required"));
        }
        if lead.id.trim().is_empty() {
            lead.id = uuid::Uuid::new_v4().to_string();
        }
        if lead.status.trim().is_empty() {
            lead.status = crate::STATUS_QUALIFIED.to_string();
        }

        lead.sprint_active = false;
        lead.is_paused = false;
        lead.active_builders.clear();
        lead.audit_log.clear();
        lead.first_completion_at = None;
        lead.winner_user_id = None;
        lead.voting_open = false;
        lead.winner_average_score = None;
        lead.sprint_round = 0;
        lead.version = 0;
        lead.created_at = Some(self.now());

        if !self.store.insert_lead(&lead).await? {
            return Err(Error::conflict(format!("Lead already exists: {}", lead.id)));
        }

        info!("Created lead: {} ({})", lead.id, lead.business_name);
        self.view(lead).await
    }

    pub async fn get_lead(&self, lead_id: &str) -> Result<LeadView> {
        let lead = self.load(lead_id).await?;
        self.view(lead).await
    }

    pub async fn list_leads(&self) -> Result<Vec<LeadView>> {
        let leads = self.store.list_leads().await?;
        let mut views = Vec::with_capacity(leads.len());
        for lead in leads {
            views.push(self.view(lead).await?);
        }
        Ok(views)
    }

    // ---- alumni registry --------------------------------------------------

    /// Register or update a builder profile
    ///
    /// Sprint bookkeeping (current build count, completed builds) is owned by
    /// the engine and kept from the stored profile on update.
    pub async fn register_alumni(&self, mut profile: AlumniProfile) -> Result<AlumniProfile> {
        if profile.id.trim().is_empty() || profile.name.trim().is_empty() {
            return Err(Error::validation("alumni id and name are required"));
        }
        if !(0.0..=5.0).contains(&profile.quality_rating) {
            return Err(Error::validation("quality_rating must be between 0 and 5"));
        }

        if let Some(existing) = self.store.get_alumni(&profile.id).await? {
            profile.current_build_count = existing.current_build_count;
            profile.completed_builds = existing.completed_builds;
        }

        self.store.upsert_alumni(&profile).await?;
        info!("Registered alumni: {}", profile.id);
        Ok(profile)
    }

    pub async fn get_alumni(&self, alumni_id: &str) -> Result<AlumniProfile> {
        self.load_alumni(alumni_id).await
    }

    pub async fn list_alumni(&self, specialty: Option<&str>) -> Result<Vec<AlumniProfile>> {
        Ok(self.store.list_alumni(specialty).await?)
    }
}
