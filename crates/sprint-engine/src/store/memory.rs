//! In-process storage backend

use anyhow::Result;
use async_trait::async_trait;
use sprint_common::{AlumniProfile, Build, Lead, Vote};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{matches_specialty, AlumniStore, LeadStore, VoteStore};

#[derive(Default)]
struct State {
    leads: HashMap<String, Lead>,
    active_builders: HashMap<String, String>,
    alumni: HashMap<String, AlumniProfile>,
    builds: HashMap<String, Build>,
    builds_by_lead: HashMap<String, Vec<String>>,
    votes_by_build: HashMap<String, Vec<Vote>>,
}

/// Storage backed by in-memory maps behind one lock
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self.state.read().await.leads.get(lead_id).cloned())
    }

    async fn list_leads(&self) -> Result<Vec<Lead>> {
        let state = self.state.read().await;
        let mut leads: Vec<Lead> = state.leads.values().cloned().collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(leads)
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.leads.contains_key(&lead.id) {
            return Ok(false);
        }
        state.leads.insert(lead.id.clone(), lead.clone());
        debug!("Inserted lead: {}", lead.id);
        Ok(true)
    }

    async fn put_lead(&self, lead: &Lead, expected_version: u64) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.leads.get(&lead.id) {
            Some(current) if current.version == expected_version => {
                state.leads.insert(lead.id.clone(), lead.clone());
                debug!("Stored lead: {} version: {}", lead.id, lead.version);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_builder(&self, user_id: &str, lead_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.active_builders.contains_key(user_id) {
            return Ok(false);
        }
        state
            .active_builders
            .insert(user_id.to_string(), lead_id.to_string());
        Ok(true)
    }

    async fn release_builder(&self, user_id: &str, lead_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.active_builders.get(user_id).map(String::as_str) == Some(lead_id) {
            state.active_builders.remove(user_id);
        }
        Ok(())
    }

    async fn active_lead_for(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.active_builders.get(user_id).cloned())
    }
}

#[async_trait]
impl AlumniStore for MemoryStore {
    async fn get_alumni(&self, alumni_id: &str) -> Result<Option<AlumniProfile>> {
        Ok(self.state.read().await.alumni.get(alumni_id).cloned())
    }

    async fn list_alumni(&self, specialty: Option<&str>) -> Result<Vec<AlumniProfile>> {
        let state = self.state.read().await;
        let mut profiles: Vec<AlumniProfile> = state
            .alumni
            .values()
            .filter(|p| matches_specialty(p, specialty))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn upsert_alumni(&self, profile: &AlumniProfile) -> Result<()> {
        let mut state = self.state.write().await;
        state.alumni.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn adjust_build_count(&self, alumni_id: &str, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(profile) = state.alumni.get_mut(alumni_id) {
            let next = (profile.current_build_count as i64 + delta).max(0);
            profile.current_build_count = next as u32;
        }
        Ok(())
    }

    async fn record_completed_build(&self, alumni_id: &str, lead_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(profile) = state.alumni.get_mut(alumni_id) {
            profile.completed_builds.push(lead_id.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn put_build(&self, build: &Build) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.builds.contains_key(&build.id) {
            return Ok(false);
        }
        state.builds.insert(build.id.clone(), build.clone());
        state
            .builds_by_lead
            .entry(build.lead_id.clone())
            .or_default()
            .push(build.id.clone());
        Ok(true)
    }

    async fn get_build(&self, build_id: &str) -> Result<Option<Build>> {
        Ok(self.state.read().await.builds.get(build_id).cloned())
    }

    async fn builds_for_lead(&self, lead_id: &str) -> Result<Vec<Build>> {
        let state = self.state.read().await;
        let builds: Vec<Build> = state
            .builds_by_lead
            .get(lead_id)
            .map(|ids| ids.iter().filter_map(|id| state.builds.get(id).cloned()).collect())
            .unwrap_or_default();
        Ok(builds)
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<bool> {
        let mut state = self.state.write().await;
        let votes = state.votes_by_build.entry(vote.build_id.clone()).or_default();
        if votes.iter().any(|v| v.voter_id == vote.voter_id) {
            return Ok(false);
        }
        votes.push(vote.clone());
        Ok(true)
    }

    async fn votes_for_build(&self, build_id: &str) -> Result<Vec<Vote>> {
        Ok(self
            .state
            .read()
            .await
            .votes_by_build
            .get(build_id)
            .cloned()
            .unwrap_or_default())
    }
}
