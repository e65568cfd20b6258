//! Redis storage backend
//!
//! Key layout:
//! - lead:{id} → lead JSON, lead:{id}:version → record version
//! - leads:all → set of lead ids
//! - builder:active:{user_id} → lead id the builder is active on
//! - alumni:{id} → profile JSON, alumni:{id}:builds → concurrent build counter,
//!   alumni:{id}:completed → list of won lead ids, alumni:all → set of ids
//! - build:{id} → build JSON, builds:lead:{lead_id} → list of build ids
//! - vote:{build_id}:{voter_id} → vote JSON (uniqueness guard),
//!   votes:build:{build_id} → list of vote JSON

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use sprint_common::{AlumniProfile, Build, Lead, Vote};
use tracing::{debug, info};

use super::{matches_specialty, AlumniStore, LeadStore, VoteStore};

const PUT_IF_VERSION: &str = r#"
local current = redis.call('GET', KEYS[2])
if current == false then current = '0' end
if current ~= ARGV[1] then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
return 1
"#;

const RELEASE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

const ADJUST_FLOORED: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then return -1 end
local n = redis.call('INCRBY', KEYS[1], ARGV[1])
if n < 0 then
  redis.call('SET', KEYS[1], 0)
  n = 0
end
return n
"#;

/// Storage backed by a Redis connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

fn lead_key(lead_id: &str) -> String {
    format!("lead:{}", lead_id)
}

fn lead_version_key(lead_id: &str) -> String {
    format!("lead:{}:version", lead_id)
}

fn builder_key(user_id: &str) -> String {
    format!("builder:active:{}", user_id)
}

fn alumni_key(alumni_id: &str) -> String {
    format!("alumni:{}", alumni_id)
}

impl RedisStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Health check - verify Redis connection
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for RedisStore {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(lead_key(lead_id)).await?;

        match json {
            Some(data) => {
                let lead: Lead =
                    serde_json::from_str(&data).context("Failed to deserialize lead")?;
                Ok(Some(lead))
            }
            None => Ok(None),
        }
    }

    async fn list_leads(&self) -> Result<Vec<Lead>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers("leads:all").await?;

        let mut leads = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(lead) = self.get_lead(&id).await? {
                leads.push(lead);
            }
        }

        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(leads)
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(lead).context("Failed to serialize lead")?;

        let created: bool = conn.set_nx(lead_key(&lead.id), json).await?;
        if !created {
            debug!("Lead already exists: {}", lead.id);
            return Ok(false);
        }

        let _: () = conn.set(lead_version_key(&lead.id), lead.version).await?;
        let _: () = conn.sadd("leads:all", &lead.id).await?;

        info!("Inserted lead: {}", lead.id);
        Ok(true)
    }

    async fn put_lead(&self, lead: &Lead, expected_version: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(lead).context("Failed to serialize lead")?;

        let stored: i32 = Script::new(PUT_IF_VERSION)
            .key(lead_key(&lead.id))
            .key(lead_version_key(&lead.id))
            .arg(expected_version.to_string())
            .arg(json)
            .arg(lead.version.to_string())
            .invoke_async(&mut conn)
            .await
            .context("Failed to store lead")?;

        debug!("Stored lead: {} version: {} ok: {}", lead.id, lead.version, stored == 1);
        Ok(stored == 1)
    }

    async fn claim_builder(&self, user_id: &str, lead_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let claimed: bool = conn.set_nx(builder_key(user_id), lead_id).await?;
        Ok(claimed)
    }

    async fn release_builder(&self, user_id: &str, lead_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i32 = Script::new(RELEASE_IF_OWNER)
            .key(builder_key(user_id))
            .arg(lead_id)
            .invoke_async(&mut conn)
            .await
            .context("Failed to release builder")?;
        Ok(())
    }

    async fn active_lead_for(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let lead_id: Option<String> = conn.get(builder_key(user_id)).await?;
        Ok(lead_id)
    }
}

#[async_trait]
impl AlumniStore for RedisStore {
    async fn get_alumni(&self, alumni_id: &str) -> Result<Option<AlumniProfile>> {
        let mut conn = self.conn.clone();
        let key = alumni_key(alumni_id);

        let json: Option<String> = conn.get(&key).await?;
        let Some(data) = json else {
            return Ok(None);
        };

        let mut profile: AlumniProfile =
            serde_json::from_str(&data).context("Failed to deserialize alumni profile")?;

        let count: Option<i64> = conn.get(format!("{}:builds", key)).await?;
        if let Some(count) = count {
            profile.current_build_count = count.max(0) as u32;
        }
        profile.completed_builds = conn.lrange(format!("{}:completed", key), 0, -1).await?;

        Ok(Some(profile))
    }

    async fn list_alumni(&self, specialty: Option<&str>) -> Result<Vec<AlumniProfile>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers("alumni:all").await?;

        let mut profiles = Vec::new();
        for id in ids {
            if let Some(profile) = self.get_alumni(&id).await? {
                if matches_specialty(&profile, specialty) {
                    profiles.push(profile);
                }
            }
        }

        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn upsert_alumni(&self, profile: &AlumniProfile) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = alumni_key(&profile.id);
        let completed_key = format!("{}:completed", key);

        let json = serde_json::to_string(profile).context("Failed to serialize alumni profile")?;
        let _: () = conn.set(&key, json).await?;
        let _: () = conn
            .set(format!("{}:builds", key), profile.current_build_count)
            .await?;
        let _: () = conn.del(&completed_key).await?;
        if !profile.completed_builds.is_empty() {
            let _: () = conn.rpush(&completed_key, &profile.completed_builds).await?;
        }
        let _: () = conn.sadd("alumni:all", &profile.id).await?;

        info!("Stored alumni profile: {}", profile.id);
        Ok(())
    }

    async fn adjust_build_count(&self, alumni_id: &str, delta: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = alumni_key(alumni_id);

        let _: i64 = Script::new(ADJUST_FLOORED)
            .key(format!("{}:builds", key))
            .key(&key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .context("Failed to adjust build count")?;
        Ok(())
    }

    async fn record_completed_build(&self, alumni_id: &str, lead_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .rpush(format!("{}:completed", alumni_key(alumni_id)), lead_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VoteStore for RedisStore {
    async fn put_build(&self, build: &Build) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(build).context("Failed to serialize build")?;

        let created: bool = conn.set_nx(format!("build:{}", build.id), json).await?;
        if created {
            let _: () = conn
                .rpush(format!("builds:lead:{}", build.lead_id), &build.id)
                .await?;
            info!("Created build: {} for lead: {}", build.id, build.lead_id);
        }
        Ok(created)
    }

    async fn get_build(&self, build_id: &str) -> Result<Option<Build>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(format!("build:{}", build_id)).await?;

        match json {
            Some(data) => Ok(Some(
                serde_json::from_str(&data).context("Failed to deserialize build")?,
            )),
            None => Ok(None),
        }
    }

    async fn builds_for_lead(&self, lead_id: &str) -> Result<Vec<Build>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(format!("builds:lead:{}", lead_id), 0, -1).await?;

        let mut builds = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(build) = self.get_build(&id).await? {
                builds.push(build);
            }
        }
        Ok(builds)
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(vote).context("Failed to serialize vote")?;

        // SET NX is the uniqueness guard for (build, voter)
        let inserted: bool = conn
            .set_nx(format!("vote:{}:{}", vote.build_id, vote.voter_id), &json)
            .await?;
        if inserted {
            let _: () = conn
                .rpush(format!("votes:build:{}", vote.build_id), json)
                .await?;
        }
        Ok(inserted)
    }

    async fn votes_for_build(&self, build_id: &str) -> Result<Vec<Vote>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(format!("votes:build:{}", build_id), 0, -1).await?;

        raw.iter()
            .map(|data| serde_json::from_str(data).context("Failed to deserialize vote"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn get_test_store() -> RedisStore {
        RedisStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis")
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_versioned_lead_writes() {
        let store = get_test_store().await;
        let id = format!("lead-{}", uuid::Uuid::new_v4());
        let mut lead = Lead::new(id.clone(), "Test Diner".into());

        assert!(store.insert_lead(&lead).await.unwrap());
        assert!(!store.insert_lead(&lead).await.unwrap());

        lead.version = 1;
        assert!(store.put_lead(&lead, 0).await.unwrap());
        assert!(!store.put_lead(&lead, 0).await.unwrap());

        let loaded = store.get_lead(&id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_builder_claim_and_vote_uniqueness() {
        let store = get_test_store().await;
        let user = format!("user-{}", uuid::Uuid::new_v4());

        assert!(store.claim_builder(&user, "lead-a").await.unwrap());
        assert!(!store.claim_builder(&user, "lead-b").await.unwrap());
        store.release_builder(&user, "lead-a").await.unwrap();
        assert!(store.active_lead_for(&user).await.unwrap().is_none());

        let vote = Vote {
            id: uuid::Uuid::new_v4().to_string(),
            build_id: format!("build-{}", user),
            voter_id: "voter-1".into(),
            score: 5,
            created_at: Utc::now(),
        };
        assert!(store.insert_vote(&vote).await.unwrap());
        assert!(!store.insert_vote(&vote).await.unwrap());
        assert_eq!(store.votes_for_build(&vote.build_id).await.unwrap().len(), 1);
    }
}
