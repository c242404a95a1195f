//! Failed-attempt counting and escalating bans.
//!
//! Each (member, permission) pair has its own counter in the cache, living
//! for `failed_attempt_ttl` after the latest denial. A grant of that
//! permission clears it. Reaching `max_failed_attempts` sets a cached ban flag
//! for the member (`ban_ttl`) and a durable banned flag on the user record.
//! The durable flag stands in for the cached one whenever the cache is
//! unreachable.
//!
//! ```text
//!   denial        denial            denial         denial
//! OK ──···──▶ WARNED (3) ──▶ FINAL WARNING (4) ──▶ BANNED (5)
//!   ◀──────── grant resets the pair's counter
//! ```

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use super::models::{MemberId, UserId};
use crate::cache::{Cache, CacheKey};
use crate::config::AuthzConfig;
use crate::error::Result;
use crate::store::MemberStore;

/// Reason recorded on the user record when a ban is applied.
pub const BAN_REASON: &str = "Exceeded permission request limit.";

const BAN_MARKER: &str = "banned";

/// Where a member stands after a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    Ok,
    Warned { remaining: u32 },
    FinalWarning,
    Banned,
}

impl AttemptStatus {
    pub fn from_attempts(attempts: u32, config: &AuthzConfig) -> Self {
        if attempts >= config.max_failed_attempts {
            Self::Banned
        } else if attempts >= config.final_warning_threshold {
            Self::FinalWarning
        } else if attempts >= config.warning_threshold {
            Self::Warned {
                remaining: config.max_failed_attempts - attempts,
            }
        } else {
            Self::Ok
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned)
    }
}

/// Outcome of recording one denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenialRecord {
    pub attempts: u32,
    pub status: AttemptStatus,
}

/// Counts denials and applies bans.
#[derive(Clone)]
pub struct AbuseTracker {
    cache: Cache,
    store: Arc<dyn MemberStore>,
    config: AuthzConfig,
}

impl AbuseTracker {
    pub fn new(cache: Cache, store: Arc<dyn MemberStore>, config: AuthzConfig) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    /// Whether the member is currently banned.
    ///
    /// Reads the cached flag. If the cache is unreachable the durable flag on
    /// the user record decides, and if that cannot be read either the member
    /// is treated as banned.
    pub async fn is_banned(&self, member_id: &MemberId, user_id: &UserId) -> bool {
        let key = CacheKey::ban(member_id.as_str());
        let cache_error = match self.cache.get::<serde_json::Value>(&key).await {
            Ok(flag) => return flag.is_some(),
            Err(e) => e,
        };

        warn!(member_id = %member_id, error = %cache_error, "Ban flag read failed; checking durable flag");
        match self.store.is_user_banned(user_id).await {
            Ok(banned) => banned,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Durable ban flag unreadable; refusing access");
                true
            }
        }
    }

    /// Count a denial of `permission` and escalate to a ban at the limit.
    ///
    /// The ban is fully applied before this returns. A counter that cannot be
    /// incremented reports zero attempts and never escalates.
    pub async fn record_denial(
        &self,
        member_id: &MemberId,
        user_id: &UserId,
        permission: &str,
    ) -> DenialRecord {
        let key = CacheKey::failed_attempts(member_id.as_str(), permission);
        let attempts = match self
            .cache
            .increment_and_get(&key, self.config.failed_attempt_ttl)
            .await
        {
            Ok(n) => u32::try_from(n).unwrap_or(u32::MAX),
            Err(e) => {
                warn!(member_id = %member_id, permission, error = %e, "Failed to count denied attempt");
                0
            }
        };

        let status = AttemptStatus::from_attempts(attempts, &self.config);
        if status.is_banned() {
            self.ban(member_id, user_id).await;
        }

        DenialRecord { attempts, status }
    }

    /// Forget the denial counter for (member, permission).
    pub async fn reset(&self, member_id: &MemberId, permission: &str) {
        let key = CacheKey::failed_attempts(member_id.as_str(), permission);
        if let Err(e) = self.cache.delete(&[key]).await {
            warn!(member_id = %member_id, permission, error = %e, "Failed to reset attempt counter");
        }
    }

    /// Current denial count for (member, permission).
    pub async fn attempts(&self, member_id: &MemberId, permission: &str) -> Result<u32> {
        let key = CacheKey::failed_attempts(member_id.as_str(), permission);
        let count = self.cache.get::<i64>(&key).await?.unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(0))
    }

    /// Set the cached and durable ban flags.
    ///
    /// Each write is attempted regardless of the other's outcome.
    pub async fn ban(&self, member_id: &MemberId, user_id: &UserId) {
        let key = CacheKey::ban(member_id.as_str());
        if let Err(e) = self
            .cache
            .set_with_ttl(&key, &BAN_MARKER, self.config.ban_ttl)
            .await
        {
            error!(member_id = %member_id, error = %e, "Failed to cache ban flag");
        }

        if let Err(e) = self.store.set_user_banned(user_id, BAN_REASON).await {
            error!(user_id = %user_id, error = %e, "Failed to persist ban");
        }

        counter!("authz_bans_total").increment(1);
        info!(member_id = %member_id, user_id = %user_id, "Member banned after repeated denials");
    }

    /// Lift a ban: drop the cached flag and clear the durable flag.
    pub async fn clear_ban(&self, member_id: &MemberId, user_id: &UserId) -> Result<()> {
        self.cache.delete(&[CacheKey::ban(member_id.as_str())]).await?;
        self.store.clear_user_banned(user_id).await?;
        info!(member_id = %member_id, user_id = %user_id, "Ban cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StoreOperation;
    use crate::store::InMemoryStore;

    fn tracker() -> (AbuseTracker, Arc<InMemoryStore>, Cache) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Cache::in_memory(1000);
        let tracker = AbuseTracker::new(cache.clone(), store.clone(), AuthzConfig::default());
        (tracker, store, cache)
    }

    #[test]
    fn test_status_thresholds() {
        let config = AuthzConfig::default();
        assert_eq!(AttemptStatus::from_attempts(0, &config), AttemptStatus::Ok);
        assert_eq!(AttemptStatus::from_attempts(2, &config), AttemptStatus::Ok);
        assert_eq!(
            AttemptStatus::from_attempts(3, &config),
            AttemptStatus::Warned { remaining: 2 }
        );
        assert_eq!(AttemptStatus::from_attempts(4, &config), AttemptStatus::FinalWarning);
        assert_eq!(AttemptStatus::from_attempts(5, &config), AttemptStatus::Banned);
        assert_eq!(AttemptStatus::from_attempts(9, &config), AttemptStatus::Banned);
    }

    #[tokio::test]
    async fn test_escalation_to_ban() {
        let (tracker, store, _cache) = tracker();
        let member = MemberId::new("mem-1");
        let user = UserId::new("user-1");

        let mut statuses = Vec::new();
        for _ in 0..5 {
            statuses.push(tracker.record_denial(&member, &user, "member:delete").await);
        }

        assert_eq!(
            statuses.iter().map(|r| r.attempts).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(statuses[4].status, AttemptStatus::Banned);
        assert!(tracker.is_banned(&member, &user).await);
        assert_eq!(store.ban_reason(&user).await.as_deref(), Some(BAN_REASON));
    }

    #[tokio::test]
    async fn test_counters_are_per_permission() {
        let (tracker, _store, _cache) = tracker();
        let member = MemberId::new("mem-1");
        let user = UserId::new("user-1");

        tracker.record_denial(&member, &user, "member:delete").await;
        tracker.record_denial(&member, &user, "member:delete").await;
        tracker.record_denial(&member, &user, "audit:view").await;

        assert_eq!(tracker.attempts(&member, "member:delete").await.unwrap(), 2);
        assert_eq!(tracker.attempts(&member, "audit:view").await.unwrap(), 1);

        tracker.reset(&member, "member:delete").await;
        assert_eq!(tracker.attempts(&member, "member:delete").await.unwrap(), 0);
        assert_eq!(tracker.attempts(&member, "audit:view").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ban_survives_durable_write_failure() {
        let (tracker, store, _cache) = tracker();
        store.set_failing(StoreOperation::WriteBan, true);
        let member = MemberId::new("mem-1");
        let user = UserId::new("user-1");
        tracker.ban(&member, &user).await;
        assert!(tracker.is_banned(&member, &user).await);
    }

    #[tokio::test]
    async fn test_clear_ban() {
        let (tracker, store, _cache) = tracker();
        let member = MemberId::new("mem-1");
        let user = UserId::new("user-1");
        tracker.ban(&member, &user).await;

        tracker.clear_ban(&member, &user).await.unwrap();
        assert!(!tracker.is_banned(&member, &user).await);
        assert!(!store.is_user_banned(&user).await.unwrap());
    }
}
