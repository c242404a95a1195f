//! Database layer for Warden.
//!
//! PostgreSQL implementation of [`MemberStore`] and [`AuditStore`] with sqlx.
//! Only the columns the authorization core reads or writes are modelled; see
//! `migrations/` for the schema.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::str::FromStr;
use tracing::{instrument, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::rbac::audit::AuditLogEntry;
use crate::rbac::models::{CustomRole, Member, MemberId, MemberRole, OrganizationId, UserId};
use crate::store::{AuditStore, MemberStore};

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: String,
    user_id: String,
    organization_id: String,
    role: String,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomRoleRow {
    id: String,
    name: String,
    permissions: Vec<String>,
}

/// Unknown role names grant nothing rather than failing the lookup.
fn parse_role(member_id: &str, raw: &str) -> MemberRole {
    MemberRole::from_str(raw).unwrap_or_else(|e| {
        warn!(member_id, error = %e, "Unknown member role; granting no base permissions");
        MemberRole::Customer
    })
}

impl MemberRow {
    fn into_member(self, custom_roles: Vec<CustomRole>) -> Member {
        Member {
            role: parse_role(&self.id, &self.role),
            id: MemberId::from(self.id),
            user_id: UserId::from(self.user_id),
            organization_id: OrganizationId::from(self.organization_id),
            is_active: self.is_active,
            custom_roles,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store implementations
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl MemberStore for Database {
    #[instrument(skip(self))]
    async fn find_active_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, user_id, organization_id, role, is_active
            FROM members
            WHERE user_id = $1 AND organization_id = $2 AND is_active = TRUE
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let roles = sqlx::query_as::<_, CustomRoleRow>(
            r#"
            SELECT cr.id, cr.name, cr.permissions
            FROM custom_roles cr
            JOIN member_custom_roles mcr ON mcr.custom_role_id = cr.id
            WHERE mcr.member_id = $1
            ORDER BY cr.name
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let custom_roles = roles
            .into_iter()
            .map(|r| CustomRole::new(r.id, r.name, r.permissions))
            .collect();

        Ok(Some(row.into_member(custom_roles)))
    }

    async fn find_member_user(
        &self,
        member_id: &MemberId,
        organization_id: &OrganizationId,
    ) -> Result<Option<UserId>> {
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM members WHERE id = $1 AND organization_id = $2")
                .bind(member_id.as_str())
                .bind(organization_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(user_id.map(UserId::from))
    }

    async fn is_user_banned(&self, user_id: &UserId) -> Result<bool> {
        let banned: Option<bool> = sqlx::query_scalar("SELECT banned FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(banned.unwrap_or(false))
    }

    #[instrument(skip(self))]
    async fn set_user_banned(&self, user_id: &UserId, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET banned = TRUE, ban_reason = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_user_banned(&self, user_id: &UserId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET banned = FALSE, ban_reason = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for Database {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, organization_id, member_id, action, entity_type, description, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.organization_id.as_str())
        .bind(entry.member_id.as_str())
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.description)
        .bind(entry.details())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_falls_back_to_no_permissions() {
        assert_eq!(parse_role("m1", "MANAGER"), MemberRole::Manager);
        assert_eq!(parse_role("m1", "SUPERUSER"), MemberRole::Customer);
    }

    #[test]
    fn test_member_row_conversion() {
        let row = MemberRow {
            id: "m1".into(),
            user_id: "u1".into(),
            organization_id: "o1".into(),
            role: "CASHIER".into(),
            is_active: true,
        };
        let member = row.into_member(vec![CustomRole::new("cr", "Stock", ["inventory:adjust"])]);
        assert_eq!(member.id, MemberId::new("m1"));
        assert_eq!(member.role, MemberRole::Cashier);
        assert_eq!(member.custom_roles.len(), 1);
    }
}
