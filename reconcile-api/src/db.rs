//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres, and `DbClient`,
//! the `ContactStore` implementation the service runs against. Every read
//! filters on `deletedat IS NULL`. Enrichment inserts and merges each run
//! in their own transaction with row locks.

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use reconcile_core::{
    plan_merge, ClusterIndex, Contact, ContactId, Identifiers, LinkPrecedence, MergeOutcome,
    MergeStep, ReconcileResult, StorageError, StorageResult, Timestamp,
};
use reconcile_storage::ContactStore;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// SCHEMA
// ============================================================================

/// Idempotent schema bootstrap for the `contact` table.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contact (
    id             BIGSERIAL PRIMARY KEY,
    phonenumber    TEXT NULL,
    email          TEXT NULL,
    linkedid       BIGINT NULL REFERENCES contact(id),
    linkprecedence TEXT NOT NULL CHECK (linkprecedence IN ('primary', 'secondary')),
    createdat      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updatedat      TIMESTAMPTZ NOT NULL DEFAULT now(),
    deletedat      TIMESTAMPTZ NULL,
    CHECK (email IS NOT NULL OR phonenumber IS NOT NULL),
    CHECK ((linkprecedence = 'primary' AND linkedid IS NULL)
        OR (linkprecedence = 'secondary' AND linkedid IS NOT NULL))
);
CREATE INDEX IF NOT EXISTS contact_email_live_idx ON contact (email) WHERE deletedat IS NULL;
CREATE INDEX IF NOT EXISTS contact_phone_live_idx ON contact (phonenumber) WHERE deletedat IS NULL;
CREATE INDEX IF NOT EXISTS contact_linkedid_live_idx ON contact (linkedid) WHERE deletedat IS NULL;
"#;

const CONTACT_COLUMNS: &str =
    "id, email, phonenumber, linkedid, linkprecedence, createdat, updatedat, deletedat";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout: Duration,
    /// Run the schema bootstrap at startup
    pub migrate: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            migrate: true,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("RECONCILE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("RECONCILE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("RECONCILE_DB_NAME").unwrap_or_else(|_| "postgres".to_string()),
            user: std::env::var("RECONCILE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("RECONCILE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("RECONCILE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("RECONCILE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            migrate: std::env::var("RECONCILE_DB_MIGRATE")
                .map(|s| s.to_lowercase() != "false" && s != "0")
                .unwrap_or(true),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        pool_cfg.timeouts.recycle = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Classify a driver error for the engine's retry policy.
fn storage_error(err: tokio_postgres::Error) -> StorageError {
    if let Some(code) = err.code() {
        if code == &SqlState::T_R_SERIALIZATION_FAILURE || code == &SqlState::T_R_DEADLOCK_DETECTED
        {
            return StorageError::Conflict {
                reason: format!("SQLSTATE {}", code.code()),
            };
        }
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: "database connection closed".to_string(),
        };
    }
    tracing::error!("Database error: {:?}", err);
    StorageError::Query {
        reason: err.to_string(),
    }
}

fn pool_error(err: PoolError) -> StorageError {
    match err {
        PoolError::Timeout(kind) => StorageError::PoolExhausted {
            reason: format!("timed out waiting for a connection ({:?})", kind),
        },
        PoolError::Closed => StorageError::Unavailable {
            reason: "database connection pool is closed".to_string(),
        },
        PoolError::Backend(err) => match storage_error(err) {
            StorageError::Query { reason } => StorageError::Unavailable { reason },
            other => other,
        },
        other => {
            tracing::error!("Connection pool error: {:?}", other);
            StorageError::Unavailable {
                reason: other.to_string(),
            }
        }
    }
}

fn contact_from_row(row: &Row) -> StorageResult<Contact> {
    let precedence: String = row.try_get("linkprecedence").map_err(storage_error)?;
    let link_precedence =
        LinkPrecedence::from_db_str(&precedence).map_err(|e| StorageError::Query {
            reason: e.to_string(),
        })?;
    let linked_id: Option<i64> = row.try_get("linkedid").map_err(storage_error)?;

    Ok(Contact {
        id: ContactId(row.try_get("id").map_err(storage_error)?),
        email: row.try_get("email").map_err(storage_error)?,
        phone_number: row.try_get("phonenumber").map_err(storage_error)?,
        linked_id: linked_id.map(ContactId),
        link_precedence,
        created_at: row.try_get("createdat").map_err(storage_error)?,
        updated_at: row.try_get("updatedat").map_err(storage_error)?,
        deleted_at: row.try_get("deletedat").map_err(storage_error)?,
    })
}

fn contacts_from_rows(rows: &[Row]) -> StorageResult<Vec<Contact>> {
    rows.iter().map(contact_from_row).collect()
}

/// Live rows with the given ids, locked in id order.
async fn lock_live_rows(
    tx: &deadpool_postgres::Transaction<'_>,
    ids: &[i64],
) -> StorageResult<Vec<Contact>> {
    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contact \
         WHERE id = ANY($1) AND deletedat IS NULL \
         ORDER BY id FOR UPDATE"
    );
    let rows = tx.query(&sql, &[&ids]).await.map_err(storage_error)?;
    contacts_from_rows(&rows)
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// PostgreSQL-backed contact store over a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Startup connectivity probe; returns the database clock.
    pub async fn probe(&self) -> ApiResult<Timestamp> {
        let conn = self.pool.get().await?;
        let row = conn.query_one("SELECT now()", &[]).await?;
        Ok(row.try_get(0)?)
    }

    /// Create the `contact` table and its indexes if they do not exist.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Contact schema is up to date");
        Ok(())
    }

    async fn apply_step(
        tx: &deadpool_postgres::Transaction<'_>,
        step: MergeStep,
    ) -> StorageResult<u64> {
        let touched = match step {
            MergeStep::Promote { id } => {
                tx.execute(
                    "UPDATE contact SET linkprecedence = 'primary', linkedid = NULL, \
                     updatedat = now() WHERE id = $1",
                    &[&id.0],
                )
                .await
            }
            MergeStep::Demote { id, into } => {
                tx.execute(
                    "UPDATE contact SET linkprecedence = 'secondary', linkedid = $2, \
                     updatedat = now() WHERE id = $1",
                    &[&id.0, &into.0],
                )
                .await
            }
            MergeStep::Repoint { from, into } => {
                tx.execute(
                    "UPDATE contact SET linkedid = $2, updatedat = now() \
                     WHERE linkedid = $1 AND id <> $2 AND deletedat IS NULL",
                    &[&from.0, &into.0],
                )
                .await
            }
        };
        touched.map_err(storage_error)
    }
}

#[async_trait]
impl ContactStore for DbClient {
    async fn find_matches(&self, identifiers: &Identifiers) -> ReconcileResult<Vec<Contact>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact \
             WHERE deletedat IS NULL AND (email = $1::text OR phonenumber = $2::text) \
             ORDER BY createdat, id"
        );
        let rows = conn
            .query(&sql, &[&identifiers.email(), &identifiers.phone_number()])
            .await
            .map_err(storage_error)?;
        Ok(contacts_from_rows(&rows)?)
    }

    async fn get_live(&self, id: ContactId) -> ReconcileResult<Option<Contact>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact WHERE id = $1 AND deletedat IS NULL"
        );
        let row = conn.query_opt(&sql, &[&id.0]).await.map_err(storage_error)?;
        Ok(row.as_ref().map(contact_from_row).transpose()?)
    }

    async fn load_cluster(&self, primary: ContactId) -> ReconcileResult<Vec<Contact>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact \
             WHERE deletedat IS NULL AND (id = $1 OR linkedid = $1) \
             ORDER BY (id = $1) DESC, createdat, id"
        );
        let rows = conn.query(&sql, &[&primary.0]).await.map_err(storage_error)?;
        Ok(contacts_from_rows(&rows)?)
    }

    async fn insert_primary(&self, identifiers: &Identifiers) -> ReconcileResult<Contact> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO contact (email, phonenumber, linkprecedence) \
             VALUES ($1, $2, $3) RETURNING {CONTACT_COLUMNS}"
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &identifiers.email(),
                    &identifiers.phone_number(),
                    &LinkPrecedence::Primary.as_db_str(),
                ],
            )
            .await
            .map_err(storage_error)?;
        Ok(contact_from_row(&row)?)
    }

    async fn insert_secondary(
        &self,
        primary: ContactId,
        identifiers: &Identifiers,
    ) -> ReconcileResult<Option<Contact>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(storage_error)?;

        let head = tx
            .query_opt(
                "SELECT linkprecedence FROM contact \
                 WHERE id = $1 AND deletedat IS NULL FOR UPDATE",
                &[&primary.0],
            )
            .await
            .map_err(storage_error)?;
        let is_primary = match head {
            Some(row) => {
                let precedence: String = row.try_get(0).map_err(storage_error)?;
                precedence == LinkPrecedence::Primary.as_db_str()
            }
            None => false,
        };
        if !is_primary {
            return Err(StorageError::Conflict {
                reason: format!("contact {} is no longer a live primary", primary),
            }
            .into());
        }

        let exists: bool = tx
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM contact \
                 WHERE deletedat IS NULL AND (id = $1 OR linkedid = $1) \
                 AND email IS NOT DISTINCT FROM $2::text \
                 AND phonenumber IS NOT DISTINCT FROM $3::text)",
                &[&primary.0, &identifiers.email(), &identifiers.phone_number()],
            )
            .await
            .and_then(|row| row.try_get(0))
            .map_err(storage_error)?;
        if exists {
            return Ok(None);
        }

        let sql = format!(
            "INSERT INTO contact (email, phonenumber, linkedid, linkprecedence) \
             VALUES ($1, $2, $3, $4) RETURNING {CONTACT_COLUMNS}"
        );
        let row = tx
            .query_one(
                &sql,
                &[
                    &identifiers.email(),
                    &identifiers.phone_number(),
                    &primary.0,
                    &LinkPrecedence::Secondary.as_db_str(),
                ],
            )
            .await
            .map_err(storage_error)?;
        let created = contact_from_row(&row)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(created))
    }

    async fn merge_clusters(&self, roots: &BTreeSet<ContactId>) -> ReconcileResult<MergeOutcome> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(storage_error)?;

        let ids: Vec<i64> = roots.iter().map(|id| id.0).collect();
        let mut candidates = lock_live_rows(&tx, &ids).await?;
        loop {
            let missing: Vec<i64> = ClusterIndex::build(&candidates)
                .missing_roots(&candidates)
                .iter()
                .map(|id| id.0)
                .collect();
            if missing.is_empty() {
                break;
            }
            let extra = lock_live_rows(&tx, &missing).await?;
            if extra.is_empty() {
                break;
            }
            candidates.extend(extra);
        }

        let plan = plan_merge(roots, candidates)?;

        let mut repointed = 0;
        for step in &plan.steps {
            let touched = Self::apply_step(&tx, *step).await?;
            if matches!(step, MergeStep::Repoint { .. }) {
                repointed += touched as usize;
            }
        }

        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact WHERE id = $1 AND deletedat IS NULL"
        );
        let survivor = tx
            .query_opt(&sql, &[&plan.survivor.id.0])
            .await
            .map_err(storage_error)?
            .ok_or_else(|| StorageError::Query {
                reason: format!("survivor {} vanished during merge", plan.survivor.id),
            })?;
        let survivor = contact_from_row(&survivor)?;

        tx.commit().await.map_err(storage_error)?;

        Ok(MergeOutcome {
            survivor,
            demoted: plan.demoted,
            repointed,
            degenerate: plan.degenerate,
        })
    }

    async fn health_check(&self) -> ReconcileResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.migrate);
    }

    #[test]
    fn test_pool_errors_are_classified() {
        let err = pool_error(PoolError::Closed);
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_schema_enforces_link_shape() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS contact"));
        assert!(SCHEMA.contains("linkprecedence = 'primary' AND linkedid IS NULL"));
        assert!(SCHEMA.contains("WHERE deletedat IS NULL"));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() -> ApiResult<()> {
        let client = DbClient::from_config(&DbConfig::default())?;
        assert_eq!(client.pool_size(), 0);
        Ok(())
    }
}
