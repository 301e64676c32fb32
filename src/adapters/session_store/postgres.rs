//! PostgreSQL session backend.
//!
//! Stores the JSON session document next to the columns needed for
//! conditional writes and owner lookups.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::domain::foundation::{ClientId, SessionId};
use crate::domain::session::Session;
use crate::ports::{BackendError, SessionBackend, WriteCondition};

const NAME: &str = "postgres";

fn db_error(e: sqlx::Error) -> BackendError {
    BackendError::unavailable(NAME, e)
}

/// Builds the conditional write for `session`. Every bound value is owned,
/// so the statement does not borrow from the session.
fn write_statement(
    session: &Session,
    condition: WriteCondition,
) -> Result<Query<'static, Postgres, PgArguments>, BackendError> {
    let doc = serde_json::to_string(session)
        .map_err(|e| BackendError::Serialization(e.to_string()))?;

    let sql = match condition {
        WriteCondition::Create => {
            r#"
            INSERT INTO boe_sessions (id, owner_id, version, last_active_at, document)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#
        }
        WriteCondition::Version(_) => {
            r#"
            UPDATE boe_sessions SET
                owner_id = $2,
                version = $3,
                last_active_at = $4,
                document = $5
            WHERE id = $1 AND version = $6
            "#
        }
        WriteCondition::Upsert => {
            r#"
            INSERT INTO boe_sessions (id, owner_id, version, last_active_at, document)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                version = EXCLUDED.version,
                last_active_at = EXCLUDED.last_active_at,
                document = EXCLUDED.document
            "#
        }
    };

    let mut query = sqlx::query(sql)
        .bind(*session.id().as_uuid())
        .bind(session.owner_id().as_str().to_string())
        .bind(session.version() as i64)
        .bind(*session.last_active_at().as_datetime())
        .bind(doc);
    if let WriteCondition::Version(expected) = condition {
        query = query.bind(expected as i64);
    }
    Ok(query)
}

/// Session documents in the `boe_sessions` table.
#[derive(Clone)]
pub struct PostgresSessionBackend {
    pool: PgPool,
}

impl PostgresSessionBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the table and owner index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS boe_sessions (
                id UUID PRIMARY KEY,
                owner_id TEXT NOT NULL,
                version BIGINT NOT NULL,
                last_active_at TIMESTAMPTZ NOT NULL,
                document TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS boe_sessions_owner_idx ON boe_sessions (owner_id)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for PostgresSessionBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, BackendError> {
        let row = sqlx::query("SELECT document FROM boe_sessions WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => {
                let doc: String = row.try_get("document").map_err(db_error)?;
                serde_json::from_str(&doc)
                    .map(Some)
                    .map_err(|e| BackendError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, session: &Session, condition: WriteCondition) -> Result<(), BackendError> {
        let result = write_statement(session, condition)?
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(BackendError::VersionConflict(session.id()));
        }
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, BackendError> {
        let result = sqlx::query("DELETE FROM boe_sessions WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, BackendError> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as("SELECT id FROM boe_sessions")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(|(id,)| SessionId::from_uuid(id)).collect())
    }

    async fn list_by_owner(&self, owner: &ClientId) -> Result<Vec<SessionId>, BackendError> {
        let rows: Vec<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM boe_sessions WHERE owner_id = $1")
                .bind(owner.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(rows.into_iter().map(|(id,)| SessionId::from_uuid(id)).collect())
    }
}
