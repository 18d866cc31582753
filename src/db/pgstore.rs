use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::{DiagramStore, ThreatModelStore};
use crate::error::StoreError;
use crate::models::{Cell, DiagramSnapshot, RoleGrant, ThreatModel};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS threat_models (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        owner TEXT NOT NULL,
        grants JSONB NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS diagrams (
        id UUID PRIMARY KEY,
        threat_model_id UUID NOT NULL REFERENCES threat_models(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        cells JSONB NOT NULL DEFAULT '[]',
        update_vector BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        modified_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS diagrams_threat_model_idx ON diagrams (threat_model_id)",
];

const THREAT_MODEL_SELECT: &str = r#"
    SELECT
        tm.id,
        tm.name,
        tm.owner,
        tm.grants,
        COALESCE(
            (SELECT array_agg(d.id) FROM diagrams d WHERE d.threat_model_id = tm.id),
            '{}'
        ) AS diagram_ids
    FROM threat_models tm
"#;

/// PostgreSQL-backed diagram and threat model store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables this service relies on when they are missing
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema verified");
        Ok(())
    }

    fn diagram_from_row(row: &PgRow) -> Result<DiagramSnapshot, SqlxError> {
        let cells: Json<Vec<Cell>> = row.try_get("cells")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let modified_at: DateTime<Utc> = row.try_get("modified_at")?;
        Ok(DiagramSnapshot {
            id: row.try_get("id")?,
            threat_model_id: row.try_get("threat_model_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            cells: cells.0,
            update_vector: row.try_get("update_vector")?,
            created_at,
            modified_at,
        })
    }

    fn threat_model_from_row(row: &PgRow) -> Result<ThreatModel, SqlxError> {
        let authorization: Json<Vec<RoleGrant>> = row.try_get("grants")?;
        Ok(ThreatModel {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner: row.try_get("owner")?,
            authorization: authorization.0,
            diagram_ids: row.try_get("diagram_ids")?,
        })
    }
}

#[async_trait]
impl DiagramStore for PgStore {
    async fn get(&self, diagram_id: Uuid) -> Result<Option<DiagramSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, threat_model_id, name, description, cells, update_vector, created_at, modified_at
            FROM diagrams
            WHERE id = $1
            "#,
        )
        .bind(diagram_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::diagram_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO diagrams (id, threat_model_id, name, description, cells, update_vector, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(diagram.id)
        .bind(diagram.threat_model_id)
        .bind(&diagram.name)
        .bind(&diagram.description)
        .bind(Json(&diagram.cells))
        .bind(diagram.update_vector)
        .bind(diagram.created_at)
        .bind(diagram.modified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE diagrams
            SET name = $2, description = $3, cells = $4, update_vector = $5, modified_at = $6
            WHERE id = $1
            "#,
        )
        .bind(diagram.id)
        .bind(&diagram.name)
        .bind(&diagram.description)
        .bind(Json(&diagram.cells))
        .bind(diagram.update_vector)
        .bind(diagram.modified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update diagram '{}': {}", diagram.id, e);
            e
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DiagramNotFound(diagram.id));
        }
        Ok(())
    }

    async fn delete(&self, diagram_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM diagrams WHERE id = $1")
            .bind(diagram_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ThreatModelStore for PgStore {
    async fn get(&self, threat_model_id: Uuid) -> Result<Option<ThreatModel>, StoreError> {
        let query_sql = format!("{} WHERE tm.id = $1", THREAT_MODEL_SELECT);
        let row = sqlx::query(&query_sql)
            .bind(threat_model_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::threat_model_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
