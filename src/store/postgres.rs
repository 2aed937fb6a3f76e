//! PostgreSQL registry store
//!
//! Schema lives in `migrations/`. Each run's transaction is a
//! `sqlx::Transaction`; dropping it without commit rolls back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, QueryBuilder, Transaction};
use std::collections::HashMap;
use tracing::{info, warn};

use super::{RegionUpsert, RegistryStore, RegistryTransaction};
use crate::config::{mask_database_url, DatabaseConfig};
use crate::error::StoreError;
use crate::models::{NewOrganisation, Organisation, OrganisationType, Region};

/// Rows per INSERT statement when bulk-creating organisations.
/// Postgres caps a statement at 65535 bind parameters.
const INSERT_CHUNK_SIZE: usize = 1000;

const ORGANISATION_COLUMNS: &str = r#"
    id, code, name, organisation_type, region_id, closure_date,
    created_at, last_updated_at, successor_id
"#;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(url = %mask_database_url(&config.url), "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to connect to database");
                e
            })?;

        info!("Database connection pool created");
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RegistryStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn RegistryTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

pub struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[derive(sqlx::FromRow)]
struct RegionRow {
    id: String,
    code: String,
    name: String,
    is_active: bool,
}

impl From<RegionRow> for Region {
    fn from(row: RegionRow) -> Self {
        Region {
            id: row.id,
            code: row.code,
            name: row.name,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrganisationRow {
    id: i64,
    code: String,
    name: String,
    organisation_type: String,
    region_id: Option<String>,
    closure_date: Option<NaiveDate>,
    created_at: Option<DateTime<Utc>>,
    last_updated_at: Option<DateTime<Utc>>,
    successor_id: Option<i64>,
}

impl From<OrganisationRow> for Organisation {
    fn from(row: OrganisationRow) -> Self {
        Organisation {
            id: row.id,
            code: row.code,
            name: row.name,
            organisation_type: OrganisationType::from_code(&row.organisation_type),
            region_id: row.region_id,
            closure_date: row.closure_date,
            created_at: row.created_at,
            last_updated_at: row.last_updated_at,
            successor_id: row.successor_id,
        }
    }
}

#[async_trait]
impl RegistryTransaction for PostgresTransaction {
    async fn upsert_region(&mut self, region: &Region) -> Result<RegionUpsert, StoreError> {
        let tx = self.tx()?;

        // xmax is zero only for a freshly inserted row
        let (created,): (bool,) = sqlx::query_as(
            r#"
            INSERT INTO regions (id, code, name, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET code = EXCLUDED.code,
                name = EXCLUDED.name,
                is_active = EXCLUDED.is_active
            RETURNING (xmax = 0) AS created
            "#,
        )
        .bind(&region.id)
        .bind(&region.code)
        .bind(&region.name)
        .bind(region.is_active)
        .fetch_one(&mut **tx)
        .await?;

        Ok(RegionUpsert {
            region: region.clone(),
            created,
        })
    }

    async fn all_regions(&mut self) -> Result<Vec<Region>, StoreError> {
        let tx = self.tx()?;
        let rows: Vec<RegionRow> =
            sqlx::query_as(r#"SELECT id, code, name, is_active FROM regions ORDER BY name"#)
                .fetch_all(&mut **tx)
                .await?;
        Ok(rows.into_iter().map(Region::from).collect())
    }

    async fn set_region_predecessors(
        &mut self,
        region_id: &str,
        predecessor_ids: &[String],
    ) -> Result<(), StoreError> {
        let tx = self.tx()?;

        sqlx::query(r#"DELETE FROM region_predecessors WHERE region_id = $1"#)
            .bind(region_id)
            .execute(&mut **tx)
            .await?;

        if !predecessor_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO region_predecessors (region_id, predecessor_id)
                SELECT $1, p FROM UNNEST($2::text[]) AS p
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(region_id)
            .bind(predecessor_ids)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn region_predecessors(&mut self, region_id: &str) -> Result<Vec<String>, StoreError> {
        let tx = self.tx()?;
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT predecessor_id FROM region_predecessors
            WHERE region_id = $1
            ORDER BY predecessor_id
            "#,
        )
        .bind(region_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(ids)
    }

    async fn organisations_by_code(&mut self) -> Result<HashMap<String, Organisation>, StoreError> {
        let tx = self.tx()?;
        let rows: Vec<OrganisationRow> =
            sqlx::query_as(&format!("SELECT {ORGANISATION_COLUMNS} FROM organisations"))
                .fetch_all(&mut **tx)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.code.clone(), Organisation::from(row)))
            .collect())
    }

    async fn organisations_with_codes(
        &mut self,
        codes: &[String],
    ) -> Result<Vec<Organisation>, StoreError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.tx()?;
        let rows: Vec<OrganisationRow> = sqlx::query_as(&format!(
            "SELECT {ORGANISATION_COLUMNS} FROM organisations WHERE code = ANY($1) ORDER BY code"
        ))
        .bind(codes)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(Organisation::from).collect())
    }

    async fn create_organisations(
        &mut self,
        batch: &[NewOrganisation],
    ) -> Result<usize, StoreError> {
        let tx = self.tx()?;
        let mut inserted = 0;

        for chunk in batch.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"INSERT INTO organisations
                   (code, name, organisation_type, region_id, closure_date, created_at, last_updated_at) "#,
            );
            builder.push_values(chunk, |mut row, new| {
                row.push_bind(&new.code)
                    .push_bind(&new.fields.name)
                    .push_bind(new.fields.organisation_type.as_code())
                    .push_bind(&new.fields.region_id)
                    .push_bind(new.fields.closure_date)
                    .push_bind(new.fields.created_at)
                    .push_bind(new.fields.last_updated_at);
            });

            let result = builder.build().execute(&mut **tx).await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn save_organisation(&mut self, organisation: &Organisation) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE organisations
            SET name = $2,
                organisation_type = $3,
                region_id = $4,
                closure_date = $5,
                created_at = $6,
                last_updated_at = $7,
                successor_id = $8
            WHERE id = $1
            "#,
        )
        .bind(organisation.id)
        .bind(&organisation.name)
        .bind(organisation.organisation_type.as_code())
        .bind(&organisation.region_id)
        .bind(organisation.closure_date)
        .bind(organisation.created_at)
        .bind(organisation.last_updated_at)
        .bind(organisation.successor_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "organisation",
                key: organisation.id.to_string(),
            });
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
