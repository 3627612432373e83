use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;

use super::event_store::{effective_limit, EventStore, StoredEvent, DEFAULT_MAX_EVENTS_PER_TYPE};
use crate::error::StoreError;
use crate::mediator::{Context, Event};

pub const DEFAULT_POSTGRES_PREFIX: &str = "mediator_events";

// ============================================================================
// Postgres Event Store
// ============================================================================
//
// One append-only table per store, named by the prefix:
//   (id SERIAL PK, event_name TEXT, event_data JSONB, created_at TIMESTAMPTZ)
//
// Retention is a hard cap enforced on every write: the insert and a trim of
// everything past max_events_per_type for that name share one transaction,
// serialized per name by a transaction-scoped advisory lock.
// created_at can repeat under load, so every ORDER BY breaks ties on id.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct PostgresStoreConfig {
    /// Table name (quoted, so any string is accepted)
    pub prefix: String,
    /// Rows kept per event name; `<= 0` disables trimming
    pub max_events_per_type: i64,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_POSTGRES_PREFIX.to_string(),
            max_events_per_type: DEFAULT_MAX_EVENTS_PER_TYPE,
        }
    }
}

/// SQL text for one table, rendered once at construction
#[derive(Debug, Clone)]
struct Statements {
    create_table: String,
    create_name_index: String,
    create_time_index: String,
    lock_name: String,
    insert: String,
    trim: String,
    select: String,
    delete: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        let quoted = quote_identifier(table);
        let name_index = quote_identifier(&format!("{}_event_name_idx", table));
        let time_index = quote_identifier(&format!("{}_created_at_idx", table));

        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (
                    id SERIAL PRIMARY KEY,
                    event_name TEXT NOT NULL,
                    event_data JSONB NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )"
            ),
            create_name_index: format!(
                "CREATE INDEX IF NOT EXISTS {name_index} ON {quoted} (event_name)"
            ),
            create_time_index: format!(
                "CREATE INDEX IF NOT EXISTS {time_index} ON {quoted} (created_at)"
            ),
            lock_name: "SELECT pg_advisory_xact_lock(hashtext($1))".to_string(),
            insert: format!(
                "INSERT INTO {quoted} (event_name, event_data, created_at) VALUES ($1, $2, $3)"
            ),
            trim: format!(
                "DELETE FROM {quoted}
                 WHERE id IN (
                    SELECT id FROM {quoted}
                    WHERE event_name = $1
                    ORDER BY created_at DESC, id DESC
                    OFFSET $2
                 )"
            ),
            select: format!(
                "SELECT event_data FROM {quoted}
                 WHERE event_name = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2"
            ),
            delete: format!("DELETE FROM {quoted} WHERE event_name = $1"),
        }
    }
}

/// Double-quote an identifier, doubling any embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    config: PostgresStoreConfig,
    statements: Statements,
}

impl PostgresEventStore {
    /// Create the store and, idempotently, its table and indexes.
    ///
    /// Fails only on connection or DDL errors.
    pub async fn new(pool: PgPool, mut config: PostgresStoreConfig) -> Result<Self, StoreError> {
        if config.prefix.is_empty() {
            config.prefix = DEFAULT_POSTGRES_PREFIX.to_string();
        }

        let store = Self {
            statements: Statements::for_table(&config.prefix),
            pool,
            config,
        };
        store.init_tables().await?;

        tracing::info!(
            table = %store.config.prefix,
            max_events_per_type = store.config.max_events_per_type,
            "Postgres event store ready"
        );

        Ok(store)
    }

    /// Connect a small pool to `database_url` and build a store on it
    pub async fn connect(database_url: &str, config: PostgresStoreConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|source| StoreError::Construction {
                step: "connect",
                source,
            })?;

        Self::new(pool, config).await
    }

    pub fn config(&self) -> &PostgresStoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        let steps = [
            ("create events table", &self.statements.create_table),
            ("create event_name index", &self.statements.create_name_index),
            ("create created_at index", &self.statements.create_time_index),
        ];

        for (step, sql) in steps {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|source| StoreError::Construction { step, source })?;
        }

        Ok(())
    }

    /// Advisory lock key, scoped to this table so other tables never contend
    fn lock_key(&self, name: &str) -> String {
        format!("{}:{}", self.config.prefix, name)
    }

    async fn insert_and_trim(&self, event: &Event) -> Result<u64, StoreError> {
        let record = StoredEvent::from_event(event, Utc::now());

        let mut tx = self.pool.begin().await?;

        let trimming = self.config.max_events_per_type > 0;

        // Writers to one name queue here until the holder commits, so each
        // trim sees every committed row and the cap holds exactly
        if trimming {
            sqlx::query(&self.statements.lock_name)
                .bind(self.lock_key(&record.name))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(&self.statements.insert)
            .bind(&record.name)
            .bind(Json(&record))
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await?;

        let trimmed = if trimming {
            sqlx::query(&self.statements.trim)
                .bind(&record.name)
                .bind(self.config.max_events_per_type)
                .execute(&mut *tx)
                .await?
                .rows_affected()
        } else {
            0
        };

        tx.commit().await?;
        Ok(trimmed)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn store_event(&self, ctx: &Context, event: &Event) -> Result<(), StoreError> {
        let trimmed = ctx.run(self.insert_and_trim(event)).await??;

        if trimmed > 0 {
            tracing::info!(
                event_name = %event.name,
                trimmed = trimmed,
                cap = self.config.max_events_per_type,
                "Trimmed stored events past retention cap"
            );
        }

        Ok(())
    }

    async fn get_events(
        &self,
        ctx: &Context,
        name: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = effective_limit(limit, self.config.max_events_per_type);

        let rows: Vec<Json<StoredEvent>> = ctx
            .run(
                sqlx::query_scalar::<_, Json<StoredEvent>>(&self.statements.select)
                    .bind(name)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await??;

        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }

    async fn clear_events(&self, ctx: &Context, name: &str) -> Result<(), StoreError> {
        let result = ctx
            .run(sqlx::query(&self.statements.delete).bind(name).execute(&self.pool))
            .await??;

        tracing::debug!(
            event_name = %name,
            deleted = result.rows_affected(),
            "Cleared events from Postgres"
        );

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("mediator_events"), "\"mediator_events\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_statements_use_quoted_table() {
        let sql = Statements::for_table("mediator_events");

        assert!(sql.create_table.contains("CREATE TABLE IF NOT EXISTS \"mediator_events\""));
        assert!(sql
            .create_name_index
            .contains("\"mediator_events_event_name_idx\" ON \"mediator_events\" (event_name)"));
        assert!(sql
            .create_time_index
            .contains("\"mediator_events_created_at_idx\" ON \"mediator_events\" (created_at)"));
        assert!(sql.insert.starts_with("INSERT INTO \"mediator_events\""));
    }

    #[test]
    fn test_ordering_is_total() {
        let sql = Statements::for_table("mediator_events");

        assert!(sql.select.contains("ORDER BY created_at DESC, id DESC"));
        assert!(sql.trim.contains("ORDER BY created_at DESC, id DESC"));
        assert!(sql.trim.contains("OFFSET $2"));
    }

    #[test]
    fn test_writers_lock_per_name_for_the_transaction() {
        let sql = Statements::for_table("mediator_events");
        assert_eq!(sql.lock_name, "SELECT pg_advisory_xact_lock(hashtext($1))");
    }

    #[test]
    fn test_default_config() {
        let config = PostgresStoreConfig::default();
        assert_eq!(config.prefix, "mediator_events");
        assert_eq!(config.max_events_per_type, 1000);
    }
}
