//! Durable room store.
//!
//! The repository talks to the database through [`RoomStore`] so tests can
//! substitute an in-memory store. [`PgRoomStore`] is the PostgreSQL
//! implementation.
//!
//! Column mapping is declared once in the SQL below; field order in the
//! `bind` chains must match the `$n` placeholders.

use crate::errors::GameError;
use crate::models::{App, RoomInfo};
use crate::observability::metrics;

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::AppId;
use sqlx::types::Json;
use sqlx::{Acquire, PgPool, Postgres, Row, Transaction};
use std::time::Instant;
use tracing::{debug, instrument};

const INSERT_ROOM: &str = r#"
    INSERT INTO room (
        id, app_id, host_id, visible, watchable, search_group,
        client_deadline, max_players, players, public_props,
        private_props, created, number
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

const UPDATE_ROOM: &str = r#"
    UPDATE room SET
        app_id = $2, host_id = $3, visible = $4, watchable = $5,
        search_group = $6, client_deadline = $7, max_players = $8,
        players = $9, public_props = $10, private_props = $11,
        created = $12, number = $13
    WHERE id = $1
"#;

const SELECT_APPS: &str = r#"SELECT id, "key" FROM app"#;

/// Room persistence used by the repository.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// All registered applications and their keys.
    async fn load_apps(&self) -> Result<Vec<App>, GameError>;

    /// Open a transaction for one room creation.
    async fn begin(&self) -> Result<Box<dyn RoomTransaction>, GameError>;

    /// Overwrite the stored record with the same id.
    async fn update_room(&self, info: &RoomInfo) -> Result<(), GameError>;
}

/// Transaction scoped to one room creation.
///
/// A failed `insert_room` leaves the transaction usable so the caller can
/// retry with a fresh id.
#[async_trait]
pub trait RoomTransaction: Send {
    /// Insert a room. Fails if the id is already taken.
    async fn insert_room(&mut self, info: &RoomInfo) -> Result<(), GameError>;

    async fn commit(self: Box<Self>) -> Result<(), GameError>;

    async fn rollback(self: Box<Self>) -> Result<(), GameError>;
}

/// PostgreSQL room store.
#[derive(Clone)]
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomStore for PgRoomStore {
    #[instrument(skip_all, name = "game.repo.load_apps")]
    async fn load_apps(&self) -> Result<Vec<App>, GameError> {
        let start = Instant::now();

        let rows = sqlx::query(SELECT_APPS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("load_apps", "error", start.elapsed());
                GameError::Database(e.to_string())
            })?;

        metrics::record_db_query("load_apps", "success", start.elapsed());

        rows.into_iter().map(map_row_to_app).collect()
    }

    #[instrument(skip_all, name = "game.repo.begin")]
    async fn begin(&self) -> Result<Box<dyn RoomTransaction>, GameError> {
        let start = Instant::now();

        let tx = self.pool.begin().await.map_err(|e| {
            metrics::record_db_query("begin", "error", start.elapsed());
            GameError::Database(e.to_string())
        })?;

        metrics::record_db_query("begin", "success", start.elapsed());
        Ok(Box::new(PgRoomTransaction { tx }))
    }

    #[instrument(skip_all, name = "game.repo.update_room", fields(room_id = %info.id))]
    async fn update_room(&self, info: &RoomInfo) -> Result<(), GameError> {
        let start = Instant::now();

        let result = sqlx::query(UPDATE_ROOM)
            .bind(info.id.as_str()) // $1
            .bind(info.app_id.as_str()) // $2
            .bind(i64::from(info.host_id)) // $3
            .bind(info.visible) // $4
            .bind(info.watchable) // $5
            .bind(i64::from(info.search_group)) // $6
            .bind(i64::from(info.client_deadline)) // $7
            .bind(i64::from(info.max_players)) // $8
            .bind(i64::from(info.players)) // $9
            .bind(Json(info.public_props.clone())) // $10
            .bind(Json(info.private_props.clone())) // $11
            .bind(info.created) // $12
            .bind(info.number) // $13
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("update_room", "error", start.elapsed());
                GameError::Database(e.to_string())
            })?;

        metrics::record_db_query("update_room", "success", start.elapsed());

        if result.rows_affected() == 0 {
            return Err(GameError::RoomNotFound(info.id.clone()));
        }
        Ok(())
    }
}

/// Open PostgreSQL transaction.
pub struct PgRoomTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RoomTransaction for PgRoomTransaction {
    #[instrument(skip_all, name = "game.repo.insert_room", fields(room_id = %info.id))]
    async fn insert_room(&mut self, info: &RoomInfo) -> Result<(), GameError> {
        let start = Instant::now();

        // A failed statement aborts a PostgreSQL transaction, so each
        // attempt runs inside its own savepoint.
        let mut savepoint = (&mut *self.tx).begin().await?;

        let result = sqlx::query(INSERT_ROOM)
            .bind(info.id.as_str()) // $1
            .bind(info.app_id.as_str()) // $2
            .bind(i64::from(info.host_id)) // $3
            .bind(info.visible) // $4
            .bind(info.watchable) // $5
            .bind(i64::from(info.search_group)) // $6
            .bind(i64::from(info.client_deadline)) // $7
            .bind(i64::from(info.max_players)) // $8
            .bind(i64::from(info.players)) // $9
            .bind(Json(info.public_props.clone())) // $10
            .bind(Json(info.private_props.clone())) // $11
            .bind(info.created) // $12
            .bind(info.number) // $13
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                metrics::record_db_query("insert_room", "success", start.elapsed());
                Ok(())
            }
            Err(e) => {
                savepoint.rollback().await?;
                metrics::record_db_query("insert_room", "error", start.elapsed());
                debug!(target: "game.repo", error = %e, "Room insert rejected");
                Err(GameError::Database(e.to_string()))
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), GameError> {
        let start = Instant::now();
        self.tx.commit().await.map_err(|e| {
            metrics::record_db_query("commit", "error", start.elapsed());
            GameError::Database(e.to_string())
        })?;
        metrics::record_db_query("commit", "success", start.elapsed());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), GameError> {
        let start = Instant::now();
        self.tx.rollback().await.map_err(|e| {
            metrics::record_db_query("rollback", "error", start.elapsed());
            GameError::Database(e.to_string())
        })?;
        metrics::record_db_query("rollback", "success", start.elapsed());
        Ok(())
    }
}

fn map_row_to_app(row: sqlx::postgres::PgRow) -> Result<App, GameError> {
    let id: String = row.try_get("id")?;
    let key: String = row.try_get("key")?;
    Ok(App {
        id: AppId::from(id),
        key: SecretString::from(key),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        (1..=20).filter(|n| sql.contains(&format!("${n}"))).count()
    }

    #[test]
    fn test_insert_and_update_bind_every_column() {
        assert_eq!(placeholders(INSERT_ROOM), 13);
        assert_eq!(placeholders(UPDATE_ROOM), 13);
        assert!(UPDATE_ROOM.contains("WHERE id = $1"));
    }
}
