//! Zone configuration store (SQLite)

use error_stack::{Report, ResultExt};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;

use crate::command_payload::{MAX_LEVEL, ZONE_COUNT};
use crate::zone_payload::{Zone, ZoneCreate, ZoneType, ZoneUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Zone {0} not found")]
    ZoneNotFound(i64),

    #[error("Hardware zone {0} is already configured")]
    DuplicateZoneNumber(i64),

    #[error("Invalid zone number {0} (valid zones are 1-32)")]
    InvalidZone(i64),

    #[error("Invalid zone type {0}")]
    InvalidZoneType(i64),

    #[error("Invalid default level {0} (valid levels are 0-100)")]
    InvalidLevel(i64),

    #[error("Database error: {0}")]
    Database(
        #[from]
        #[source]
        sqlx::Error,
    ),

    #[error("Database migration failed")]
    Migration,

    #[error("In context of '{0}'")]
    Context(String),
}

pub type StoreResult<T> = std::result::Result<T, Report<StoreError>>;

const ZONE_COLUMNS: &str = "id, name, zone, zonetypeid, default_level";

#[derive(Clone)]
pub struct ZoneStore {
    pool: SqlitePool,
}

impl ZoneStore {
    /// Open (creating if missing) the database file and apply migrations
    pub async fn open(db_path: &str) -> StoreResult<ZoneStore> {
        let into_context = || StoreError::Context(format!("Opening zone database {db_path}"));

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .change_context_lazy(into_context)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .change_context_lazy(into_context)?;

        info!("Zone database {} opened", db_path);

        ZoneStore::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<ZoneStore> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StoreError::Migration)?;

        Ok(ZoneStore { pool })
    }

    pub async fn list_zones(&self) -> StoreResult<Vec<Zone>> {
        let zones = sqlx::query_as::<_, Zone>(&format!("SELECT {ZONE_COLUMNS} FROM zone ORDER BY zone"))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(zones)
    }

    pub async fn get_zone(&self, id: i64) -> StoreResult<Zone> {
        sqlx::query_as::<_, Zone>(&format!("SELECT {ZONE_COLUMNS} FROM zone WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::ZoneNotFound(id).into())
    }

    pub async fn find_by_zone_number(&self, zone: i64) -> StoreResult<Option<Zone>> {
        let zone = sqlx::query_as::<_, Zone>(&format!("SELECT {ZONE_COLUMNS} FROM zone WHERE zone = ?"))
            .bind(zone)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(zone)
    }

    pub async fn list_zone_types(&self) -> StoreResult<Vec<ZoneType>> {
        let zone_types = sqlx::query_as::<_, ZoneType>("SELECT id, name FROM zonetype ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(zone_types)
    }

    async fn check_zone_type(&self, zonetypeid: i64) -> StoreResult<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM zonetype WHERE id = ?")
            .bind(zonetypeid)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::InvalidZoneType(zonetypeid).into()),
        }
    }

    fn check_level(default_level: i64) -> StoreResult<()> {
        if (0..=MAX_LEVEL as i64).contains(&default_level) {
            Ok(())
        } else {
            Err(StoreError::InvalidLevel(default_level).into())
        }
    }

    pub async fn create_zone(&self, data: ZoneCreate) -> StoreResult<Zone> {
        if !(1..=ZONE_COUNT as i64).contains(&data.zone) {
            return Err(StoreError::InvalidZone(data.zone).into());
        }
        ZoneStore::check_level(data.default_level)?;
        self.check_zone_type(data.zonetypeid).await?;

        if self.find_by_zone_number(data.zone).await?.is_some() {
            return Err(StoreError::DuplicateZoneNumber(data.zone).into());
        }

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO zone (name, zone, zonetypeid, default_level) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&data.name)
        .bind(data.zone)
        .bind(data.zonetypeid)
        .bind(data.default_level)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            // Lost a race with another create for the same hardware zone
            Some(db_error) if db_error.is_unique_violation() => StoreError::DuplicateZoneNumber(data.zone),
            _ => StoreError::from(e),
        })?;

        info!("Zone {} ({}) created for hardware zone {}", id, data.name, data.zone);
        self.get_zone(id).await
    }

    pub async fn update_zone(&self, id: i64, data: ZoneUpdate) -> StoreResult<Zone> {
        if let Some(default_level) = data.default_level {
            ZoneStore::check_level(default_level)?;
        }
        if let Some(zonetypeid) = data.zonetypeid {
            self.check_zone_type(zonetypeid).await?;
        }

        let rows = sqlx::query(
            "UPDATE zone SET name = COALESCE(?1, name), zonetypeid = COALESCE(?2, zonetypeid), default_level = COALESCE(?3, default_level) WHERE id = ?4",
        )
        .bind(data.name)
        .bind(data.zonetypeid)
        .bind(data.default_level)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if rows.rows_affected() == 0 {
            return Err(StoreError::ZoneNotFound(id).into());
        }

        self.get_zone(id).await
    }

    pub async fn delete_zone(&self, id: i64) -> StoreResult<()> {
        let rows = sqlx::query("DELETE FROM zone WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        if rows.rows_affected() == 0 {
            return Err(StoreError::ZoneNotFound(id).into());
        }

        info!("Zone {} deleted", id);
        Ok(())
    }
}
