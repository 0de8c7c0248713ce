//! SQLite account store: credentials and per-user usage counters.
//!
//! One table, three columns. The pool is opened once at startup and handed to
//! handlers through `AppState`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("username already taken")]
  UsernameTaken,

  #[error("unknown user")]
  UnknownUser,

  #[error("usage quota exceeded: {used} of {quota} used, {requested} requested")]
  QuotaExceeded { used: i64, quota: i64, requested: i64 },

  #[error("database error: {0}")]
  Db(#[from] sqlx::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Usage {
  pub used: i64,
  pub quota: i64,
}

impl Usage {
  pub fn remaining(&self) -> i64 {
    (self.quota - self.used).max(0)
  }
}

#[derive(Clone)]
pub struct Store {
  pool: SqlitePool,
}

impl Store {
  /// Open (creating if needed) the database and make sure the schema exists.
  pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
      .max_connections(5)
      .connect_with(options)
      .await?;

    let store = Self { pool };
    store.init_schema().await?;
    info!(target: "mcqgen_backend", "Account store ready");
    Ok(store)
  }

  /// In-memory database; a single connection so every query sees the same data.
  #[cfg(test)]
  pub async fn in_memory() -> Result<Self, StoreError> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    let store = Self { pool };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<(), StoreError> {
    sqlx::query(
      "CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 0
      )",
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self, password_hash))]
  pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
    let res = sqlx::query("INSERT INTO users (username, password_hash, usage_count) VALUES (?, ?, 0)")
      .bind(username)
      .bind(password_hash)
      .execute(&self.pool)
      .await;
    match res {
      Ok(_) => Ok(()),
      Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::UsernameTaken),
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn password_hash(&self, username: &str) -> Result<Option<String>, StoreError> {
    let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE username = ?")
      .bind(username)
      .fetch_optional(&self.pool)
      .await?;
    Ok(hash)
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn usage(&self, username: &str, quota: i64) -> Result<Usage, StoreError> {
    let used = sqlx::query_scalar::<_, i64>("SELECT usage_count FROM users WHERE username = ?")
      .bind(username)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(StoreError::UnknownUser)?;
    Ok(Usage { used, quota })
  }

  /// Atomically add `amount` to the user's usage if it stays within `quota`.
  ///
  /// The check and the increment are one conditional UPDATE inside a transaction,
  /// so concurrent requests from the same user cannot both pass the check.
  #[instrument(level = "info", skip(self))]
  pub async fn reserve_usage(&self, username: &str, amount: i64, quota: i64) -> Result<Usage, StoreError> {
    let mut tx = self.pool.begin().await?;

    let updated = sqlx::query(
      "UPDATE users SET usage_count = usage_count + ?1
       WHERE username = ?2 AND usage_count + ?1 <= ?3",
    )
    .bind(amount)
    .bind(username)
    .bind(quota)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let used = sqlx::query_scalar::<_, i64>("SELECT usage_count FROM users WHERE username = ?")
      .bind(username)
      .fetch_optional(&mut *tx)
      .await?;

    match (updated, used) {
      (_, None) => {
        tx.rollback().await?;
        Err(StoreError::UnknownUser)
      }
      (0, Some(used)) => {
        tx.rollback().await?;
        warn!(target: "mcq", %username, used, quota, requested = amount, "Usage quota exceeded");
        Err(StoreError::QuotaExceeded { used, quota, requested: amount })
      }
      (_, Some(used)) => {
        tx.commit().await?;
        info!(target: "mcq", %username, used, quota, "Usage reserved");
        Ok(Usage { used, quota })
      }
    }
  }

  /// Give back `amount` reserved units that were not delivered. Never drops below zero.
  #[instrument(level = "info", skip(self))]
  pub async fn release_usage(&self, username: &str, amount: i64, quota: i64) -> Result<Usage, StoreError> {
    let used = sqlx::query_scalar::<_, i64>(
      "UPDATE users SET usage_count = MAX(usage_count - ?1, 0)
       WHERE username = ?2
       RETURNING usage_count",
    )
    .bind(amount)
    .bind(username)
    .fetch_optional(&self.pool)
    .await?
    .ok_or(StoreError::UnknownUser)?;
    info!(target: "mcq", %username, used, quota, released = amount, "Usage released");
    Ok(Usage { used, quota })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn duplicate_username_is_rejected() {
    let store = Store::in_memory().await.expect("store");
    store.create_user("ada", "hash-1").await.expect("first insert");
    assert!(matches!(store.create_user("ada", "hash-2").await, Err(StoreError::UsernameTaken)));
    assert_eq!(store.password_hash("ada").await.expect("query").as_deref(), Some("hash-1"));
    assert_eq!(store.password_hash("grace").await.expect("query"), None);
  }

  #[tokio::test]
  async fn reservation_stops_at_quota() {
    let store = Store::in_memory().await.expect("store");
    store.create_user("ada", "h").await.expect("insert");

    assert_eq!(store.reserve_usage("ada", 10, 15).await.expect("first").used, 10);
    assert_eq!(store.reserve_usage("ada", 5, 15).await.expect("second").used, 15);

    match store.reserve_usage("ada", 1, 15).await {
      Err(StoreError::QuotaExceeded { used, quota, requested }) => {
        assert_eq!((used, quota, requested), (15, 15, 1));
      }
      other => panic!("expected quota error, got {other:?}"),
    }
    let usage = store.usage("ada", 15).await.expect("usage");
    assert_eq!(usage.used, 15);
    assert_eq!(usage.remaining(), 0);
  }

  #[tokio::test]
  async fn rejected_reservation_leaves_count_untouched() {
    let store = Store::in_memory().await.expect("store");
    store.create_user("ada", "h").await.expect("insert");
    store.reserve_usage("ada", 4, 15).await.expect("reserve");
    assert!(store.reserve_usage("ada", 12, 15).await.is_err());
    assert_eq!(store.usage("ada", 15).await.expect("usage").used, 4);
  }

  #[tokio::test]
  async fn released_units_can_be_reserved_again() {
    let store = Store::in_memory().await.expect("store");
    store.create_user("ada", "h").await.expect("insert");
    store.reserve_usage("ada", 10, 15).await.expect("reserve");

    assert_eq!(store.release_usage("ada", 9, 15).await.expect("release").used, 1);
    assert_eq!(store.reserve_usage("ada", 14, 15).await.expect("reserve again").used, 15);
    assert_eq!(store.release_usage("ada", 40, 15).await.expect("over-release").used, 0);
    assert!(matches!(store.release_usage("nobody", 1, 15).await, Err(StoreError::UnknownUser)));
  }

  #[tokio::test]
  async fn unknown_user_cannot_reserve() {
    let store = Store::in_memory().await.expect("store");
    assert!(matches!(store.reserve_usage("nobody", 1, 15).await, Err(StoreError::UnknownUser)));
    assert!(matches!(store.usage("nobody", 15).await, Err(StoreError::UnknownUser)));
  }

  #[tokio::test]
  async fn concurrent_reservations_never_overshoot() {
    let store = Store::in_memory().await.expect("store");
    store.create_user("ada", "h").await.expect("insert");

    let tasks: Vec<_> = (0..10)
      .map(|_| {
        let s = store.clone();
        tokio::spawn(async move { s.reserve_usage("ada", 3, 15).await.is_ok() })
      })
      .collect();
    let mut granted = 0;
    for t in tasks {
      if t.await.expect("join") {
        granted += 1;
      }
    }
    assert_eq!(granted, 5);
    assert_eq!(store.usage("ada", 15).await.expect("usage").used, 15);
  }
}
