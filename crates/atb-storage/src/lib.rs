//! Optional persisted bot state.
//!
//! [`Store::Disabled`] answers every read with an empty value and drops
//! writes, so callers never branch on whether a database is configured.

use serde_json::Value;

use atb_core::{domain::UserId, Result};

pub mod sqlite;

pub use sqlite::SqliteStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredUser {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Unix seconds.
    pub first_seen: i64,
    pub last_seen: i64,
}

#[derive(Clone, Debug)]
pub enum Store {
    Disabled,
    Sqlite(SqliteStore),
}

impl Store {
    /// Connect when a database URL is given; `Disabled` otherwise.
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) => Ok(Store::Sqlite(SqliteStore::connect(url).await?)),
            None => {
                tracing::info!("database disabled");
                Ok(Store::Disabled)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Store::Sqlite(_))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Disabled => "disabled",
            Store::Sqlite(_) => "sqlite",
        }
    }

    pub async fn close(&self) {
        if let Store::Sqlite(s) = self {
            s.close().await;
        }
    }

    /// Insert or refresh a user record.
    pub async fn add_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        match self {
            Store::Disabled => Ok(()),
            Store::Sqlite(s) => s.add_user(user_id, username, first_name).await,
        }
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        match self {
            Store::Disabled => Ok(None),
            Store::Sqlite(s) => s.get_user(user_id).await,
        }
    }

    pub async fn all_user_ids(&self) -> Result<Vec<UserId>> {
        match self {
            Store::Disabled => Ok(Vec::new()),
            Store::Sqlite(s) => s.all_user_ids().await,
        }
    }

    pub async fn user_count(&self) -> Result<i64> {
        match self {
            Store::Disabled => Ok(0),
            Store::Sqlite(s) => s.user_count().await,
        }
    }

    pub async fn set_data(&self, namespace: &str, key: &str, value: &Value) -> Result<()> {
        match self {
            Store::Disabled => Ok(()),
            Store::Sqlite(s) => s.set_data(namespace, key, value).await,
        }
    }

    pub async fn get_data(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        match self {
            Store::Disabled => Ok(None),
            Store::Sqlite(s) => s.get_data(namespace, key).await,
        }
    }

    /// Returns whether a value was removed.
    pub async fn delete_data(&self, namespace: &str, key: &str) -> Result<bool> {
        match self {
            Store::Disabled => Ok(false),
            Store::Sqlite(s) => s.delete_data(namespace, key).await,
        }
    }

    pub async fn increment_stat(&self, stat: &str, by: i64) -> Result<()> {
        match self {
            Store::Disabled => Ok(()),
            Store::Sqlite(s) => s.increment_stat(stat, by).await,
        }
    }

    pub async fn get_stat(&self, stat: &str) -> Result<i64> {
        match self {
            Store::Disabled => Ok(0),
            Store::Sqlite(s) => s.get_stat(stat).await,
        }
    }

    /// Row counts per table, plus one `kv:<namespace>` entry per namespace.
    pub async fn collection_counts(&self) -> Result<Vec<(String, i64)>> {
        match self {
            Store::Disabled => Ok(Vec::new()),
            Store::Sqlite(s) => s.collection_counts().await,
        }
    }
}
