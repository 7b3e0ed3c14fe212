// Credential storage backends

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use super::types::{CredentialPair, UserProfile};

const CREDENTIALS_KEY: &str = "session:credentials";
const USER_KEY: &str = "session:user";

/// Key-value persistence for the current session
///
/// Implementations have no concurrency policy of their own; the refresh
/// coordinator is the only writer during a refresh.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<CredentialPair>>;

    fn set(&self, pair: &CredentialPair) -> Result<()>;

    /// Remove the credential pair and the cached user
    fn clear(&self) -> Result<()>;

    fn user(&self) -> Result<Option<UserProfile>>;

    fn set_user(&self, user: &UserProfile) -> Result<()>;
}

/// In-process store, lost on restart
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<(Option<CredentialPair>, Option<UserProfile>)>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(pair: CredentialPair) -> Self {
        Self {
            inner: Mutex::new((Some(pair), None)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<CredentialPair>> {
        Ok(self.inner.lock().0.clone())
    }

    fn set(&self, pair: &CredentialPair) -> Result<()> {
        self.inner.lock().0 = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock() = (None, None);
        Ok(())
    }

    fn user(&self) -> Result<Option<UserProfile>> {
        Ok(self.inner.lock().1.clone())
    }

    fn set_user(&self, user: &UserProfile) -> Result<()> {
        self.inner.lock().1 = Some(user.clone());
        Ok(())
    }
}

/// Durable store backed by an `auth_kv` table in a SQLite database
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to load {} from SQLite", key))?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .with_context(|| format!("Failed to parse {} from SQLite", key)),
        }
    }

    fn write<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, json.as_str()],
            )
            .with_context(|| format!("Failed to store {} in SQLite", key))?;
        Ok(())
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn get(&self) -> Result<Option<CredentialPair>> {
        self.read(CREDENTIALS_KEY)
    }

    fn set(&self, pair: &CredentialPair) -> Result<()> {
        self.write(CREDENTIALS_KEY, pair)
    }

    fn clear(&self) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM auth_kv WHERE key IN (?1, ?2)",
                [CREDENTIALS_KEY, USER_KEY],
            )
            .context("Failed to clear session from SQLite")?;
        Ok(())
    }

    fn user(&self) -> Result<Option<UserProfile>> {
        self.read(USER_KEY)
    }

    fn set_user(&self, user: &UserProfile) -> Result<()> {
        self.write(USER_KEY, user)
    }
}
