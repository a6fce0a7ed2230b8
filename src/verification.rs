//! Verification Ledger
//!
//! Tracks which users have unlocked the bot. The ledger only grows:
//! a user flips from unverified to verified once and never back.
//! Writes go through a single connection behind a mutex, and the
//! `user_id` primary key makes re-appending the same id a no-op.

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// Durable set of verified user ids
pub trait VerificationStore: Send + Sync {
    /// Has this user unlocked the bot?
    fn is_verified(&self, user_id: i64) -> Result<bool>;

    /// Record the user as verified. Idempotent.
    fn mark_verified(&self, user_id: i64) -> Result<()>;
}

/// Verification ledger with SQLite backend
pub struct SqliteVerificationStore {
    conn: Mutex<Connection>,
}

impl SqliteVerificationStore {
    /// Create or open the ledger database
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// In-memory ledger (tests, dry runs)
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS verified_users (
                user_id INTEGER PRIMARY KEY,
                verified_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of verified users
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM verified_users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rows recorded for a single user (0 or 1)
    pub fn entries_for(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM verified_users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// When the user was verified (unix seconds)
    pub fn verified_at(&self, user_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let at = conn
            .query_row(
                "SELECT verified_at FROM verified_users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(at)
    }
}

impl VerificationStore for SqliteVerificationStore {
    fn is_verified(&self, user_id: i64) -> Result<bool> {
        Ok(self.verified_at(user_id)?.is_some())
    }

    fn mark_verified(&self, user_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO verified_users (user_id, verified_at) VALUES (?1, ?2)",
            params![user_id, chrono::Utc::now().timestamp()],
        )?;
        if inserted > 0 {
            tracing::info!("User {} verified", user_id);
        }
        Ok(())
    }
}

/// Process-local ledger, lost on restart
#[derive(Default)]
pub struct InMemoryVerificationStore {
    verified: Mutex<HashSet<i64>>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verified(users: &[i64]) -> Self {
        Self {
            verified: Mutex::new(users.iter().copied().collect()),
        }
    }
}

impl VerificationStore for InMemoryVerificationStore {
    fn is_verified(&self, user_id: i64) -> Result<bool> {
        Ok(self.verified.lock().contains(&user_id))
    }

    fn mark_verified(&self, user_id: i64) -> Result<()> {
        self.verified.lock().insert(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_user_not_verified() {
        let store = SqliteVerificationStore::in_memory().unwrap();
        assert!(!store.is_verified(42).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_mark_verified_is_idempotent() {
        let store = SqliteVerificationStore::in_memory().unwrap();
        store.mark_verified(42).unwrap();
        let first_at = store.verified_at(42).unwrap();

        store.mark_verified(42).unwrap();

        assert!(store.is_verified(42).unwrap());
        assert_eq!(store.entries_for(42).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
        // Re-marking keeps the original timestamp
        assert_eq!(store.verified_at(42).unwrap(), first_at);
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("verified.db");

        {
            let store = SqliteVerificationStore::open(&path).unwrap();
            store.mark_verified(7).unwrap();
        }

        let store = SqliteVerificationStore::open(&path).unwrap();
        assert!(store.is_verified(7).unwrap());
        assert!(!store.is_verified(8).unwrap());
    }

    #[test]
    fn test_concurrent_marks_single_entry() {
        let store = Arc::new(SqliteVerificationStore::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.mark_verified(99).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.entries_for(99).unwrap(), 1);
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryVerificationStore::with_verified(&[1]);
        assert!(store.is_verified(1).unwrap());
        assert!(!store.is_verified(2).unwrap());
        store.mark_verified(2).unwrap();
        store.mark_verified(2).unwrap();
        assert!(store.is_verified(2).unwrap());
    }
}
