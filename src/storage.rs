//! Credential Store: durable persistence for the session triple.
//!
//! Dumb backend by contract. Nothing here validates the token; the
//! session manager owns all interpretation of what it stores.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use sled::{Batch, Db};

use crate::error::Result;
use crate::models::Credential;

pub const TOKEN_KEY: &str = "jwt";
pub const ROLE_KEY: &str = "userRole";
pub const USER_ID_KEY: &str = "userID";

pub trait CredentialStore: Send + Sync {
    fn save(&self, credential: &Credential) -> Result<()>;
    /// Missing values read back as empty strings.
    fn load(&self) -> Result<Credential>;
    fn clear(&self) -> Result<()>;
}

/// Sled-backed store; survives process restarts.
#[derive(Clone)]
pub struct SledCredentialStore {
    #[allow(dead_code)] // keeps the database handle alive alongside the tree
    db: Db,
    tree: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let tree = db.open_tree("credentials")?;
        Ok(Self { db, tree })
    }

    fn read(&self, key: &str) -> Result<String> {
        Ok(self
            .tree
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default())
    }
}

impl CredentialStore for SledCredentialStore {
    fn save(&self, credential: &Credential) -> Result<()> {
        // All three keys land together or not at all
        let mut batch = Batch::default();
        batch.insert(TOKEN_KEY.as_bytes(), credential.token.as_bytes());
        batch.insert(ROLE_KEY.as_bytes(), credential.role.as_bytes());
        batch.insert(USER_ID_KEY.as_bytes(), credential.user_id.as_bytes());
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }

    fn load(&self) -> Result<Credential> {
        Ok(Credential {
            token: self.read(TOKEN_KEY)?,
            role: self.read(ROLE_KEY)?,
            user_id: self.read(USER_ID_KEY)?,
        })
    }

    fn clear(&self) -> Result<()> {
        let mut batch = Batch::default();
        for key in [TOKEN_KEY, ROLE_KEY, USER_ID_KEY] {
            batch.remove(key.as_bytes());
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }
}

/// In-process store for embedding and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: &Credential) -> Self {
        let store = Self::default();
        store.put(credential);
        store
    }

    fn put(&self, credential: &Credential) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(TOKEN_KEY, credential.token.clone());
        values.insert(ROLE_KEY, credential.role.clone());
        values.insert(USER_ID_KEY, credential.user_id.clone());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, credential: &Credential) -> Result<()> {
        self.put(credential);
        Ok(())
    }

    fn load(&self) -> Result<Credential> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let get = |k: &str| values.get(k).cloned().unwrap_or_default();
        Ok(Credential {
            token: get(TOKEN_KEY),
            role: get(ROLE_KEY),
            user_id: get(USER_ID_KEY),
        })
    }

    fn clear(&self) -> Result<()> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}
