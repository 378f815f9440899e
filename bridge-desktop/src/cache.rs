//! File-backed cache store using Tokio
//!
//! One directory tree per account:
//!
//! ```text
//! <root>/<account>/cols/<collection_uid>/col              collection (JSON)
//! <root>/<account>/cols/<collection_uid>/items/<item_uid> item (JSON)
//! <root>/<account>/tmp/<n>                                in-flight writes
//! ```

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::{Collection, Item},
    storage::CacheStore,
};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

const COLLECTIONS_DIR: &str = "cols";
const COLLECTION_FILE: &str = "col";
const ITEMS_DIR: &str = "items";
const TMP_DIR: &str = "tmp";

/// [`CacheStore`] over plain JSON files.
pub struct FileCacheStore {
    account_dir: PathBuf,
    next_tmp: AtomicU64,
}

impl FileCacheStore {
    /// Cache for `account` under `root`.
    pub fn new(root: impl Into<PathBuf>, account: &str) -> Result<Self> {
        let account = path_component(account)?;
        Ok(Self {
            account_dir: root.into().join(account),
            next_tmp: AtomicU64::new(0),
        })
    }

    /// Platform cache directory for the application.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("notes-sync")
    }

    pub fn account_dir(&self) -> &Path {
        &self.account_dir
    }

    fn collections_dir(&self) -> PathBuf {
        self.account_dir.join(COLLECTIONS_DIR)
    }

    /// Write through a temporary file so readers never see a torn entry.
    ///
    /// Temporaries live outside `cols/` so no uid can collide with them.
    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        let tmp_dir = self.account_dir.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).await?;

        let tmp = tmp_dir.join(self.next_tmp.fetch_add(1, Ordering::Relaxed).to_string());
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            fs::remove_file(&tmp).await.ok();
            return Err(BridgeError::Io(e));
        }
        Ok(())
    }

    fn collection_dir(&self, collection_uid: &str) -> Result<PathBuf> {
        Ok(self.collections_dir().join(path_component(collection_uid)?))
    }

    fn items_dir(&self, collection_uid: &str) -> Result<PathBuf> {
        Ok(self.collection_dir(collection_uid)?.join(ITEMS_DIR))
    }

    fn item_path(&self, collection_uid: &str, item_uid: &str) -> Result<PathBuf> {
        Ok(self.items_dir(collection_uid)?.join(path_component(item_uid)?))
    }
}

/// Reject values that would escape their directory.
fn path_component(value: &str) -> Result<&str> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
    {
        return Err(BridgeError::OperationFailed(format!(
            "Invalid cache path component: {:?}",
            value
        )));
    }
    Ok(value)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BridgeError::Io(e)),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BridgeError::Io(e)),
    }
}

/// Entries of `dir`, or nothing if it does not exist.
async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BridgeError::Io(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn upsert_collection(&self, collection: &Collection) -> Result<()> {
        let items_dir = self.items_dir(&collection.uid)?;
        fs::create_dir_all(&items_dir).await?;

        let path = self.collection_dir(&collection.uid)?.join(COLLECTION_FILE);
        self.write_json(&path, collection).await?;

        debug!(collection = %collection.uid, "Cached collection");
        Ok(())
    }

    async fn remove_collection(&self, collection_uid: &str) -> Result<()> {
        remove_dir_if_exists(&self.collection_dir(collection_uid)?).await?;
        debug!(collection = %collection_uid, "Removed cached collection");
        Ok(())
    }

    async fn get_collection(&self, collection_uid: &str) -> Result<Option<Collection>> {
        let path = self.collection_dir(collection_uid)?.join(COLLECTION_FILE);
        read_json(&path).await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let mut collections = Vec::new();
        for dir in list_dir(&self.collections_dir()).await? {
            if let Some(collection) = read_json(&dir.join(COLLECTION_FILE)).await? {
                collections.push(collection);
            }
        }
        Ok(collections)
    }

    async fn bulk_set_items(&self, collection_uid: &str, items: &[Item]) -> Result<()> {
        let items_dir = self.items_dir(collection_uid)?;
        fs::create_dir_all(&items_dir).await?;

        for item in items {
            self.write_json(&self.item_path(collection_uid, &item.uid)?, item).await?;
        }

        debug!(collection = %collection_uid, items = items.len(), "Cached items");
        Ok(())
    }

    async fn get_item(&self, collection_uid: &str, item_uid: &str) -> Result<Option<Item>> {
        read_json(&self.item_path(collection_uid, item_uid)?).await
    }

    async fn list_items(&self, collection_uid: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for path in list_dir(&self.items_dir(collection_uid)?).await? {
            if let Some(item) = read_json(&path).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn clear_all(&self) -> Result<()> {
        remove_dir_if_exists(&self.account_dir).await?;
        debug!("Cleared account cache");
        Ok(())
    }
}
