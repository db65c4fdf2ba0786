//! Session registry of mountable vector databases.
//!
//! Retrieval takes a read guard for the whole merge so a database cannot be
//! mounted or unmounted while it is being searched; mount changes take the
//! write guard and therefore wait for in-flight merges.

use std::sync::Arc;

use contextweave_core::knowledge::VectorStore;
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

struct MountEntry {
    name: String,
    store: Arc<dyn VectorStore>,
    mounted: bool,
}

/// Name and state of a registered database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountStatus {
    pub name: String,
    pub mounted: bool,
}

#[derive(Clone, Default)]
pub struct StoreMounts {
    entries: Arc<RwLock<Vec<MountEntry>>>,
}

impl StoreMounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name` and mount it. Replaces any database
    /// already registered with that name.
    pub async fn mount(&self, name: impl Into<String>, store: Arc<dyn VectorStore>) {
        let name = name.into();
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.name != name);
        info!(database = %name, "Database mounted");
        entries.push(MountEntry {
            name,
            store,
            mounted: true,
        });
    }

    /// Register `store` without mounting it.
    pub async fn register(&self, name: impl Into<String>, store: Arc<dyn VectorStore>) {
        let name = name.into();
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.name != name);
        entries.push(MountEntry {
            name,
            store,
            mounted: false,
        });
    }

    /// Stop searching `name`. False when no such database is registered.
    pub async fn unmount(&self, name: &str) -> bool {
        self.set_mounted(name, Some(false)).await.is_some()
    }

    /// Flip the mount state of `name`, returning the new state.
    pub async fn toggle(&self, name: &str) -> Option<bool> {
        self.set_mounted(name, None).await
    }

    pub async fn snapshot(&self) -> Vec<MountStatus> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| MountStatus {
                name: e.name.clone(),
                mounted: e.mounted,
            })
            .collect()
    }

    /// Hold the registry for reading for as long as the guard lives.
    pub async fn read(&self) -> ActiveStores<'_> {
        ActiveStores {
            guard: self.entries.read().await,
        }
    }

    async fn set_mounted(&self, name: &str, state: Option<bool>) -> Option<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries.iter_mut().find(|e| e.name == name)?;
        entry.mounted = state.unwrap_or(!entry.mounted);
        info!(database = %name, mounted = entry.mounted, "Database mount state changed");
        Some(entry.mounted)
    }
}

/// A read view over the registry.
pub struct ActiveStores<'a> {
    guard: RwLockReadGuard<'a, Vec<MountEntry>>,
}

impl ActiveStores<'_> {
    /// Mounted databases in registration order.
    pub fn stores(&self) -> Vec<Arc<dyn VectorStore>> {
        self.guard
            .iter()
            .filter(|e| e.mounted)
            .map(|e| Arc::clone(&e.store))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.guard.iter().any(|e| e.mounted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedStore;
    use std::time::Duration;

    fn store(name: &str) -> Arc<dyn VectorStore> {
        Arc::new(ScriptedStore::new(name, vec![]))
    }

    #[tokio::test]
    async fn mount_unmount_toggle() {
        let mounts = StoreMounts::new();
        mounts.mount("docs", store("docs")).await;
        mounts.register("notes", store("notes")).await;

        assert_eq!(mounts.read().await.stores().len(), 1);
        assert_eq!(mounts.toggle("notes").await, Some(true));
        assert_eq!(mounts.read().await.stores().len(), 2);
        assert!(mounts.unmount("docs").await);
        assert!(!mounts.unmount("missing").await);
        assert_eq!(mounts.toggle("missing").await, None);

        let names: Vec<_> = mounts.read().await.stores().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["notes"]);
        assert_eq!(
            mounts.snapshot().await,
            vec![
                MountStatus { name: "docs".into(), mounted: false },
                MountStatus { name: "notes".into(), mounted: true },
            ]
        );
    }

    #[tokio::test]
    async fn remount_replaces_entry() {
        let mounts = StoreMounts::new();
        mounts.mount("docs", store("old")).await;
        mounts.mount("docs", store("new")).await;
        let stores = mounts.read().await.stores();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name(), "new");
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_waits_for_readers() {
        let mounts = StoreMounts::new();
        mounts.mount("docs", store("docs")).await;

        let guard = mounts.read().await;
        let writer = {
            let mounts = mounts.clone();
            tokio::spawn(async move { mounts.unmount("docs").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!writer.is_finished());
        assert_eq!(guard.stores().len(), 1);
        drop(guard);

        assert!(writer.await.unwrap());
        assert!(mounts.read().await.is_empty());
    }
}
