//! Stockage dans un répertoire : un document JSON par ingestion
//!
//! `<id>.json` contient le document complet, `<id>.meta.json` ses métadonnées.
//! Chaque fichier est écrit dans un fichier temporaire puis renommé ; les
//! métadonnées sont écrites en dernier et rendent l'ingestion visible.

use super::{validate_run_id, PacketFilter, PacketSlice, RunDocument, RunStore};
use crate::error::StorageError;
use crate::models::{RunInfo, StatsSnapshot};
use async_trait::async_trait;
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

const META_SUFFIX: &str = ".meta.json";

#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    // Dernier document lu, pour les pages successives d'une même ingestion
    last_loaded: RwLock<Option<Arc<RunDocument>>>,
}

impl DirectoryStore {
    /// Ouvre le répertoire, en le créant au besoin
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            last_loaded: RwLock::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}{}", id, META_SUFFIX))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written = async {
            fs::write(&tmp, bytes).await?;
            fs::rename(&tmp, path).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Arc<RunDocument>>, StorageError> {
        validate_run_id(id)?;
        if let Some(doc) = self.last_loaded.read().await.as_ref() {
            if doc.info.id == id {
                return Ok(Some(doc.clone()));
            }
        }

        let bytes = match fs::read(self.document_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: Arc<RunDocument> = Arc::new(serde_json::from_slice(&bytes)?);
        *self.last_loaded.write().await = Some(doc.clone());
        Ok(Some(doc))
    }
}

#[async_trait]
impl RunStore for DirectoryStore {
    async fn store_run(&self, document: RunDocument) -> Result<(), StorageError> {
        let id = document.info.id.clone();
        validate_run_id(&id)?;

        let document_path = self.document_path(&id);
        if fs::try_exists(&document_path).await? {
            return Err(StorageError::AlreadyExists(id));
        }

        let body = serde_json::to_vec(&document)?;
        let meta = serde_json::to_vec_pretty(&document.info)?;

        Self::write_atomic(&document_path, &body).await?;
        if let Err(e) = Self::write_atomic(&self.meta_path(&id), &meta).await {
            error!("Métadonnées de {} non écrites, document retiré: {}", id, e);
            let _ = fs::remove_file(&document_path).await;
            return Err(e);
        }

        info!(
            "Ingestion {} écrite dans {} ({} octets)",
            id,
            self.root.display(),
            body.len()
        );
        *self.last_loaded.write().await = Some(Arc::new(document));
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunInfo>, StorageError> {
        validate_run_id(id)?;
        match fs::read(self.meta_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, StorageError> {
        Ok(self.load(id).await?.map(|doc| doc.snapshot.clone()))
    }

    async fn get_packets(
        &self,
        id: &str,
        skip: usize,
        limit: usize,
        filter: &PacketFilter,
    ) -> Result<Option<PacketSlice>, StorageError> {
        Ok(self
            .load(id)
            .await?
            .map(|doc| PacketSlice::from_packets(&doc.packets, skip, limit, filter)))
    }

    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<RunInfo>, StorageError> {
        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(META_SUFFIX) {
                continue;
            }
            let bytes = fs::read(entry.path()).await?;
            match serde_json::from_slice::<RunInfo>(&bytes) {
                Ok(info) => runs.push(info),
                Err(e) => warn!("Métadonnées illisibles ignorées ({}): {}", name, e),
            }
        }

        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(runs.into_iter().skip(skip).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::document;

    #[tokio::test]
    async fn test_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let doc = document("run-a", 12, 0);
        let expected = doc.snapshot.clone();
        store.store_run(doc).await.unwrap();

        assert!(dir.path().join("run-a.json").exists());
        assert!(dir.path().join("run-a.meta.json").exists());
        assert!(!dir.path().join("run-a.json.tmp").exists());

        // Nouvelle instance : lecture depuis le disque
        let reopened = DirectoryStore::open(dir.path()).unwrap();
        let snapshot = reopened.get_snapshot("run-a").await.unwrap().unwrap();
        assert_eq!(snapshot.total_bytes, expected.total_bytes);
        assert_eq!(snapshot.protocol_counts, expected.protocol_counts);
        assert_eq!(snapshot.ip_counters, expected.ip_counters);
        assert_eq!(snapshot.packet_sizes, expected.packet_sizes);
        let page = reopened
            .get_packets("run-a", 10, 10, &PacketFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((page.total, page.items.len()), (12, 2));
    }

    #[tokio::test]
    async fn test_listing_and_missing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.store_run(document("old", 2, 0)).await.unwrap();
        store.store_run(document("new", 2, 60)).await.unwrap();
        // Fichier étranger : ignoré
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let ids: Vec<String> = store.list_runs(0, 10).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(store.latest_run_id().await.unwrap().as_deref(), Some("new"));
        assert_eq!(store.get_snapshot("absent").await.unwrap(), None);
        assert_eq!(store.get_run("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_existing_run_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.store_run(document("same", 2, 0)).await.unwrap();
        assert!(matches!(
            store.store_run(document("same", 5, 0)).await,
            Err(StorageError::AlreadyExists(_))
        ));
        let fresh = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(fresh.get_run("same").await.unwrap().unwrap().packet_count, 2);
    }
}
