// SPDX-License-Identifier: MIT OR Apache-2.0
//! The object store facade.
//!
//! Couples the storage engine with the recipe registry and the event sink.
//! All writes validate against the recipe first, so nothing that violates
//! its schema ever reaches disk.

use crate::events::{EventSink, StoreEvent, StoreEventKind};
use crate::nodes::{ReverseMapEntry, VersionNode};
use chrono::Utc;
use one_core::{Hash, Obj};
use one_error::{ErrorKind, OneError, Result, codes};
use one_microdata::{from_microdata, id_hash, to_microdata};
use one_recipes::RecipeRegistry;
use one_storage::{CreationStatus, FileCreation, Storage};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Outcome of storing a versioned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedCreation {
    /// Whether the version's file was new or already present.
    pub status: CreationStatus,
    /// The content hash of this version.
    pub hash: Hash,
    /// The object's stable ID hash.
    pub id_hash: Hash,
    /// Write time recorded in the version head, epoch milliseconds.
    pub timestamp: i64,
}

/// Storage engine + recipe registry + event sink.
#[derive(Clone)]
pub struct ObjectStore {
    storage: Storage,
    registry: Arc<RecipeRegistry>,
    events: EventSink,
}

impl ObjectStore {
    /// Create a store over an initialized storage instance.
    ///
    /// The registry must already hold a recipe for every type that will be
    /// stored or read.
    #[must_use]
    pub fn new(storage: Storage, registry: Arc<RecipeRegistry>) -> Self {
        Self {
            storage,
            registry,
            events: EventSink::new(),
        }
    }

    /// The underlying storage engine.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The recipe registry this store validates against.
    #[must_use]
    pub fn registry(&self) -> &RecipeRegistry {
        &self.registry
    }

    /// Subscribe to new-object announcements.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreEvent>> {
        self.events.subscribe()
    }

    // -- Writes -----------------------------------------------------------

    /// Store an unversioned object, addressed only by its content hash.
    ///
    /// Emits a [`StoreEventKind::NewUnversionedObject`] event when the file
    /// is new; storing the same object again is a silent `Exists`.
    pub async fn store_unversioned_object(&self, obj: &Obj) -> Result<FileCreation> {
        let microdata = to_microdata(obj, &self.registry)?;
        let creation = self.storage.store_utf8_object(&microdata).await?;
        let timestamp = Utc::now().timestamp_millis();
        self.update_reverse_maps(obj, creation.hash, timestamp).await?;
        if creation.status == CreationStatus::New {
            self.events.emit(StoreEvent {
                kind: StoreEventKind::NewUnversionedObject,
                obj: obj.clone(),
                hash: creation.hash,
                id_hash: None,
                timestamp,
            });
        }
        Ok(creation)
    }

    /// Store a new version of a versioned object.
    ///
    /// Validates the recipe, writes the microdata file, appends to the
    /// version head (every call appends, including `Exists` — the head is
    /// unchanged in that case because it is the same hash), maintains the
    /// reverse maps, and emits events for genuinely new files.
    pub async fn store_versioned_object(
        &self,
        obj: &Obj,
        parent: Option<Hash>,
    ) -> Result<VersionedCreation> {
        let microdata = to_microdata(obj, &self.registry)?;
        let id = id_hash(obj, &self.registry)?;
        let id_existed = self.storage.vhead_exists(&id).await;

        let creation = self.storage.store_utf8_object(&microdata).await?;
        let timestamp = Utc::now().timestamp_millis();
        let node = VersionNode {
            hash: creation.hash,
            timestamp,
            parent,
        };
        self.storage.append_vhead_line(&id, &node.to_line()).await?;
        self.update_reverse_maps(obj, creation.hash, timestamp).await?;

        debug!(hash = %creation.hash, id_hash = %id, status = ?creation.status, "stored versioned object");
        if creation.status == CreationStatus::New {
            self.events.emit(StoreEvent {
                kind: StoreEventKind::NewVersionedObject,
                obj: obj.clone(),
                hash: creation.hash,
                id_hash: Some(id),
                timestamp,
            });
        }
        if !id_existed {
            self.events.emit(StoreEvent {
                kind: StoreEventKind::NewIdObject,
                obj: obj.clone(),
                hash: creation.hash,
                id_hash: Some(id),
                timestamp,
            });
        }

        Ok(VersionedCreation {
            status: creation.status,
            hash: creation.hash,
            id_hash: id,
            timestamp,
        })
    }

    /// Record one reverse-map entry per reference for enabled referrer
    /// types. Unlisted types generate nothing.
    async fn update_reverse_maps(&self, obj: &Obj, referrer: Hash, timestamp: i64) -> Result<()> {
        if !self.storage.reverse_map_types().contains(obj.type_name()) {
            return Ok(());
        }
        let mut targets = Vec::new();
        obj.for_each_reference(|link| targets.push(link.hash));
        targets.sort_unstable();
        targets.dedup();
        let entry = ReverseMapEntry {
            referrer,
            timestamp,
        };
        for target in targets {
            self.storage
                .append_rmap_line(&target, obj.type_name(), &entry.to_line())
                .await?;
        }
        Ok(())
    }

    // -- Reads ------------------------------------------------------------

    /// Load and decode the object stored under `hash`.
    pub async fn get_object(&self, hash: &Hash) -> Result<Obj> {
        let microdata = self.storage.read_utf8_object(hash).await?;
        let mut obj = from_microdata(&microdata, &self.registry)?;
        obj.set_version_hash(*hash);
        Ok(obj)
    }

    /// All version nodes for an identity, in file (write) order.
    pub async fn get_version_nodes(&self, id_hash: &Hash) -> Result<Vec<VersionNode>> {
        let lines = self.storage.read_vhead_lines(id_hash).await?;
        lines.iter().map(|l| VersionNode::parse(l)).collect()
    }

    /// The current head node: the last line of the version head.
    pub async fn get_current_version_node(&self, id_hash: &Hash) -> Result<VersionNode> {
        let nodes = self.get_version_nodes(id_hash).await?;
        nodes.last().copied().ok_or_else(|| {
            OneError::new(
                ErrorKind::FileNotFound,
                codes::SB_READ1,
                format!("version head for {id_hash} is empty"),
            )
        })
    }

    /// Load the current version of an identity.
    pub async fn get_current_version(&self, id_hash: &Hash) -> Result<Obj> {
        let node = self.get_current_version_node(id_hash).await?;
        self.get_object(&node.hash).await
    }

    /// Materialize the ID object for an identity: the projection of the
    /// current version onto its ID fields.
    ///
    /// # Errors
    ///
    /// `VOB-IDO1` when the projection does not reproduce the requested ID
    /// hash — the version head points at an object of a different identity.
    pub async fn get_id_object(&self, id_hash_value: &Hash) -> Result<Obj> {
        let current = self.get_current_version(id_hash_value).await?;
        let recipe = self.registry.get(current.type_name())?;
        let mut projection = Obj::new(current.type_name());
        for rule in recipe.id_rules() {
            if let Some(value) = current.get(&rule.item_prop) {
                projection.set(rule.item_prop.clone(), value.clone());
            }
        }
        let recomputed = id_hash(&projection, &self.registry)?;
        if recomputed != *id_hash_value {
            return Err(OneError::new(
                ErrorKind::Integrity,
                codes::VOB_IDO1,
                format!("ID projection hashes to {recomputed}, expected {id_hash_value}"),
            ));
        }
        Ok(projection)
    }

    /// Reverse-map entries for `(target, referrer_type)`, in file order.
    /// A map that was never written yields an empty list.
    pub async fn get_reverse_map_entries(
        &self,
        target: &Hash,
        referrer_type: &str,
    ) -> Result<Vec<ReverseMapEntry>> {
        let lines = self.storage.read_rmap_lines(target, referrer_type).await?;
        lines.iter().map(|l| ReverseMapEntry::parse(l)).collect()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("storage", &self.storage)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
