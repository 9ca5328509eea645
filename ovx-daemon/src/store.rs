//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;

use ovx_hypervisor::network::VirtualLinkLike;
use ovx_hypervisor::southbound::{EmbeddingRecord, EmbeddingStore};
use parking_lot::Mutex;
use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
use tracing::{debug, warn};

// Embedding store backed by a pickledb file.
pub struct DbStore {
    db: Mutex<PickleDb>,
}

// ===== impl DbStore =====

impl DbStore {
    pub(crate) fn open<P: AsRef<Path>>(
        path: P,
    ) -> Result<DbStore, pickledb::error::Error> {
        let dump_policy = PickleDbDumpPolicy::AutoDump;
        let serialization_method = SerializationMethod::Bin;
        let db = match path.as_ref().exists() {
            true => PickleDb::load(path, dump_policy, serialization_method)?,
            false => PickleDb::new(path, dump_policy, serialization_method),
        };
        Ok(DbStore { db: Mutex::new(db) })
    }

    // Persisted embeddings, in key order.
    pub(crate) fn records(&self) -> Vec<EmbeddingRecord> {
        let db = self.db.lock();
        let mut keys = db.get_all();
        keys.sort();
        keys.iter()
            .filter_map(|key| {
                let record = db.get::<EmbeddingRecord>(key);
                if record.is_none() {
                    warn!(%key, "ignoring malformed embedding record");
                }
                record
            })
            .collect()
    }
}

impl EmbeddingStore for DbStore {
    fn save(&self, record: &EmbeddingRecord) {
        let key = record.store_key();
        match self.db.lock().set(&key, record) {
            Ok(()) => debug!(%key, "embedding saved"),
            Err(error) => warn!(%key, %error, "failed to save embedding"),
        }
    }

    fn remove(&self, element: &VirtualLinkLike) {
        let key = element.to_string();
        if let Err(error) = self.db.lock().rem(&key) {
            warn!(%key, %error, "failed to remove embedding");
        }
    }
}

impl std::fmt::Debug for DbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStore").finish_non_exhaustive()
    }
}
