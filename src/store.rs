//! Content-addressed persistence for query records.
//!
//! Every distinct [`QuerySpec`] gets exactly one persisted [`QueryRecord`],
//! keyed by its signature digest. The store is the only shared mutable
//! resource in the engine: its interior lives behind one mutex so that
//! `find_or_create` behaves as a serialized critical section per signature,
//! and a unique constraint on the digest column backstops the guarantee
//! across processes sharing the same database file.
//!
//! An in-memory keeper caches records in front of the table (a bidirectional
//! digest/identity map plus an identity map to shared records), so repeated
//! lookups of the same query do not touch SQLite.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex, MutexGuard};

use bimap::BiMap;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use seahash::SeaHasher;
use tracing::debug;

use crate::error::{RequeryError, Result};
use crate::spec::{ParamValue, QuerySpec, RecordId, Signature};

pub type IdHasher = BuildHasherDefault<SeaHasher>;

/// Where the record table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

// ------------- QueryRecord -------------

/// One persisted, immutable query specification. Shared through `Arc`;
/// runtime query handles reference records, they never own them.
#[derive(Debug)]
pub struct QueryRecord {
    id: RecordId,
    spec: QuerySpec,
    signature: Signature,
    created: DateTime<Utc>,
}

impl QueryRecord {
    // Fields are encapsulated behind getters so records stay truly
    // immutable after creation.
    pub fn id(&self) -> RecordId {
        self.id
    }
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

// ------------- Keeper -------------

#[derive(Debug, Default)]
struct RecordKeeper {
    by_digest: BiMap<String, RecordId>,
    kept: HashMap<RecordId, Arc<QueryRecord>, IdHasher>,
}

impl RecordKeeper {
    fn keep(&mut self, record: QueryRecord) -> Arc<QueryRecord> {
        let keepsake = Arc::new(record);
        self.by_digest
            .insert(keepsake.signature().digest_hex(), keepsake.id());
        self.kept.insert(keepsake.id(), Arc::clone(&keepsake));
        keepsake
    }

    fn get_by_digest(&self, digest: &str) -> Option<Arc<QueryRecord>> {
        let id = self.by_digest.get_by_left(digest)?;
        self.kept.get(id).map(Arc::clone)
    }

    fn get(&self, id: RecordId) -> Option<Arc<QueryRecord>> {
        self.kept.get(&id).map(Arc::clone)
    }

    fn evict(&mut self, id: RecordId) {
        self.by_digest.remove_by_right(&id);
        self.kept.remove(&id);
    }
}

// ------------- Store -------------

struct StoreState {
    db: Connection,
    keeper: RecordKeeper,
}

/// The shared record store: find-or-create by signature, load by identity.
pub struct QueryRecordStore {
    state: Mutex<StoreState>,
}

impl QueryRecordStore {
    pub fn new(mode: PersistenceMode) -> Result<QueryRecordStore> {
        let db = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        db.execute_batch(
            "
            create table if not exists QueryRecord (
                Record_Identity integer not null primary key autoincrement,
                Signature_Digest text not null,
                Signature_Canonical text not null,
                Entity text not null,
                Variant text not null,
                Parameters text not null,
                Created text not null,
                Last_Used text not null,
                Access_Count integer not null,
                constraint unique_Signature unique (
                    Signature_Digest
                )
            );
            ",
        )?;
        Ok(QueryRecordStore {
            state: Mutex::new(StoreState {
                db,
                keeper: RecordKeeper::default(),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|e| RequeryError::Lock(e.to_string()))
    }

    /// Return the one record for this spec, creating it if this is the
    /// first time the signature has been seen. The flag reports whether the
    /// record was previously kept. Reusing a record never re-resolves
    /// anything; creation persists exactly one row even when callers race
    /// (insert-or-ignore under the store mutex, reselect on conflict).
    pub fn find_or_create(&self, spec: &QuerySpec) -> Result<(Arc<QueryRecord>, bool)> {
        let signature = spec.signature();
        let digest = signature.digest_hex();
        let mut state = self.lock()?;

        if let Some(record) = state.keeper.get_by_digest(&digest) {
            state.touch(record.id())?;
            return Ok((record, true));
        }
        if let Some(id) = state.select_id_by_digest(&digest)? {
            let record = state.load_row(id)?;
            state.touch(id)?;
            return Ok((record, true));
        }

        let created = Utc::now();
        let parameters = encode_parameters(spec)?;
        let inserted = state.db.execute(
            "
            insert or ignore into QueryRecord (
                Signature_Digest,
                Signature_Canonical,
                Entity,
                Variant,
                Parameters,
                Created,
                Last_Used,
                Access_Count
            ) values (?, ?, ?, ?, ?, ?, ?, 0)
            ",
            params![
                &digest,
                signature.canonical(),
                spec.entity().as_str(),
                spec.variant().kind().as_str(),
                &parameters,
                &created,
                &created,
            ],
        )?;
        if inserted == 1 {
            let id = state.db.last_insert_rowid() as RecordId;
            debug!(id, digest = %digest, "created query record");
            let record = state.keeper.keep(QueryRecord {
                id,
                spec: spec.clone(),
                signature,
                created,
            });
            Ok((record, false))
        } else {
            // Lost a race against another connection on the same file.
            let id = state.select_id_by_digest(&digest)?.ok_or_else(|| {
                RequeryError::Invariant(format!(
                    "record for signature {digest} neither inserted nor found"
                ))
            })?;
            let record = state.load_row(id)?;
            state.touch(id)?;
            Ok((record, true))
        }
    }

    /// Load a record by identity. Fails with `NotFound` when the record
    /// never existed or was swept by [`QueryRecordStore::cleanup`].
    pub fn load(&self, id: RecordId) -> Result<Arc<QueryRecord>> {
        let mut state = self.lock()?;
        if let Some(record) = state.keeper.get(id) {
            state.touch(id)?;
            return Ok(record);
        }
        let record = state.load_row(id)?;
        state.touch(id)?;
        Ok(record)
    }

    /// Number of persisted records.
    pub fn len(&self) -> Result<usize> {
        let state = self.lock()?;
        let count: i64 =
            state
                .db
                .query_row("select count(*) from QueryRecord", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// How often a record has been looked up since creation.
    pub fn access_count(&self, id: RecordId) -> Result<u64> {
        let state = self.lock()?;
        let count: Option<i64> = state
            .db
            .query_row(
                "select Access_Count from QueryRecord where Record_Identity = ?",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()?;
        count
            .map(|c| c as u64)
            .ok_or_else(|| RequeryError::NotFound(format!("no query record with identity {id}")))
    }

    /// Out-of-band garbage collection: drop records that were never looked
    /// up within `unused_max_age`, and looked-up ones idle longer than
    /// `used_max_age`. Returns how many records were swept.
    pub fn cleanup(&self, unused_max_age: Duration, used_max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let unused_cutoff = now - unused_max_age;
        let used_cutoff = now - used_max_age;
        let mut state = self.lock()?;
        let doomed: Vec<RecordId> = {
            let mut statement = state.db.prepare_cached(
                "
                select Record_Identity from QueryRecord
                    where (Access_Count = 0 and Last_Used < ?)
                       or (Access_Count > 0 and Last_Used < ?)
                ",
            )?;
            let rows = statement.query_map(params![&unused_cutoff, &used_cutoff], |row| {
                row.get::<_, i64>(0)
            })?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row? as RecordId);
            }
            ids
        };
        for &id in &doomed {
            state.db.execute(
                "delete from QueryRecord where Record_Identity = ?",
                params![id as i64],
            )?;
            state.keeper.evict(id);
        }
        if !doomed.is_empty() {
            debug!(swept = doomed.len(), "cleaned up stale query records");
        }
        Ok(doomed.len())
    }
}

impl StoreState {
    fn select_id_by_digest(&self, digest: &str) -> Result<Option<RecordId>> {
        let mut statement = self.db.prepare_cached(
            "select Record_Identity from QueryRecord where Signature_Digest = ?",
        )?;
        let id: Option<i64> = statement
            .query_row(params![digest], |row| row.get(0))
            .optional()?;
        Ok(id.map(|i| i as RecordId))
    }

    fn load_row(&mut self, id: RecordId) -> Result<Arc<QueryRecord>> {
        let row: Option<(String, String, String, DateTime<Utc>)> = {
            let mut statement = self.db.prepare_cached(
                "
                select Entity, Variant, Parameters, Created
                    from QueryRecord
                    where Record_Identity = ?
                ",
            )?;
            statement
                .query_row(params![id as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .optional()?
        };
        let (entity, variant, parameters, created) = row.ok_or_else(|| {
            RequeryError::NotFound(format!("no query record with identity {id}"))
        })?;
        let spec = decode_parameters(&entity, &variant, &parameters)?;
        let signature = spec.signature();
        Ok(self.keeper.keep(QueryRecord {
            id,
            spec,
            signature,
            created,
        }))
    }

    fn touch(&self, id: RecordId) -> Result<()> {
        self.db.execute(
            "
            update QueryRecord
                set Last_Used = ?, Access_Count = Access_Count + 1
                where Record_Identity = ?
            ",
            params![&Utc::now(), id as i64],
        )?;
        Ok(())
    }
}

fn encode_parameters(spec: &QuerySpec) -> Result<String> {
    serde_json::to_string(&spec.params())
        .map_err(|e| RequeryError::Persistence(format!("could not encode parameters: {e}")))
}

fn decode_parameters(entity: &str, variant: &str, parameters: &str) -> Result<QuerySpec> {
    let params: std::collections::BTreeMap<String, ParamValue> =
        serde_json::from_str(parameters).map_err(|e| {
            RequeryError::Persistence(format!("could not decode stored parameters: {e}"))
        })?;
    QuerySpec::from_parts(entity, variant, &params)
}
