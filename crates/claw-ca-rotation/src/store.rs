//! The backing store interface the rotation core consumes.
//!
//! The real store (etcd, a SQL table, whatever the cluster's control plane
//! already uses) lives outside this crate. `InMemoryCaStore` here is a
//! reference implementation — grounded on the same `RwLock<HashMap<_, _>>`
//! shape this workspace's certificate store used before rotation support
//! existed — kept as a working default and as the fixture the rest of this
//! crate's tests run against.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::model::{CaRecord, CaType};

/// Required operations on the CA backing store.
///
/// Every write is a compare-and-swap guarded by the record a caller fetched
/// at the start of its transition; the store, not this trait's caller, is
/// the authoritative serialization point for concurrent writers.
pub trait CaStore: Send + Sync {
    /// Fetches the current record for `(ca_type, cluster_name)`.
    ///
    /// When `load_secrets` is `false`, private signing and TLS key material
    /// is redacted from the returned record (signing keys become empty
    /// strings, TLS entries lose their private key) — the "public-only
    /// view" external rotation reads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record exists.
    fn get(&self, ca_type: CaType, cluster_name: &str, load_secrets: bool) -> Result<CaRecord>;

    /// Atomically replaces `expected` with `new`. `expected` must be
    /// byte-identical to the record currently in the store (i.e. the
    /// clone fetched by a prior [`CaStore::get`] call before it was
    /// mutated).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the stored record no longer matches
    /// `expected`, or [`Error::NotFound`] if no record exists at all.
    fn compare_and_swap(&self, new: &CaRecord, expected: &CaRecord) -> Result<()>;
}

/// In-memory reference implementation of [`CaStore`].
pub struct InMemoryCaStore {
    records: RwLock<HashMap<(CaType, String), CaRecord>>,
}

impl InMemoryCaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the store with a bootstrap record, as an external bootstrap
    /// process would. Overwrites any existing record for the same key.
    pub fn seed(&self, record: CaRecord) {
        let key = (record.ca_type, record.cluster_name.clone());
        info!(ca_type = %record.ca_type, cluster_name = %key.1, "seeding certificate authority record");
        let mut guard = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(key, record);
    }
}

impl Default for InMemoryCaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaStore for InMemoryCaStore {
    fn get(&self, ca_type: CaType, cluster_name: &str, load_secrets: bool) -> Result<CaRecord> {
        let guard = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let record = guard
            .get(&(ca_type, cluster_name.to_string()))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "{ca_type} certificate authority for cluster {cluster_name}"
                ))
            })?
            .clone();

        debug!(%ca_type, cluster_name, load_secrets, "loaded certificate authority record");

        Ok(if load_secrets {
            record
        } else {
            redact_secrets(record)
        })
    }

    fn compare_and_swap(&self, new: &CaRecord, expected: &CaRecord) -> Result<()> {
        let key = (new.ca_type, new.cluster_name.clone());
        let mut guard = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let current = guard.get(&key).ok_or_else(|| {
            Error::NotFound(format!(
                "{} certificate authority for cluster {}",
                key.0, key.1
            ))
        })?;

        if current != expected {
            return Err(Error::Conflict(format!(
                "{} certificate authority for cluster {} was modified concurrently",
                key.0, key.1
            )));
        }

        guard.insert(key.clone(), new.clone());
        info!(ca_type = %key.0, cluster_name = %key.1, phase = %new.rotation.phase, "certificate authority record updated");

        Ok(())
    }
}

/// Strips private key material from a record, leaving only what a peer
/// cluster (or any reader without secrets access) should see.
///
/// Signing keys are wiped with [`Zeroize::zeroize`] rather than
/// `String::clear`, which only resets the length and leaves the old bytes
/// sitting in the backing buffer.
fn redact_secrets(mut record: CaRecord) -> CaRecord {
    for key in record.signing_keys.iter_mut() {
        key.zeroize();
    }
    for pair in &mut record.tls_key_pairs {
        pair.key_pem = None;
    }
    record
}
