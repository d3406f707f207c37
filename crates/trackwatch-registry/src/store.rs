//! ---
//! tw_section: "03-persistence"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Durable alert collection and its mutation gate."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use trackwatch_common::time::AlertIdGenerator;
use trackwatch_common::Location;
use trackwatch_msg::types::{AlertRecord, AlertStatus, Severity};

use crate::{RegistryError, Result};

/// Current version of the persisted collection envelope.
pub const COLLECTION_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionEnvelope {
    version: u16,
    written_at: DateTime<Utc>,
    hash: String,
    alerts: Vec<AlertRecord>,
}

/// Result of an [`AlertRegistry::upsert_active`] call.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// The created or refreshed record.
    pub record: AlertRecord,
    /// True when a new record was created, false on a `last_seen` refresh.
    pub created: bool,
}

/// Owner of the durable alert collection.
///
/// Every mutation runs under one internal mutex and persists the full
/// collection before the in-memory state adopts it: a failed write leaves
/// both memory and disk at the previous durable state. The file is replaced
/// atomically (temp file, then rename) so concurrent readers of the path
/// never observe a partially written collection.
#[derive(Debug)]
pub struct AlertRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    alerts: Vec<AlertRecord>,
    ids: AlertIdGenerator,
}

impl AlertRegistry {
    /// Open the registry at `path`, loading and verifying any existing
    /// collection. The identifier floor is raised past loaded records so
    /// identifiers stay unique across process restarts.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let alerts = if path.exists() {
            load_collection(&path)?
        } else {
            Vec::new()
        };
        let ids = AlertIdGenerator::new();
        for alert in &alerts {
            ids.observe(alert.id);
        }
        debug!(path = %path.display(), loaded = alerts.len(), "alert registry opened");
        Ok(Self {
            inner: Mutex::new(Inner { path, alerts, ids }),
        })
    }

    /// Full collection in creation order.
    pub fn list_all(&self) -> Vec<AlertRecord> {
        self.inner.lock().alerts.clone()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.lock().alerts.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().alerts.is_empty()
    }

    /// Refresh the open alert for `node_id`, or create one.
    ///
    /// An existing non-FIXED record only has its `last_seen` advanced;
    /// identity, severity, and location are never overwritten. Otherwise a
    /// fresh ACTIVE record is created with the given severity and the
    /// location as resolved at this moment.
    pub fn upsert_active(
        &self,
        node_id: &str,
        severity: Severity,
        location: &Location,
    ) -> Result<UpsertOutcome> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let mut next = inner.alerts.clone();

        if let Some(index) = next
            .iter()
            .position(|alert| alert.node_id == node_id && alert.is_open())
        {
            // last_seen is monotonically non-decreasing.
            next[index].last_seen = next[index].last_seen.max(now);
            write_collection(&inner.path, &next)?;
            let record = next[index].clone();
            inner.alerts = next;
            debug!(node = node_id, alert_id = record.id, "open alert refreshed");
            return Ok(UpsertOutcome {
                record,
                created: false,
            });
        }

        let record = AlertRecord {
            id: inner.ids.next_id(),
            node_id: node_id.to_owned(),
            lat: location.lat,
            lng: location.lng,
            location_name: location.name.clone(),
            severity,
            status: AlertStatus::Active,
            is_construction: false,
            timestamp: now,
            last_seen: now,
        };
        next.push(record.clone());
        write_collection(&inner.path, &next)?;
        inner.alerts = next;
        debug!(node = node_id, alert_id = record.id, severity = ?severity, "alert created");
        Ok(UpsertOutcome {
            record,
            created: true,
        })
    }

    /// Set the construction annotation on the record matching `alert_id`.
    ///
    /// The annotation is one-way and never touches `status`. Returns
    /// `Ok(None)` when no record carries the identifier; repeated calls on an
    /// already annotated record are a persisted-state no-op.
    pub fn annotate_construction(&self, alert_id: i64) -> Result<Option<AlertRecord>> {
        let mut inner = self.inner.lock();
        let Some(index) = inner.alerts.iter().position(|alert| alert.id == alert_id) else {
            return Ok(None);
        };
        if inner.alerts[index].is_construction {
            return Ok(Some(inner.alerts[index].clone()));
        }

        let mut next = inner.alerts.clone();
        next[index].is_construction = true;
        write_collection(&inner.path, &next)?;
        let record = next[index].clone();
        inner.alerts = next;
        debug!(alert_id, "construction annotation set");
        Ok(Some(record))
    }
}

fn compute_hash(alerts: &[AlertRecord]) -> Result<String> {
    let serialized = serde_json::to_vec(alerts)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}

fn write_collection(path: &Path, alerts: &[AlertRecord]) -> Result<()> {
    let envelope = CollectionEnvelope {
        version: COLLECTION_VERSION,
        written_at: Utc::now(),
        hash: compute_hash(alerts)?,
        alerts: alerts.to_vec(),
    };
    let staging = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        writer.write_all(&serde_json::to_vec_pretty(&envelope)?)?;
        writer.flush()?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

fn load_collection(path: &Path) -> Result<Vec<AlertRecord>> {
    let bytes = fs::read(path)?;
    let envelope: CollectionEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.hash != compute_hash(&envelope.alerts)? {
        return Err(RegistryError::HashMismatch);
    }
    Ok(envelope.alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn delhi() -> Location {
        Location::new(28.6139, 77.2090, "New Delhi Central")
    }

    fn open_registry(dir: &Path) -> AlertRegistry {
        AlertRegistry::open(dir.join("alerts.json")).unwrap()
    }

    #[test]
    fn upsert_creates_then_refreshes_single_record() {
        let dir = tempdir().unwrap();
        let registry = open_registry(dir.path());

        let first = registry
            .upsert_active("TRACK_SEC_42", Severity::Red, &delhi())
            .unwrap();
        assert!(first.created);
        assert_eq!(first.record.status, AlertStatus::Active);
        assert_eq!(first.record.location_name, "New Delhi Central");
        assert!(!first.record.is_construction);

        let second = registry
            .upsert_active("TRACK_SEC_42", Severity::Yellow, &delhi())
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);
        // First-seen severity wins; later anomalies only refresh last_seen.
        assert_eq!(second.record.severity, Severity::Red);
        assert!(second.record.last_seen >= first.record.last_seen);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_nodes_get_distinct_records_in_creation_order() {
        let dir = tempdir().unwrap();
        let registry = open_registry(dir.path());

        let a = registry
            .upsert_active("TRACK_SEC_42", Severity::Red, &delhi())
            .unwrap();
        let b = registry
            .upsert_active("TRACK_SEC_43", Severity::Yellow, &delhi())
            .unwrap();
        assert!(a.record.id < b.record.id);

        let listed = registry.list_all();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].node_id, "TRACK_SEC_42");
        assert_eq!(listed[1].node_id, "TRACK_SEC_43");
    }

    #[test]
    fn annotation_is_idempotent_and_leaves_status_untouched() {
        let dir = tempdir().unwrap();
        let registry = open_registry(dir.path());
        let created = registry
            .upsert_active("TRACK_SEC_42", Severity::Red, &delhi())
            .unwrap();

        let annotated = registry
            .annotate_construction(created.record.id)
            .unwrap()
            .unwrap();
        assert!(annotated.is_construction);
        assert_eq!(annotated.status, AlertStatus::Active);
        assert_eq!(annotated.severity, Severity::Red);

        let again = registry
            .annotate_construction(created.record.id)
            .unwrap()
            .unwrap();
        assert_eq!(again, annotated);
    }

    #[test]
    fn annotation_of_unknown_id_reports_not_found_without_mutation() {
        let dir = tempdir().unwrap();
        let registry = open_registry(dir.path());
        registry
            .upsert_active("TRACK_SEC_42", Severity::Red, &delhi())
            .unwrap();

        let before = registry.list_all();
        assert!(registry.annotate_construction(404).unwrap().is_none());
        assert_eq!(registry.list_all(), before);
    }

    #[test]
    fn failed_persist_rolls_back_the_mutation() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("store");
        let registry = AlertRegistry::open(data_dir.join("alerts.json")).unwrap();
        registry
            .upsert_active("TRACK_SEC_42", Severity::Red, &delhi())
            .unwrap();

        // Destroy the backing directory so the staging file cannot be created.
        fs::remove_dir_all(&data_dir).unwrap();
        let err = registry
            .upsert_active("TRACK_SEC_43", Severity::Yellow, &delhi())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
        assert_eq!(registry.len(), 1);

        fs::create_dir_all(&data_dir).unwrap();
        let retried = registry
            .upsert_active("TRACK_SEC_43", Severity::Yellow, &delhi())
            .unwrap();
        assert!(retried.created);
        assert_eq!(registry.len(), 2);
    }
}
