//! Registry of tracked relationships keyed by (target stable id, kind).
//!
//! The registry owns the records; presentation only ever sees the ordered
//! listing, which is rebuilt on every call because display names can change
//! between calls.

use hashbrown::HashMap;
use log::{debug, warn};

use crate::ids::StableId;
use crate::record::{ConstraintKind, ConstraintRecord, RecordKey};
use crate::scene::Scene;

/// One row of the presentation listing.
#[derive(Clone, Debug)]
pub struct ListEntry<'a> {
    /// `"<target name>  |  <Kind>"`.
    pub label: String,
    pub target_name: String,
    pub kind: ConstraintKind,
    pub record: &'a ConstraintRecord,
}

impl ListEntry<'_> {
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registry {
    records: HashMap<RecordKey, ConstraintRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a record, replacing any existing record for the same target and kind.
    pub fn add(&mut self, record: ConstraintRecord) -> Option<ConstraintRecord> {
        self.records.insert(record.key(), record)
    }

    /// Remove a record. Missing keys are logged, not treated as errors.
    pub fn remove(&mut self, key: &RecordKey) -> Option<ConstraintRecord> {
        let removed = self.records.remove(key);
        if removed.is_none() {
            warn!("no tracked constraint for {key}; nothing removed");
        }
        removed
    }

    pub fn get(&self, key: &RecordKey) -> Option<&ConstraintRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn lookup(&self, target: &StableId, kind: ConstraintKind) -> Option<&ConstraintRecord> {
        self.records.get(&RecordKey::new(target.clone(), kind))
    }

    /// Unordered iteration over all records.
    pub fn iter(&self) -> impl Iterator<Item = &ConstraintRecord> {
        self.records.values()
    }

    /// All keys sorted by (target stable id, kind).
    pub fn keys(&self) -> Vec<RecordKey> {
        let mut keys: Vec<RecordKey> = self.records.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Drop every record whose target or relationship node no longer resolves.
    ///
    /// Only registry entries are pruned; the scene is never touched. Returns the
    /// dropped keys in key order.
    pub fn reconcile(&mut self, scene: &dyn Scene) -> Vec<RecordKey> {
        let mut dropped: Vec<RecordKey> = self
            .records
            .iter()
            .filter_map(|(key, record)| {
                record.stale_entity(scene).map(|missing| {
                    debug!("reconcile: dropping {key} (missing {missing})");
                    key.clone()
                })
            })
            .collect();
        dropped.sort();
        for key in &dropped {
            self.records.remove(key);
        }
        for record in self.records.values_mut() {
            record.refresh_names(scene);
        }
        dropped
    }

    /// Records in display order: target display name, then kind, then stable id.
    ///
    /// Records whose target does not resolve are left out. The returned
    /// iterator can be cloned to walk the same listing again.
    pub fn list_ordered<'a>(&'a self, scene: &dyn Scene) -> std::vec::IntoIter<ListEntry<'a>> {
        let mut entries: Vec<ListEntry<'a>> = self
            .records
            .values()
            .filter_map(|record| {
                let target_name = scene.resolve(&record.target.id)?;
                Some(ListEntry {
                    label: format!("{}  |  {}", target_name, record.kind),
                    target_name,
                    kind: record.kind,
                    record,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.target_name
                .cmp(&b.target_name)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.record.target.id.cmp(&b.record.target.id))
        });
        entries.into_iter()
    }

    /// Record at `position` in the current listing.
    pub fn record_at(&self, scene: &dyn Scene, position: usize) -> Option<&ConstraintRecord> {
        self.list_ordered(scene).nth(position).map(|e| e.record)
    }
}
