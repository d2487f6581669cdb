//! ConstraintManager: the engine instance owned by the UI/CLI layer.
//!
//! Every mutating call follows the same flow: do the work through the scene,
//! reconcile the registry against the scene, then persist the registry into
//! the document metadata slot (when `Config::auto_save` is set).
//!
//! Host undo/redo is not tracked. Call [`ConstraintManager::reconcile`] after
//! any host undo/redo notification before trusting the registry again.

use log::{info, warn};

use crate::config::{Config, CreateOptions, SwitchOptions};
use crate::error::{ConManError, Result};
use crate::factory;
use crate::ids::StableId;
use crate::persist;
use crate::record::{ConstraintKind, ConstraintRecord, RecordKey};
use crate::registry::{ListEntry, Registry};
use crate::scene::{HostInfo, Scene};
use crate::switch::{apply_switch, SwitchMode, SwitchReport, SwitchRequest};

#[derive(Debug)]
pub struct ConstraintManager {
    cfg: Config,
    host: HostInfo,
    registry: Registry,
}

/// Reject hosts whose entity ids do not survive save/reload.
pub fn check_host(host: &HostInfo, cfg: &Config) -> Result<()> {
    if !host.stable_ids || host.version < cfg.min_host_version {
        return Err(ConManError::UnsupportedHostVersion {
            host: host.name.clone(),
            version: host.version,
            required: cfg.min_host_version,
        });
    }
    Ok(())
}

impl ConstraintManager {
    /// Create a manager with an empty registry.
    pub fn new(cfg: Config, scene: &dyn Scene) -> Result<Self> {
        let host = scene.host_info();
        check_host(&host, &cfg)?;
        Ok(Self {
            cfg,
            host,
            registry: Registry::new(),
        })
    }

    /// Create a manager and restore the registry stored in the document.
    pub fn load(cfg: Config, scene: &dyn Scene) -> Result<Self> {
        let mut manager = Self::new(cfg, scene)?;
        manager.registry = persist::read(scene, &manager.cfg);
        let dropped = manager.registry.reconcile(scene);
        if !dropped.is_empty() {
            info!("ignoring {} stale stored constraint(s)", dropped.len());
        }
        Ok(manager)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get(&self, key: &RecordKey) -> Option<&ConstraintRecord> {
        self.registry.get(key)
    }

    /// Drop records whose target or node no longer resolves. Returns the dropped keys.
    pub fn reconcile(&mut self, scene: &dyn Scene) -> Vec<RecordKey> {
        self.registry.reconcile(scene)
    }

    /// Persist the registry unconditionally. Returns the written blob.
    pub fn save(&self, scene: &mut dyn Scene) -> Result<String> {
        persist::write(scene, &self.registry, &self.cfg)
    }

    fn commit(&mut self, scene: &mut dyn Scene) -> Result<()> {
        self.registry.reconcile(scene);
        if self.cfg.auto_save {
            self.save(scene)?;
        }
        Ok(())
    }

    /// Build a relationship from an explicit selection (drivers..., target).
    pub fn create(
        &mut self,
        scene: &mut dyn Scene,
        kind: ConstraintKind,
        selection: &[StableId],
        opts: &CreateOptions,
    ) -> Result<ConstraintRecord> {
        let record = factory::create(scene, &mut self.registry, kind, selection, opts)?;
        self.commit(scene)?;
        Ok(record)
    }

    /// Build a relationship from the host's current selection.
    pub fn create_from_selection(
        &mut self,
        scene: &mut dyn Scene,
        kind: ConstraintKind,
        opts: &CreateOptions,
    ) -> Result<ConstraintRecord> {
        let selection = scene.selection();
        self.create(scene, kind, &selection, opts)
    }

    /// Track a relationship node that already exists in the scene.
    pub fn adopt(&mut self, scene: &mut dyn Scene, node: &StableId) -> Result<ConstraintRecord> {
        let record = factory::adopt(scene, &mut self.registry, node)?;
        self.commit(scene)?;
        Ok(record)
    }

    /// Track every selected relationship node.
    pub fn adopt_selection(&mut self, scene: &mut dyn Scene) -> Result<Vec<ConstraintRecord>> {
        let records = factory::adopt_selection(scene, &mut self.registry)?;
        self.commit(scene)?;
        Ok(records)
    }

    /// Stop tracking a record. The scene is left alone; a missing key is only logged.
    pub fn remove(
        &mut self,
        scene: &mut dyn Scene,
        key: &RecordKey,
    ) -> Result<Option<ConstraintRecord>> {
        let removed = self.registry.remove(key);
        self.commit(scene)?;
        Ok(removed)
    }

    /// Delete the relationship node from the scene and stop tracking it.
    pub fn remove_from_scene(
        &mut self,
        scene: &mut dyn Scene,
        key: &RecordKey,
    ) -> Result<ConstraintRecord> {
        let node = match self.registry.get(key) {
            Some(record) => record.node.clone(),
            None => return Err(ConManError::NotTracked { key: key.clone() }),
        };
        if node.is_live(scene) {
            scene.delete(&node.id)?;
            info!("deleted constraint node {node}");
        } else {
            warn!("constraint node {} is already gone; nothing to delete", node.id);
        }
        let removed = self
            .registry
            .remove(key)
            .ok_or_else(|| ConManError::NotTracked { key: key.clone() })?;
        self.commit(scene)?;
        Ok(removed)
    }

    /// Switch the drivers of one tracked record.
    pub fn switch(
        &mut self,
        scene: &mut dyn Scene,
        key: &RecordKey,
        mode: SwitchMode,
        opts: SwitchOptions,
    ) -> Result<SwitchReport> {
        let record = self
            .registry
            .get(key)
            .ok_or_else(|| ConManError::NotTracked { key: key.clone() })?;
        let report = apply_switch(scene, &SwitchRequest::new(record, mode, opts), &self.cfg)?;
        self.commit(scene)?;
        Ok(report)
    }

    /// Reconcile and persist, dropping stale stored data.
    pub fn clean_stale(&mut self, scene: &mut dyn Scene) -> Result<Vec<RecordKey>> {
        let dropped = self.registry.reconcile(scene);
        self.save(scene)?;
        if !dropped.is_empty() {
            info!("constraint data has been cleaned ({} stale)", dropped.len());
        }
        Ok(dropped)
    }

    /// Forget every record and remove the metadata slot.
    pub fn purge(&mut self, scene: &mut dyn Scene) {
        self.registry.clear();
        persist::clear(scene, &self.cfg);
        info!("constraint data has been purged");
    }

    /// Tracked records in display order.
    pub fn listing<'a>(&'a self, scene: &dyn Scene) -> std::vec::IntoIter<ListEntry<'a>> {
        self.registry.list_ordered(scene)
    }

    pub fn record_at(&self, scene: &dyn Scene, position: usize) -> Option<&ConstraintRecord> {
        self.registry.record_at(scene, position)
    }

    /// Current driver names of a record, in driver-index order.
    pub fn switch_choices(&self, scene: &dyn Scene, key: &RecordKey) -> Result<Vec<String>> {
        let record = self
            .registry
            .get(key)
            .ok_or_else(|| ConManError::NotTracked { key: key.clone() })?;
        Ok(record
            .drivers
            .iter()
            .map(|d| scene.resolve(&d.id).unwrap_or_else(|| d.display_name.clone()))
            .collect())
    }
}
