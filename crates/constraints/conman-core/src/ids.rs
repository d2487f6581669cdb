//! Stable identifiers and entity references.
//!
//! The host assigns every entity an identifier that survives renaming. All
//! registry keys use [`StableId`]; display names are only a presentation hint
//! and are refreshed from the host whenever a reference is resolved.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::scene::Scene;

/// Rename-proof opaque key naming one host entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StableId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StableId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Non-owning back-reference to a host entity.
///
/// Equality and hashing use the stable id only. `display_name` is the last
/// name observed for the entity and may be out of date; call
/// [`EntityRef::resolve`] before presenting it.
#[derive(Clone, Debug)]
pub struct EntityRef {
    pub id: StableId,
    pub display_name: String,
}

impl EntityRef {
    pub fn new(id: impl Into<StableId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Reference with no known display name yet (the id stands in for it).
    pub fn from_id(id: impl Into<StableId>) -> Self {
        let id = id.into();
        let display_name = id.to_string();
        Self { id, display_name }
    }

    /// Resolve against the live scene. Returns a fresh reference carrying the
    /// current display name, or `None` when the id is stale.
    pub fn resolve(&self, scene: &dyn Scene) -> Option<EntityRef> {
        scene
            .resolve(&self.id)
            .map(|name| EntityRef::new(self.id.clone(), name))
    }

    pub fn is_live(&self, scene: &dyn Scene) -> bool {
        scene.resolve(&self.id).is_some()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

// Persisted as the bare stable id; names are never written out.
impl Serialize for EntityRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D>(deserializer: D) -> Result<EntityRef, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(de::Error::custom("empty stable id"));
        }
        Ok(EntityRef::from_id(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_display_name() {
        let a = EntityRef::new("0F3A", "locator1");
        let b = EntityRef::new("0F3A", "renamed_locator");
        let c = EntityRef::new("77C1", "locator1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn serializes_as_bare_id() {
        let r = EntityRef::new("0F3A", "locator1");
        let s = serde_json::to_string(&r).unwrap();
        assert_eq!(s, "\"0F3A\"");
        let back: EntityRef = serde_json::from_str(&s).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.display_name, "0F3A");
    }

    #[test]
    fn rejects_empty_id() {
        assert!(serde_json::from_str::<EntityRef>("\"\"").is_err());
    }
}
