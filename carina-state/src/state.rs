//! Persisted state: what each managed resource looked like after the last
//! successful apply, and the remote identifier needed to find it again.

use std::collections::{BTreeMap, HashMap};

use carina_core::resource::{ResourceId, State, Value};
use carina_core::waiter::Timeouts;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendResult};

/// The document written to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Bumped on every write; a backend refuses to go backwards
    pub serial: u64,
    /// Fixed for the lifetime of a state, so two configurations cannot
    /// overwrite each other's state
    pub lineage: String,
    pub carina_version: String,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            carina_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Prepare for the next write
    pub fn bump(&mut self) {
        self.serial += 1;
        self.carina_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == id.resource_type && r.name == id.name)
    }

    /// Insert or replace, keeping resources sorted by type and name
    pub fn upsert(&mut self, resource: ResourceState) {
        let key = (resource.resource_type.clone(), resource.name.clone());
        match self
            .resources
            .binary_search_by(|r| (&r.resource_type, &r.name).cmp(&(&key.0, &key.1)))
        {
            Ok(pos) => self.resources[pos] = resource,
            Err(pos) => self.resources.insert(pos, resource),
        }
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == id.resource_type && r.name == id.name)?;
        Some(self.resources.remove(pos))
    }

    /// Stored states keyed by resource id, as the planner expects them
    pub fn to_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.id(), r.to_state()))
            .collect()
    }

    /// Whether `next` may replace `self` in the backend
    pub fn check_successor(&self, next: &StateFile) -> BackendResult<()> {
        if self.lineage != next.lineage {
            return Err(BackendError::LineageMismatch {
                expected: self.lineage.clone(),
                actual: next.lineage.clone(),
            });
        }
        if next.serial <= self.serial {
            return Err(BackendError::StaleSerial {
                stored: self.serial,
                attempted: next.serial,
            });
        }
        Ok(())
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// One managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Remote identifier handed to read/update/delete (endpoint id,
    /// replication config ARN, ...)
    pub identifier: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Bindings this resource referenced when it was applied, so that
    /// destroy can run in reverse dependency order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceState {
    /// Record a provider state. States without an identifier cannot be
    /// found again and are not recorded. Internal `_` attributes are
    /// dropped except the configured timeouts, which a later delete needs.
    pub fn from_state(state: &State) -> Option<Self> {
        let identifier = state.identifier.clone()?;
        Some(Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier,
            attributes: state
                .attributes
                .iter()
                .filter(|(k, _)| !k.starts_with('_') || k.as_str() == Timeouts::ATTRIBUTE)
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
            depends_on: Vec::new(),
        })
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        State::existing(self.id(), attributes).with_identifier(&self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint_state(name: &str, port: i64) -> State {
        let attributes = [
            ("endpoint_id".to_string(), Value::from(name)),
            ("port".to_string(), Value::Int(port)),
            ("_binding".to_string(), Value::from(name)),
            (
                Timeouts::ATTRIBUTE.to_string(),
                Value::Map([("delete".to_string(), Value::from("15m"))].into()),
            ),
        ]
        .into_iter()
        .collect();
        State::existing(ResourceId::new("dms_endpoint", name), attributes).with_identifier(name)
    }

    #[test]
    fn records_identifier_and_skips_internal_keys() {
        let recorded = ResourceState::from_state(&endpoint_state("source", 5432)).unwrap();
        assert_eq!(recorded.identifier, "source");
        assert_eq!(recorded.attributes["port"], serde_json::json!(5432));
        assert!(!recorded.attributes.contains_key("_binding"));
        assert_eq!(
            recorded.attributes[Timeouts::ATTRIBUTE],
            serde_json::json!({ "delete": "15m" })
        );

        let restored = recorded.to_state();
        assert!(restored.exists);
        assert_eq!(restored.identifier.as_deref(), Some("source"));
        assert_eq!(restored.attributes["port"], Value::Int(5432));
        assert_eq!(
            Timeouts::from_attributes(&restored.attributes).unwrap().delete,
            Some(std::time::Duration::from_secs(15 * 60))
        );
    }

    #[test]
    fn state_without_identifier_is_not_recorded() {
        let state = State::not_found(ResourceId::new("dms_endpoint", "gone"));
        assert!(ResourceState::from_state(&state).is_none());
    }

    #[test]
    fn upsert_keeps_order_and_replaces() {
        let mut file = StateFile::new();
        for (name, port) in [("target", 3306), ("source", 5432), ("target", 3307)] {
            file.upsert(ResourceState::from_state(&endpoint_state(name, port)).unwrap());
        }
        let names: Vec<&str> = file.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["source", "target"]);

        let target = file.get(&ResourceId::new("dms_endpoint", "target")).unwrap();
        assert_eq!(target.attributes["port"], serde_json::json!(3307));

        assert!(file.remove(&ResourceId::new("dms_endpoint", "source")).is_some());
        assert!(file.remove(&ResourceId::new("dms_endpoint", "source")).is_none());
        assert_eq!(file.to_states().len(), 1);
    }

    #[test]
    fn successor_must_share_lineage_and_advance() {
        let stored = StateFile::new();
        let mut next = stored.clone();
        assert!(matches!(
            stored.check_successor(&next),
            Err(BackendError::StaleSerial { stored: 0, attempted: 0 })
        ));

        next.bump();
        assert!(stored.check_successor(&next).is_ok());

        let mut foreign = StateFile::new();
        foreign.bump();
        assert!(matches!(
            stored.check_successor(&foreign),
            Err(BackendError::LineageMismatch { .. })
        ));
    }

    #[test]
    fn dependencies_are_omitted_when_empty() {
        let mut file = StateFile::new();
        file.upsert(ResourceState::from_state(&endpoint_state("source", 5432)).unwrap());
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("depends_on"));

        let parsed: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, file);
    }
}
