//! Effect - Side effects represented as values
//!
//! An Effect describes an operation against the provider without
//! performing it. The Interpreter turns Effects into API calls.

use crate::resource::{Resource, ResourceId, State};
use crate::waiter::Timeouts;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up a data source
    Read { resource: Resource },
    Create(Resource),
    /// In-place update of the listed attributes
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete followed by create, caused by a change to a force-new attribute
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    Delete {
        id: ResourceId,
        identifier: String,
        timeouts: Timeouts,
    },
}

impl Effect {
    /// Whether this Effect changes remote infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read { .. })
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read { resource } | Effect::Create(resource) => &resource.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Read { .. } => "read",
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Replace { .. } => "replace",
            Effect::Delete { .. } => "delete",
        }
    }
}
