//! Want metadata: identity, labels, and owner references (§3).

use crate::id::WantId;
use crate::labels::Labels;
use serde::{Deserialize, Serialize};

/// A back-pointer from a child want to a controller owner that drives its
/// lifecycle (§3, §4.G).
///
/// Owner references form a DAG (invariant 6): the Topology Resolver and
/// Reconciler never need to detect cycles in *this* graph themselves
/// because recipe expansion (§4.B) is the only producer of owner
/// references and it only ever points a child at the want it was expanded
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub owner_id: WantId,
    pub owner_name: String,
    /// Whether the owner is a controller (drives the child's lifecycle) as
    /// opposed to a non-controlling reference. The core currently only
    /// creates controller references via recipe expansion.
    pub controller: bool,
    /// Whether deleting the owner cascades to deleting this child (§4.G).
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// A controller owner reference that cascades deletion, the shape
    /// produced by recipe expansion for every child it materialises.
    #[must_use]
    pub fn controller(owner_id: WantId, owner_name: impl Into<String>) -> Self {
        Self {
            owner_id,
            owner_name: owner_name.into(),
            controller: true,
            block_owner_deletion: true,
        }
    }
}

/// Identity and ownership metadata for a want (§3 "Metadata").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: WantId,
    pub name: String,
    /// The registry tag used to look up this want's factory (§4.D).
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl Metadata {
    /// Whether any owner reference names `candidate` as a controller whose
    /// deletion should cascade to this want (§4.G).
    #[must_use]
    pub fn has_blocking_owner(&self, candidate: WantId) -> bool {
        self.owner_references
            .iter()
            .any(|r| r.owner_id == candidate && r.controller && r.block_owner_deletion)
    }

    /// The set of controller owner ids this want should notify on a
    /// terminal transition (§4.D, owner-aware adapter).
    pub fn controller_owners(&self) -> impl Iterator<Item = WantId> + '_ {
        self.owner_references.iter().filter(|r| r.controller).map(|r| r.owner_id)
    }
}
