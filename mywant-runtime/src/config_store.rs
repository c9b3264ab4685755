//! Config Store (§4.A): the authoritative declared set of wants.
//!
//! Mirrors the split the teacher draws between a `Writer` (exclusive,
//! single-writer mutation handle — `reflector/store.rs`) and the
//! lock-protected map it wraps, except here the "writer" is the
//! Reconciler itself rather than a reflector task, and mutations arrive
//! through an explicit queue instead of a watch stream.

use mywant_core::labels::{Labels, Selector};
use mywant_core::metadata::{Metadata, OwnerReference};
use mywant_core::want::{Params, Requires, Spec};
use mywant_core::{ConfigError, RecipeDefinition, WantId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The declared (desired) shape of a want: identity plus spec, with no
/// status/state/history — those only exist once the Execution Runtime has
/// actually instantiated the want (§3 "Lifecycle").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub metadata: Metadata,
    pub spec: Spec,
}

/// The caller-supplied shape of a brand new want (§6 `SubmitConfig`).
///
/// `name` is optional; the store auto-generates one from the type tag and
/// id if absent (§3 "human name... auto-generated if absent").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantSubmission {
    pub name: Option<String>,
    pub type_tag: String,
    pub labels: Labels,
    pub owner_references: Vec<OwnerReference>,
    pub spec: Spec,
}

/// A partial update to an existing want's spec (§6 `UpdateWant`).
///
/// `None` fields are left unchanged; `Some` fields replace the existing
/// value wholesale (params are merged key-by-key, since a "parameter-only
/// update" in §4.F is expected to patch individual keys, not replace the
/// whole params map).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecPatch {
    pub params: Option<Params>,
    pub using: Option<Vec<Selector>>,
    pub requires: Option<Requires>,
}

/// One queued change to the declared set, produced by an external call and
/// drained by the Reconciler on its next tick (§4.A, §4.F step 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(WantSubmission),
    Delete(WantId),
    Update(WantId, SpecPatch),
}

#[derive(Default)]
struct Indices {
    wants: HashMap<WantId, DesiredEntry>,
    by_name: HashMap<String, WantId>,
    by_label: HashMap<(String, String), HashSet<WantId>>,
}

/// The Config Store.
///
/// All index mutation happens in [`ConfigStore::apply`]; everything else
/// (`enqueue_*`) only appends to the mutation queue, so the store's maps
/// only ever change from inside the Reconciler's tick (single-writer, §5).
pub struct ConfigStore {
    indices: Mutex<Indices>,
    recipes: Mutex<HashMap<String, RecipeDefinition>>,
    mutations: Mutex<VecDeque<Mutation>>,
    /// Bumped once per name-less `Add`, so two anonymous submissions of the
    /// same type never derive the same id.
    anonymous_seq: std::sync::atomic::AtomicU64,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: Mutex::new(Indices::default()),
            recipes: Mutex::new(HashMap::new()),
            mutations: Mutex::new(VecDeque::new()),
            anonymous_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// `RegisterRecipe` (§6, in-process).
    pub fn register_recipe(&self, definition: RecipeDefinition) {
        self.recipes.lock().insert(definition.name.clone(), definition);
    }

    #[must_use]
    pub fn recipe(&self, name: &str) -> Option<RecipeDefinition> {
        self.recipes.lock().get(name).cloned()
    }

    /// Enqueue a new want (`SubmitConfig`/`AddWants`). Never mutates the
    /// declared set inline (§4.A).
    pub fn enqueue_add(&self, submission: WantSubmission) {
        self.mutations.lock().push_back(Mutation::Add(submission));
    }

    /// Enqueue a deletion (`DeleteWant`).
    pub fn enqueue_delete(&self, id: WantId) {
        self.mutations.lock().push_back(Mutation::Delete(id));
    }

    /// Enqueue a spec patch (`UpdateWant`).
    pub fn enqueue_update(&self, id: WantId, patch: SpecPatch) {
        self.mutations.lock().push_back(Mutation::Update(id, patch));
    }

    /// Drain every mutation queued since the last tick. Called once at the
    /// start of the Reconciler's tick (§4.F step 1); the lock is held only
    /// long enough to swap the queue out (§5 "short").
    pub fn drain_mutations(&self) -> Vec<Mutation> {
        let mut guard = self.mutations.lock();
        guard.drain(..).collect()
    }

    /// `Snapshot()`: a frozen copy of the declared set, safe to diff
    /// against without holding the store's lock (§4.A).
    #[must_use]
    pub fn snapshot(&self) -> Vec<DesiredEntry> {
        self.indices.lock().wants.values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, id: WantId) -> Option<DesiredEntry> {
        self.indices.lock().wants.get(&id).cloned()
    }

    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<WantId> {
        self.indices.lock().by_name.get(name).copied()
    }

    /// `ListWants(filter_labels?)` (§6).
    #[must_use]
    pub fn list_ids(&self, filter: Option<&Selector>) -> Vec<WantId> {
        let indices = self.indices.lock();
        match filter {
            None => indices.wants.keys().copied().collect(),
            Some(sel) => indices
                .wants
                .values()
                .filter(|entry| sel.matches(&entry.metadata.labels))
                .map(|entry| entry.metadata.id)
                .collect(),
        }
    }

    /// `Apply(change_set)`: atomically apply a batch of mutations to the
    /// declared set.
    ///
    /// Structural well-formedness only (§4.A): ids unique, names unique,
    /// referenced recipes exist. Semantic checks (reachability, cycles)
    /// are the Topology Resolver's job. Each mutation is validated and
    /// applied independently; a rejected mutation leaves prior state
    /// unchanged and is reported back via its slot in the returned vec
    /// (§7 "Configuration errors... reported synchronously... prior state
    /// unchanged").
    pub fn apply(&self, batch: Vec<Mutation>) -> Vec<Result<WantId, ConfigError>> {
        let mut indices = self.indices.lock();
        batch
            .into_iter()
            .map(|mutation| self.apply_one(&mut indices, mutation))
            .collect()
    }

    /// Derive the id a submission would get: named submissions hash their
    /// name (stable across resubmission attempts of the same name), and
    /// anonymous ones hash a private sequence number so they never collide.
    fn id_for_submission(&self, submission: &WantSubmission) -> WantId {
        match &submission.name {
            Some(name) => WantId::derive("store:named", &[name]),
            None => {
                let seq = self
                    .anonymous_seq
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                WantId::derive("store:anon", &[&submission.type_tag, &seq.to_string()])
            }
        }
    }

    fn apply_one(&self, indices: &mut Indices, mutation: Mutation) -> Result<WantId, ConfigError> {
        match mutation {
            Mutation::Add(submission) => {
                if let Some(recipe) = &submission.spec.recipe {
                    if !self.recipes.lock().contains_key(&recipe.name) {
                        let id = self.id_for_submission(&submission);
                        return Err(ConfigError::UnknownRecipe(recipe.name.clone(), id));
                    }
                }
                let id = self.id_for_submission(&submission);
                for owner in &submission.owner_references {
                    if !indices.wants.contains_key(&owner.owner_id) {
                        return Err(ConfigError::UnknownOwner(id, owner.owner_id));
                    }
                }

                let name = submission
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}-{}", submission.type_tag, id));

                if indices.by_name.contains_key(&name) {
                    return Err(ConfigError::DuplicateName(name));
                }
                if indices.wants.contains_key(&id) {
                    return Err(ConfigError::DuplicateId(id));
                }

                let metadata = Metadata {
                    id,
                    name: name.clone(),
                    type_tag: submission.type_tag,
                    labels: submission.labels,
                    owner_references: submission.owner_references,
                };
                for (k, v) in &metadata.labels {
                    indices
                        .by_label
                        .entry((k.clone(), v.clone()))
                        .or_default()
                        .insert(id);
                }
                indices.by_name.insert(name, id);
                indices.wants.insert(id, DesiredEntry {
                    metadata,
                    spec: submission.spec,
                });
                Ok(id)
            }
            Mutation::Delete(id) => {
                let Some(entry) = indices.wants.remove(&id) else {
                    return Ok(id); // deleting an absent want is a no-op, not an error
                };
                indices.by_name.remove(&entry.metadata.name);
                for (k, v) in &entry.metadata.labels {
                    if let Some(set) = indices.by_label.get_mut(&(k.clone(), v.clone())) {
                        set.remove(&id);
                    }
                }
                Ok(id)
            }
            Mutation::Update(id, patch) => {
                let Some(entry) = indices.wants.get_mut(&id) else {
                    return Err(ConfigError::Malformed(format!("update for unknown want {id}")));
                };
                if let Some(params) = patch.params {
                    entry.spec.params.extend(params);
                }
                if let Some(using) = patch.using {
                    entry.spec.using = using;
                }
                if let Some(requires) = patch.requires {
                    entry.spec.requires = requires;
                }
                Ok(id)
            }
        }
    }
}
