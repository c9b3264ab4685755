//! The [`Want`] type: the unit of configuration and execution (§3).

use crate::id::WantId;
use crate::labels::Selector;
use crate::metadata::Metadata;
use crate::state::{History, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A want's params: arbitrary scalars or nested structs, keyed by name.
///
/// Represented as dynamic JSON rather than a fixed Rust type, the way
/// `DynamicObject` in the corpus carries arbitrary data for object kinds
/// that aren't known at compile time — the core only ever reads selected
/// keys (e.g. `prefix` during recipe expansion) and otherwise passes values
/// through opaquely to the want type that owns them.
pub type Params = BTreeMap<String, serde_json::Value>;

/// What a want needs before it may transition to `running` (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requires {
    /// No inputs or consumers are required.
    None,
    /// At least one downstream consumer must exist.
    Users,
    /// Every resolved input must exist and be wired.
    Providers,
    /// Both of the above.
    ProvidersAndUsers,
}

impl Requires {
    #[must_use]
    pub fn needs_providers(self) -> bool {
        matches!(self, Requires::Providers | Requires::ProvidersAndUsers)
    }

    #[must_use]
    pub fn needs_users(self) -> bool {
        matches!(self, Requires::Users | Requires::ProvidersAndUsers)
    }
}

/// A reference to a recipe template plus the caller's parameter overrides
/// (§4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRef {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

/// The declared configuration of a want: what it should do and what it
/// depends on (§3 "Spec").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub using: Vec<Selector>,
    #[serde(default = "default_requires")]
    pub requires: Requires,
    #[serde(default)]
    pub recipe: Option<RecipeRef>,
}

fn default_requires() -> Requires {
    Requires::None
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            params: Params::default(),
            using: Vec::new(),
            requires: Requires::None,
            recipe: None,
        }
    }
}

impl Spec {
    /// Whether this spec differs from `other` in a way that requires a
    /// full delete+add rather than an in-place parameter update (§4.F
    /// "structural update").
    #[must_use]
    pub fn differs_structurally(&self, other: &Spec) -> bool {
        self.using != other.using || self.requires != other.requires || self.recipe != other.recipe
    }
}

/// A want's lifecycle phase (§3 "Status", invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl Status {
    /// Whether `self -> next` is a legal transition under invariant 2.
    ///
    /// `failed -> idle` is included even though `failed` is documented as
    /// terminal: it is reachable only via an explicit `restart` control
    /// message, never by the runtime on its own, which is what "terminal
    /// unless explicitly reset" means in practice.
    ///
    /// `running -> idle` is the Reconciler's parameter-only-update reset
    /// (§4.F step 6): also reconciler-driven rather than something a want's
    /// own `Exec` can trigger from inside a cycle.
    #[must_use]
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::{Completed, Failed, Idle, Running, Suspended};
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Suspended)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Idle)
                | (Suspended, Running)
                | (Suspended, Completed)
                | (Completed, Idle)
                | (Failed, Idle)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// A diagnostic recorded against a want's status by the resolver or runtime
/// (§7). Not itself part of `Status` so that a `failed`/`running` want can
/// still carry the diagnostic that explains how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// A named, typed processing unit (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Want {
    pub metadata: Metadata,
    pub spec: Spec,
    pub status: Status,
    pub state: State,
    pub history: History,
    #[serde(default)]
    pub diagnostic: Option<Diagnostic>,
}

impl Want {
    /// Construct a new want in `idle` status with empty state/history.
    #[must_use]
    pub fn new(metadata: Metadata, spec: Spec) -> Self {
        Self {
            metadata,
            spec,
            status: Status::Idle,
            state: State::default(),
            history: History::default(),
            diagnostic: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> WantId {
        self.metadata.id
    }

    /// Attempt the transition, returning whether it was legal. Illegal
    /// transitions are a programmer error in the Reconciler/runtime and are
    /// rejected rather than silently coerced.
    #[must_use]
    pub fn try_transition(&mut self, next: Status) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn record_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostic = Some(Diagnostic {
            message: message.into(),
            recorded_at: chrono::Utc::now(),
        });
    }

    /// Open a new execution cycle's pending-state buffer (§4.E `BeginCycle`).
    pub fn begin_cycle(&mut self) {
        self.state.begin_cycle();
    }

    /// Commit the cycle's pending-state buffer, appending a history entry
    /// only if anything actually changed (§4.E `EndCycle`, §8 property 4).
    pub fn end_cycle(&mut self) -> Option<BTreeMap<String, serde_json::Value>> {
        let Self { state, history, .. } = self;
        state.end_cycle(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_match_invariant_2() {
        assert!(Status::Idle.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Suspended));
        assert!(Status::Running.can_transition_to(Status::Completed));
        assert!(Status::Running.can_transition_to(Status::Failed));
        assert!(Status::Suspended.can_transition_to(Status::Running));
        assert!(Status::Completed.can_transition_to(Status::Idle));
        assert!(Status::Failed.can_transition_to(Status::Idle), "failed is terminal unless explicitly reset by restart");
        assert!(Status::Running.can_transition_to(Status::Idle), "reconciler-driven reset on parameter-only update");
        assert!(!Status::Idle.can_transition_to(Status::Completed));
    }

    #[test]
    fn structural_diff_ignores_param_only_changes() {
        let mut a = Spec::default();
        a.params.insert("count".into(), serde_json::json!(10));
        let mut b = a.clone();
        b.params.insert("count".into(), serde_json::json!(20));
        assert!(!a.differs_structurally(&b));

        b.requires = Requires::Users;
        assert!(a.differs_structurally(&b));
    }
}
