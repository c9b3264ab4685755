//! Batched state and append-only history (§3 "State", "History"; invariant
//! 3, §8 property 3-4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single committed history entry: the state keys that changed in one
/// execution cycle, and when the commit happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub changed: BTreeMap<String, serde_json::Value>,
}

/// One line of the agent-execution log mentioned alongside history in §3.
/// The core only carries the log; agent scheduling itself is out of scope
/// (§1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Append-only record of a want's committed state changes plus its
/// agent-execution log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
    agent_log: Vec<AgentLogEntry>,
}

impl History {
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn agent_log(&self) -> &[AgentLogEntry] {
        &self.agent_log
    }

    pub fn push_agent_log(&mut self, message: impl Into<String>) {
        self.agent_log.push(AgentLogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    fn push_entry(&mut self, changed: BTreeMap<String, serde_json::Value>) {
        self.entries.push(HistoryEntry {
            timestamp: Utc::now(),
            changed,
        });
    }
}

/// A want's conceptually-versioned state map, with the pending buffer that
/// makes a whole execution cycle's writes atomic to readers (invariant 3).
///
/// `StoreState` calls during `Exec` land in `pending`; `EndCycle` is the
/// only thing that moves them into `committed` and appends a `History`
/// entry, and only if at least one key actually changed (§8 property 4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    committed: BTreeMap<String, serde_json::Value>,
    #[serde(skip)]
    pending: Option<BTreeMap<String, serde_json::Value>>,
}

impl State {
    /// Read a committed value. Never observes an in-flight cycle's writes.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.committed.get(key)
    }

    /// A snapshot of every committed key/value pair.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.committed.clone()
    }

    /// Open a new pending buffer for an execution cycle (`BeginCycle`).
    ///
    /// Panics if a cycle is already open: the runtime is responsible for
    /// always pairing `begin_cycle` with `end_cycle` before starting
    /// another (this is a control-plane invariant, not something a want
    /// author can violate from `Exec`).
    pub fn begin_cycle(&mut self) {
        assert!(self.pending.is_none(), "begin_cycle called while a cycle was already open");
        self.pending = Some(BTreeMap::new());
    }

    /// `StoreState(key, value)`: buffer a write, invisible until
    /// `end_cycle` commits it.
    ///
    /// Panics if called outside an open cycle, for the same reason as
    /// `begin_cycle`.
    pub fn store(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let pending = self
            .pending
            .as_mut()
            .expect("store called outside an open execution cycle");
        pending.insert(key.into(), value);
    }

    /// `EndCycle`: commit the pending buffer and append a history entry iff
    /// at least one key actually changed. Returns the changed keys, if any.
    pub fn end_cycle(&mut self, history: &mut History) -> Option<BTreeMap<String, serde_json::Value>> {
        let pending = self.pending.take().unwrap_or_default();
        let mut changed = BTreeMap::new();
        for (key, value) in pending {
            if self.committed.get(&key) != Some(&value) {
                changed.insert(key.clone(), value.clone());
            }
            self.committed.insert(key, value);
        }
        if changed.is_empty() {
            None
        } else {
            history.push_entry(changed.clone());
            Some(changed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_writes_are_invisible_until_commit() {
        let mut state = State::default();
        let mut history = History::default();
        state.begin_cycle();
        state.store("a", json!(1));
        assert_eq!(state.get("a"), None);
        state.end_cycle(&mut history);
        assert_eq!(state.get("a"), Some(&json!(1)));
    }

    #[test]
    fn no_change_produces_no_history_entry() {
        let mut state = State::default();
        let mut history = History::default();
        state.begin_cycle();
        state.store("a", json!(1));
        state.end_cycle(&mut history);
        assert_eq!(history.entries().len(), 1);

        state.begin_cycle();
        state.store("a", json!(1));
        let changed = state.end_cycle(&mut history);
        assert!(changed.is_none());
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn a_cycle_that_changes_a_key_appends_one_monotonic_entry() {
        let mut state = State::default();
        let mut history = History::default();
        state.begin_cycle();
        state.store("a", json!(1));
        state.store("b", json!(2));
        state.end_cycle(&mut history);

        state.begin_cycle();
        state.store("a", json!(2));
        state.end_cycle(&mut history);

        assert_eq!(history.entries().len(), 2);
        assert!(history.entries()[1].timestamp >= history.entries()[0].timestamp);
        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!(2)));
    }

    #[test]
    #[should_panic(expected = "outside an open execution cycle")]
    fn store_outside_cycle_panics() {
        let mut state = State::default();
        state.store("a", json!(1));
    }
}
