//! Conjunctive label selectors (§3, §4.C).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A string-keyed label map carried on a want's metadata.
pub type Labels = BTreeMap<String, String>;

/// A single `using` entry: a conjunctive match against a producer's labels.
///
/// Every key/value pair in the selector must appear identically in the
/// producer's labels for a match (§4.C, "Conjunctive label match"). An
/// empty selector matches every want, mirroring `Selector::selects_all` in
/// the corpus this pattern is modeled on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(Labels);

impl Selector {
    /// Build a selector from an iterator of label key/value pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Whether this selector matches every want (has no constraints).
    #[must_use]
    pub fn selects_all(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `labels` satisfies every entry of this selector.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Iterate the selector's key/value constraints.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}
