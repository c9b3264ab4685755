//! Recipe templates (§4.B): parameterised groups of wants that expand into
//! concrete children plus a target want that aggregates their result.

use crate::labels::Labels;
use crate::want::{Params, Requires};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry in a recipe's `wants[…]` template list.
///
/// `name` is a template; when absent the expander generates
/// `<prefix>-<type>-<index>` (§4.B point 2). `params` values that match a
/// recipe parameter name are substituted at expansion time; everything
/// else passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeWantTemplate {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub using: Vec<crate::labels::Selector>,
    #[serde(default = "default_requires")]
    pub requires: Requires,
}

fn default_requires() -> Requires {
    Requires::None
}

/// How the referring (target) want computes its result once every
/// expanded child has completed (§4.B point 3, §4.G).
///
/// For each child, the named `state_keys` are pulled out of its committed
/// state into one aggregated entry keyed by the child's name, giving "one
/// aggregated entry per child" (§8 scenario iii).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSpec {
    pub state_keys: Vec<String>,
}

/// A parameterised template that expands into a set of concrete wants
/// (§4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDefinition {
    pub name: String,
    /// Parameter name -> default value, overridden by the referring want's
    /// own `params` at expansion time.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub wants: Vec<RecipeWantTemplate>,
    #[serde(default)]
    pub result: Option<ResultSpec>,
}

impl RecipeDefinition {
    /// Resolve the effective parameter set: recipe defaults overridden by
    /// the caller's overrides (§4.B point 1).
    #[must_use]
    pub fn resolve_parameters(&self, overrides: &Params) -> BTreeMap<String, serde_json::Value> {
        let mut resolved = self.parameters.clone();
        for (k, v) in overrides {
            if resolved.contains_key(k) {
                resolved.insert(k.clone(), v.clone());
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_only_affect_known_parameters() {
        let recipe = RecipeDefinition {
            name: "travel".into(),
            parameters: BTreeMap::from([("prefix".into(), json!("trip"))]),
            wants: vec![],
            result: None,
        };
        let mut overrides = Params::new();
        overrides.insert("prefix".into(), json!("trip1"));
        overrides.insert("unrelated".into(), json!(42));

        let resolved = recipe.resolve_parameters(&overrides);
        assert_eq!(resolved.get("prefix"), Some(&json!("trip1")));
        assert!(!resolved.contains_key("unrelated"));
    }
}
