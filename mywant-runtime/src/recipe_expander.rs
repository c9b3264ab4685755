//! Recipe Expander (§4.B): turns a recipe reference into concrete child
//! wants, deterministically and idempotently (§8 property 1).

use crate::config_store::DesiredEntry;
use mywant_core::labels::Labels;
use mywant_core::metadata::{Metadata, OwnerReference};
use mywant_core::recipe::RecipeDefinition;
use mywant_core::want::{Params, Spec};
use mywant_core::{ConfigError, WantId};

/// Expand `target`'s recipe reference into its concrete children.
///
/// The target itself is left untouched by this function: per §4.B point 3
/// it "retains no direct execution duty beyond waiting for its expanded
/// children to complete", which the Execution Runtime implements by
/// special-casing any want whose spec still carries a `recipe` reference
/// (see `runtime::TargetExec`) rather than by the expander rewriting the
/// target's own entry.
pub fn expand(target: &DesiredEntry, recipe: &RecipeDefinition) -> Result<Vec<DesiredEntry>, ConfigError> {
    let recipe_ref = target
        .spec
        .recipe
        .as_ref()
        .ok_or_else(|| ConfigError::Malformed(format!("want {} has no recipe reference", target.metadata.id)))?;

    let resolved_params = recipe.resolve_parameters(&recipe_ref.params);
    let prefix = recipe_ref
        .params
        .get("prefix")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| target.metadata.name.clone());

    let mut children = Vec::with_capacity(recipe.wants.len());
    for (zero_based_index, template) in recipe.wants.iter().enumerate() {
        let index = zero_based_index + 1;
        let name = template
            .name
            .clone()
            .unwrap_or_else(|| format!("{prefix}-{}-{index}", template.type_tag));

        let id = WantId::derive("recipe", &[
            &recipe.name,
            &target.metadata.id.to_string(),
            &index.to_string(),
        ]);

        let mut labels: Labels = template.labels.clone();
        labels.insert("owner".into(), "child".into());
        labels.insert("prefix".into(), prefix.clone());

        let mut params: Params = template.params.clone();
        for (key, value) in &resolved_params {
            if params.contains_key(key) {
                params.insert(key.clone(), value.clone());
            }
        }

        let metadata = Metadata {
            id,
            name,
            type_tag: template.type_tag.clone(),
            labels,
            owner_references: vec![OwnerReference::controller(target.metadata.id, target.metadata.name.clone())],
        };
        let spec = Spec {
            params,
            using: template.using.clone(),
            requires: template.requires,
            recipe: None,
        };
        children.push(DesiredEntry { metadata, spec });
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mywant_core::recipe::RecipeWantTemplate;
    use mywant_core::want::Requires;
    use mywant_core::RecipeRef;
    use std::collections::BTreeMap;

    fn travel_recipe() -> RecipeDefinition {
        RecipeDefinition {
            name: "travel".into(),
            parameters: BTreeMap::from([("prefix".into(), serde_json::json!("trip"))]),
            wants: vec![
                RecipeWantTemplate {
                    type_tag: "restaurant".into(),
                    name: None,
                    labels: Labels::default(),
                    params: Params::default(),
                    using: vec![],
                    requires: Requires::None,
                },
                RecipeWantTemplate {
                    type_tag: "hotel".into(),
                    name: None,
                    labels: Labels::default(),
                    params: Params::default(),
                    using: vec![],
                    requires: Requires::None,
                },
                RecipeWantTemplate {
                    type_tag: "buffet".into(),
                    name: None,
                    labels: Labels::default(),
                    params: Params::default(),
                    using: vec![],
                    requires: Requires::None,
                },
                RecipeWantTemplate {
                    type_tag: "coordinator".into(),
                    name: None,
                    labels: Labels::default(),
                    params: Params::default(),
                    using: vec![mywant_core::Selector::new([("owner", "child"), ("prefix", "trip1")])],
                    requires: Requires::Providers,
                },
            ],
            result: None,
        }
    }

    fn target() -> DesiredEntry {
        let mut params = Params::new();
        params.insert("prefix".into(), serde_json::json!("trip1"));
        DesiredEntry {
            metadata: Metadata {
                id: WantId::from_raw(1),
                name: "owner1".into(),
                type_tag: "owner".into(),
                labels: Labels::default(),
                owner_references: vec![],
            },
            spec: Spec {
                params: Params::default(),
                using: vec![],
                requires: Requires::None,
                recipe: Some(RecipeRef {
                    name: "travel".into(),
                    params,
                }),
            },
        }
    }

    #[test]
    fn expansion_produces_deterministic_names_per_scenario_iii() {
        let recipe = travel_recipe();
        let children = expand(&target(), &recipe).unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.metadata.name.as_str()).collect();
        assert_eq!(names, vec![
            "trip1-restaurant-1",
            "trip1-hotel-2",
            "trip1-buffet-3",
            "trip1-coordinator-4",
        ]);
    }

    #[test]
    fn expansion_is_idempotent_across_repeated_calls() {
        let recipe = travel_recipe();
        let first = expand(&target(), &recipe).unwrap();
        let second = expand(&target(), &recipe).unwrap();
        let first_ids: Vec<WantId> = first.iter().map(|c| c.metadata.id).collect();
        let second_ids: Vec<WantId> = second.iter().map(|c| c.metadata.id).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first, second);
    }

    #[test]
    fn children_carry_controller_owner_reference_and_namespace_labels() {
        let recipe = travel_recipe();
        let children = expand(&target(), &recipe).unwrap();
        for child in &children {
            assert_eq!(child.metadata.labels.get("owner"), Some(&"child".to_string()));
            assert_eq!(child.metadata.labels.get("prefix"), Some(&"trip1".to_string()));
            assert!(child.metadata.has_blocking_owner(WantId::from_raw(1)));
        }
    }
}
