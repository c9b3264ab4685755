//! Registers the `travel` recipe (restaurant + hotel + buffet booked in
//! parallel, then a coordinator that waits on all three) and submits one
//! target want that expands into it, demonstrating recipe expansion and
//! result aggregation end to end.

use mywant::{Context, Engine, RecipeDefinition, RecipeRef, Registry, ResultSpec, Selector, WantSubmission};
use mywant_core::recipe::RecipeWantTemplate;
use mywant_core::want::{Requires, Spec};
use std::collections::BTreeMap;

fn travel_recipe() -> RecipeDefinition {
    RecipeDefinition {
        name: "travel".into(),
        parameters: BTreeMap::from([("prefix".into(), serde_json::json!("trip"))]),
        wants: vec![
            RecipeWantTemplate {
                type_tag: "restaurant".into(),
                name: None,
                labels: Default::default(),
                params: Default::default(),
                using: vec![],
                requires: Requires::None,
            },
            RecipeWantTemplate {
                type_tag: "hotel".into(),
                name: None,
                labels: Default::default(),
                params: Default::default(),
                using: vec![],
                requires: Requires::None,
            },
            RecipeWantTemplate {
                type_tag: "buffet".into(),
                name: None,
                labels: Default::default(),
                params: Default::default(),
                using: vec![],
                requires: Requires::None,
            },
            RecipeWantTemplate {
                type_tag: "coordinator".into(),
                name: None,
                labels: Default::default(),
                params: Default::default(),
                using: vec![Selector::new([("owner", "child")])],
                requires: Requires::Providers,
            },
        ],
        result: Some(ResultSpec { state_keys: vec!["confirmation".into()] }),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut registry = Registry::new();
    mywant_demos::register_all(&mut registry);
    let engine = Engine::new(registry, Context::default());
    engine.register_recipe(travel_recipe());

    let mut params = mywant_core::Params::new();
    params.insert("prefix".into(), serde_json::json!("trip1"));
    engine.submit(WantSubmission {
        name: Some("trip1".into()),
        type_tag: "owner".into(),
        labels: Default::default(),
        owner_references: vec![],
        spec: Spec {
            recipe: Some(RecipeRef { name: "travel".into(), params }),
            ..Spec::default()
        },
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(async move { engine.run(shutdown_rx).await });

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
}
