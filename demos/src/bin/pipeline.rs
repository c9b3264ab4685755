//! Wires a numbers generator through a delaying queue into a counting
//! sink, purely by label selectors, and lets the engine resolve and run
//! the pipeline to completion.

use mywant::{Context, Engine, Registry, Selector, WantSubmission};
use mywant_core::want::{Requires, Spec};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut registry = Registry::new();
    mywant_demos::register_all(&mut registry);
    let engine = Engine::new(registry, Context::default());

    engine.submit(WantSubmission {
        name: Some("gen".into()),
        type_tag: "numbers".into(),
        labels: [("role".to_string(), "source".to_string())].into_iter().collect(),
        owner_references: vec![],
        spec: Spec { params: [("count".to_string(), serde_json::json!(5))].into_iter().collect(), ..Spec::default() },
    });
    engine.submit(WantSubmission {
        name: Some("queue".into()),
        type_tag: "delaying_queue".into(),
        labels: [("role".to_string(), "relay".to_string())].into_iter().collect(),
        owner_references: vec![],
        spec: Spec {
            using: vec![Selector::new([("role", "source")])],
            requires: Requires::Providers,
            ..Spec::default()
        },
    });
    engine.submit(WantSubmission {
        name: Some("sink".into()),
        type_tag: "counting_sink".into(),
        labels: Default::default(),
        owner_references: vec![],
        spec: Spec {
            using: vec![Selector::new([("role", "relay")])],
            requires: Requires::Providers,
            ..Spec::default()
        },
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(async move { engine.run(shutdown_rx).await });

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
}
