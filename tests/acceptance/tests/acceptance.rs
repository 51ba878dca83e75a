//! Cucumber acceptance tests for the Mimic matching engine
//!
//! Run with: cargo test --test acceptance

use cucumber::{writer, World, WriterExt};
use mimic_acceptance_tests::world::AcceptanceWorld;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    AcceptanceWorld::cucumber()
        .before(|_feature, _rule, scenario, _world| {
            Box::pin(async move {
                tracing::info!("Starting scenario: {}", scenario.name);
            })
        })
        .with_writer(writer::Basic::stdout().summarized().assert_normalized())
        .filter_run(
            concat!(env!("CARGO_MANIFEST_DIR"), "/features"),
            |_, _, sc| !sc.tags.iter().any(|t| t == "skip"),
        )
        .await;
}
