//! Given step definitions

use crate::world::AcceptanceWorld;
use cucumber::{gherkin::Step, given};

fn docstring(step: &Step) -> &str {
    step.docstring().expect("Missing docstring")
}

#[given("a stub mapping:")]
fn stub_mapping(world: &mut AcceptanceWorld, step: &Step) {
    world
        .register(docstring(step))
        .expect("Failed to register stub mapping");
}

#[given("the stub mappings:")]
fn stub_mappings(world: &mut AcceptanceWorld, step: &Step) {
    world
        .register(docstring(step))
        .expect("Failed to register stub mappings");
}

#[given(expr = "a stub named {string} for {word} {string}")]
fn named_stub(world: &mut AcceptanceWorld, name: String, method: String, url: String) {
    let mapping = format!(
        r#"{{"name": "{name}", "request": {{"method": "{method}", "url": "{url}"}}, "response": {{"status": 200, "body": "{name}"}}}}"#
    );
    world
        .register(&mapping)
        .expect("Failed to register stub mapping");
}
