//! When step definitions

use crate::world::{AcceptanceWorld, Verification};
use cucumber::{gherkin::Step, when};
use mimic_core::{Request, RequestCount};

fn serve(world: &mut AcceptanceWorld, request: Request) {
    world.last = Some(world.engine.serve(request));
}

#[when(expr = "a {word} request is made to {string}")]
fn plain_request(world: &mut AcceptanceWorld, method: String, url: String) {
    serve(world, Request::new(method, url));
}

#[when(expr = "a {word} request is made to {string} with header {string} set to {string}")]
fn request_with_header(
    world: &mut AcceptanceWorld,
    method: String,
    url: String,
    name: String,
    value: String,
) {
    serve(world, Request::new(method, url).with_header(name, value));
}

#[when(expr = "a {word} request is made to {string} with body:")]
fn request_with_body(world: &mut AcceptanceWorld, method: String, url: String, step: &Step) {
    let body = step.docstring().expect("Missing docstring").trim().to_string();
    serve(world, Request::new(method, url).with_body(body));
}

#[when("all scenarios are reset")]
fn reset_scenarios(world: &mut AcceptanceWorld) {
    world.engine.reset_scenarios();
}

#[when(expr = "the scenario {string} is set to {string}")]
fn set_scenario(world: &mut AcceptanceWorld, name: String, state: String) {
    world
        .engine
        .set_scenario_state(&name, &state)
        .expect("Failed to set scenario state");
}

#[when("I register the stub mapping:")]
fn try_register(world: &mut AcceptanceWorld, step: &Step) {
    // Failures are asserted by later steps
    let _ = world.register(step.docstring().expect("Missing docstring"));
}

#[when(expr = "I verify {int} request(s) matching:")]
fn verify(world: &mut AcceptanceWorld, count: usize, step: &Step) {
    let pattern = AcceptanceWorld::parse_pattern(step.docstring().expect("Missing docstring"));
    let compiled = world
        .engine
        .compile_pattern(&pattern)
        .expect("Invalid request pattern");
    world.verification = Some(match world.engine.verify(&compiled, RequestCount::Exactly(count)) {
        Ok(()) => Verification::Passed,
        Err(e) => Verification::Failed(e.message),
    });
}
