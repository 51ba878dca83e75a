//! Then step definitions

use crate::world::{AcceptanceWorld, Verification};
use cucumber::then;

#[then(expr = "the response body should be {string}")]
fn response_body(world: &mut AcceptanceWorld, expected: String) {
    let response = world.last_response();
    assert_eq!(
        response["body"].as_str(),
        Some(expected.as_str()),
        "Unexpected response {response}"
    );
}

#[then(expr = "the response status should be {int}")]
fn response_status(world: &mut AcceptanceWorld, expected: u64) {
    let response = world.last_response();
    assert_eq!(response["status"].as_u64(), Some(expected), "Unexpected response {response}");
}

#[then("the request should not be matched")]
fn not_matched(world: &mut AcceptanceWorld) {
    let outcome = world.last_outcome();
    assert!(
        !outcome.is_matched(),
        "Request was served by {:?}",
        outcome.mapping.as_ref().map(|m| m.mapping().display_name())
    );
    assert!(!outcome.event.was_matched);
}

#[then(expr = "the scenario {string} should be in state {string}")]
fn scenario_state(world: &mut AcceptanceWorld, name: String, expected: String) {
    assert_eq!(world.engine.scenario_state(&name), Some(expected));
}

#[then(expr = "the closest stub should be {string}")]
fn closest_stub(world: &mut AcceptanceWorld, expected: String) {
    let request = &world.last_outcome().event.request.request;
    let misses = world.engine.near_misses(request);
    let closest = misses.first().expect("No near misses");
    assert_eq!(
        closest.stub_mapping.as_ref().map(|m| m.display_name()),
        Some(expected)
    );
}

#[then(expr = "the diff should mark {string} as not matching")]
fn diff_marks(world: &mut AcceptanceWorld, label: String) {
    let request = &world.last_outcome().event.request.request;
    let diff = world
        .engine
        .render_not_matched(request)
        .expect("No stub to compare with");
    let marker = format!("<<<<< {label} does not match");
    assert!(diff.contains(&marker), "Missing '{marker}' in:\n{diff}");
}

#[then(expr = "the diff should not mark {string}")]
fn diff_does_not_mark(world: &mut AcceptanceWorld, label: String) {
    let request = &world.last_outcome().event.request.request;
    let diff = world
        .engine
        .render_not_matched(request)
        .expect("No stub to compare with");
    let marker = format!("<<<<< {label} does not match");
    assert!(!diff.contains(&marker), "Unexpected '{marker}' in:\n{diff}");
}

#[then(expr = "the registration should fail with {string}")]
fn registration_failed(world: &mut AcceptanceWorld, fragment: String) {
    let error = world
        .registration_error
        .as_ref()
        .expect("Registration succeeded");
    assert!(error.contains(&fragment), "Unexpected error: {error}");
}

#[then(expr = "the registration should warn {string}")]
fn registration_warned(world: &mut AcceptanceWorld, fragment: String) {
    assert!(
        world.registration_warnings.iter().any(|w| w.contains(&fragment)),
        "No warning containing '{fragment}' in {:?}",
        world.registration_warnings
    );
}

#[then(expr = "there should be {int} stub mapping(s)")]
fn mapping_count(world: &mut AcceptanceWorld, expected: usize) {
    assert_eq!(world.engine.mappings().len(), expected);
}

#[then("the verification should pass")]
fn verification_passed(world: &mut AcceptanceWorld) {
    match world.verification.as_ref().expect("Nothing was verified") {
        Verification::Passed => {}
        Verification::Failed(message) => panic!("Verification failed:\n{message}"),
    }
}

#[then(expr = "the verification should fail mentioning {string}")]
fn verification_failed(world: &mut AcceptanceWorld, fragment: String) {
    match world.verification.as_ref().expect("Nothing was verified") {
        Verification::Passed => panic!("Verification passed"),
        Verification::Failed(message) => {
            assert!(message.contains(&fragment), "Unexpected message:\n{message}")
        }
    }
}

#[then(expr = "the journal should contain {int} request(s)")]
fn journal_size(world: &mut AcceptanceWorld, expected: usize) {
    assert_eq!(world.engine.all_requests().len(), expected);
}
