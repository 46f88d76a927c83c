//! BDD step definitions for `tests/features/reconciliation.feature`.

use std::cell::RefCell;

use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{FakeNetwork, FakeRuntime, TestWorld, world};
use crate::executor::ComposeVerb;
use crate::probe::ProbeFailure;
use crate::reconciler::ObservedState;
use crate::runtime::RuntimeAdapter;

fn parse_verb(text: &str) -> ComposeVerb {
    [
        ComposeVerb::Up,
        ComposeVerb::Start,
        ComposeVerb::Stop,
        ComposeVerb::Down,
    ]
    .into_iter()
    .find(|verb| verb.to_string() == text)
    .unwrap_or_else(|| panic!("unknown compose verb {text:?}"))
}

#[given("no managed containers exist")]
fn given_empty(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_runtime(FakeRuntime::empty());
}

#[given("the managed containers are stopped")]
fn given_stopped(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_runtime(FakeRuntime::stopped());
}

#[given("the managed containers are running")]
fn given_running(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_runtime(FakeRuntime::running());
}

#[given("the container runtime is unavailable")]
fn given_unavailable(world: &RefCell<TestWorld>) {
    world
        .borrow_mut()
        .use_runtime(FakeRuntime::unobservable(ProbeFailure::ToolUnavailable(
            String::from("'docker' is not available"),
        )));
}

#[given("the orchestrator fails \"{verb}\" with \"{reason}\"")]
fn given_failure(world: &RefCell<TestWorld>, verb: String, reason: String) {
    world.borrow().runtime.fail_next(parse_verb(&verb), &reason);
}

#[given("the orchestrator times out on \"{verb}\"")]
fn given_timeout(world: &RefCell<TestWorld>, verb: String) {
    world.borrow().runtime.stall_next(
        parse_verb(&verb),
        &format!("'docker compose {verb}' did not finish within 300000 ms"),
    );
}

#[given("the compose tool is missing")]
fn given_compose_missing(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    for verb in [
        ComposeVerb::Up,
        ComposeVerb::Start,
        ComposeVerb::Stop,
        ComposeVerb::Down,
    ] {
        world
            .runtime
            .stall_next(verb, "'docker-compose' is not available: entity not found");
    }
}

#[given("the operator interrupts \"{verb}\"")]
fn given_interrupt(world: &RefCell<TestWorld>, verb: String) {
    world.borrow().runtime.interrupt_on(parse_verb(&verb));
}

#[given("the endpoint does not answer")]
fn given_endpoint_silent(world: &RefCell<TestWorld>) {
    world.borrow_mut().network = FakeNetwork::reachable(false);
}

#[when("the operator reconciles")]
fn when_reconciles(world: &RefCell<TestWorld>) {
    world.borrow_mut().reconcile();
}

#[when("the operator reconciles again")]
fn when_reconciles_again(world: &RefCell<TestWorld>) {
    world.borrow_mut().reconcile();
}

#[when("the operator checks status")]
fn when_checks_status(world: &RefCell<TestWorld>) {
    world.borrow_mut().status();
}

#[then("the orchestrator ran \"{verbs}\"")]
fn then_orchestrator_ran(world: &RefCell<TestWorld>, verbs: String) {
    let expected: Vec<ComposeVerb> = verbs.split(", ").map(parse_verb).collect();
    assert_eq!(world.borrow().runtime.invocations(), expected);
}

#[then("the orchestrator was not invoked")]
fn then_not_invoked(world: &RefCell<TestWorld>) {
    assert!(world.borrow().runtime.invocations().is_empty());
}

#[then("the final state is all running")]
fn then_all_running(world: &RefCell<TestWorld>) {
    let snapshot = world.borrow().runtime.snapshot();
    assert_eq!(ObservedState::classify(&snapshot), ObservedState::AllRunning);
}

#[then("readiness was probed")]
fn then_probed(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().network.budgets().len(), 1);
}

#[then("readiness was not probed")]
fn then_not_probed(world: &RefCell<TestWorld>) {
    assert!(world.borrow().network.budgets().is_empty());
}

#[then("the summary contains \"{snippet}\"")]
fn then_summary_contains(world: &RefCell<TestWorld>, snippet: String) {
    let stdout = world.borrow().stdout_text();
    assert!(
        stdout.contains(&snippet),
        "summary {stdout:?} did not contain {snippet:?}"
    );
}

#[then("the run exits with code {status}")]
fn then_exit_code(world: &RefCell<TestWorld>, status: u8) {
    world.borrow().assert_exit_code(status);
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "An empty deployment is created and started"
)]
fn empty_deployment_is_created(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "Stopped containers are started in place"
)]
fn stopped_containers_are_started(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A failed start escalates to recreate"
)]
fn failed_start_escalates(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A failed recreate is fatal"
)]
fn failed_recreate_is_fatal(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A running deployment is left alone but still verified"
)]
fn running_deployment_is_verified(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A second run after success is a no-op"
)]
fn second_run_is_noop(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "An unobservable runtime is never treated as empty"
)]
fn unobservable_runtime_defers(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "An interrupt during an action exits with 130"
)]
fn interrupt_exits_130(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "Status mode observes without acting"
)]
fn status_mode_observes(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A timed-out start is not escalated to recreate"
)]
fn timed_out_start_is_not_escalated(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/reconciliation.feature",
    name = "A missing compose tool defers instead of failing"
)]
fn missing_compose_defers(world: RefCell<TestWorld>) {
    let _ = world;
}
