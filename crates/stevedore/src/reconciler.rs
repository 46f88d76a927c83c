//! Observe, decide and act.
//!
//! The decision itself is the pure [`decide`] function over an
//! [`ObservedState`]; [`fallback`] names the escalation for a failed action.
//! [`Reconciler`] owns the single side-effecting pass: one snapshot, one plan,
//! and at most one walk down the plan's fallback chain.

use std::fmt;

use thiserror::Error;

use crate::executor::{ActionExecutor, ActionResult};
use crate::probe::Snapshot;
use crate::reporter::ReconcileReporter;
use crate::runtime::RuntimeAdapter;

/// Aggregate state derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    /// No managed container exists.
    NoContainers,
    /// Containers exist but none is running.
    AllStopped,
    /// At least one container runs and at least one does not.
    SomeRunning,
    /// Every managed container runs.
    AllRunning,
    /// The runtime could not be observed.
    Indeterminate,
}

impl ObservedState {
    /// Classifies a snapshot.
    ///
    /// Containers whose status is unknown count as not running.
    #[must_use]
    pub fn classify(snapshot: &Snapshot) -> Self {
        let Snapshot::Observed(containers) = snapshot else {
            return Self::Indeterminate;
        };
        if containers.is_empty() {
            return Self::NoContainers;
        }
        let running = containers
            .iter()
            .filter(|container| container.is_running())
            .count();
        if running == 0 {
            Self::AllStopped
        } else if running == containers.len() {
            Self::AllRunning
        } else {
            Self::SomeRunning
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::NoContainers => "no containers",
            Self::AllStopped => "all stopped",
            Self::SomeRunning => "some running",
            Self::AllRunning => "all running",
            Self::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Lifecycle action chosen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create missing containers and start them.
    CreateAndStart,
    /// Start containers that exist but are stopped.
    StartExisting,
    /// Stop, remove and create everything afresh.
    Recreate,
    /// Leave the runtime untouched.
    NoOp,
}

impl Action {
    const fn label(self) -> &'static str {
        match self {
            Self::CreateAndStart => "create-and-start",
            Self::StartExisting => "start-existing",
            Self::Recreate => "recreate",
            Self::NoOp => "no-op",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Chooses the action for an observed state.
#[must_use]
pub const fn decide(state: ObservedState) -> Action {
    match state {
        ObservedState::NoContainers => Action::CreateAndStart,
        ObservedState::AllStopped => Action::StartExisting,
        ObservedState::SomeRunning | ObservedState::AllRunning | ObservedState::Indeterminate => {
            Action::NoOp
        }
    }
}

/// The more aggressive action to try when `failed` fails, if any.
#[must_use]
pub const fn fallback(failed: Action) -> Option<Action> {
    match failed {
        Action::StartExisting => Some(Action::Recreate),
        Action::CreateAndStart | Action::Recreate | Action::NoOp => None,
    }
}

/// Ordered action chain computed for one run.
///
/// The first action is the decision; each later one is the fallback for the
/// action before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    state: ObservedState,
    actions: Vec<Action>,
    rationale: String,
}

impl ReconciliationPlan {
    /// Plans the run for `snapshot`.
    #[must_use]
    pub fn for_snapshot(snapshot: &Snapshot) -> Self {
        let state = ObservedState::classify(snapshot);
        let mut actions = vec![decide(state)];
        while let Some(next) = actions.last().copied().and_then(fallback) {
            actions.push(next);
        }
        Self {
            state,
            actions,
            rationale: rationale(state, snapshot),
        }
    }

    /// State that triggered the plan.
    #[must_use]
    pub const fn state(&self) -> ObservedState {
        self.state
    }

    /// Decision followed by its fallbacks.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        self.actions.as_slice()
    }

    /// The decided action.
    #[must_use]
    pub fn primary(&self) -> Action {
        self.actions.first().copied().unwrap_or(Action::NoOp)
    }

    /// Human-readable reason for the plan.
    #[must_use]
    pub fn rationale(&self) -> &str {
        self.rationale.as_str()
    }
}

fn rationale(state: ObservedState, snapshot: &Snapshot) -> String {
    let total = snapshot.containers().len();
    let running = snapshot
        .containers()
        .iter()
        .filter(|container| container.is_running())
        .count();
    match (state, snapshot.failure()) {
        (_, Some(failure)) => format!("runtime could not be observed ({failure})"),
        (ObservedState::NoContainers, None) => String::from("no managed containers exist"),
        (ObservedState::AllStopped, None) => format!("{total} managed container(s) stopped"),
        (ObservedState::SomeRunning, None) => {
            format!("{running} of {total} managed container(s) running")
        }
        (ObservedState::AllRunning | ObservedState::Indeterminate, None) => {
            format!("all {total} managed container(s) running")
        }
    }
}

/// One executed action and its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Action that ran.
    pub action: Action,
    /// Its result.
    pub result: ActionResult,
}

/// Terminal reconciliation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Creating the deployment from nothing failed.
    #[error("failed to create containers: {reason}")]
    CreationFailed {
        /// Orchestrator failure detail.
        reason: String,
    },
    /// Recreating the deployment failed after the start fallback.
    #[error("failed to recreate containers: {reason}")]
    RecreationFailed {
        /// Orchestrator failure detail.
        reason: String,
    },
    /// Any other action failed with no fallback left.
    #[error("{action} failed: {reason}")]
    ActionFailed {
        /// Action that failed.
        action: Action,
        /// Orchestrator failure detail.
        reason: String,
    },
}

impl ReconcileError {
    fn terminal(action: Action, reason: String) -> Self {
        match action {
            Action::CreateAndStart => Self::CreationFailed { reason },
            Action::Recreate => Self::RecreationFailed { reason },
            Action::StartExisting | Action::NoOp => Self::ActionFailed { action, reason },
        }
    }
}

/// How a reconciliation pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `action` brought the deployment up.
    Applied {
        /// Action that succeeded.
        action: Action,
    },
    /// Containers were already running.
    AlreadySatisfied {
        /// Whether the endpoint port answered.
        port_active: bool,
    },
    /// The run stopped without escalating: the runtime could not be
    /// observed, or the orchestrator was missing or timed out.
    Deferred {
        /// Probe or orchestrator failure detail.
        reason: String,
    },
    /// The last action in the chain failed.
    Failed(ReconcileError),
    /// The operator interrupted `action`.
    Interrupted {
        /// Action in flight.
        action: Action,
    },
}

/// Everything a reconciliation pass observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Snapshot the decision was based on.
    pub snapshot: Snapshot,
    /// Plan derived from it.
    pub plan: ReconciliationPlan,
    /// Actions executed, in order.
    pub attempts: Vec<Attempt>,
    /// Final verdict.
    pub verdict: Verdict,
}

impl ReconcileOutcome {
    /// Fatal error, if the pass failed.
    #[must_use]
    pub const fn error(&self) -> Option<&ReconcileError> {
        match &self.verdict {
            Verdict::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the pass was interrupted.
    #[must_use]
    pub const fn was_interrupted(&self) -> bool {
        matches!(self.verdict, Verdict::Interrupted { .. })
    }

    /// Whether any action touched the runtime.
    #[must_use]
    pub fn acted(&self) -> bool {
        !self.attempts.is_empty()
    }
}

/// Runs one observe-decide-act pass.
pub struct Reconciler<'a, R: ?Sized, P: ?Sized> {
    runtime: &'a R,
    reporter: &'a P,
    port: u16,
}

impl<'a, R, P> Reconciler<'a, R, P>
where
    R: RuntimeAdapter + ?Sized,
    P: ReconcileReporter + ?Sized,
{
    /// Builds a reconciler; `port` is checked when containers already run.
    pub const fn new(runtime: &'a R, reporter: &'a P, port: u16) -> Self {
        Self {
            runtime,
            reporter,
            port,
        }
    }

    /// Observes the runtime, plans and executes.
    pub fn reconcile(&self) -> ReconcileOutcome {
        let snapshot = self.runtime.snapshot();
        self.reporter.snapshot_taken(&snapshot);
        let plan = ReconciliationPlan::for_snapshot(&snapshot);
        self.reporter.plan_chosen(&plan);

        let (attempts, verdict) = match (plan.primary(), snapshot.failure()) {
            (Action::NoOp, Some(failure)) => (
                Vec::new(),
                Verdict::Deferred {
                    reason: failure.to_string(),
                },
            ),
            (Action::NoOp, None) => {
                let port_active = self.runtime.is_port_active(self.port);
                self.reporter.already_satisfied(self.port, port_active);
                (Vec::new(), Verdict::AlreadySatisfied { port_active })
            }
            _ => self.execute(&plan),
        };

        ReconcileOutcome {
            snapshot,
            plan,
            attempts,
            verdict,
        }
    }

    fn execute(&self, plan: &ReconciliationPlan) -> (Vec<Attempt>, Verdict) {
        let executor = ActionExecutor::new(self.runtime);
        let mut attempts = Vec::new();
        let mut verdict = Verdict::Deferred {
            reason: String::from("empty plan"),
        };
        for &action in plan.actions() {
            self.reporter.action_started(action);
            let result = executor.execute(action);
            self.reporter.action_finished(action, &result);
            attempts.push(Attempt {
                action,
                result: result.clone(),
            });
            match result {
                ActionResult::Succeeded => {
                    verdict = Verdict::Applied { action };
                    break;
                }
                ActionResult::Interrupted => {
                    verdict = Verdict::Interrupted { action };
                    break;
                }
                ActionResult::Unavailable(reason) => {
                    verdict = Verdict::Deferred { reason };
                    break;
                }
                ActionResult::Failed(reason) => {
                    let error = ReconcileError::terminal(action, reason);
                    verdict = Verdict::Failed(error);
                }
            }
        }
        if let Verdict::Failed(error) = &verdict {
            self.reporter.reconcile_failed(error);
        }
        (attempts, verdict)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::executor::ComposeVerb;
    use crate::probe::{ManagedContainer, ProbeFailure};
    use crate::reporter::StructuredReporter;
    use crate::tests::support::FakeRuntime;

    fn running(name: &str) -> ManagedContainer {
        ManagedContainer::new(name, "Up 4 minutes")
    }

    fn stopped(name: &str) -> ManagedContainer {
        ManagedContainer::new(name, "Exited (137) 2 minutes ago")
    }

    #[rstest]
    #[case(Snapshot::Observed(vec![]), ObservedState::NoContainers)]
    #[case(Snapshot::Observed(vec![stopped("a"), stopped("b")]), ObservedState::AllStopped)]
    #[case(Snapshot::Observed(vec![running("a"), stopped("b")]), ObservedState::SomeRunning)]
    #[case(Snapshot::Observed(vec![running("a"), running("b")]), ObservedState::AllRunning)]
    #[case(
        Snapshot::Observed(vec![ManagedContainer::new("a", "")]),
        ObservedState::AllStopped
    )]
    #[case(
        Snapshot::Indeterminate(ProbeFailure::TimedOut(String::from("slow"))),
        ObservedState::Indeterminate
    )]
    fn classifies_snapshots(#[case] snapshot: Snapshot, #[case] expected: ObservedState) {
        assert_eq!(ObservedState::classify(&snapshot), expected);
    }

    #[rstest]
    #[case(ObservedState::NoContainers, Action::CreateAndStart)]
    #[case(ObservedState::AllStopped, Action::StartExisting)]
    #[case(ObservedState::SomeRunning, Action::NoOp)]
    #[case(ObservedState::AllRunning, Action::NoOp)]
    #[case(ObservedState::Indeterminate, Action::NoOp)]
    fn decision_table(#[case] state: ObservedState, #[case] expected: Action) {
        assert_eq!(decide(state), expected);
    }

    #[test]
    fn empty_snapshots_never_start_existing() {
        let plan = ReconciliationPlan::for_snapshot(&Snapshot::Observed(Vec::new()));
        assert_eq!(plan.actions(), [Action::CreateAndStart]);
    }

    #[test]
    fn stopped_plan_tries_start_before_recreate() {
        let plan = ReconciliationPlan::for_snapshot(&Snapshot::Observed(vec![
            stopped("mcp-mem0"),
            stopped("mcp-mem0-db"),
        ]));
        assert_eq!(plan.actions(), [Action::StartExisting, Action::Recreate]);
        assert_eq!(plan.rationale(), "2 managed container(s) stopped");
    }

    #[test]
    fn recreate_is_terminal() {
        assert_eq!(fallback(Action::Recreate), None);
        assert_eq!(fallback(Action::CreateAndStart), None);
    }

    #[test]
    fn creation_failure_is_fatal_without_escalation() {
        let runtime = FakeRuntime::empty();
        runtime.fail_next(ComposeVerb::Up, "pull access denied");
        let outcome = Reconciler::new(&runtime, &StructuredReporter, 8050).reconcile();
        assert_eq!(
            outcome.error(),
            Some(&ReconcileError::CreationFailed {
                reason: String::from("pull access denied")
            })
        );
        assert_eq!(runtime.invocations(), vec![ComposeVerb::Up]);
    }

    #[test]
    fn indeterminate_snapshot_defers_without_touching_runtime() {
        let runtime = FakeRuntime::unobservable(ProbeFailure::ToolUnavailable(String::from(
            "docker not found",
        )));
        let outcome = Reconciler::new(&runtime, &StructuredReporter, 8050).reconcile();
        assert!(matches!(outcome.verdict, Verdict::Deferred { .. }));
        assert!(!outcome.acted());
        assert!(runtime.invocations().is_empty());
    }

    #[test]
    fn partially_running_deployment_checks_port_only() {
        let runtime = FakeRuntime::mixed();
        runtime.set_port_active(false);
        let outcome = Reconciler::new(&runtime, &StructuredReporter, 8050).reconcile();
        assert_eq!(outcome.plan.state(), ObservedState::SomeRunning);
        assert_eq!(
            outcome.verdict,
            Verdict::AlreadySatisfied { port_active: false }
        );
        assert!(runtime.invocations().is_empty());
    }

    #[rstest]
    #[case::start_timed_out(FakeRuntime::stopped(), ComposeVerb::Start)]
    #[case::compose_missing(FakeRuntime::empty(), ComposeVerb::Up)]
    fn unavailable_orchestrator_defers_without_escalating(
        #[case] runtime: FakeRuntime,
        #[case] verb: ComposeVerb,
    ) {
        runtime.stall_next(verb, "'docker compose' did not finish within 300000 ms");
        let outcome = Reconciler::new(&runtime, &StructuredReporter, 8050).reconcile();
        assert!(
            matches!(&outcome.verdict, Verdict::Deferred { reason } if reason.contains("did not finish")),
            "verdict: {:?}",
            outcome.verdict
        );
        assert_eq!(outcome.error(), None);
        assert_eq!(runtime.invocations(), vec![verb]);
    }

    #[test]
    fn interrupt_stops_escalation() {
        let runtime = FakeRuntime::stopped();
        runtime.interrupt_on(ComposeVerb::Start);
        let outcome = Reconciler::new(&runtime, &StructuredReporter, 8050).reconcile();
        assert!(outcome.was_interrupted());
        assert_eq!(runtime.invocations(), vec![ComposeVerb::Start]);
    }
}
