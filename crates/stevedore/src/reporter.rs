//! Structured reporting for reconciliation events.

use crate::executor::ActionResult;
use crate::probe::Snapshot;
use crate::readiness::ReadinessReport;
use crate::reconciler::{Action, ReconcileError, ReconciliationPlan};

const RECONCILE_TARGET: &str = "stevedore::reconcile";

/// Observer notified as a run moves through observe, decide, act and verify.
pub trait ReconcileReporter {
    /// A snapshot was taken.
    fn snapshot_taken(&self, snapshot: &Snapshot);

    /// A plan was chosen.
    fn plan_chosen(&self, plan: &ReconciliationPlan);

    /// An action is about to run.
    fn action_started(&self, action: Action);

    /// An action finished.
    fn action_finished(&self, action: Action, result: &ActionResult);

    /// Containers were already running; `port_active` reflects the endpoint
    /// port check.
    fn already_satisfied(&self, port: u16, port_active: bool);

    /// The terminal action failed.
    fn reconcile_failed(&self, error: &ReconcileError);

    /// Readiness verification completed.
    fn readiness_checked(&self, report: &ReadinessReport);
}

/// Default reporter that records events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl ReconcileReporter for StructuredReporter {
    fn snapshot_taken(&self, snapshot: &Snapshot) {
        match snapshot.failure() {
            Some(failure) => tracing::warn!(
                target: RECONCILE_TARGET,
                event = "snapshot_indeterminate",
                reason = %failure,
                "runtime state could not be observed"
            ),
            None => tracing::info!(
                target: RECONCILE_TARGET,
                event = "snapshot_taken",
                containers = snapshot.containers().len(),
                running = snapshot
                    .containers()
                    .iter()
                    .filter(|container| container.is_running())
                    .count(),
                "observed managed containers"
            ),
        }
    }

    fn plan_chosen(&self, plan: &ReconciliationPlan) {
        tracing::info!(
            target: RECONCILE_TARGET,
            event = "plan_chosen",
            state = %plan.state(),
            action = %plan.primary(),
            rationale = %plan.rationale(),
            "reconciliation plan chosen"
        );
    }

    fn action_started(&self, action: Action) {
        tracing::info!(
            target: RECONCILE_TARGET,
            event = "action_started",
            action = %action,
            "executing action"
        );
    }

    fn action_finished(&self, action: Action, result: &ActionResult) {
        match result {
            ActionResult::Succeeded => tracing::info!(
                target: RECONCILE_TARGET,
                event = "action_succeeded",
                action = %action,
                "action succeeded"
            ),
            ActionResult::Failed(reason) => tracing::warn!(
                target: RECONCILE_TARGET,
                event = "action_failed",
                action = %action,
                reason = %reason,
                "action failed"
            ),
            ActionResult::Unavailable(reason) => tracing::warn!(
                target: RECONCILE_TARGET,
                event = "action_unavailable",
                action = %action,
                reason = %reason,
                "orchestrator unavailable, not escalating"
            ),
            ActionResult::Interrupted => tracing::warn!(
                target: RECONCILE_TARGET,
                event = "action_interrupted",
                action = %action,
                "action interrupted"
            ),
        }
    }

    fn already_satisfied(&self, port: u16, port_active: bool) {
        if port_active {
            tracing::info!(
                target: RECONCILE_TARGET,
                event = "already_running",
                port,
                "containers already running and port is active"
            );
        } else {
            tracing::warn!(
                target: RECONCILE_TARGET,
                event = "already_running",
                port,
                "containers running but port is not active; the service may still be starting"
            );
        }
    }

    fn reconcile_failed(&self, error: &ReconcileError) {
        tracing::error!(
            target: RECONCILE_TARGET,
            event = "reconcile_failed",
            error = %error,
            "reconciliation failed"
        );
    }

    fn readiness_checked(&self, report: &ReadinessReport) {
        tracing::info!(
            target: RECONCILE_TARGET,
            event = "readiness_checked",
            endpoint = %report.endpoint,
            reachable = report.endpoint_reachable,
            detail = %report.detail,
            "readiness verified"
        );
    }
}
