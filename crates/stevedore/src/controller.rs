//! Drives one run: reconcile or status, then the summary and exit code.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use stevedore_config::Config;

use crate::errors::AppError;
use crate::probe::Snapshot;
use crate::readiness::{NetworkProbe, ReadinessReport, ReadinessVerifier};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::report::{EnvCheck, RunMode, StatusSummary};
use crate::reporter::ReconcileReporter;
use crate::runtime::{INTERRUPTED_EXIT_CODE, InterruptFlag, RuntimeAdapter};

/// Collaborators shared by both commands.
pub(crate) struct Controller<'a, R: ?Sized, N: ?Sized, P: ?Sized> {
    pub(crate) config: &'a Config,
    pub(crate) runtime: &'a R,
    pub(crate) network: &'a N,
    pub(crate) reporter: &'a P,
    pub(crate) env: &'a EnvCheck,
    pub(crate) interrupt: InterruptFlag,
}

impl<R, N, P> Controller<'_, R, N, P>
where
    R: RuntimeAdapter + ?Sized,
    N: NetworkProbe + ?Sized,
    P: ReconcileReporter + ?Sized,
{
    /// Observes, acts, re-observes and verifies.
    ///
    /// Exits 0 unless the terminal action failed (1) or the operator
    /// interrupted the run (130).
    pub(crate) fn reconcile<W: Write>(&self, stdout: &mut W) -> Result<ExitCode, AppError> {
        let outcome = Reconciler::new(self.runtime, self.reporter, self.config.endpoint().port())
            .reconcile();

        let (snapshot, readiness) = if outcome.was_interrupted() || self.interrupt.is_raised() {
            let readiness = ReadinessReport::skipped(
                self.config.endpoint().clone(),
                &outcome.snapshot,
                "skipped after interrupt",
            );
            (outcome.snapshot.clone(), readiness)
        } else {
            let current = self.runtime.snapshot();
            self.reporter.snapshot_taken(&current);
            let grace = if outcome.acted() {
                self.config.grace_period()
            } else {
                Duration::ZERO
            };
            let readiness = self.verify(&current, Some(&outcome.snapshot), grace);
            (current, readiness)
        };

        self.print(stdout, RunMode::Reconcile, Some(&outcome), &snapshot, &readiness)?;
        Ok(self.exit_code(Some(&outcome)))
    }

    /// Observes and verifies without acting.
    pub(crate) fn status<W: Write>(&self, stdout: &mut W) -> Result<ExitCode, AppError> {
        let snapshot = self.runtime.snapshot();
        self.reporter.snapshot_taken(&snapshot);
        let readiness = self.verify(&snapshot, None, Duration::ZERO);
        self.print(stdout, RunMode::Status, None, &snapshot, &readiness)?;
        Ok(self.exit_code(None))
    }

    fn verify(
        &self,
        current: &Snapshot,
        previous: Option<&Snapshot>,
        grace: Duration,
    ) -> ReadinessReport {
        let report = ReadinessVerifier::new(self.network, self.config.endpoint().clone())
            .with_grace_period(grace)
            .with_interrupt(self.interrupt.clone())
            .verify(current, previous, self.config.readiness_timeout());
        self.reporter.readiness_checked(&report);
        report
    }

    fn print<W: Write>(
        &self,
        stdout: &mut W,
        mode: RunMode,
        outcome: Option<&ReconcileOutcome>,
        snapshot: &Snapshot,
        readiness: &ReadinessReport,
    ) -> Result<(), AppError> {
        let summary = StatusSummary {
            mode,
            project_dir: self.config.project_dir().as_str(),
            compose_command: self.config.compose_command.trim(),
            outcome,
            snapshot,
            readiness,
            env: self.env,
        };
        write!(stdout, "{summary}").map_err(AppError::Output)?;
        stdout.flush().map_err(AppError::Output)
    }

    fn exit_code(&self, outcome: Option<&ReconcileOutcome>) -> ExitCode {
        let interrupted =
            self.interrupt.is_raised() || outcome.is_some_and(ReconcileOutcome::was_interrupted);
        if interrupted {
            ExitCode::from(INTERRUPTED_EXIT_CODE)
        } else if outcome.and_then(ReconcileOutcome::error).is_some() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}
