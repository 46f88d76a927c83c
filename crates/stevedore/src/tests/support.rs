//! Scripted fakes for the runtime boundary and the controller harness.
//!
//! [`FakeRuntime`] simulates a two-container deployment: orchestrator verbs
//! change container state the way compose would, unless a failure or an
//! interrupt has been scripted for that verb.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::process::ExitCode;
use std::time::Duration;

use rstest::fixture;
use stevedore_config::{Config, ServiceEndpoint};

use crate::config::ConfigLoader;
use crate::controller::Controller;
use crate::errors::AppError;
use crate::executor::{ActionResult, ComposeVerb};
use crate::probe::{ManagedContainer, ProbeFailure, Snapshot};
use crate::readiness::{NetworkProbe, ProbeVerdict};
use crate::report::EnvCheck;
use crate::reporter::StructuredReporter;
use crate::runtime::{InterruptFlag, RuntimeAdapter};

pub(crate) const SERVER: &str = "mcp-mem0";
pub(crate) const DATABASE: &str = "mcp-mem0-db";
const MANAGED: [&str; 2] = [SERVER, DATABASE];
const RUNNING_TEXT: &str = "Up 2 seconds";
const STOPPED_TEXT: &str = "Exited (0) 3 minutes ago";

/// In-memory stand-in for Docker and compose.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    containers: RefCell<Vec<ManagedContainer>>,
    unobservable: RefCell<Option<ProbeFailure>>,
    scripted: RefCell<HashMap<ComposeVerb, VecDeque<ActionResult>>>,
    interrupt_on: Cell<Option<ComposeVerb>>,
    interrupt: RefCell<Option<InterruptFlag>>,
    port_override: Cell<Option<bool>>,
    invocations: RefCell<Vec<ComposeVerb>>,
}

impl FakeRuntime {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn stopped() -> Self {
        Self::with_states(&[false, false])
    }

    pub(crate) fn running() -> Self {
        Self::with_states(&[true, true])
    }

    pub(crate) fn mixed() -> Self {
        Self::with_states(&[true, false])
    }

    pub(crate) fn unobservable(failure: ProbeFailure) -> Self {
        let runtime = Self::default();
        *runtime.unobservable.borrow_mut() = Some(failure);
        runtime
    }

    fn with_states(running: &[bool]) -> Self {
        let runtime = Self::default();
        *runtime.containers.borrow_mut() = MANAGED
            .iter()
            .zip(running)
            .map(|(name, &up)| container(name, up))
            .collect();
        runtime
    }

    /// Makes the next call of `verb` fail with `reason`.
    pub(crate) fn fail_next(&self, verb: ComposeVerb, reason: &str) {
        self.script(verb, ActionResult::Failed(reason.to_owned()));
    }

    /// Makes the next call of `verb` report the orchestrator as unavailable,
    /// as a timeout or a missing compose binary would.
    pub(crate) fn stall_next(&self, verb: ComposeVerb, reason: &str) {
        self.script(verb, ActionResult::Unavailable(reason.to_owned()));
    }

    fn script(&self, verb: ComposeVerb, result: ActionResult) {
        self.scripted
            .borrow_mut()
            .entry(verb)
            .or_default()
            .push_back(result);
    }

    /// Makes `verb` behave as if the operator pressed Ctrl-C during it.
    pub(crate) fn interrupt_on(&self, verb: ComposeVerb) {
        self.interrupt_on.set(Some(verb));
    }

    /// Flag raised when a scripted interrupt fires.
    pub(crate) fn link_interrupt(&self, flag: InterruptFlag) {
        *self.interrupt.borrow_mut() = Some(flag);
    }

    pub(crate) fn set_port_active(&self, active: bool) {
        self.port_override.set(Some(active));
    }

    pub(crate) fn invocations(&self) -> Vec<ComposeVerb> {
        self.invocations.borrow().clone()
    }

    fn apply(&self, verb: ComposeVerb) -> ActionResult {
        let mut containers = self.containers.borrow_mut();
        match verb {
            ComposeVerb::Up => {
                *containers = MANAGED.iter().map(|name| container(name, true)).collect();
            }
            ComposeVerb::Start => {
                if containers.is_empty() {
                    return ActionResult::Failed(String::from(
                        "exit status 1: no containers to start",
                    ));
                }
                set_all(&mut containers, true);
            }
            ComposeVerb::Stop => set_all(&mut containers, false),
            ComposeVerb::Down => containers.clear(),
        }
        ActionResult::Succeeded
    }
}

fn container(name: &str, running: bool) -> ManagedContainer {
    let text = if running { RUNNING_TEXT } else { STOPPED_TEXT };
    ManagedContainer::new(name, text)
}

fn set_all(containers: &mut [ManagedContainer], running: bool) {
    for slot in containers.iter_mut() {
        *slot = container(&slot.name, running);
    }
}

impl RuntimeAdapter for FakeRuntime {
    fn snapshot(&self) -> Snapshot {
        match self.unobservable.borrow().as_ref() {
            Some(failure) => Snapshot::Indeterminate(failure.clone()),
            None => Snapshot::Observed(self.containers.borrow().clone()),
        }
    }

    fn is_port_active(&self, _port: u16) -> bool {
        self.port_override.get().unwrap_or_else(|| {
            self.containers
                .borrow()
                .iter()
                .any(|container| container.name == SERVER && container.is_running())
        })
    }

    fn invoke(&self, verb: ComposeVerb) -> ActionResult {
        self.invocations.borrow_mut().push(verb);
        if self.interrupt_on.get() == Some(verb) {
            if let Some(flag) = self.interrupt.borrow().as_ref() {
                flag.raise();
            }
            return ActionResult::Interrupted;
        }
        if let Some(result) = self
            .scripted
            .borrow_mut()
            .get_mut(&verb)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }
        self.apply(verb)
    }
}

/// Network probe answering from a fixed verdict and recording budgets.
pub(crate) struct FakeNetwork {
    reachable: bool,
    budgets: RefCell<Vec<Duration>>,
}

impl FakeNetwork {
    pub(crate) fn reachable(reachable: bool) -> Self {
        Self {
            reachable,
            budgets: RefCell::default(),
        }
    }

    pub(crate) fn budgets(&self) -> Vec<Duration> {
        self.budgets.borrow().clone()
    }
}

impl NetworkProbe for FakeNetwork {
    fn probe(&self, _endpoint: &ServiceEndpoint, budget: Duration) -> ProbeVerdict {
        self.budgets.borrow_mut().push(budget);
        if self.reachable {
            ProbeVerdict::Reachable(String::from("connection held open (streaming)"))
        } else {
            ProbeVerdict::Unreachable(String::from("connection refused"))
        }
    }
}

/// Loader returning a fixed configuration.
pub(crate) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(crate) fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// Configuration with no grace period and a short readiness budget.
pub(crate) fn test_config() -> Config {
    Config {
        project_dir: "/srv/mem0".into(),
        grace_period_ms: 0,
        readiness_timeout_secs: 1,
        ..Config::default()
    }
}

/// Controller harness wired to fakes.
pub(crate) struct TestWorld {
    pub(crate) config: Config,
    pub(crate) runtime: FakeRuntime,
    pub(crate) network: FakeNetwork,
    pub(crate) env: EnvCheck,
    pub(crate) interrupt: InterruptFlag,
    pub(crate) stdout: Vec<u8>,
    pub(crate) exit_code: Option<ExitCode>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            config: test_config(),
            runtime: FakeRuntime::empty(),
            network: FakeNetwork::reachable(true),
            env: EnvCheck::FileNotFound {
                path: "/srv/mem0/.env".into(),
            },
            interrupt: InterruptFlag::default(),
            stdout: Vec::new(),
            exit_code: None,
        }
    }
}

impl TestWorld {
    pub(crate) fn use_runtime(&mut self, runtime: FakeRuntime) {
        runtime.link_interrupt(self.interrupt.clone());
        self.runtime = runtime;
    }

    fn controller(&self) -> Controller<'_, FakeRuntime, FakeNetwork, StructuredReporter> {
        Controller {
            config: &self.config,
            runtime: &self.runtime,
            network: &self.network,
            reporter: &StructuredReporter,
            env: &self.env,
            interrupt: self.interrupt.clone(),
        }
    }

    pub(crate) fn reconcile(&mut self) {
        let mut stdout = Vec::new();
        let exit = self
            .controller()
            .reconcile(&mut stdout)
            .unwrap_or_else(|error| panic!("reconcile failed to report: {error}"));
        self.stdout = stdout;
        self.exit_code = Some(exit);
    }

    pub(crate) fn status(&mut self) {
        let mut stdout = Vec::new();
        let exit = self
            .controller()
            .status(&mut stdout)
            .unwrap_or_else(|error| panic!("status failed to report: {error}"));
        self.stdout = stdout;
        self.exit_code = Some(exit);
    }

    pub(crate) fn stdout_text(&self) -> String {
        String::from_utf8(self.stdout.clone()).expect("stdout utf8")
    }

    pub(crate) fn assert_exit_code(&self, expected: u8) {
        let exit = self.exit_code.expect("exit code recorded");
        assert_eq!(exit, ExitCode::from(expected));
    }
}

#[fixture]
pub(crate) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}
