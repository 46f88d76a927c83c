//! Docker-backed [`RuntimeAdapter`].

use std::time::Duration;

use stevedore_config::{Config, EnvFile};

use super::{CommandRunner, RuntimeAdapter};
use crate::executor::{ActionResult, ComposeOrchestrator, ComposeVerb};
use crate::probe::{ContainerProbe, Snapshot, port_is_active};

const PORT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Runtime adapter driving `docker` and the compose front end.
#[derive(Debug, Clone)]
pub struct DockerRuntime<C> {
    probe: ContainerProbe<C>,
    orchestrator: ComposeOrchestrator<C>,
    port_host: String,
}

impl<C: CommandRunner + Clone> DockerRuntime<C> {
    /// Builds the adapter from configuration.
    ///
    /// Values from `env` are forwarded to every orchestrator call.
    pub fn from_config(config: &Config, runner: C, env: Option<&EnvFile>) -> Self {
        let probe = ContainerProbe::new(
            runner.clone(),
            config.docker_binary(),
            config.container_prefix(),
            config.probe_timeout(),
        );
        let mut orchestrator = ComposeOrchestrator::new(
            runner,
            config.compose_command(),
            config.project_dir().as_std_path(),
            config.action_timeout(),
        );
        if let Some(env) = env {
            orchestrator = orchestrator.with_environment(env.entries());
        }
        Self {
            probe,
            orchestrator,
            port_host: config.endpoint().host().to_owned(),
        }
    }
}

impl<C: CommandRunner> RuntimeAdapter for DockerRuntime<C> {
    fn snapshot(&self) -> Snapshot {
        self.probe.snapshot()
    }

    fn is_port_active(&self, port: u16) -> bool {
        port_is_active(&self.port_host, port, PORT_CHECK_TIMEOUT)
    }

    fn invoke(&self, verb: ComposeVerb) -> ActionResult {
        self.orchestrator.invoke(verb)
    }
}
