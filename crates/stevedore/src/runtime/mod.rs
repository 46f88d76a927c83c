//! Boundary between the reconciler and the real container runtime.
//!
//! [`RuntimeAdapter`] is the only surface the decision logic sees. The Docker
//! implementation lives in [`docker`]; tests drive the reconciler through
//! scripted fakes instead.

mod command;
mod docker;
mod interrupt;

pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use docker::DockerRuntime;
pub use interrupt::{INTERRUPTED_EXIT_CODE, InterruptFlag};

use crate::executor::{ActionResult, ComposeVerb};
use crate::probe::Snapshot;

/// Narrow view of the container runtime used by the reconciler.
pub trait RuntimeAdapter {
    /// Observes the managed containers.
    fn snapshot(&self) -> Snapshot;

    /// Reports whether something accepts connections on `port`.
    ///
    /// Failures count as inactive.
    fn is_port_active(&self, port: u16) -> bool;

    /// Runs one orchestrator verb.
    fn invoke(&self, verb: ComposeVerb) -> ActionResult;
}

impl<T: RuntimeAdapter + ?Sized> RuntimeAdapter for &T {
    fn snapshot(&self) -> Snapshot {
        (**self).snapshot()
    }

    fn is_port_active(&self, port: u16) -> bool {
        (**self).is_port_active(port)
    }

    fn invoke(&self, verb: ComposeVerb) -> ActionResult {
        (**self).invoke(verb)
    }
}
