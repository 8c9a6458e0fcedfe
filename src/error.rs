use crate::step::StepName;
use crate::wiring::Port;
use thiserror::Error;

/// Errors raised by the engine itself while wiring or running steps.
///
/// Failures reported by a unit of work are not engine errors: they are
/// [`WorkError`](crate::WorkError)s and travel along the error path of the
/// step that produced them.
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code. When matching
/// on this error, always include a wildcard pattern:
///
/// ```
/// use nagare::{PipelineError, Port};
///
/// fn handle_error(error: PipelineError) {
///     match error {
///         PipelineError::AlreadyConnected { step_name, port } => {
///             eprintln!("{} of step {} is already wired", port, step_name);
///         }
///         PipelineError::Disconnected { step_name, port } => {
///             eprintln!("step {} lost the peer of its {}", step_name, port);
///         }
///         _ => eprintln!("Unknown error: {}", error),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// A wiring call targeted a port that already has a handoff point.
    ///
    /// Returned by [`Step::connect_to`](crate::Step::connect_to) and
    /// [`Step::error_to`](crate::Step::error_to). Neither step is modified.
    #[error("Port '{port}' of step '{step_name}' is already connected")]
    AlreadyConnected {
        /// The step owning the occupied port
        step_name: StepName,
        /// Which port was occupied
        port: Port,
    },

    /// The other end of a handoff point went away while the step was running.
    ///
    /// This ends the step's loop. It is not reported when the step is being
    /// stopped through its cancellation token.
    #[error("Step '{step_name}' lost the peer of its {port} handoff")]
    Disconnected {
        /// The step whose loop ended
        step_name: StepName,
        /// The port whose peer disappeared
        port: Port,
    },

    /// The task running the step panicked or was aborted.
    #[error("Step '{step_name}' did not finish cleanly: {details}")]
    Join {
        /// The step whose task failed
        step_name: StepName,
        /// Details reported by the runtime
        details: String,
    },
}
