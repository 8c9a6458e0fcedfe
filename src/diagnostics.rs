//! Diagnostic sink injected into every step.
//!
//! Steps never configure or reach for a global logger. They report what
//! they do through an [`Arc<dyn Diagnostics>`](Diagnostics) given at
//! construction, which defaults to [`TracingDiagnostics`]. A
//! [`Pipeline`](crate::Pipeline) reports its shutdown of each step through
//! its own sink, with the same default.

use crate::error::PipelineError;
use crate::step::StepName;
use crate::wiring::Port;
use crate::work::WorkError;
use tracing::{debug, error, info, warn};

/// Something a step did, as reported to its [`Diagnostics`] sink.
///
/// Payload values are never part of an event.
#[derive(Debug)]
#[non_exhaustive]
pub enum DiagnosticEvent<'a> {
    /// A handoff point was created from this step's `port` to `peer`.
    Wired {
        /// The port of this step that was wired
        port: Port,
        /// The step on the other end
        peer: &'a StepName,
    },
    /// The step's loop was spawned.
    Started,
    /// The step started without an error path; failures will be dropped.
    UnwiredErrorPath,
    /// The loop is waiting on the input handoff point.
    WaitingForInput,
    /// A value was taken from the input handoff point.
    ReceivedInput,
    /// The unit of work returned an output that is being handed off.
    SendingOutput,
    /// The unit of work returned an empty output; nothing is sent.
    EmptyOutput,
    /// The unit of work returned an output but no downstream step is wired.
    OutputDiscarded,
    /// The unit of work failed.
    Failed {
        /// The failure it reported
        error: &'a WorkError,
    },
    /// The original input of a failed invocation was handed to the error path.
    FailureRouted,
    /// A failure was dropped because the step has no error path.
    FailureDropped,
    /// The peer of a handoff point went away and the loop ended.
    Disconnected {
        /// The port whose peer disappeared
        port: Port,
    },
    /// The loop ended because the step was stopped.
    Stopped,
    /// The pipeline running the step is stopping it.
    StopRequested,
    /// The pipeline found that the step ended with an error.
    EndedWithError {
        /// How the step ended
        error: &'a PipelineError,
    },
}

impl DiagnosticEvent<'_> {
    /// Short stable name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticEvent::Wired { .. } => "wired",
            DiagnosticEvent::Started => "started",
            DiagnosticEvent::UnwiredErrorPath => "unwired_error_path",
            DiagnosticEvent::WaitingForInput => "waiting_for_input",
            DiagnosticEvent::ReceivedInput => "received_input",
            DiagnosticEvent::SendingOutput => "sending_output",
            DiagnosticEvent::EmptyOutput => "empty_output",
            DiagnosticEvent::OutputDiscarded => "output_discarded",
            DiagnosticEvent::Failed { .. } => "failed",
            DiagnosticEvent::FailureRouted => "failure_routed",
            DiagnosticEvent::FailureDropped => "failure_dropped",
            DiagnosticEvent::Disconnected { .. } => "disconnected",
            DiagnosticEvent::Stopped => "stopped",
            DiagnosticEvent::StopRequested => "stop_requested",
            DiagnosticEvent::EndedWithError { .. } => "ended_with_error",
        }
    }
}

/// Receiver of the diagnostic events emitted by steps and pipelines.
///
/// Implementations must be cheap: events are recorded inline on the step's
/// loop.
///
/// # Examples
///
/// ```
/// use nagare::{DiagnosticEvent, Diagnostics, StepName};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct FailureCounter(AtomicUsize);
///
/// impl Diagnostics for FailureCounter {
///     fn record(&self, _step: &StepName, event: DiagnosticEvent<'_>) {
///         if let DiagnosticEvent::Failed { .. } = event {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait Diagnostics: Send + Sync {
    /// Records one event emitted by `step`.
    fn record(&self, step: &StepName, event: DiagnosticEvent<'_>);
}

/// Forwards diagnostic events to [`tracing`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, step: &StepName, event: DiagnosticEvent<'_>) {
        match event {
            DiagnosticEvent::Wired { port, peer } => {
                debug!(step = %step, %port, peer = %peer, "Wired handoff point");
            }
            DiagnosticEvent::Started => info!(step = %step, "Starting step"),
            DiagnosticEvent::UnwiredErrorPath => {
                warn!(step = %step, "No error path wired, failures will be dropped");
            }
            DiagnosticEvent::WaitingForInput => debug!(step = %step, "Waiting for input"),
            DiagnosticEvent::ReceivedInput => debug!(step = %step, "Received input"),
            DiagnosticEvent::SendingOutput => debug!(step = %step, "Sending output data"),
            DiagnosticEvent::EmptyOutput => debug!(step = %step, "Empty output, nothing sent"),
            DiagnosticEvent::OutputDiscarded => {
                debug!(step = %step, "No downstream step, output discarded");
            }
            DiagnosticEvent::Failed { error } => {
                warn!(step = %step, error = %error, "Error while executing step");
            }
            DiagnosticEvent::FailureRouted => {
                debug!(step = %step, "Sent failed input to the error path");
            }
            DiagnosticEvent::FailureDropped => debug!(step = %step, "Failure dropped"),
            DiagnosticEvent::Disconnected { port } => {
                error!(step = %step, %port, "Handoff peer went away, step ended");
            }
            DiagnosticEvent::Stopped => info!(step = %step, "Step stopped"),
            DiagnosticEvent::StopRequested => info!(step = %step, "Stopping step"),
            DiagnosticEvent::EndedWithError { error } => {
                warn!(step = %step, error = %error, "Step ended with an error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        let error = WorkError::new("error from step");
        let peer = StepName::new("step5");

        assert_eq!(DiagnosticEvent::Started.kind(), "started");
        assert_eq!(DiagnosticEvent::Failed { error: &error }.kind(), "failed");
        assert_eq!(
            DiagnosticEvent::Wired {
                port: Port::Error,
                peer: &peer,
            }
            .kind(),
            "wired"
        );
        assert_eq!(
            DiagnosticEvent::Disconnected { port: Port::Input }.kind(),
            "disconnected"
        );

        let ended = PipelineError::Disconnected {
            step_name: peer.clone(),
            port: Port::Input,
        };
        assert_eq!(DiagnosticEvent::StopRequested.kind(), "stop_requested");
        assert_eq!(
            DiagnosticEvent::EndedWithError { error: &ended }.kind(),
            "ended_with_error"
        );
    }

    #[test]
    fn test_tracing_diagnostics_without_subscriber() {
        let name = StepName::new("step1");
        let error = WorkError::new("error from step");

        TracingDiagnostics.record(&name, DiagnosticEvent::Started);
        TracingDiagnostics.record(&name, DiagnosticEvent::Failed { error: &error });
        TracingDiagnostics.record(&name, DiagnosticEvent::Stopped);
    }
}
