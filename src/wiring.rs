//! Graph wiring: connecting steps before they start.
//!
//! Every edge is a fresh [`handoff`](crate::handoff()) point with exactly one
//! writer and one reader. A port can be wired once; later attempts are
//! rejected with [`PipelineError::AlreadyConnected`] and leave both steps
//! untouched.
//!
//! Wiring is only possible before a step starts, since [`Step::start`]
//! consumes the step. A step cannot be connected to itself
//! (`step.connect_to(&mut step)` is rejected by the borrow checker), but
//! longer cycles are not detected and deadlock on the first handoff.

use crate::diagnostics::DiagnosticEvent;
use crate::error::PipelineError;
use crate::handoff::handoff;
use crate::step::Step;
use std::fmt;

/// The handoff ports of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Values the step receives.
    Input,
    /// Non-empty outputs of successful invocations.
    Output,
    /// Original inputs of failed invocations, `None` for a source.
    Error,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input => write!(f, "input"),
            Port::Output => write!(f, "output"),
            Port::Error => write!(f, "error"),
        }
    }
}

impl<I, O> Step<I, O> {
    /// Sends this step's outputs to `target`.
    ///
    /// Creates the handoff point that becomes `target`'s input and this
    /// step's output.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyConnected`] if this step already has an
    /// output or `target` already has an input.
    ///
    /// # Examples
    ///
    /// ```
    /// use nagare::{from_fn, PipelineError, Port, Step};
    ///
    /// let mut step1: Step<(), String> =
    ///     Step::new("step1", from_fn(|_: Option<&()>| Ok(Some("hello".to_string()))));
    /// let mut step2: Step<String, String> =
    ///     Step::new("step2", from_fn(|input: Option<&String>| Ok(input.cloned())));
    /// let mut step3: Step<String, ()> =
    ///     Step::new("step3", from_fn(|_: Option<&String>| Ok(None)));
    ///
    /// step1.connect_to(&mut step2)?;
    ///
    /// // Each port takes a single edge.
    /// assert!(matches!(
    ///     step1.connect_to(&mut step3),
    ///     Err(PipelineError::AlreadyConnected { port: Port::Output, .. })
    /// ));
    /// # Ok::<(), PipelineError>(())
    /// ```
    pub fn connect_to<P>(&mut self, target: &mut Step<O, P>) -> Result<(), PipelineError> {
        if self.output.is_some() {
            return Err(self.occupied(Port::Output));
        }
        if target.input.is_some() {
            return Err(target.occupied(Port::Input));
        }

        let (tx, rx) = handoff();
        target.input = Some(rx);
        self.output = Some(tx);
        self.diagnostics.record(
            &self.name,
            DiagnosticEvent::Wired {
                port: Port::Output,
                peer: &target.name,
            },
        );
        Ok(())
    }

    /// Sends the original input of every failed invocation to `target`.
    ///
    /// Every failure is handed on exactly once. `target` receives
    /// `Some(input)` for a step with an input, and `None` when this step is a
    /// source.
    ///
    /// Independent of [`connect_to`](Step::connect_to): a step may have both
    /// a normal and an error downstream.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyConnected`] if this step already has an
    /// error path or `target` already has an input.
    pub fn error_to<P>(
        &mut self,
        target: &mut Step<Option<I>, P>,
    ) -> Result<(), PipelineError> {
        if self.error_output.is_some() {
            return Err(self.occupied(Port::Error));
        }
        if target.input.is_some() {
            return Err(target.occupied(Port::Input));
        }

        let (tx, rx) = handoff();
        target.input = Some(rx);
        self.error_output = Some(tx);
        self.diagnostics.record(
            &self.name,
            DiagnosticEvent::Wired {
                port: Port::Error,
                peer: &target.name,
            },
        );
        Ok(())
    }

    fn occupied(&self, port: Port) -> PipelineError {
        PipelineError::AlreadyConnected {
            step_name: self.name.clone(),
            port,
        }
    }
}
