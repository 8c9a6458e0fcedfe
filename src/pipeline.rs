use crate::diagnostics::{DiagnosticEvent, Diagnostics, TracingDiagnostics};
use crate::error::PipelineError;
use crate::step::{Step, StepHandle, StepName};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A group of running steps that are stopped together.
///
/// Every step started through the pipeline gets a child of the pipeline's
/// cancellation token, so [`shutdown`](Pipeline::shutdown) stops them all.
/// Connected steps stopped together end cleanly, whichever sees the
/// cancellation first.
///
/// The pipeline reports each stop request and each step that ended with an
/// error to its own [`Diagnostics`] sink, [`TracingDiagnostics`] unless
/// replaced with [`with_diagnostics`](Pipeline::with_diagnostics).
///
/// # Examples
///
/// ```
/// use nagare::{from_fn, Pipeline, Step};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut hello: Step<(), String> =
///     Step::new("step1", from_fn(|_: Option<&()>| Ok(Some("hello for step1".to_string()))));
/// let mut log: Step<String, ()> =
///     Step::new("step2", from_fn(|_: Option<&String>| Ok(None)));
/// hello.connect_to(&mut log).expect("fresh steps");
///
/// let mut pipeline = Pipeline::new();
/// pipeline.start(hello).start(log);
/// assert_eq!(pipeline.step_count(), 2);
///
/// pipeline.shutdown().await.expect("clean stop");
/// # }
/// ```
pub struct Pipeline {
    cancel: CancellationToken,
    diagnostics: Arc<dyn Diagnostics>,
    handles: Vec<StepHandle>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Creates an empty pipeline with its own cancellation token.
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Creates an empty pipeline stopped by `cancel`.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            diagnostics: Arc::new(TracingDiagnostics),
            handles: Vec::new(),
        }
    }

    /// Replaces the diagnostic sink of the pipeline. Steps keep their own.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Returns the token that stops every step of the pipeline.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Starts `step` as part of this pipeline.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<I, O>(&mut self, step: Step<I, O>) -> &mut Self
    where
        I: Send + Sync + 'static,
        O: Send + 'static,
    {
        let handle = step.start_with(self.cancel.child_token());
        self.handles.push(handle);
        self
    }

    /// Returns the names of the started steps, in start order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.handles.iter().map(StepHandle::name)
    }

    /// Returns the number of started steps.
    pub fn step_count(&self) -> usize {
        self.handles.len()
    }

    /// Stops every step and waits for all of them to end.
    ///
    /// Returns the errors of the steps that did not end cleanly, in start
    /// order.
    pub async fn shutdown(self) -> Result<(), Vec<PipelineError>> {
        for handle in &self.handles {
            self.diagnostics
                .record(handle.name(), DiagnosticEvent::StopRequested);
        }
        self.cancel.cancel();

        let mut errors = Vec::new();
        for handle in self.handles {
            let name = handle.name().clone();
            if let Err(e) = handle.join().await {
                self.diagnostics
                    .record(&name, DiagnosticEvent::EndedWithError { error: &e });
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs until `signal` completes or the pipeline token is cancelled,
    /// then shuts down.
    ///
    /// ```no_run
    /// # async fn run(pipeline: nagare::Pipeline) {
    /// pipeline
    ///     .run_until(async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await
    ///     .ok();
    /// # }
    /// ```
    pub async fn run_until<F>(self, signal: F) -> Result<(), Vec<PipelineError>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            _ = self.cancel.cancelled() => {}
        }
        self.shutdown().await
    }
}
