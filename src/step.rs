use crate::diagnostics::{DiagnosticEvent, Diagnostics, TracingDiagnostics};
use crate::error::PipelineError;
use crate::handoff::{HandoffReceiver, HandoffSender};
use crate::wiring::Port;
use crate::work::UnitOfWork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Step identity, used only for diagnostics.
///
/// # Examples
///
/// ```
/// use nagare::StepName;
///
/// let name = StepName::new("step1");
/// assert_eq!(name.as_str(), "step1");
///
/// // From trait for ergonomic conversion
/// let name: StepName = "step2".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Configuration for a step.
///
/// # Examples
///
/// ```
/// use nagare::StepConfig;
/// use std::time::Duration;
///
/// // A source that polls once per second and is expected to drop failures.
/// let config = StepConfig {
///     source_interval: Some(Duration::from_secs(1)),
///     report_unwired_errors: false,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Pause between two invocations of a source step. `None` only yields
    /// to the scheduler. Ignored for steps with an input.
    /// Default: `None`.
    pub source_interval: Option<Duration>,
    /// Whether starting a step without an error path records an
    /// [`UnwiredErrorPath`](DiagnosticEvent::UnwiredErrorPath) event.
    /// Default: `true`.
    pub report_unwired_errors: bool,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            source_interval: None,
            report_unwired_errors: true,
        }
    }
}

/// A processing node wrapping one unit of work.
///
/// `I` is the type of values the step receives, `O` the type it hands on.
/// The error path carries `Option<I>`: the original input of a failed
/// invocation, `None` when a source step fails.
///
/// A step is built with [`Step::new`], wired with
/// [`connect_to`](Step::connect_to) and [`error_to`](Step::error_to), then
/// consumed by [`start`](Step::start), which spawns its loop:
///
/// 1. wait for a value on the input, or use `None` for a source step;
/// 2. invoke the unit of work;
/// 3. on failure, hand the original input to the error path if one is wired,
///    exactly once per failure;
/// 4. on a non-empty output, hand it to the downstream step if one is wired.
///
/// Handoffs block until the peer takes the value. A failure on a step with
/// no error path is dropped after a diagnostic record.
///
/// # Examples
///
/// ```
/// use nagare::{from_fn, Step};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut hello: Step<(), String> =
///     Step::new("step1", from_fn(|_: Option<&()>| Ok(Some("hello for step1".to_string()))));
/// let mut print: Step<String, ()> = Step::new(
///     "step2",
///     from_fn(|input: Option<&String>| {
///         println!("{:?}", input);
///         Ok(None)
///     }),
/// );
///
/// hello.connect_to(&mut print).expect("fresh steps");
///
/// // Connected steps share a token so that they stop together.
/// let stop = CancellationToken::new();
/// let print = print.start_with(stop.child_token());
/// let hello = hello.start_with(stop.child_token());
///
/// stop.cancel();
/// print.join().await.expect("clean stop");
/// hello.join().await.expect("clean stop");
/// # }
/// ```
pub struct Step<I, O> {
    pub(crate) name: StepName,
    work: Arc<dyn UnitOfWork<I, O>>,
    config: StepConfig,
    pub(crate) diagnostics: Arc<dyn Diagnostics>,
    pub(crate) input: Option<HandoffReceiver<I>>,
    pub(crate) output: Option<HandoffSender<O>>,
    pub(crate) error_output: Option<HandoffSender<Option<I>>>,
}

impl<I, O> fmt::Debug for Step<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("error_output", &self.error_output.is_some())
            .finish()
    }
}

impl<I, O> Step<I, O> {
    /// Returns the step name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the step configuration.
    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Returns `true` if another step has been connected to this one.
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Returns `true` if this step has a normal downstream step.
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Returns `true` if this step has an error path.
    pub fn has_error_output(&self) -> bool {
        self.error_output.is_some()
    }

    /// Returns `true` if this step has no input and will be invoked with `None`.
    pub fn is_source(&self) -> bool {
        self.input.is_none()
    }
}

impl<I, O> Step<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    /// Creates a step running `work`, logging through [`TracingDiagnostics`].
    pub fn new(name: impl Into<StepName>, work: impl UnitOfWork<I, O> + 'static) -> Self {
        Self {
            name: name.into(),
            work: Arc::new(work),
            config: StepConfig::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            input: None,
            output: None,
            error_output: None,
        }
    }

    /// Replaces the step configuration.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the diagnostic sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Spawns the step loop with its own cancellation token.
    ///
    /// Steps may be started in any order; handoffs wait for both ends.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(self) -> StepHandle {
        self.start_with(CancellationToken::new())
    }

    /// Spawns the step loop, stopping it when `cancel` is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_with(self, cancel: CancellationToken) -> StepHandle {
        let Step {
            name,
            work,
            config,
            diagnostics,
            input,
            output,
            error_output,
        } = self;

        diagnostics.record(&name, DiagnosticEvent::Started);
        if error_output.is_none() && config.report_unwired_errors {
            diagnostics.record(&name, DiagnosticEvent::UnwiredErrorPath);
        }

        let step_loop = StepLoop {
            name: name.clone(),
            work,
            source_interval: config.source_interval,
            diagnostics,
            input,
            output,
            error_output,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(step_loop.run());

        StepHandle { name, cancel, task }
    }
}

/// Control handle of a running step.
#[derive(Debug)]
pub struct StepHandle {
    name: StepName,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), PipelineError>>,
}

impl StepHandle {
    /// Returns the name of the running step.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the token that stops this step.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Asks the step to stop at its next suspension point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the step loop has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the step loop to end.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - the step was stopped
    /// - `Err(PipelineError::Disconnected)` - a handoff peer went away
    /// - `Err(PipelineError::Join)` - the step task panicked
    pub async fn join(self) -> Result<(), PipelineError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Join {
                step_name: self.name,
                details: e.to_string(),
            }),
        }
    }

    /// Stops the step and waits for its loop to end.
    ///
    /// Only this step is stopped. Its handoff ends close with it, so a
    /// running step reading from it ends with
    /// [`PipelineError::Disconnected`] on [`Port::Input`], and one writing
    /// to it on [`Port::Output`] or [`Port::Error`], whichever of the two is
    /// stopped first. Stop connected steps together through a shared token
    /// ([`start_with`](Step::start_with)) or a [`Pipeline`](crate::Pipeline)
    /// to avoid that.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        self.stop();
        self.join().await
    }
}

enum Exit {
    Stopped,
    Disconnected(Port),
}

struct StepLoop<I, O> {
    name: StepName,
    work: Arc<dyn UnitOfWork<I, O>>,
    source_interval: Option<Duration>,
    diagnostics: Arc<dyn Diagnostics>,
    input: Option<HandoffReceiver<I>>,
    output: Option<HandoffSender<O>>,
    error_output: Option<HandoffSender<Option<I>>>,
    cancel: CancellationToken,
}

impl<I, O> StepLoop<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    async fn run(mut self) -> Result<(), PipelineError> {
        let exit = loop {
            if let Err(exit) = self.iterate().await {
                break exit;
            }
        };

        match exit {
            Exit::Stopped => {
                self.record(DiagnosticEvent::Stopped);
                Ok(())
            }
            Exit::Disconnected(port) => {
                self.record(DiagnosticEvent::Disconnected { port });
                Err(PipelineError::Disconnected {
                    step_name: self.name,
                    port,
                })
            }
        }
    }

    async fn iterate(&mut self) -> Result<(), Exit> {
        let input = match self.input.as_mut() {
            Some(rx) => {
                self.diagnostics
                    .record(&self.name, DiagnosticEvent::WaitingForInput);
                let received = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Exit::Stopped),
                    received = rx.recv() => received,
                };
                match received {
                    Some(value) => {
                        self.record(DiagnosticEvent::ReceivedInput);
                        Some(value)
                    }
                    None => return Err(self.closed(Port::Input)),
                }
            }
            None => None,
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Exit::Stopped),
            result = self.work.process(input.as_ref()) => result,
        };

        match result {
            Err(error) => {
                self.record(DiagnosticEvent::Failed { error: &error });
                match &self.error_output {
                    Some(tx) => {
                        self.hand_off(tx, input, Port::Error).await?;
                        self.record(DiagnosticEvent::FailureRouted);
                    }
                    None => self.record(DiagnosticEvent::FailureDropped),
                }
            }
            Ok(Some(value)) => match &self.output {
                Some(tx) => {
                    self.record(DiagnosticEvent::SendingOutput);
                    self.hand_off(tx, value, Port::Output).await?;
                }
                None => self.record(DiagnosticEvent::OutputDiscarded),
            },
            Ok(None) => self.record(DiagnosticEvent::EmptyOutput),
        }

        if self.input.is_none() {
            self.pace().await?;
        }
        Ok(())
    }

    async fn hand_off<T: Send>(
        &self,
        tx: &HandoffSender<T>,
        value: T,
        port: Port,
    ) -> Result<(), Exit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Exit::Stopped),
            sent = tx.send(value) => sent.map_err(|_| self.closed(port)),
        }
    }

    async fn pace(&self) -> Result<(), Exit> {
        match self.source_interval {
            Some(interval) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Exit::Stopped),
                _ = tokio::time::sleep(interval) => Ok(()),
            },
            None => {
                tokio::task::yield_now().await;
                if self.cancel.is_cancelled() {
                    Err(Exit::Stopped)
                } else {
                    Ok(())
                }
            }
        }
    }

    // A peer stopped by the same shutdown is not a disconnection.
    fn closed(&self, port: Port) -> Exit {
        if self.cancel.is_cancelled() {
            Exit::Stopped
        } else {
            Exit::Disconnected(port)
        }
    }

    fn record(&self, event: DiagnosticEvent<'_>) {
        self.diagnostics.record(&self.name, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{from_fn, WorkError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDiagnostics {
        events: Mutex<Vec<(String, &'static str)>>,
    }

    impl RecordingDiagnostics {
        fn kinds(&self, step: &str) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == step)
                .map(|(_, kind)| *kind)
                .collect()
        }
    }

    impl Diagnostics for RecordingDiagnostics {
        fn record(&self, step: &StepName, event: DiagnosticEvent<'_>) {
            self.events
                .lock()
                .unwrap()
                .push((step.to_string(), event.kind()));
        }
    }

    fn empty_source(name: &str) -> Step<(), u32> {
        Step::new(name, from_fn(|_: Option<&()>| Ok(None)))
    }

    #[test]
    fn test_step_name() {
        let name = StepName::new("step1");
        assert_eq!(name.as_str(), "step1");
        assert_eq!(name.to_string(), "step1");
        assert_eq!(StepName::from("step1"), name);
        assert_eq!(StepName::from("step1".to_string()), name);
    }

    #[test]
    fn test_step_config_default() {
        let config = StepConfig::default();
        assert_eq!(config.source_interval, None);
        assert!(config.report_unwired_errors);
    }

    #[test]
    fn test_step_config_deserialize_partial() {
        let config: StepConfig =
            serde_json::from_str(r#"{"source_interval": {"secs": 2, "nanos": 0}}"#).unwrap();
        assert_eq!(config.source_interval, Some(Duration::from_secs(2)));
        assert!(config.report_unwired_errors);

        let config: StepConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StepConfig::default());
    }

    #[test]
    fn test_new_step_is_unwired_source() {
        let step = empty_source("step1");
        assert_eq!(step.name().as_str(), "step1");
        assert!(step.is_source());
        assert!(!step.has_output());
        assert!(!step.has_error_output());
        assert_eq!(step.config(), &StepConfig::default());
    }

    #[test]
    fn test_step_debug_hides_payload() {
        let step = empty_source("step1");
        let debug = format!("{:?}", step);
        assert!(debug.contains("step1"));
        assert!(debug.contains("input: false"));
    }

    #[tokio::test]
    async fn test_start_reports_unwired_error_path() {
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let handle = empty_source("step1")
            .with_diagnostics(diagnostics.clone())
            .start();

        assert!(handle.shutdown().await.is_ok());

        let kinds = diagnostics.kinds("step1");
        assert_eq!(kinds[0], "started");
        assert_eq!(kinds[1], "unwired_error_path");
        assert_eq!(kinds.last(), Some(&"stopped"));
    }

    #[tokio::test]
    async fn test_unwired_error_report_can_be_disabled() {
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let handle = empty_source("step1")
            .with_config(StepConfig {
                report_unwired_errors: false,
                ..StepConfig::default()
            })
            .with_diagnostics(diagnostics.clone())
            .start();

        assert!(handle.shutdown().await.is_ok());
        assert!(!diagnostics.kinds("step1").contains(&"unwired_error_path"));
    }

    #[tokio::test]
    async fn test_source_is_invoked_repeatedly_with_empty_input() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let step: Step<(), u32> = Step::new(
            "step1",
            from_fn(move |input: Option<&()>| {
                assert!(input.is_none());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
        );

        let handle = step.start();
        while calls.load(Ordering::SeqCst) < 10 {
            tokio::task::yield_now().await;
        }

        assert!(handle.shutdown().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_interval_paces_invocations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let step: Step<(), u32> = Step::new(
            "step1",
            from_fn(move |_: Option<&()>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
        )
        .with_config(StepConfig {
            source_interval: Some(Duration::from_secs(1)),
            ..StepConfig::default()
        });

        let handle = step.start();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(handle.shutdown().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_source_failure_sends_empty_input_once_per_failure() {
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let calls = AtomicUsize::new(0);
        // Fails on its first three invocations, then only produces empty outputs.
        let mut failing: Step<(), u32> = Step::new(
            "step4",
            from_fn(move |_: Option<&()>| {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(WorkError::new("error from step"))
                } else {
                    Ok(None)
                }
            }),
        )
        .with_diagnostics(diagnostics.clone());

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut errors: Step<Option<()>, u32> = Step::new(
            "step5",
            from_fn(move |input: Option<&Option<()>>| {
                sink.lock().unwrap().push(input.cloned());
                Ok(None)
            }),
        );
        failing.error_to(&mut errors).unwrap();

        let errors = errors.start();
        let failing = failing.start();
        while received.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(errors.shutdown().await.is_ok());
        assert!(failing.shutdown().await.is_ok());

        assert_eq!(*received.lock().unwrap(), vec![Some(None); 3]);
        let kinds = diagnostics.kinds("step4");
        assert_eq!(kinds.iter().filter(|k| **k == "failed").count(), 3);
        assert_eq!(kinds.iter().filter(|k| **k == "failure_routed").count(), 3);
        assert!(!kinds.contains(&"failure_dropped"));
    }

    #[tokio::test]
    async fn test_stopping_writer_alone_disconnects_reader() {
        let mut upstream = empty_source("step1");
        let mut downstream: Step<u32, u32> =
            Step::new("step2", from_fn(|input: Option<&u32>| Ok(input.copied())));
        upstream.connect_to(&mut downstream).unwrap();

        let downstream = downstream.start();
        let upstream = upstream.start();

        assert!(upstream.shutdown().await.is_ok());
        assert!(matches!(
            downstream.join().await,
            Err(PipelineError::Disconnected {
                port: Port::Input,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_shared_token_stops_connected_steps_cleanly() {
        let mut upstream: Step<(), u32> =
            Step::new("step1", from_fn(|_: Option<&()>| Ok(Some(1))));
        let mut downstream: Step<u32, u32> =
            Step::new("step2", from_fn(|_: Option<&u32>| Ok(None)));
        upstream.connect_to(&mut downstream).unwrap();

        let stop = CancellationToken::new();
        let downstream = downstream.start_with(stop.child_token());
        let upstream = upstream.start_with(stop.child_token());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        stop.cancel();
        assert!(upstream.join().await.is_ok());
        assert!(downstream.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_upstream_disconnects_input() {
        let mut upstream = empty_source("step1");
        let mut downstream: Step<u32, u32> =
            Step::new("step2", from_fn(|input: Option<&u32>| Ok(input.copied())));
        upstream.connect_to(&mut downstream).unwrap();
        drop(upstream);

        let result = downstream.start().join().await;
        match result {
            Err(PipelineError::Disconnected { step_name, port }) => {
                assert_eq!(step_name.as_str(), "step2");
                assert_eq!(port, Port::Input);
            }
            _ => panic!("Unexpected result"),
        }
    }

    #[tokio::test]
    async fn test_dropped_downstream_disconnects_output() {
        let mut upstream: Step<(), u32> =
            Step::new("step1", from_fn(|_: Option<&()>| Ok(Some(1))));
        let mut downstream: Step<u32, u32> =
            Step::new("step2", from_fn(|input: Option<&u32>| Ok(input.copied())));
        upstream.connect_to(&mut downstream).unwrap();
        drop(downstream);

        let result = upstream.start().join().await;
        assert!(matches!(
            result,
            Err(PipelineError::Disconnected {
                port: Port::Output,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_input() {
        let mut upstream = empty_source("step1");
        let mut downstream: Step<u32, u32> =
            Step::new("step2", from_fn(|input: Option<&u32>| Ok(input.copied())));
        upstream.connect_to(&mut downstream).unwrap();

        let handle = downstream.start();
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        assert!(handle.shutdown().await.is_ok());
        drop(upstream);
    }

    #[tokio::test]
    async fn test_panicking_work_reports_join_error() {
        #[allow(clippy::panic)]
        let step: Step<(), u32> = Step::new(
            "step1",
            from_fn(|_: Option<&()>| -> Result<Option<u32>, WorkError> { panic!("boom") }),
        );

        let result = step.start().join().await;
        match result {
            Err(PipelineError::Join { step_name, .. }) => {
                assert_eq!(step_name.as_str(), "step1");
            }
            _ => panic!("Unexpected result"),
        }
    }
}
