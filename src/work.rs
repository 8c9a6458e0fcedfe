//! The unit-of-work contract every step executes.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a unit of work for the input it was given.
///
/// This is the only failure kind the engine routes: the step that observed
/// it hands its original input to the error path, or drops it if none is
/// wired.
///
/// # Examples
///
/// ```
/// use nagare::WorkError;
///
/// let error = WorkError::new("error from step");
/// assert_eq!(error.to_string(), "error from step");
///
/// let io = std::io::Error::new(std::io::ErrorKind::Other, "queue unreachable");
/// let error = WorkError::with_source("receive failed", io);
/// assert!(std::error::Error::source(&error).is_some());
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct WorkError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl WorkError {
    /// Creates a failure with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a failure wrapping the error that caused it.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A transformation executed by a step, once per loop iteration.
///
/// The input is `None` when the step is a source (it has no input handoff
/// point). The input is only borrowed: the step keeps ownership so that it
/// can route the value to its error path when the call fails.
///
/// # Returns
///
/// - `Ok(Some(value))` - hand `value` to the connected downstream step
/// - `Ok(None)` - nothing is sent onward
/// - `Err(error)` - failure; the original input goes to the error path
///
/// Implementations may suspend for as long as they need. Each step runs
/// on its own task, so a slow unit of work only stalls its own chain.
///
/// # Examples
///
/// ```
/// use nagare::{UnitOfWork, WorkError};
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// struct Delay(Duration);
///
/// #[async_trait]
/// impl UnitOfWork<String, String> for Delay {
///     async fn process(&self, input: Option<&String>) -> Result<Option<String>, WorkError> {
///         tokio::time::sleep(self.0).await;
///         Ok(input.cloned())
///     }
/// }
/// ```
#[async_trait]
pub trait UnitOfWork<I, O>: Send + Sync {
    /// Processes one input value.
    async fn process(&self, input: Option<&I>) -> Result<Option<O>, WorkError>;
}

/// Unit of work backed by a synchronous closure. See [`from_fn`].
pub struct FnWork<F> {
    f: F,
}

/// Wraps a synchronous closure as a unit of work.
///
/// The closure runs inline on the step's task, so it should not block.
/// Use [`blocking`] for closures that sleep or perform blocking I/O.
///
/// # Examples
///
/// ```
/// use nagare::{from_fn, Step};
///
/// let hello: Step<(), String> = Step::new(
///     "step1",
///     from_fn(|_: Option<&()>| Ok(Some("hello for step1".to_string()))),
/// );
/// assert_eq!(hello.name().as_str(), "step1");
/// ```
pub fn from_fn<I, O, F>(f: F) -> FnWork<F>
where
    F: Fn(Option<&I>) -> Result<Option<O>, WorkError> + Send + Sync,
{
    FnWork { f }
}

#[async_trait]
impl<I, O, F> UnitOfWork<I, O> for FnWork<F>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(Option<&I>) -> Result<Option<O>, WorkError> + Send + Sync,
{
    async fn process(&self, input: Option<&I>) -> Result<Option<O>, WorkError> {
        (self.f)(input)
    }
}

/// Unit of work running a synchronous closure on the blocking thread pool.
/// See [`blocking`].
pub struct BlockingWork<F> {
    f: Arc<F>,
}

/// Wraps a blocking closure as a unit of work.
///
/// Each call clones the input and runs the closure through
/// [`tokio::task::spawn_blocking`]. A panic inside the closure is reported
/// as a [`WorkError`].
///
/// # Examples
///
/// ```
/// use nagare::{blocking, Step};
/// use std::time::Duration;
///
/// let delay: Step<String, String> = Step::new(
///     "step2",
///     blocking(|input: Option<String>| {
///         std::thread::sleep(Duration::from_millis(10));
///         Ok(input)
///     }),
/// );
/// ```
pub fn blocking<I, O, F>(f: F) -> BlockingWork<F>
where
    F: Fn(Option<I>) -> Result<Option<O>, WorkError> + Send + Sync + 'static,
{
    BlockingWork { f: Arc::new(f) }
}

#[async_trait]
impl<I, O, F> UnitOfWork<I, O> for BlockingWork<F>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(Option<I>) -> Result<Option<O>, WorkError> + Send + Sync + 'static,
{
    async fn process(&self, input: Option<&I>) -> Result<Option<O>, WorkError> {
        let f = Arc::clone(&self.f);
        let input = input.cloned();
        tokio::task::spawn_blocking(move || f(input))
            .await
            .map_err(|e| WorkError::with_source("blocking unit of work did not complete", e))?
    }
}
