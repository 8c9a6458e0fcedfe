//! # Nagare (流れ)
//!
//! A minimal dataflow pipeline runtime for Rust.
//!
//! The name "Nagare" (流れ) means "flow" or "stream" in Japanese: values
//! flow from step to step, each step transforming what it receives and
//! passing the result downstream.
//!
//! ## Features
//!
//! - **One task per step**: every [`Step`] runs its own loop, no central scheduler
//! - **Rendezvous handoffs**: steps are joined by unbuffered [`handoff`] points,
//!   a slow consumer stalls its upstream chain
//! - **Error path**: failed inputs are routed to a dedicated step with [`Step::error_to`]
//! - **Typed edges**: `Step<I, O>` only connects to steps that accept `O`
//! - **Graceful stop**: cancellation tokens checked at every suspension point
//! - **Injected diagnostics**: each step logs through a [`Diagnostics`] sink,
//!   [`tracing`] by default
//!
//! ## Quick Start
//!
//! ```rust
//! use nagare::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut hello: Step<(), String> = Step::new(
//!     "step1",
//!     from_fn(|_: Option<&()>| Ok(Some("hello for step1".to_string()))),
//! );
//! let mut shout: Step<String, String> = Step::new(
//!     "step2",
//!     from_fn(|input: Option<&String>| Ok(input.map(|s| s.to_uppercase()))),
//! );
//! let mut log: Step<String, ()> = Step::new(
//!     "step3",
//!     from_fn(|input: Option<&String>| {
//!         println!("received {:?}", input);
//!         Ok(None)
//!     }),
//! );
//!
//! hello.connect_to(&mut shout).expect("valid wiring");
//! shout.connect_to(&mut log).expect("valid wiring");
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.start(hello).start(shout).start(log);
//!
//! tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//! pipeline.shutdown().await.expect("clean stop");
//! # }
//! ```
//!
//! ## Error Path
//!
//! A failing invocation hands its *original input* to the step wired with
//! [`Step::error_to`], exactly once per failure. The error step of a
//! `Step<I, O>` accepts `Option<I>`: a failing source has no input and sends
//! `None`. Without an error path the failure is dropped after a
//! diagnostic record, and starting such a step reports
//! [`DiagnosticEvent::UnwiredErrorPath`].
//!
//! ```rust
//! use nagare::prelude::*;
//!
//! let mut parse: Step<String, u64> = Step::new(
//!     "parse",
//!     from_fn(|input: Option<&String>| match input {
//!         Some(s) => s
//!             .parse::<u64>()
//!             .map(Some)
//!             .map_err(|e| WorkError::with_source("not a number", e)),
//!         None => Ok(None),
//!     }),
//! );
//! let mut rejected: Step<Option<String>, ()> = Step::new(
//!     "rejected",
//!     from_fn(|input: Option<&Option<String>>| {
//!         eprintln!("could not parse {:?}", input);
//!         Ok(None)
//!     }),
//! );
//!
//! parse.error_to(&mut rejected).expect("valid wiring");
//! ```
//!
//! ## Async Units of Work
//!
//! ```rust
//! use nagare::prelude::*;
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct Delay(Duration);
//!
//! #[async_trait]
//! impl UnitOfWork<String, String> for Delay {
//!     async fn process(&self, input: Option<&String>) -> Result<Option<String>, WorkError> {
//!         tokio::time::sleep(self.0).await;
//!         Ok(input.cloned())
//!     }
//! }
//!
//! let delay = Step::new("step2", Delay(Duration::from_secs(3)));
//! # let _: &Step<String, String> = &delay;
//! ```

mod diagnostics;
mod error;
mod handoff;
mod pipeline;
mod step;
mod wiring;
mod work;

pub mod prelude;

pub use diagnostics::{DiagnosticEvent, Diagnostics, TracingDiagnostics};
pub use error::PipelineError;
pub use handoff::{handoff, HandoffClosed, HandoffReceiver, HandoffSender};
pub use pipeline::Pipeline;
pub use step::{Step, StepConfig, StepHandle, StepName};
pub use wiring::Port;
pub use work::{blocking, from_fn, BlockingWork, FnWork, UnitOfWork, WorkError};
