//! Commonly used types and traits

pub use crate::diagnostics::{DiagnosticEvent, Diagnostics};
pub use crate::error::PipelineError;
pub use crate::pipeline::Pipeline;
pub use crate::step::{Step, StepConfig, StepHandle};
pub use crate::work::{blocking, from_fn, UnitOfWork, WorkError};
