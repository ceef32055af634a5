//! Commonly used types and traits

pub use crate::define_steps;
pub use crate::error::{BoxError, Role, StepError};
pub use crate::manager::{InMemoryPersistence, StepManager, StepPersistence};
pub use crate::step::{StepId, StepValue};
pub use crate::value_step::ValueStep;
pub use crate::void_step::VoidStep;
