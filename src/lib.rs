//! # stepflag
//!
//! Idempotent steps for business processes that may be run more than once.
//!
//! Each step of a process owns one bit of a `u64` stored by the caller (for
//! example a column of the process row). When a step is checked, its `exec`
//! worker runs only if the bit is still clear, and the bit is set once `exec`
//! succeeds. Re-running the whole process after a crash therefore skips the
//! steps that already completed and runs their `otherwise` worker instead.
//!
//! ## Features
//!
//! - **Replay-safe**: completed steps never run `exec` again
//! - **Structured hooks**: `init`, `exec`, `otherwise`, `whenError`, `always`
//! - **Typed results**: [`ValueStep`] threads a value through every worker
//! - **Pluggable storage**: implement [`StepPersistence`] for your store
//! - **Logging**: one `tracing` line before and after every worker
//!
//! ## Quick Start
//!
//! ```rust
//! use stepflag::prelude::*;
//!
//! define_steps! {
//!     enum OrderSteps {
//!         Reserve = 0x01,
//!         Invoice = 0x02,
//!     }
//! }
//!
//! let bits = InMemoryPersistence::default();
//! let manager = StepManager::new(bits.clone());
//! manager.set_log_comment("order 42");
//!
//! let invoice = manager
//!     .step_with::<String>(OrderSteps::Invoice)
//!     .exec(|| Ok("INV-1".to_string()))
//!     .otherwise(|| Ok("INV-1 (loaded)".to_string()))
//!     .check()?;
//!
//! assert_eq!(invoice, "INV-1");
//! assert_eq!(bits.bits(), 0x02);
//! # Ok::<(), StepError>(())
//! ```
//!
//! ## Re-running a Process
//!
//! ```rust
//! use stepflag::prelude::*;
//! use std::cell::Cell;
//!
//! let mails_sent = Cell::new(0);
//! let bits = InMemoryPersistence::default();
//! let manager = StepManager::new(bits.clone());
//!
//! for _ in 0..3 {
//!     manager
//!         .step(0x04)
//!         .exec(|| {
//!             mails_sent.set(mails_sent.get() + 1);
//!             Ok(())
//!         })
//!         .check()?;
//! }
//!
//! assert_eq!(mails_sent.get(), 1);
//! # Ok::<(), StepError>(())
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use stepflag::prelude::*;
//!
//! let manager = StepManager::new(InMemoryPersistence::default());
//!
//! let result = manager
//!     .step(0x01)
//!     .exec(|| Err("boom".into()))
//!     .always(|| Ok(()))
//!     .check();
//!
//! match result {
//!     Err(StepError::Worker { role, source }) => {
//!         eprintln!("worker {} failed: {}", role, source);
//!     }
//!     Err(StepError::Configuration(msg)) => {
//!         eprintln!("misconfigured step: {}", msg);
//!     }
//!     Err(error) => eprintln!("Error: {}", error),
//!     Ok(()) => unreachable!(),
//! }
//! ```

mod error;
mod manager;
mod step;
mod step_log;
mod value_step;
mod void_step;

pub mod context;
pub mod prelude;
pub mod response;

pub use error::{BoxError, Role, StepError};
pub use manager::{InMemoryPersistence, StepManager, StepPersistence};
pub use step::{StepId, StepValue};
pub use step_log::{format_step_line, init_logging};
pub use value_step::ValueStep;
pub use void_step::VoidStep;

/// Macro to define a set of described steps with minimal boilerplate
///
/// This macro creates an enum with:
/// - one variant per step, each bound to its bit
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash` derives
/// - a [`StepValue`] implementation whose description is the variant name
/// - a `From` conversion into [`StepId`], so variants can be passed to
///   [`StepManager::step`] directly
///
/// # Example
///
/// ```rust
/// use stepflag::{define_steps, StepValue};
///
/// define_steps! {
///     pub enum MySteps {
///         First = 0x01,
///         Second = 0x02,
///     }
/// }
///
/// assert_eq!(MySteps::Second.bit_flag(), 0x02);
/// assert_eq!(MySteps::First.description(), "First");
/// ```
#[macro_export]
macro_rules! define_steps {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $bit:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::StepValue for $name {
            fn description(&self) -> &str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            fn bit_flag(&self) -> u64 {
                match self {
                    $($name::$variant => $bit),+
                }
            }
        }

        impl ::core::convert::From<$name> for $crate::StepId {
            fn from(value: $name) -> Self {
                $crate::StepId::from(&value)
            }
        }
    };
}
