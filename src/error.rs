use thiserror::Error;

/// Error type returned by workers and persistence handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The role a worker is bound to.
///
/// Used as the binding key of a step, as the `handler` field of every log
/// line, and to tell hooks which worker ran last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Produces the initial carried value of a [`ValueStep`](crate::ValueStep).
    Init,
    /// Runs when the step's bit is not yet set.
    Exec,
    /// Runs when the step's bit is already set.
    Otherwise,
    /// Runs when an earlier worker failed.
    WhenError,
    /// Runs last, whatever happened before.
    Always,
}

impl Role {
    /// Name of the role as it appears in log lines and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Init => "init",
            Role::Exec => "exec",
            Role::Otherwise => "otherwise",
            Role::WhenError => "whenError",
            Role::Always => "always",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while configuring or checking a step.
///
/// Configuration errors signal a programming mistake and are never routed to
/// a `whenError` worker. Worker and persistence errors are business errors:
/// they are handed to `whenError` when one is bound, and returned from
/// `check()` otherwise.
///
/// ```
/// use stepflag::{InMemoryPersistence, StepError, StepManager};
///
/// let manager = StepManager::new(InMemoryPersistence::default());
/// let result = manager
///     .step(0x01)
///     .exec(|| Err("boom".into()))
///     .check();
///
/// match result {
///     Err(StepError::Worker { role, source }) => {
///         assert_eq!(role.as_str(), "exec");
///         assert_eq!(source.to_string(), "boom");
///     }
///     other => panic!("unexpected result: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StepError {
    /// The step was used in a way the engine does not allow.
    ///
    /// Returned when:
    /// - `check()` is called a second time
    /// - a role is bound twice, or bound after `check()`
    /// - no `exec` worker is bound
    #[error("Invalid step configuration: {0}")]
    Configuration(String),

    /// A bound worker returned an error.
    #[error("Worker '{role}()' failed: {source}")]
    Worker {
        /// Role of the failing worker
        role: Role,
        /// The error returned by the worker
        source: BoxError,
    },

    /// The persistence handler failed to read or store the step bits.
    #[error("Step persistence failed: {source}")]
    Persistence {
        /// The error returned by the persistence handler
        source: BoxError,
    },
}

impl StepError {
    pub(crate) fn already_bound(role: Role) -> Self {
        StepError::Configuration(format!("worker '{}()' has already been defined", role))
    }

    pub(crate) fn bound_after_check(role: Role) -> Self {
        StepError::Configuration(format!(
            "worker '{}()' bound after 'check()' was called",
            role
        ))
    }

    pub(crate) fn checked_twice() -> Self {
        StepError::Configuration("'check()' called twice".to_string())
    }

    pub(crate) fn missing_exec() -> Self {
        StepError::Configuration(format!("worker '{}()' is not defined", Role::Exec))
    }

    /// Returns `true` for usage errors, which are never retryable.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StepError::Configuration(_))
    }

    /// Role of the worker that raised this error, if a worker raised it.
    pub fn role(&self) -> Option<Role> {
        match self {
            StepError::Worker { role, .. } => Some(*role),
            _ => None,
        }
    }
}
