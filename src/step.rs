use crate::error::{BoxError, Role, StepError};
use crate::manager::StepManager;
use crate::step_log;
use std::fmt;
use tracing::debug;

/// A described step identifier, usually an enum variant.
///
/// Implement it by hand or generate it with [`define_steps!`](crate::define_steps).
/// The description replaces the raw bit in log lines.
///
/// # Examples
///
/// ```
/// use stepflag::StepValue;
///
/// #[derive(Debug, Clone, Copy)]
/// enum Steps {
///     Reserve,
///     Notify,
/// }
///
/// impl StepValue for Steps {
///     fn description(&self) -> &str {
///         match self {
///             Steps::Reserve => "RESERVE",
///             Steps::Notify => "NOTIFY",
///         }
///     }
///
///     fn bit_flag(&self) -> u64 {
///         match self {
///             Steps::Reserve => 0x01,
///             Steps::Notify => 0x02,
///         }
///     }
/// }
///
/// assert_eq!(Steps::Notify.bit_flag(), 0x02);
/// ```
pub trait StepValue {
    /// Human readable name of the step.
    fn description(&self) -> &str;

    /// Bit guarding the step, one bit set by convention.
    fn bit_flag(&self) -> u64;
}

/// Identity of a step: the bit (or mask) tested against the persisted bits,
/// and an optional description used in log lines.
///
/// # Examples
///
/// ```
/// use stepflag::StepId;
///
/// let id = StepId::from(0x04);
/// assert_eq!(id.bit(), 0x04);
/// assert_eq!(id.description(), None);
///
/// let id = StepId::described(0x08, "ARCHIVE");
/// assert!(id.is_set_in(0x0c));
/// assert!(!id.is_set_in(0x03));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepId {
    bit: u64,
    description: Option<String>,
}

impl StepId {
    /// Creates an undescribed step identifier.
    pub fn new(bit: u64) -> Self {
        Self {
            bit,
            description: None,
        }
    }

    /// Creates a step identifier carrying a description.
    pub fn described(bit: u64, description: impl Into<String>) -> Self {
        Self {
            bit,
            description: Some(description.into()),
        }
    }

    /// Returns the bit (or mask) of the step.
    pub fn bit(&self) -> u64 {
        self.bit
    }

    /// Returns the description, if the step has one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns `true` if any bit of this step is set in `bits`.
    pub fn is_set_in(&self, bits: u64) -> bool {
        bits & self.bit != 0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}", description),
            None => write!(f, "{:#x}", self.bit),
        }
    }
}

impl From<u64> for StepId {
    fn from(bit: u64) -> Self {
        Self::new(bit)
    }
}

impl<V: StepValue> From<&V> for StepId {
    fn from(value: &V) -> Self {
        Self::described(value.bit_flag(), value.description())
    }
}

/// State threaded through the phases of one `check()`.
#[derive(Debug)]
pub(crate) struct Progress<T> {
    pub(crate) value: T,
    pub(crate) last_role: Option<Role>,
    pub(crate) error: Option<StepError>,
}

impl<T> Progress<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            last_role: None,
            error: None,
        }
    }
}

/// A bound `init`, `exec`, `otherwise` or `always` worker.
pub(crate) trait Work<T> {
    fn run(self, progress: &Progress<T>) -> Result<T, BoxError>;
}

/// A bound `whenError` worker.
pub(crate) trait Recover<T> {
    fn run(self, error: StepError, progress: &Progress<T>) -> Result<T, BoxError>;
}

/// Worker binding table, one optional slot per role.
pub(crate) struct Bindings<X, R, A> {
    pub(crate) init: Option<X>,
    pub(crate) exec: Option<X>,
    pub(crate) otherwise: Option<X>,
    pub(crate) when_error: Option<R>,
    pub(crate) always: Option<A>,
}

impl<X, R, A> Default for Bindings<X, R, A> {
    fn default() -> Self {
        Self {
            init: None,
            exec: None,
            otherwise: None,
            when_error: None,
            always: None,
        }
    }
}

impl<X, R, A> Bindings<X, R, A> {
    pub(crate) fn bound_roles(&self) -> Vec<Role> {
        let slots = [
            (Role::Init, self.init.is_some()),
            (Role::Exec, self.exec.is_some()),
            (Role::Otherwise, self.otherwise.is_some()),
            (Role::WhenError, self.when_error.is_some()),
            (Role::Always, self.always.is_some()),
        ];
        slots
            .into_iter()
            .filter(|(_, bound)| *bound)
            .map(|(role, _)| role)
            .collect()
    }
}

/// Part of a step shared by [`ValueStep`](crate::ValueStep) and
/// [`VoidStep`](crate::VoidStep): identity, one-shot flag, deferred
/// configuration error and the execution protocol.
pub(crate) struct StepCore<'a> {
    manager: &'a StepManager,
    id: StepId,
    ran: bool,
    config_error: Option<StepError>,
}

impl<'a> StepCore<'a> {
    pub(crate) fn new(manager: &'a StepManager, id: StepId) -> Self {
        Self {
            manager,
            id,
            ran: false,
            config_error: None,
        }
    }

    pub(crate) fn id(&self) -> &StepId {
        &self.id
    }

    pub(crate) fn ran(&self) -> bool {
        self.ran
    }

    /// Puts `worker` into `slot`. Misuse is recorded and reported by `check()`;
    /// only the first configuration error is kept.
    pub(crate) fn bind<W>(&mut self, slot: &mut Option<W>, role: Role, worker: W) {
        debug!(step = %self.id, role = %role, "binding worker");

        let error = if self.ran {
            StepError::bound_after_check(role)
        } else if slot.is_some() {
            StepError::already_bound(role)
        } else {
            *slot = Some(worker);
            return;
        };

        if self.config_error.is_none() {
            self.config_error = Some(error);
        }
    }

    /// Runs the step protocol once.
    ///
    /// `init` runs first, then `exec` if the step bit is not yet persisted,
    /// `otherwise` if it is. A failure is handed to `whenError`, and `always`
    /// runs last in every case. The bits are stored only after `exec`
    /// succeeded. The error returned is the latest one raised.
    pub(crate) fn execute<T, X, R, A>(
        &mut self,
        bindings: Bindings<X, R, A>,
        progress: Progress<T>,
    ) -> Result<T, StepError>
    where
        X: Work<T>,
        R: Recover<T>,
        A: Work<T>,
    {
        debug!(step = %self.id, "check - START");

        // a worker bound after a previous run is reported ahead of the rerun
        if let Some(error) = self.config_error.take() {
            self.ran = true;
            return Err(error);
        }

        if self.ran {
            return Err(StepError::checked_twice());
        }
        self.ran = true;

        let Bindings {
            init,
            exec,
            otherwise,
            when_error,
            always,
        } = bindings;
        let exec = exec.ok_or_else(StepError::missing_exec)?;

        let mut progress = progress;
        if let Err(error) = self.decide(init, exec, otherwise, &mut progress) {
            progress.error = Some(error);
        }
        let progress = self.recover(when_error, progress);
        let progress = self.finish(always, progress);

        debug!(step = %self.id, failed = progress.error.is_some(), "check - END");

        match progress.error {
            Some(error) => Err(error),
            None => Ok(progress.value),
        }
    }

    fn decide<T, X: Work<T>>(
        &self,
        init: Option<X>,
        exec: X,
        otherwise: Option<X>,
        progress: &mut Progress<T>,
    ) -> Result<(), StepError> {
        if let Some(init) = init {
            progress.last_role = Some(Role::Init);
            progress.value = self.invoke(Role::Init, init, progress)?;
        }

        let bits = self.manager.load_bits()?;

        if !self.id.is_set_in(bits) {
            progress.last_role = Some(Role::Exec);
            progress.value = self.invoke(Role::Exec, exec, progress)?;
            self.manager.store_bits(bits | self.id.bit)?;
        } else if let Some(otherwise) = otherwise {
            progress.last_role = Some(Role::Otherwise);
            progress.value = self.invoke(Role::Otherwise, otherwise, progress)?;
        } else {
            debug!(step = %self.id, bits, "step already completed, nothing to run");
        }

        Ok(())
    }

    fn recover<T, R: Recover<T>>(&self, worker: Option<R>, mut progress: Progress<T>) -> Progress<T> {
        let Some(worker) = worker else {
            return progress;
        };
        let Some(error) = progress.error.take() else {
            return progress;
        };

        self.log(Role::WhenError, "");
        match worker.run(error, &progress) {
            Ok(value) => {
                self.log(Role::WhenError, step_log::DONE);
                progress.value = value;
            }
            Err(source) => {
                progress.error = Some(StepError::Worker {
                    role: Role::WhenError,
                    source,
                });
            }
        }
        progress
    }

    fn finish<T, A: Work<T>>(&self, worker: Option<A>, mut progress: Progress<T>) -> Progress<T> {
        let Some(worker) = worker else {
            return progress;
        };

        match self.invoke(Role::Always, worker, &progress) {
            Ok(value) => progress.value = value,
            Err(error) => progress.error = Some(error),
        }
        progress
    }

    fn invoke<T, W: Work<T>>(
        &self,
        role: Role,
        worker: W,
        progress: &Progress<T>,
    ) -> Result<T, StepError> {
        self.log(role, "");
        let value = worker
            .run(progress)
            .map_err(|source| StepError::Worker { role, source })?;
        self.log(role, step_log::DONE);
        Ok(value)
    }

    fn log(&self, role: Role, suffix: &str) {
        let comment = self.manager.log_comment();
        step_log::print(
            suffix,
            role,
            comment.as_deref(),
            self.id.description(),
            self.id.bit,
        );
    }
}

impl fmt::Debug for StepCore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCore")
            .field("id", &self.id)
            .field("ran", &self.ran)
            .field("config_error", &self.config_error)
            .finish()
    }
}
