use crate::error::{BoxError, Role, StepError};
use crate::manager::StepManager;
use crate::step::{Bindings, Progress, Recover, StepCore, StepId, Work};
use std::fmt;

type Produce<'a, T> = Box<dyn FnOnce() -> Result<T, BoxError> + 'a>;
type Transform<'a, T> = Box<dyn FnOnce(&T) -> Result<T, BoxError> + 'a>;

/// Shapes accepted by `init`, `exec` and `otherwise`.
pub(crate) enum ValueWorker<'a, T> {
    Produce(Produce<'a, T>),
    Transform(Transform<'a, T>),
}

impl<T> Work<T> for ValueWorker<'_, T> {
    fn run(self, progress: &Progress<T>) -> Result<T, BoxError> {
        match self {
            ValueWorker::Produce(worker) => worker(),
            ValueWorker::Transform(worker) => worker(&progress.value),
        }
    }
}

/// Shapes accepted by `always`.
pub(crate) enum AlwaysWorker<'a, T> {
    Plain(Produce<'a, T>),
    Value(Transform<'a, T>),
    ValueRole(Box<dyn FnOnce(&T, Option<Role>) -> Result<T, BoxError> + 'a>),
    ValueRoleError(
        Box<dyn FnOnce(&T, Option<Role>, Option<&StepError>) -> Result<T, BoxError> + 'a>,
    ),
}

impl<T> Work<T> for AlwaysWorker<'_, T> {
    fn run(self, progress: &Progress<T>) -> Result<T, BoxError> {
        match self {
            AlwaysWorker::Plain(worker) => worker(),
            AlwaysWorker::Value(worker) => worker(&progress.value),
            AlwaysWorker::ValueRole(worker) => worker(&progress.value, progress.last_role),
            AlwaysWorker::ValueRoleError(worker) => worker(
                &progress.value,
                progress.last_role,
                progress.error.as_ref(),
            ),
        }
    }
}

/// Shapes accepted by `whenError`.
pub(crate) enum ErrorWorker<'a, T> {
    Error(Box<dyn FnOnce(StepError) -> Result<T, BoxError> + 'a>),
    ErrorValue(Box<dyn FnOnce(StepError, &T) -> Result<T, BoxError> + 'a>),
    ErrorValueRole(Box<dyn FnOnce(StepError, &T, Option<Role>) -> Result<T, BoxError> + 'a>),
}

impl<T> Recover<T> for ErrorWorker<'_, T> {
    fn run(self, error: StepError, progress: &Progress<T>) -> Result<T, BoxError> {
        match self {
            ErrorWorker::Error(worker) => worker(error),
            ErrorWorker::ErrorValue(worker) => worker(error, &progress.value),
            ErrorWorker::ErrorValueRole(worker) => {
                worker(error, &progress.value, progress.last_role)
            }
        }
    }
}

/// A step carrying a value of type `T` from worker to worker.
///
/// Created by [`StepManager::step_with`]. Every worker returns the new
/// carried value; [`check`](ValueStep::check) returns the value left after
/// the last worker ran.
///
/// Binding a role twice, or binding after `check()`, is reported by
/// `check()` as [`StepError::Configuration`] before any worker runs.
///
/// # Examples
///
/// ```
/// use stepflag::{InMemoryPersistence, Role, StepManager};
///
/// let bits = InMemoryPersistence::default();
/// let manager = StepManager::new(bits.clone());
///
/// let total = manager
///     .step_with::<u32>(0x02)
///     .init(40)
///     .exec_with(|value| Ok(value + 2))
///     .otherwise_with(|value| Ok(*value))
///     .always_with_role(|value, role| {
///         assert_eq!(role, Some(Role::Exec));
///         Ok(*value)
///     })
///     .check()?;
///
/// assert_eq!(total, 42);
/// # Ok::<(), stepflag::StepError>(())
/// ```
pub struct ValueStep<'a, T> {
    core: StepCore<'a>,
    seed: T,
    bindings: Bindings<ValueWorker<'a, T>, ErrorWorker<'a, T>, AlwaysWorker<'a, T>>,
}

impl<T: fmt::Debug> fmt::Debug for ValueStep<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStep")
            .field("id", self.core.id())
            .field("seed", &self.seed)
            .field("workers", &self.bindings.bound_roles())
            .field("ran", &self.core.ran())
            .finish()
    }
}

impl<'a, T: Default> ValueStep<'a, T> {
    pub(crate) fn new(manager: &'a StepManager, id: StepId) -> Self {
        Self {
            core: StepCore::new(manager, id),
            seed: T::default(),
            bindings: Bindings::default(),
        }
    }

    /// Seeds the carried value.
    ///
    /// An `init` worker bound with [`init_with`](ValueStep::init_with)
    /// replaces it when the step runs.
    pub fn init(mut self, value: T) -> Self {
        self.seed = value;
        self
    }

    /// Binds the `init` worker, producing the carried value before the
    /// completion bit is tested.
    pub fn init_with<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<T, BoxError> + 'a,
    {
        let worker = ValueWorker::Produce(Box::new(worker));
        self.core.bind(&mut self.bindings.init, Role::Init, worker);
        self
    }

    /// Binds the `exec` worker, producing a new value.
    pub fn exec<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<T, BoxError> + 'a,
    {
        let worker = ValueWorker::Produce(Box::new(worker));
        self.core.bind(&mut self.bindings.exec, Role::Exec, worker);
        self
    }

    /// Binds the `exec` worker, deriving the new value from the carried one.
    pub fn exec_with<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(&T) -> Result<T, BoxError> + 'a,
    {
        let worker = ValueWorker::Transform(Box::new(worker));
        self.core.bind(&mut self.bindings.exec, Role::Exec, worker);
        self
    }

    /// Binds the `otherwise` worker, producing a new value.
    pub fn otherwise<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<T, BoxError> + 'a,
    {
        let worker = ValueWorker::Produce(Box::new(worker));
        self.core.bind(&mut self.bindings.otherwise, Role::Otherwise, worker);
        self
    }

    /// Binds the `otherwise` worker, deriving the new value from the carried one.
    pub fn otherwise_with<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(&T) -> Result<T, BoxError> + 'a,
    {
        let worker = ValueWorker::Transform(Box::new(worker));
        self.core.bind(&mut self.bindings.otherwise, Role::Otherwise, worker);
        self
    }

    /// Binds the `always` worker.
    pub fn always<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<T, BoxError> + 'a,
    {
        let worker = AlwaysWorker::Plain(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `always` worker, receiving the carried value.
    pub fn always_with_value<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(&T) -> Result<T, BoxError> + 'a,
    {
        let worker = AlwaysWorker::Value(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `always` worker, receiving the carried value and the role
    /// of the last `init`/`exec`/`otherwise` worker that ran.
    pub fn always_with_role<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(&T, Option<Role>) -> Result<T, BoxError> + 'a,
    {
        let worker = AlwaysWorker::ValueRole(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `always` worker, receiving the carried value, the last role
    /// and the error still pending, if any.
    pub fn always_with_error<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(&T, Option<Role>, Option<&StepError>) -> Result<T, BoxError> + 'a,
    {
        let worker = AlwaysWorker::ValueRoleError(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `whenError` worker. Returning `Ok` marks the error handled.
    pub fn when_error<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(StepError) -> Result<T, BoxError> + 'a,
    {
        let worker = ErrorWorker::Error(Box::new(worker));
        self.core.bind(&mut self.bindings.when_error, Role::WhenError, worker);
        self
    }

    /// Binds the `whenError` worker, also receiving the carried value.
    pub fn when_error_with_value<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(StepError, &T) -> Result<T, BoxError> + 'a,
    {
        let worker = ErrorWorker::ErrorValue(Box::new(worker));
        self.core.bind(&mut self.bindings.when_error, Role::WhenError, worker);
        self
    }

    /// Binds the `whenError` worker, also receiving the carried value and the
    /// role of the worker that ran last.
    pub fn when_error_with_role<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(StepError, &T, Option<Role>) -> Result<T, BoxError> + 'a,
    {
        let worker = ErrorWorker::ErrorValueRole(Box::new(worker));
        self.core.bind(&mut self.bindings.when_error, Role::WhenError, worker);
        self
    }

    /// Runs the step and returns the final carried value.
    pub fn check(mut self) -> Result<T, StepError> {
        self.run()
    }

    /// Runs the step without consuming it.
    ///
    /// Only the first call runs workers; later calls return
    /// [`StepError::Configuration`].
    pub fn run(&mut self) -> Result<T, StepError> {
        let bindings = std::mem::take(&mut self.bindings);
        let progress = Progress::new(std::mem::take(&mut self.seed));
        self.core.execute(bindings, progress)
    }
}
