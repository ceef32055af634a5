use crate::error::{BoxError, Role, StepError};
use crate::manager::StepManager;
use crate::step::{Bindings, Progress, Recover, StepCore, StepId, Work};
use std::fmt;

type Task<'a> = Box<dyn FnOnce() -> Result<(), BoxError> + 'a>;

/// The single shape accepted by `exec` and `otherwise`.
pub(crate) struct VoidWorker<'a>(Task<'a>);

impl Work<()> for VoidWorker<'_> {
    fn run(self, _progress: &Progress<()>) -> Result<(), BoxError> {
        (self.0)()
    }
}

pub(crate) enum VoidAlwaysWorker<'a> {
    Plain(Task<'a>),
    Role(Box<dyn FnOnce(Option<Role>) -> Result<(), BoxError> + 'a>),
    RoleError(Box<dyn FnOnce(Option<Role>, Option<&StepError>) -> Result<(), BoxError> + 'a>),
}

impl Work<()> for VoidAlwaysWorker<'_> {
    fn run(self, progress: &Progress<()>) -> Result<(), BoxError> {
        match self {
            VoidAlwaysWorker::Plain(worker) => worker(),
            VoidAlwaysWorker::Role(worker) => worker(progress.last_role),
            VoidAlwaysWorker::RoleError(worker) => {
                worker(progress.last_role, progress.error.as_ref())
            }
        }
    }
}

pub(crate) enum VoidErrorWorker<'a> {
    Error(Box<dyn FnOnce(StepError) -> Result<(), BoxError> + 'a>),
    ErrorRole(Box<dyn FnOnce(StepError, Option<Role>) -> Result<(), BoxError> + 'a>),
}

impl Recover<()> for VoidErrorWorker<'_> {
    fn run(self, error: StepError, progress: &Progress<()>) -> Result<(), BoxError> {
        match self {
            VoidErrorWorker::Error(worker) => worker(error),
            VoidErrorWorker::ErrorRole(worker) => worker(error, progress.last_role),
        }
    }
}

/// A step producing no value.
///
/// Created by [`StepManager::step`].
///
/// # Examples
///
/// ```
/// use stepflag::{define_steps, InMemoryPersistence, Role, StepManager};
///
/// define_steps! {
///     enum Steps {
///         Notify = 0x01,
///     }
/// }
///
/// let bits = InMemoryPersistence::default();
/// let manager = StepManager::new(bits.clone());
///
/// manager
///     .step(Steps::Notify)
///     .exec(|| Err("mail server down".into()))
///     .when_error_with_role(|error, role| {
///         assert_eq!(role, Some(Role::Exec));
///         eprintln!("notification postponed: {}", error);
///         Ok(())
///     })
///     .check()?;
///
/// // exec failed, so the bit stays clear and the next run retries it
/// assert_eq!(bits.bits(), 0);
/// # Ok::<(), stepflag::StepError>(())
/// ```
pub struct VoidStep<'a> {
    core: StepCore<'a>,
    bindings: Bindings<VoidWorker<'a>, VoidErrorWorker<'a>, VoidAlwaysWorker<'a>>,
}

impl fmt::Debug for VoidStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoidStep")
            .field("id", self.core.id())
            .field("workers", &self.bindings.bound_roles())
            .field("ran", &self.core.ran())
            .finish()
    }
}

impl<'a> VoidStep<'a> {
    pub(crate) fn new(manager: &'a StepManager, id: StepId) -> Self {
        Self {
            core: StepCore::new(manager, id),
            bindings: Bindings::default(),
        }
    }

    /// Binds the `exec` worker.
    pub fn exec<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + 'a,
    {
        let worker = VoidWorker(Box::new(worker));
        self.core.bind(&mut self.bindings.exec, Role::Exec, worker);
        self
    }

    /// Binds the `otherwise` worker.
    pub fn otherwise<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + 'a,
    {
        let worker = VoidWorker(Box::new(worker));
        self.core.bind(&mut self.bindings.otherwise, Role::Otherwise, worker);
        self
    }

    /// Binds the `always` worker.
    pub fn always<F>(mut self, worker: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + 'a,
    {
        let worker = VoidAlwaysWorker::Plain(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `always` worker, receiving the role of the last
    /// `exec`/`otherwise` worker that ran.
    pub fn always_with_role<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(Option<Role>) -> Result<(), BoxError> + 'a,
    {
        let worker = VoidAlwaysWorker::Role(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `always` worker, receiving the last role and the error
    /// still pending, if any.
    pub fn always_with_error<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(Option<Role>, Option<&StepError>) -> Result<(), BoxError> + 'a,
    {
        let worker = VoidAlwaysWorker::RoleError(Box::new(worker));
        self.core.bind(&mut self.bindings.always, Role::Always, worker);
        self
    }

    /// Binds the `whenError` worker. Returning `Ok` marks the error handled.
    pub fn when_error<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(StepError) -> Result<(), BoxError> + 'a,
    {
        let worker = VoidErrorWorker::Error(Box::new(worker));
        self.core.bind(&mut self.bindings.when_error, Role::WhenError, worker);
        self
    }

    /// Binds the `whenError` worker, also receiving the role of the worker
    /// that ran last.
    pub fn when_error_with_role<F>(mut self, worker: F) -> Self
    where
        F: FnOnce(StepError, Option<Role>) -> Result<(), BoxError> + 'a,
    {
        let worker = VoidErrorWorker::ErrorRole(Box::new(worker));
        self.core.bind(&mut self.bindings.when_error, Role::WhenError, worker);
        self
    }

    /// Runs the step.
    pub fn check(mut self) -> Result<(), StepError> {
        self.run()
    }

    /// Runs the step without consuming it.
    ///
    /// Only the first call runs workers; later calls return
    /// [`StepError::Configuration`].
    pub fn run(&mut self) -> Result<(), StepError> {
        let bindings = std::mem::take(&mut self.bindings);
        self.core.execute(bindings, Progress::new(()))
    }
}
