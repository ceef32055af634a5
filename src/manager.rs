use crate::error::{BoxError, StepError};
use crate::step::StepId;
use crate::value_step::ValueStep;
use crate::void_step::VoidStep;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Storage of the completion bits of one business process.
///
/// The engine reads the bits once per `check()` and, after a successful
/// `exec` worker, stores them with the step bit added. Storing the same value
/// twice must be harmless: a crash between the two calls followed by a
/// re-run recomputes the same value.
///
/// Errors are routed like worker errors: to `whenError` if bound, otherwise
/// out of `check()` as [`StepError::Persistence`].
///
/// # Examples
///
/// ```
/// use stepflag::{BoxError, StepPersistence};
///
/// struct Row {
///     steps: u64,
/// }
///
/// impl StepPersistence for Row {
///     fn get(&self) -> Result<u64, BoxError> {
///         Ok(self.steps)
///     }
///
///     fn store(&mut self, bits: u64) -> Result<(), BoxError> {
///         self.steps = bits;
///         Ok(())
///     }
/// }
/// ```
pub trait StepPersistence {
    /// Reads the current bits.
    fn get(&self) -> Result<u64, BoxError>;

    /// Replaces the stored bits.
    fn store(&mut self, bits: u64) -> Result<(), BoxError>;
}

/// In-memory [`StepPersistence`].
///
/// Clones share the same bits, so a caller can keep a handle and inspect the
/// bits after handing a clone to a [`StepManager`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    bits: Rc<Cell<u64>>,
    stores: Rc<Cell<usize>>,
}

impl InMemoryPersistence {
    /// Creates a store holding `bits`.
    pub fn new(bits: u64) -> Self {
        Self {
            bits: Rc::new(Cell::new(bits)),
            stores: Rc::new(Cell::new(0)),
        }
    }

    /// Returns the current bits.
    pub fn bits(&self) -> u64 {
        self.bits.get()
    }

    /// Returns how many times the bits were stored.
    pub fn store_count(&self) -> usize {
        self.stores.get()
    }
}

impl StepPersistence for InMemoryPersistence {
    fn get(&self) -> Result<u64, BoxError> {
        Ok(self.bits.get())
    }

    fn store(&mut self, bits: u64) -> Result<(), BoxError> {
        self.bits.set(bits);
        self.stores.set(self.stores.get() + 1);
        Ok(())
    }
}

/// Creates steps sharing one [`StepPersistence`] and one log comment.
///
/// Steps borrow the manager: the log comment is read each time a step logs,
/// so changing it affects steps already created.
///
/// # Examples
///
/// ```
/// use stepflag::{InMemoryPersistence, StepManager};
///
/// let bits = InMemoryPersistence::default();
/// let manager = StepManager::new(bits.clone());
/// manager.set_log_comment("order 42");
///
/// let reserved = manager
///     .step_with::<String>(0x01)
///     .exec(|| Ok("reserved".to_string()))
///     .otherwise(|| Ok("already reserved".to_string()))
///     .check()?;
///
/// assert_eq!(reserved, "reserved");
/// assert_eq!(bits.bits(), 0x01);
/// # Ok::<(), stepflag::StepError>(())
/// ```
pub struct StepManager {
    persistence: RefCell<Box<dyn StepPersistence>>,
    log_comment: RefCell<Option<String>>,
}

impl fmt::Debug for StepManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepManager")
            .field("log_comment", &self.log_comment.borrow())
            .finish_non_exhaustive()
    }
}

impl StepManager {
    /// Creates a manager storing step bits through `persistence`.
    pub fn new(persistence: impl StepPersistence + 'static) -> Self {
        Self {
            persistence: RefCell::new(Box::new(persistence)),
            log_comment: RefCell::new(None),
        }
    }

    /// Sets the comment prefixed to every step log line.
    pub fn set_log_comment(&self, comment: impl Into<String>) {
        *self.log_comment.borrow_mut() = Some(comment.into());
    }

    /// Removes the log comment.
    pub fn clear_log_comment(&self) {
        *self.log_comment.borrow_mut() = None;
    }

    /// Returns the current log comment.
    pub fn log_comment(&self) -> Option<String> {
        self.log_comment.borrow().clone()
    }

    /// Read access to the persistence handler.
    pub fn persistence(&self) -> Ref<'_, dyn StepPersistence> {
        Ref::map(self.persistence.borrow(), |p| &**p)
    }

    /// Creates a step producing no value.
    pub fn step(&self, id: impl Into<StepId>) -> VoidStep<'_> {
        VoidStep::new(self, self.checked_id(id.into()))
    }

    /// Creates a step carrying a value of type `T` through its workers.
    ///
    /// The carried value starts as `T::default()` unless seeded with
    /// [`ValueStep::init`] or produced by [`ValueStep::init_with`].
    pub fn step_with<T: Default>(&self, id: impl Into<StepId>) -> ValueStep<'_, T> {
        ValueStep::new(self, self.checked_id(id.into()))
    }

    fn checked_id(&self, id: StepId) -> StepId {
        if id.bit() == 0 {
            warn!(step = %id, "step bit is zero, exec will run on every check");
        }
        id
    }

    pub(crate) fn load_bits(&self) -> Result<u64, StepError> {
        let persistence = self
            .persistence
            .try_borrow()
            .map_err(|e| StepError::Persistence { source: Box::new(e) })?;
        persistence
            .get()
            .map_err(|source| StepError::Persistence { source })
    }

    pub(crate) fn store_bits(&self, bits: u64) -> Result<(), StepError> {
        let mut persistence = self
            .persistence
            .try_borrow_mut()
            .map_err(|e| StepError::Persistence { source: Box::new(e) })?;
        persistence
            .store(bits)
            .map_err(|source| StepError::Persistence { source })
    }
}
