use std::cell::{Cell, RefCell};
use std::io;
use std::sync::{Arc, Mutex};
use stepflag::prelude::*;

define_steps! {
    enum TestStep {
        First = 0x01,
        Second = 0x02,
        Third = 0x04,
        Fourth = 0x08,
    }
}

fn manager() -> (StepManager, InMemoryPersistence) {
    let bits = InMemoryPersistence::default();
    let manager = StepManager::new(bits.clone());
    (manager, bits)
}

fn worker_source(error: &StepError) -> String {
    match error {
        StepError::Worker { source, .. } => source.to_string(),
        other => panic!("expected a worker error, got {:?}", other),
    }
}

#[test]
fn test_check_twice_is_configuration_error() {
    let (manager, _bits) = manager();
    manager.set_log_comment("TEST COMMENTS");

    let mut step = manager.step(TestStep::First).exec(|| Ok(()));
    step.run().unwrap();
    let error = step.run().unwrap_err();
    assert!(error.is_configuration());
    assert!(error.to_string().contains("'check()' called twice"));

    // also after a failed first run
    let mut step = manager
        .step(TestStep::Second)
        .exec(|| Err("exec".into()));
    assert!(!step.run().unwrap_err().is_configuration());
    assert!(step.run().unwrap_err().is_configuration());
}

#[test]
fn test_binding_after_check_is_configuration_error() {
    let (manager, _bits) = manager();

    let mut step = manager.step(TestStep::First).exec(|| Ok(()));
    step.run().unwrap();

    let mut step = step.otherwise(|| Err("otherwise".into())).always(|| Ok(()));
    let error = step.run().unwrap_err();
    assert!(error.is_configuration());
    assert_eq!(
        error.to_string(),
        "Invalid step configuration: worker 'otherwise()' bound after 'check()' was called"
    );
}

#[test]
fn test_exec_bound_twice() {
    let (manager, bits) = manager();
    let ran = Cell::new(false);

    let error = manager
        .step(TestStep::First)
        .exec(|| {
            ran.set(true);
            Ok(())
        })
        .exec(|| {
            ran.set(true);
            Ok(())
        })
        .otherwise(|| Ok(()))
        .check()
        .unwrap_err();

    assert!(error.is_configuration());
    assert_eq!(
        error.to_string(),
        "Invalid step configuration: worker 'exec()' has already been defined"
    );
    assert!(!ran.get());
    assert_eq!(bits.store_count(), 0);
}

#[test]
fn test_missing_exec() {
    let (manager, bits) = manager();
    let ran = Cell::new(false);

    let error = manager
        .step_with::<String>(TestStep::First)
        .init_with(|| {
            ran.set(true);
            Ok("init".to_string())
        })
        .otherwise(|| {
            ran.set(true);
            Ok("otherwise".to_string())
        })
        .check()
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "Invalid step configuration: worker 'exec()' is not defined"
    );
    assert!(!ran.get());
    assert_eq!(bits.store_count(), 0);
}

#[test]
fn test_unhandled_otherwise_error_propagates_after_always() {
    let bits = InMemoryPersistence::new(0x01);
    let manager = StepManager::new(bits.clone());
    let always_error = RefCell::new(None);

    let error = manager
        .step(TestStep::First)
        .exec(|| Ok(()))
        .otherwise(|| Err("fake exception".into()))
        .always_with_error(|role, error| {
            assert_eq!(role, Some(Role::Otherwise));
            *always_error.borrow_mut() = error.map(ToString::to_string);
            Ok(())
        })
        .check()
        .unwrap_err();

    assert_eq!(error.role(), Some(Role::Otherwise));
    assert_eq!(worker_source(&error), "fake exception");
    assert_eq!(
        always_error.borrow().as_deref(),
        Some("Worker 'otherwise()' failed: fake exception")
    );
    assert_eq!(bits.store_count(), 0);
}

#[test]
fn test_void_steps_with_enum() {
    let (manager, bits) = manager();
    manager.set_log_comment("TEST COMMENTS");

    manager
        .step(TestStep::First)
        .exec(|| Err("exec".into()))
        .otherwise(|| Ok(()))
        .when_error_with_role(|error, role| {
            assert_eq!(role, Some(Role::Exec));
            assert_eq!(worker_source(&error), "exec");
            Ok(())
        })
        .always_with_role(|_role| Ok(()))
        .check()
        .unwrap();
    assert_eq!(bits.bits(), 0);

    manager
        .step(TestStep::First)
        .exec(|| Ok(()))
        .otherwise(|| Err("otherwise".into()))
        .when_error_with_role(|_, _| Err("whenError must not run".into()))
        .check()
        .unwrap();
    assert_eq!(bits.bits(), 0x01);

    manager
        .step(TestStep::First)
        .exec(|| Ok(()))
        .otherwise(|| Err("otherwise".into()))
        .when_error_with_role(|error, role| {
            assert_eq!(role, Some(Role::Otherwise));
            assert_eq!(worker_source(&error), "otherwise");
            Ok(())
        })
        .always_with_role(|_role| Ok(()))
        .check()
        .unwrap();
}

#[test]
fn test_void_steps_with_raw_bits() {
    let (manager, _bits) = manager();
    let first = TestStep::First.bit_flag();

    manager
        .step(first)
        .exec(|| Ok(()))
        .otherwise(|| Err("otherwise".into()))
        .when_error(|error| Err(error.into()))
        .always_with_role(|_role| Ok(()))
        .check()
        .unwrap();

    manager
        .step(first)
        .exec(|| Err("exec".into()))
        .otherwise(|| Ok(()))
        .when_error(|error| Err(error.into()))
        .always_with_error(|_role, error| {
            assert!(error.is_none());
            Ok(())
        })
        .check()
        .unwrap();

    let error = manager
        .step(first)
        .exec(|| Ok(()))
        .otherwise(|| Err("otherwise".into()))
        .when_error(|error| Err(error.into()))
        .check()
        .unwrap_err();
    assert_eq!(error.role(), Some(Role::WhenError));

    manager
        .step(first)
        .exec(|| Ok(()))
        .otherwise(|| Err("otherwise".into()))
        .when_error(|error| {
            assert_eq!(worker_source(&error), "otherwise");
            Ok(())
        })
        .check()
        .unwrap();
}

#[test]
fn test_value_steps_exec_otherwise_always() {
    let (manager, _bits) = manager();

    let result = manager
        .step_with::<String>(TestStep::First)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Ok("otherwise".to_string()))
        .when_error(|error| Err(error.into()))
        .check()
        .unwrap();
    assert_eq!(result, "exec");

    let result = manager
        .step_with::<String>(TestStep::First)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Ok("otherwise".to_string()))
        .when_error(|error| Err(error.into()))
        .check()
        .unwrap();
    assert_eq!(result, "otherwise");

    let result = manager
        .step_with::<String>(TestStep::First)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Ok("otherwise".to_string()))
        .always(|| Ok("always".to_string()))
        .check()
        .unwrap();
    assert_eq!(result, "always");

    let result = manager
        .step_with::<String>(TestStep::Second)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Ok("otherwise".to_string()))
        .always_with_value(|value| {
            assert_eq!(value, "exec");
            Ok("always".to_string())
        })
        .check()
        .unwrap();
    assert_eq!(result, "always");

    let result = manager
        .step_with::<String>(TestStep::Second)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Ok("otherwise".to_string()))
        .always_with_value(|value| {
            assert_eq!(value, "otherwise");
            Ok("always".to_string())
        })
        .check()
        .unwrap();
    assert_eq!(result, "always");
}

#[test]
fn test_value_steps_error_recovery() {
    let (manager, bits) = manager();

    for _ in 0..2 {
        // exec keeps failing, so the bit is never stored and exec runs again
        let result = manager
            .step_with::<String>(TestStep::Third)
            .exec(|| Err("exec".into()))
            .otherwise(|| Err("otherwise".into()))
            .when_error(|error| {
                assert_eq!(worker_source(&error), "exec");
                Ok("error-exec".to_string())
            })
            .check()
            .unwrap();
        assert_eq!(result, "error-exec");
    }
    assert_eq!(bits.bits(), 0);

    let result = manager
        .step_with::<String>(TestStep::Third)
        .exec(|| Ok("exec".to_string()))
        .otherwise(|| Err("otherwise".into()))
        .when_error_with_value(|_, _| Ok("error-exec".to_string()))
        .check()
        .unwrap();
    assert_eq!(result, "exec");
    assert_eq!(bits.bits(), 0x04);

    let result = manager
        .step_with::<String>(TestStep::Third)
        .init("init".to_string())
        .exec(|| Err("exec".into()))
        .otherwise(|| Err("otherwise".into()))
        .when_error_with_value(|error, value| {
            assert_eq!(value, "init");
            assert_eq!(worker_source(&error), "otherwise");
            Ok("error-otherwise".to_string())
        })
        .check()
        .unwrap();
    assert_eq!(result, "error-otherwise");

    let result = manager
        .step_with::<String>(TestStep::Third)
        .init("init".to_string())
        .exec(|| Err("exec".into()))
        .otherwise(|| Err("otherwise".into()))
        .when_error_with_role(|error, value, role| {
            assert_eq!(value, "init");
            assert_eq!(role, Some(Role::Otherwise));
            assert_eq!(worker_source(&error), "otherwise");
            Ok("error-otherwise".to_string())
        })
        .check()
        .unwrap();
    assert_eq!(result, "error-otherwise");
}

#[test]
fn test_value_steps_init_and_always_hooks() {
    let (manager, _bits) = manager();

    let result = manager
        .step_with::<String>(TestStep::Fourth)
        .init_with(|| Ok("init".to_string()))
        .exec_with(|value| {
            assert_eq!(value, "init");
            Ok(value.clone())
        })
        .otherwise_with(|_| Err("otherwise".into()))
        .always_with_role(|value, role| {
            assert_eq!(value, "init");
            assert_eq!(role, Some(Role::Exec));
            Ok(value.clone())
        })
        .check()
        .unwrap();
    assert_eq!(result, "init");

    let result = manager
        .step_with::<String>(TestStep::Fourth)
        .init("init".to_string())
        .exec_with(|_| Err("exec".into()))
        .otherwise_with(|value| {
            assert_eq!(value, "init");
            Ok(value.clone())
        })
        .always_with_error(|value, role, error| {
            assert_eq!(value, "init");
            assert_eq!(role, Some(Role::Otherwise));
            assert!(error.is_none());
            Ok(value.clone())
        })
        .check()
        .unwrap();
    assert_eq!(result, "init");
}

#[test]
fn test_scenario_exec_on_clear_bit() {
    let (manager, bits) = manager();

    let result = manager
        .step_with::<String>(0x01)
        .exec(|| Ok("A".to_string()))
        .check()
        .unwrap();

    assert_eq!(result, "A");
    assert_eq!(bits.bits(), 0x01);
}

#[test]
fn test_scenario_otherwise_on_set_bit() {
    let bits = InMemoryPersistence::new(0x01);
    let manager = StepManager::new(bits.clone());

    let result = manager
        .step_with::<String>(0x01)
        .exec(|| Ok("A".to_string()))
        .otherwise(|| Ok("B".to_string()))
        .check()
        .unwrap();

    assert_eq!(result, "B");
    assert_eq!(bits.bits(), 0x01);
    assert_eq!(bits.store_count(), 0);
}

#[test]
fn test_scenario_unhandled_exec_error_wins_over_always() {
    let (manager, bits) = manager();
    let always_ran = Cell::new(false);

    let error = manager
        .step_with::<String>(0x01)
        .exec(|| Err("boom".into()))
        .always(|| {
            always_ran.set(true);
            Ok("C".to_string())
        })
        .check()
        .unwrap_err();

    assert!(always_ran.get());
    assert_eq!(worker_source(&error), "boom");
    assert_eq!(bits.bits(), 0);
    assert_eq!(bits.store_count(), 0);
}

#[test]
fn test_stored_bits_are_or_of_flag() {
    let masks: [u64; 5] = [0x00, 0x02, 0x0a, 0xf0, u64::MAX ^ 0x01];
    for mask in masks {
        let bits = InMemoryPersistence::new(mask);
        let manager = StepManager::new(bits.clone());
        let exec_ran = Cell::new(false);

        manager
            .step(TestStep::First)
            .exec(|| {
                exec_ran.set(true);
                Ok(())
            })
            .check()
            .unwrap();

        assert!(exec_ran.get());
        assert_eq!(bits.bits(), mask | 0x01);
        assert_eq!(bits.store_count(), 1);
    }
}

#[test]
fn test_replay_never_runs_exec_twice() {
    let (manager, bits) = manager();
    let execs = Cell::new(0);
    let otherwises = Cell::new(0);

    for _ in 0..2 {
        for step in [TestStep::First, TestStep::Second, TestStep::Third] {
            manager
                .step(step)
                .exec(|| {
                    execs.set(execs.get() + 1);
                    Ok(())
                })
                .otherwise(|| {
                    otherwises.set(otherwises.get() + 1);
                    Ok(())
                })
                .check()
                .unwrap();
        }
    }

    assert_eq!(execs.get(), 3);
    assert_eq!(otherwises.get(), 3);
    assert_eq!(bits.bits(), 0x07);
}

#[test]
fn test_persistence_failure_is_routed_to_when_error() {
    struct ReadOnly;

    impl StepPersistence for ReadOnly {
        fn get(&self) -> Result<u64, BoxError> {
            Ok(0)
        }

        fn store(&mut self, _bits: u64) -> Result<(), BoxError> {
            Err("read-only replica".into())
        }
    }

    let manager = StepManager::new(ReadOnly);

    let result = manager
        .step_with::<String>(TestStep::First)
        .exec(|| Ok("exec".to_string()))
        .when_error_with_role(|error, value, role| {
            assert!(matches!(error, StepError::Persistence { .. }));
            assert_eq!(value, "exec");
            assert_eq!(role, Some(Role::Exec));
            Ok("not stored".to_string())
        })
        .check()
        .unwrap();
    assert_eq!(result, "not stored");
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Step lines without the fmt prefix and the structured fields.
    fn step_lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .filter_map(|line| line.find("[SM").map(|at| &line[at..]))
            .map(|line| line.split(" role=").next().unwrap_or(line).to_string())
            .collect()
    }
}

#[test]
fn test_step_lines_logged_around_every_worker() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let (manager, _bits) = manager();

        manager.set_log_comment("c1");
        manager.step(0x01).exec(|| Ok(())).check().unwrap();

        // comment changed after the step was created
        let step = manager
            .step(TestStep::Second)
            .exec(|| Ok(()))
            .always(|| Ok(()));
        manager.set_log_comment("c2");
        step.check().unwrap();

        // a failing worker only logs its first line
        manager.clear_log_comment();
        manager
            .step(0x04)
            .exec(|| Err("exec".into()))
            .when_error(|_| Ok(()))
            .check()
            .unwrap();
    });

    assert_eq!(
        logs.step_lines(),
        vec![
            "[SM - c1] bit -> 1, handler -> exec: executing step...",
            "[SM - c1] bit -> 1, handler -> exec: executing step...DONE",
            "[SM - c2] step -> Second, handler -> exec: executing step...",
            "[SM - c2] step -> Second, handler -> exec: executing step...DONE",
            "[SM - c2] step -> Second, handler -> always: executing step...",
            "[SM - c2] step -> Second, handler -> always: executing step...DONE",
            "[SM] bit -> 4, handler -> exec: executing step...",
            "[SM] bit -> 4, handler -> whenError: executing step...",
            "[SM] bit -> 4, handler -> whenError: executing step...DONE",
        ]
    );
}
