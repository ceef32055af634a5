use std::cell::Cell;
use stepflag::prelude::*;

define_steps! {
    enum OrderStep {
        Reserve = 0x01,
        Charge = 0x02,
        Notify = 0x04,
    }
}

/// Runs every step of one order. Completed steps are skipped on a re-run.
fn process_order(
    manager: &StepManager,
    order_id: u32,
    mail_up: bool,
    charges: &Cell<u32>,
) -> Result<String, StepError> {
    manager.set_log_comment(format!("order {}", order_id));

    manager
        .step(OrderStep::Reserve)
        .exec(|| {
            println!("Reserving stock...");
            Ok(())
        })
        .check()?;

    let receipt = manager
        .step_with::<String>(OrderStep::Charge)
        .exec(|| {
            charges.set(charges.get() + 1);
            Ok(format!("RCPT-{}", order_id))
        })
        .otherwise(|| Ok(format!("RCPT-{} (already charged)", order_id)))
        .check()?;

    manager
        .step(OrderStep::Notify)
        .exec(|| {
            if mail_up {
                println!("Mail sent");
                Ok(())
            } else {
                Err("mail server unavailable".into())
            }
        })
        .when_error(|error| {
            println!("Notification postponed: {}", error);
            Ok(())
        })
        .always_with_role(|role| {
            println!("Notify finished after {:?}", role);
            Ok(())
        })
        .check()?;

    Ok(receipt)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bits = InMemoryPersistence::default();
    let manager = StepManager::new(bits.clone());
    let charges = Cell::new(0);

    let receipt = process_order(&manager, 42, false, &charges)?;
    println!("First run: {} (bits = {:#05b})", receipt, bits.bits());

    let receipt = process_order(&manager, 42, true, &charges)?;
    println!("Second run: {} (bits = {:#05b})", receipt, bits.bits());

    println!("Customer charged {} time(s)", charges.get());

    Ok(())
}
