use rill::*;

fn main() {
    env_logger::init();
    let scheduler = Scheduler::historical(NanoTime::ZERO);
    let routine = MachineDescription::new([
        ("sleep", Next::from("wakeup")),
        ("wakeup", Next::from(["coffee", "breakfast"])),
        ("coffee", Next::from("bike")),
        ("breakfast", Next::from("bike")),
        ("bike", Next::Terminal),
    ]);
    let machine = DrivenMachine::new(scheduler.clone(), routine, None).unwrap();
    let _changes = machine.on_change(|change| {
        println!("{} -> {}", change.prior, change.current);
    });
    let _stop = machine.on_stop(|state| {
        println!("routine finished at {state}");
    });

    machine.set_state("wakeup").unwrap();
    println!("from wakeup we could: {:?}", machine.possible());
    machine.set_state("breakfast").unwrap();
    machine.set_state("bike").unwrap();

    // change and stop notifications are deferred tasks; drain them
    scheduler.run_until_idle();
}
