use rill::*;

use std::time::Duration;

fn main() {
    env_logger::init();
    let scheduler = Scheduler::historical(NanoTime::ZERO);

    // A thermometer polled every 100ms, as a stream of readings.
    let readings = pull(
        &scheduler,
        || [18.5, 21.0, 23.5, 19.0, 26.0, 24.5, 20.5].into_iter(),
        PullOptions {
            lazy: Lazy::Never,
            read_interval: Duration::from_millis(100),
            ..PullOptions::default()
        },
    );

    // Route readings: first matching case wins.
    let outputs = switcher(
        &readings,
        vec![
            ("hot", Box::new(|t: &f64| *t > 23.0) as Predicate<f64>),
            ("fine", Box::new(|_: &f64| true) as Predicate<f64>),
        ],
        Match::First,
    );

    // At most one alert per 250ms, however fast the readings arrive.
    let alerts = outputs["hot"]
        .throttle(&scheduler, Duration::from_millis(250))
        .transform(|t| format!("too warm: {t:.1}C"));

    let _alerts = alerts.on_value(Box::new(|line| println!("{line}")));
    let _fine = outputs["fine"].on_value(Box::new(|t| println!("ok: {t:.1}C")));

    // Historical mode drains the whole tape instantly; the pull source
    // disposes itself once the iterator is exhausted.
    scheduler.run_until_idle();
}
