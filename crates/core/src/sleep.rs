use rand::Rng;
use std::time::Duration;

/// `base` with +/-`ratio` random jitter, never below 10ms.
pub fn jittered(base: Duration, ratio: f64) -> Duration {
    let secs = base.as_secs_f64();
    if secs <= 0.0 || ratio <= 0.0 {
        return base;
    }
    let jitter = secs * ratio;
    let actual = secs + rand::thread_rng().gen_range(-jitter..jitter);
    Duration::from_secs_f64(actual.max(0.01))
}
