use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Sleep for `secs` seconds. Non-positive or non-finite values return at once.
pub fn sleep_secs(secs: f64) {
    if let Ok(d) = Duration::try_from_secs_f64(secs) {
        thread::sleep(d);
    }
}

pub fn sleep_until(until: Instant) {
    let now = Instant::now();
    if until > now {
        thread::sleep(until - now);
    }
}

/// Time between polls for a (validated, positive) scan rate.
pub fn scan_interval(rate: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / rate).unwrap_or(Duration::from_secs(1))
}

/// Wall-clock deadline `secs` after `start`; `None` means no deadline.
pub fn deadline(start: Instant, secs: Option<f64>) -> Option<Instant> {
    let secs = secs?;
    Duration::try_from_secs_f64(secs)
        .ok()
        .and_then(|d| start.checked_add(d))
}

/// Park the current thread until `until`, returning early once `stop` is set.
/// Whoever sets `stop` should unpark this thread.
pub fn park_until(until: Instant, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= until {
            return;
        }
        thread::park_timeout(until - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_scan_interval() {
        assert_eq!(scan_interval(4.0), Duration::from_millis(250));
    }

    #[test]
    fn test_deadline() {
        let now = Instant::now();
        assert_eq!(deadline(now, None), None);
        assert_eq!(deadline(now, Some(1.0)), Some(now + Duration::from_secs(1)));
        assert_eq!(deadline(now, Some(f64::INFINITY)), None);
    }

    #[test]
    fn test_park_until_wakes_on_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let parked = thread::current();
        let setter = Arc::clone(&stop);
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            setter.store(true, Ordering::SeqCst);
            parked.unpark();
        });
        let start = Instant::now();
        park_until(start + Duration::from_secs(10), &stop);
        assert!(start.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }
}
