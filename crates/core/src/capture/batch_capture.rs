use std::thread;
use std::time::Duration;

use crate::capture::domain::capture_record::{CaptureBatch, CaptureRecord};

/// Calls `capture` `count` times, sleeping `delay` between calls (not after
/// the last). `None` results are skipped, so the batch may be shorter than
/// `count`.
pub fn capture_multiple<F>(count: usize, delay: Duration, mut capture: F) -> CaptureBatch
where
    F: FnMut() -> Option<CaptureRecord>,
{
    let mut batch = CaptureBatch::default();
    for i in 0..count {
        match capture() {
            Some(record) => batch.push(record),
            None => log::debug!("Capture {}/{count} produced nothing", i + 1),
        }
        if i + 1 < count {
            thread::sleep(delay);
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::domain::bounding_box::PositionData;
    use std::time::Instant;

    fn record(n: usize) -> CaptureRecord {
        CaptureRecord {
            image_b64: format!("data:image/jpeg;base64,{n}"),
            position: PositionData::centered_default(),
        }
    }

    #[test]
    fn test_all_succeed_with_delays_between() {
        let mut n = 0;
        let start = Instant::now();
        let batch = capture_multiple(5, Duration::from_millis(200), || {
            n += 1;
            Some(record(n))
        });
        let elapsed = start.elapsed();

        assert_eq!(batch.frames.len(), 5);
        assert_eq!(batch.positions.len(), 5);
        assert!(elapsed >= Duration::from_millis(800), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_every_third_failure_gives_partial_batch() {
        let mut n = 0;
        let batch = capture_multiple(5, Duration::ZERO, || {
            n += 1;
            (n % 3 != 0).then(|| record(n))
        });
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.frames[2], "data:image/jpeg;base64,4");
    }

    #[test]
    fn test_all_fail_gives_empty_batch() {
        let batch = capture_multiple(3, Duration::ZERO, || None);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_zero_count_never_calls() {
        let mut calls = 0;
        let batch = capture_multiple(0, Duration::from_secs(10), || {
            calls += 1;
            None
        });
        assert!(batch.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_single_capture_does_not_sleep() {
        let start = Instant::now();
        let batch = capture_multiple(1, Duration::from_secs(5), || Some(record(1)));
        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
