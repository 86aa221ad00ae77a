use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::capture::domain::camera::MediaStream;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::pipeline::session_event::SessionEvent;

/// Background thread that pulls the newest frame from the stream, runs the
/// detector on it and posts the result to the session worker.
///
/// A frame is only processed once; the feeder idles until the stream
/// produces a newer one.
pub struct FrameFeeder {
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameFeeder {
    pub fn spawn(
        stream: Arc<dyn MediaStream>,
        mut detector: Box<dyn LandmarkDetector>,
        events: Sender<SessionEvent>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let stopped = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stopped);

        let handle = thread::Builder::new()
            .name("frame-feeder".into())
            .spawn(move || {
                let mut last_sequence = None;
                while !stop_flag.load(Ordering::Relaxed) {
                    let tick_start = Instant::now();
                    if let Some(frame) = stream.latest_frame() {
                        if last_sequence != Some(frame.sequence()) {
                            last_sequence = Some(frame.sequence());
                            let t0 = Instant::now();
                            match detector.process(&frame) {
                                Ok(result) => {
                                    let detect_ms = t0.elapsed().as_secs_f64() * 1000.0;
                                    let event = SessionEvent::Detection { result, detect_ms };
                                    if events.send(event).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => log::warn!("Detector failed on frame {}: {e}", frame.sequence()),
                            }
                        }
                    }
                    if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                log::debug!("Frame feeder stopped");
            })?;

        Ok(Self {
            stopped,
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it to finish its current tick.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Frame feeder thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FrameFeeder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::landmark_detector::DetectionResult;
    use crate::geometry::domain::point::NormalizedPoint;
    use crate::shared::error::SendError;
    use crate::shared::frame::Frame;
    use crate::shared::size::Size;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    struct StepStream {
        sequence: AtomicU64,
        advance: bool,
    }

    impl MediaStream for StepStream {
        fn native_size(&self) -> Option<Size> {
            Some(Size::new(4, 4))
        }
        fn latest_frame(&self) -> Option<Frame> {
            let seq = if self.advance {
                self.sequence.fetch_add(1, Ordering::SeqCst)
            } else {
                self.sequence.load(Ordering::SeqCst)
            };
            Some(Frame::new(vec![0; 4 * 4 * 3], 4, 4, seq))
        }
        fn stop(&self) {}
        fn is_active(&self) -> bool {
            true
        }
    }

    struct ScriptedDetector {
        calls: Arc<Mutex<usize>>,
        fail_every: usize,
    }

    impl LandmarkDetector for ScriptedDetector {
        fn process(&mut self, _frame: &Frame) -> Result<DetectionResult, SendError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_every > 0 && *calls % self.fail_every == 0 {
                return Err("scripted failure".into());
            }
            Ok(DetectionResult {
                faces: vec![vec![NormalizedPoint::new(0.5, 0.5)]],
                topology: None,
            })
        }
    }

    fn stream(advance: bool) -> Arc<dyn MediaStream> {
        Arc::new(StepStream {
            sequence: AtomicU64::new(0),
            advance,
        })
    }

    #[test]
    fn test_posts_results_until_stopped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let calls = Arc::new(Mutex::new(0));
        let detector = ScriptedDetector {
            calls: calls.clone(),
            fail_every: 0,
        };
        let mut feeder =
            FrameFeeder::spawn(stream(true), Box::new(detector), tx, Duration::from_millis(1))
                .unwrap();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, SessionEvent::Detection { .. }));

        feeder.stop();
        assert!(!feeder.is_running());
        let after_stop = *calls.lock().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*calls.lock().unwrap(), after_stop);
    }

    #[test]
    fn test_same_frame_is_processed_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let calls = Arc::new(Mutex::new(0));
        let detector = ScriptedDetector {
            calls: calls.clone(),
            fail_every: 0,
        };
        let mut feeder =
            FrameFeeder::spawn(stream(false), Box::new(detector), tx, Duration::from_millis(1))
                .unwrap();
        thread::sleep(Duration::from_millis(50));
        feeder.stop();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_detector_errors_do_not_stop_feeding() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let detector = ScriptedDetector {
            calls: Arc::new(Mutex::new(0)),
            fail_every: 2,
        };
        let mut feeder =
            FrameFeeder::spawn(stream(true), Box::new(detector), tx, Duration::from_millis(1))
                .unwrap();
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        feeder.stop();
    }

    #[test]
    fn test_exits_when_receiver_is_gone() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let detector = ScriptedDetector {
            calls: Arc::new(Mutex::new(0)),
            fail_every: 0,
        };
        let feeder =
            FrameFeeder::spawn(stream(true), Box::new(detector), tx, Duration::from_millis(1))
                .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while feeder.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!feeder.is_running());
    }
}
