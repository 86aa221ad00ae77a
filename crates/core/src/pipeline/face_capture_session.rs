//! Session lifecycle: acquires camera and detector on a worker thread, runs
//! the event loop that owns all pipeline state, and releases everything on
//! stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;

use crate::capture::batch_capture::capture_multiple;
use crate::capture::domain::camera::{Camera, MediaStream};
use crate::capture::domain::capture_record::{CaptureBatch, CaptureRecord};
use crate::capture::domain::frame_encoder::FrameEncoder;
use crate::capture::infrastructure::jpeg_data_url_encoder::JpegDataUrlEncoder;
use crate::detection::domain::landmark_detector::DetectorFactory;
use crate::detection::domain::result_handler::DetectionResultHandler;
use crate::display::domain::display_host::{DisplayHost, ListenerKind};
use crate::display::domain::listener_guard::ListenerGuard;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::infrastructure::mesh_overlay_renderer::MeshOverlayRenderer;
use crate::pipeline::capture_context::{CaptureContext, ContextParts};
use crate::pipeline::frame_feeder::FrameFeeder;
use crate::pipeline::media_surfaces::MediaSurfaces;
use crate::pipeline::session_error::SessionError;
use crate::pipeline::session_event::SessionEvent;
use crate::pipeline::session_logger::{NullSessionLogger, SessionLogger};
use crate::shared::asset_resolver::AssetRegistry;
use crate::shared::config::CaptureConfig;
use crate::shared::size::Size;
use crate::status::domain::pipeline_status::{PipelineStatus, StatusBoard, LABEL_STARTING};

const METADATA_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type RendererFactory = Arc<dyn Fn() -> Box<dyn OverlayRenderer> + Send + Sync>;

/// Caller-visible snapshot of the session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub ready: bool,
    pub error: Option<String>,
    pub face_ready: bool,
    pub status: PipelineStatus,
    pub status_label: &'static str,
}

impl SessionView {
    fn initial() -> Self {
        Self {
            ready: false,
            error: None,
            face_ready: false,
            status: PipelineStatus::Initializing,
            status_label: LABEL_STARTING,
        }
    }

    fn live(board: &StatusBoard) -> Self {
        Self {
            ready: true,
            error: None,
            face_ready: board.face_ready(),
            status: board.displayed(),
            status_label: board.label(),
        }
    }
}

/// External collaborators of a session. Cheap to clone.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub camera: Arc<dyn Camera>,
    pub detector_factory: Arc<dyn DetectorFactory>,
    pub display: Arc<dyn DisplayHost>,
    pub assets: Arc<AssetRegistry>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub renderer_factory: RendererFactory,
    pub logger: Arc<Mutex<dyn SessionLogger>>,
}

impl SessionCollaborators {
    /// JPEG data URL encoder, white mesh renderer, silent logger.
    pub fn new(
        camera: Arc<dyn Camera>,
        detector_factory: Arc<dyn DetectorFactory>,
        display: Arc<dyn DisplayHost>,
        assets: Arc<AssetRegistry>,
    ) -> Self {
        Self {
            camera,
            detector_factory,
            display,
            assets,
            encoder: Arc::new(JpegDataUrlEncoder::default()),
            renderer_factory: Arc::new(|| {
                Box::new(MeshOverlayRenderer::new()) as Box<dyn OverlayRenderer>
            }),
            logger: Arc::new(Mutex::new(NullSessionLogger)),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_renderer(mut self, factory: RendererFactory) -> Self {
        self.renderer_factory = factory;
        self
    }

    pub fn with_logger(mut self, logger: Arc<Mutex<dyn SessionLogger>>) -> Self {
        self.logger = logger;
        self
    }
}

struct RunHandle {
    cancelled: Arc<AtomicBool>,
    events: Sender<SessionEvent>,
    worker: JoinHandle<()>,
}

/// Live face-capture session.
///
/// `start` returns immediately; acquisition and every pipeline mutation run
/// on one worker thread. Readiness, errors and status are read from a
/// published [`SessionView`]. Captures are served by the worker against the
/// newest frame and face box.
pub struct FaceCaptureSession {
    config: CaptureConfig,
    parts: SessionCollaborators,
    view: Arc<Mutex<SessionView>>,
    run: Mutex<Option<RunHandle>>,
}

impl FaceCaptureSession {
    pub fn new(config: CaptureConfig, parts: SessionCollaborators) -> Self {
        Self {
            config,
            parts,
            view: Arc::new(Mutex::new(SessionView::initial())),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Starts acquisition. No-op while a run is active, including a run that
    /// failed and has not been stopped yet.
    pub fn start(&self) {
        let mut run = lock(&self.run);
        if run.is_some() {
            log::debug!("Session already started");
            return;
        }
        *lock(&self.view) = SessionView::initial();

        let (tx, rx) = crossbeam_channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = SessionWorker {
            config: self.config.clone(),
            parts: self.parts.clone(),
            view: Arc::clone(&self.view),
            cancelled: Arc::clone(&cancelled),
            events_tx: tx.clone(),
            events: rx,
        };

        match thread::Builder::new()
            .name("face-capture-session".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                *run = Some(RunHandle {
                    cancelled,
                    events: tx,
                    worker: handle,
                });
            }
            Err(e) => {
                let err = SessionError::Thread("session", e);
                log::error!("{err}");
                lock(&self.view).error = Some(err.to_string());
            }
        }
    }

    /// Requests teardown and returns without waiting for it. Safe to call
    /// while acquisition is in flight: the worker releases whatever it
    /// acquires afterwards.
    pub fn stop(&self) {
        if let Some(run) = self.begin_stop() {
            // Detached; the worker finishes teardown on its own.
            drop(run.worker);
        }
    }

    /// Like [`stop`](Self::stop), but waits until the camera, feeder and
    /// listeners are released.
    pub fn stop_and_join(&self) {
        if let Some(run) = self.begin_stop() {
            if run.worker.join().is_err() {
                log::error!("Session worker panicked");
            }
        }
    }

    fn begin_stop(&self) -> Option<RunHandle> {
        let run = lock(&self.run).take()?;
        {
            // Under the view lock so a concurrent publish cannot land after the reset.
            let mut view = lock(&self.view);
            run.cancelled.store(true, Ordering::SeqCst);
            *view = SessionView::initial();
        }
        let _ = run.events.send(SessionEvent::Shutdown);
        log::info!("Session stop requested");
        Some(run)
    }

    pub fn is_started(&self) -> bool {
        lock(&self.run).is_some()
    }

    pub fn view(&self) -> SessionView {
        lock(&self.view).clone()
    }

    pub fn ready(&self) -> bool {
        lock(&self.view).ready
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.view).error.clone()
    }

    pub fn face_ready(&self) -> bool {
        lock(&self.view).face_ready
    }

    /// Human-readable status label.
    pub fn status(&self) -> &'static str {
        lock(&self.view).status_label
    }

    pub fn status_kind(&self) -> PipelineStatus {
        lock(&self.view).status
    }

    /// One still with its face position, or `None` if the session is not
    /// live.
    pub fn capture(&self) -> Option<CaptureRecord> {
        self.request(SessionEvent::Capture).flatten()
    }

    /// `count` captures spaced by `delay`; failed captures are skipped.
    /// The delay runs on the calling thread.
    pub fn capture_multi(&self, count: usize, delay: Duration) -> CaptureBatch {
        capture_multiple(count, delay, || self.capture())
    }

    /// Batch with the configured size and spacing.
    pub fn capture_batch(&self) -> CaptureBatch {
        self.capture_multi(self.config.batch_size, self.config.batch_delay())
    }

    /// Copy of the current overlay surface.
    pub fn overlay(&self) -> Option<RgbaImage> {
        self.request(SessionEvent::SnapshotOverlay)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> SessionEvent) -> Option<T> {
        if !self.ready() {
            return None;
        }
        let events = lock(&self.run).as_ref()?.events.clone();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        events.send(make(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }
}

impl Drop for FaceCaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Worker ──

/// Stops the stream when dropped, so every early return during acquisition
/// releases the camera.
struct ActiveStream(Arc<dyn MediaStream>);

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.stop();
    }
}

struct RunningSession {
    ctx: CaptureContext,
    feeder: FrameFeeder,
    stream: ActiveStream,
    listeners: Vec<ListenerGuard>,
}

impl RunningSession {
    fn teardown(self) {
        let RunningSession {
            ctx,
            mut feeder,
            stream,
            listeners,
        } = self;
        feeder.stop();
        drop(stream);
        drop(listeners);
        drop(ctx);
    }
}

struct SessionWorker {
    config: CaptureConfig,
    parts: SessionCollaborators,
    view: Arc<Mutex<SessionView>>,
    cancelled: Arc<AtomicBool>,
    events_tx: Sender<SessionEvent>,
    events: Receiver<SessionEvent>,
}

impl SessionWorker {
    fn run(self) {
        match self.acquire() {
            Ok(running) => self.event_loop(running),
            Err(SessionError::Cancelled) => log::info!("Session stopped during acquisition"),
            Err(e) => {
                log::error!("Session failed: {e}");
                self.publish(|view| view.error = Some(e.to_string()));
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn publish(&self, update: impl FnOnce(&mut SessionView)) {
        let mut view = lock(&self.view);
        if !self.is_cancelled() {
            update(&mut view);
        }
    }

    fn acquire(&self) -> Result<RunningSession, SessionError> {
        let factory = &self.parts.detector_factory;

        let asset_paths = self.parts.assets.ensure_all(&factory.required_assets())?;
        self.check_cancelled()?;

        log::info!("Opening camera ({:?} facing)", self.config.camera.facing_mode);
        let stream = ActiveStream(
            self.parts
                .camera
                .open(&self.config.camera)
                .map_err(SessionError::CameraUnavailable)?,
        );
        self.check_cancelled()?;

        let native = self.wait_for_metadata(&stream.0)?;
        log::info!("Camera negotiated {native}");

        let rendered = self
            .parts
            .display
            .rendered_size()
            .ok_or(SessionError::MissingTarget)?;
        let surfaces = MediaSurfaces::new(Some(native), rendered);

        let detector = factory
            .create(&asset_paths, &self.config.detector)
            .map_err(SessionError::Detector)?;
        self.check_cancelled()?;

        // Listeners go first: the context reads the current visibility after
        // them, and any later change arrives as an event.
        let listeners: Vec<ListenerGuard> = [
            ListenerKind::ResizeObserver,
            ListenerKind::WindowResize,
            ListenerKind::Visibility,
        ]
        .into_iter()
        .map(|kind| {
            let tx = self.events_tx.clone();
            ListenerGuard::register(
                Arc::clone(&self.parts.display),
                kind,
                Box::new(move |event| {
                    let _ = tx.send(SessionEvent::Display(event));
                }),
            )
        })
        .collect();

        let mut ctx = CaptureContext::new(
            surfaces,
            self.config.fallback_native,
            ContextParts {
                stream: Arc::clone(&stream.0),
                display: Arc::clone(&self.parts.display),
                renderer: (self.parts.renderer_factory)(),
                encoder: Arc::clone(&self.parts.encoder),
                logger: Arc::clone(&self.parts.logger),
            },
        );

        let feeder = FrameFeeder::spawn(
            Arc::clone(&stream.0),
            detector,
            self.events_tx.clone(),
            self.config.tick_interval(),
        )
        .map_err(|e| SessionError::Thread("frame feeder", e))?;

        ctx.mark_live();
        lock(&self.parts.logger).info(&format!(
            "Session live: native {native}, display {}",
            ctx.surfaces().overlay_size()
        ));

        Ok(RunningSession {
            ctx,
            feeder,
            stream,
            listeners,
        })
    }

    fn wait_for_metadata(&self, stream: &Arc<dyn MediaStream>) -> Result<Size, SessionError> {
        let timeout = self.config.metadata_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            self.check_cancelled()?;
            if let Some(size) = stream.native_size().filter(|s| !s.is_empty()) {
                return Ok(size);
            }
            if Instant::now() >= deadline {
                return Err(SessionError::MetadataTimeout(timeout.as_millis() as u64));
            }
            thread::sleep(METADATA_POLL_INTERVAL);
        }
    }

    fn event_loop(&self, mut running: RunningSession) {
        self.publish(|view| *view = SessionView::live(running.ctx.status()));

        for event in self.events.iter() {
            if self.is_cancelled() {
                break;
            }
            match event {
                SessionEvent::Detection { result, detect_ms } => {
                    running.ctx.record_timing("detect", detect_ms);
                    running
                        .ctx
                        .on_result(result.first_face(), result.topology.as_deref());
                }
                SessionEvent::Display(event) => running.ctx.handle_display_event(event),
                SessionEvent::Capture(reply) => {
                    let _ = reply.send(running.ctx.capture_once());
                }
                SessionEvent::SnapshotOverlay(reply) => {
                    let _ = reply.send(running.ctx.overlay_snapshot());
                }
                SessionEvent::Shutdown => break,
            }
            self.publish(|view| *view = SessionView::live(running.ctx.status()));
        }

        running.teardown();
        log::info!("Session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera::StreamConstraints;
    use crate::detection::domain::landmark_detector::{
        DetectionResult, DetectorOptions, LandmarkDetector, LandmarkPoint,
    };
    use crate::display::infrastructure::in_memory_display_host::InMemoryDisplayHost;
    use crate::geometry::domain::point::NormalizedPoint;
    use crate::shared::asset_resolver::{AssetError, AssetFetcher, AssetSpec};
    use crate::shared::error::SendError;
    use crate::shared::frame::Frame;
    use crate::status::domain::pipeline_status::{
        LABEL_NO_FACE, LABEL_PAUSED, LABEL_READY, LABEL_TOO_FAR,
    };
    use approx::assert_relative_eq;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    // ── Stubs ──

    struct StubStream {
        native: Option<Size>,
        active: AtomicBool,
        sequence: AtomicU64,
    }

    impl MediaStream for StubStream {
        fn native_size(&self) -> Option<Size> {
            self.native
        }
        fn latest_frame(&self) -> Option<Frame> {
            let size = self.native?;
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            Some(Frame::new(
                vec![90; (size.width * size.height * 3) as usize],
                size.width,
                size.height,
                seq,
            ))
        }
        fn stop(&self) {
            self.active.store(false, Ordering::SeqCst);
        }
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    struct StubCamera {
        open_delay: Duration,
        fail: AtomicBool,
        native: Option<Size>,
        opened: Mutex<Vec<Arc<StubStream>>>,
    }

    impl StubCamera {
        fn new(native: Option<Size>) -> Self {
            Self {
                open_delay: Duration::ZERO,
                fail: AtomicBool::new(false),
                native,
                opened: Mutex::new(Vec::new()),
            }
        }

        fn open_count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn active_count(&self) -> usize {
            self.opened
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.is_active())
                .count()
        }
    }

    impl Camera for StubCamera {
        fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn MediaStream>, SendError> {
            assert_eq!(constraints.facing_mode, crate::capture::domain::camera::FacingMode::User);
            thread::sleep(self.open_delay);
            if self.fail.load(Ordering::SeqCst) {
                return Err("permission denied".into());
            }
            let stream = Arc::new(StubStream {
                native: self.native,
                active: AtomicBool::new(true),
                sequence: AtomicU64::new(0),
            });
            self.opened.lock().unwrap().push(Arc::clone(&stream));
            Ok(stream)
        }
    }

    /// Reports whatever face the test put in the shared slot.
    struct ScriptedDetector {
        face: Arc<Mutex<Vec<LandmarkPoint>>>,
    }

    impl LandmarkDetector for ScriptedDetector {
        fn process(&mut self, _frame: &Frame) -> Result<DetectionResult, SendError> {
            let face = self.face.lock().unwrap().clone();
            Ok(DetectionResult {
                faces: if face.is_empty() { vec![] } else { vec![face] },
                topology: None,
            })
        }
    }

    struct StubFactory {
        face: Arc<Mutex<Vec<LandmarkPoint>>>,
        fail: bool,
    }

    impl DetectorFactory for StubFactory {
        fn required_assets(&self) -> Vec<AssetSpec> {
            vec![AssetSpec::named("mesh.onnx")]
        }
        fn create(
            &self,
            assets: &[PathBuf],
            _options: &DetectorOptions,
        ) -> Result<Box<dyn LandmarkDetector>, SendError> {
            assert_eq!(assets.len(), 1);
            if self.fail {
                return Err("model corrupt".into());
            }
            Ok(Box::new(ScriptedDetector {
                face: Arc::clone(&self.face),
            }))
        }
    }

    struct CountingFetcher {
        fetches: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AssetFetcher for CountingFetcher {
        fn fetch(&self, spec: &AssetSpec) -> Result<PathBuf, AssetError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AssetError::NotFound(spec.name.clone()));
            }
            Ok(PathBuf::from("/models").join(&spec.name))
        }
    }

    struct Harness {
        session: FaceCaptureSession,
        camera: Arc<StubCamera>,
        display: Arc<InMemoryDisplayHost>,
        face: Arc<Mutex<Vec<LandmarkPoint>>>,
        fetches: Arc<AtomicUsize>,
    }

    impl Harness {
        fn set_face(&self, face: Vec<LandmarkPoint>) {
            *self.face.lock().unwrap() = face;
        }
    }

    struct HarnessOptions {
        camera: StubCamera,
        display: InMemoryDisplayHost,
        detector_fails: bool,
        assets_fail: bool,
        config: CaptureConfig,
    }

    impl Default for HarnessOptions {
        fn default() -> Self {
            let mut config = CaptureConfig::default();
            config.tick_interval_ms = 5;
            config.metadata_timeout_ms = 200;
            Self {
                camera: StubCamera::new(Some(Size::new(64, 48))),
                display: InMemoryDisplayHost::new(Size::new(64, 48)),
                detector_fails: false,
                assets_fail: false,
                config,
            }
        }
    }

    fn harness(options: HarnessOptions) -> Harness {
        let camera = Arc::new(options.camera);
        let display = Arc::new(options.display);
        let face = Arc::new(Mutex::new(Vec::new()));
        let fetches = Arc::new(AtomicUsize::new(0));
        let assets = Arc::new(AssetRegistry::new(Box::new(CountingFetcher {
            fetches: Arc::clone(&fetches),
            fail: options.assets_fail,
        })));
        let parts = SessionCollaborators::new(
            camera.clone(),
            Arc::new(StubFactory {
                face: Arc::clone(&face),
                fail: options.detector_fails,
            }),
            display.clone(),
            assets,
        );
        Harness {
            session: FaceCaptureSession::new(options.config, parts),
            camera,
            display,
            face,
            fetches,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn square_face(side: f64) -> Vec<LandmarkPoint> {
        vec![
            NormalizedPoint::new(0.5 - side / 2.0, 0.4 - side / 2.0),
            NormalizedPoint::new(0.5 + side / 2.0, 0.4 + side / 2.0),
            NormalizedPoint::new(0.5, 0.4),
        ]
    }

    // ── Lifecycle ──

    #[test]
    fn test_start_becomes_ready_and_searching() {
        let h = harness(HarnessOptions::default());
        assert_eq!(h.session.status(), LABEL_STARTING);
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        assert!(h.session.error().is_none());
        assert_eq!(h.display.total_listeners(), 3);
    }

    #[test]
    fn test_start_is_idempotent() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        h.session.start();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(h.camera.open_count(), 1);
        assert_eq!(h.display.total_listeners(), 3);
    }

    #[test]
    fn test_stop_before_camera_resolves_releases_stream() {
        let mut camera = StubCamera::new(Some(Size::new(64, 48)));
        camera.open_delay = Duration::from_millis(100);
        let h = harness(HarnessOptions {
            camera,
            ..HarnessOptions::default()
        });
        h.session.start();
        // Let the worker block inside open().
        thread::sleep(Duration::from_millis(30));
        h.session.stop();

        assert!(wait_until(|| h.camera.open_count() == 1));
        assert!(wait_until(|| h.camera.active_count() == 0));
        assert!(!h.session.ready());
        assert!(!h.session.is_started());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(h.display.total_listeners(), 0);
    }

    #[test]
    fn test_stop_releases_everything_and_allows_restart() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.ready()));

        h.session.stop_and_join();
        assert_eq!(h.camera.active_count(), 0);
        assert_eq!(h.display.total_listeners(), 0);
        assert!(!h.session.ready());

        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        assert_eq!(h.camera.open_count(), 2);
        assert_eq!(h.camera.active_count(), 1);
        assert_eq!(h.display.total_listeners(), 3);
    }

    #[test]
    fn test_assets_are_fetched_once_across_runs() {
        let h = harness(HarnessOptions::default());
        for _ in 0..3 {
            h.session.start();
            assert!(wait_until(|| h.session.ready()));
            h.session.stop_and_join();
        }
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_session() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        let Harness {
            session,
            camera,
            display,
            ..
        } = h;
        drop(session);
        assert!(wait_until(|| camera.active_count() == 0));
        assert!(wait_until(|| display.total_listeners() == 0));
    }

    // ── Acquisition failures ──

    #[test]
    fn test_camera_failure_surfaces_error_until_restart() {
        let camera = StubCamera::new(Some(Size::new(64, 48)));
        camera.fail.store(true, Ordering::SeqCst);
        let h = harness(HarnessOptions {
            camera,
            ..HarnessOptions::default()
        });
        h.session.start();
        assert!(wait_until(|| h.session.error().is_some()));
        assert!(h.session.error().unwrap().contains("permission denied"));
        assert!(!h.session.ready());
        assert!(h.session.is_started());

        h.camera.fail.store(false, Ordering::SeqCst);
        h.session.start();
        thread::sleep(Duration::from_millis(50));
        assert!(!h.session.ready());

        h.session.stop();
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        assert!(h.session.error().is_none());
    }

    #[test]
    fn test_missing_display_target_fails_and_releases_stream() {
        let h = harness(HarnessOptions {
            display: InMemoryDisplayHost::with_target(None),
            ..HarnessOptions::default()
        });
        h.session.start();
        assert!(wait_until(|| h.session.error().is_some()));
        assert_eq!(h.camera.open_count(), 1);
        assert!(wait_until(|| h.camera.active_count() == 0));
    }

    #[test]
    fn test_metadata_timeout() {
        let h = harness(HarnessOptions {
            camera: StubCamera::new(None),
            ..HarnessOptions::default()
        });
        h.session.start();
        assert!(wait_until(|| h.session.error().is_some()));
        assert!(h.session.error().unwrap().contains("resolution"));
        assert_eq!(h.camera.active_count(), 0);
    }

    #[test]
    fn test_asset_failure_never_opens_camera() {
        let h = harness(HarnessOptions {
            assets_fail: true,
            ..HarnessOptions::default()
        });
        h.session.start();
        assert!(wait_until(|| h.session.error().is_some()));
        assert_eq!(h.camera.open_count(), 0);
    }

    #[test]
    fn test_detector_failure_releases_stream() {
        let h = harness(HarnessOptions {
            detector_fails: true,
            ..HarnessOptions::default()
        });
        h.session.start();
        assert!(wait_until(|| h.session.error().is_some()));
        assert!(h.session.error().unwrap().contains("model corrupt"));
        assert_eq!(h.camera.active_count(), 0);
    }

    // ── Status ──

    #[test]
    fn test_status_follows_detection() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.status() == LABEL_NO_FACE));
        assert!(!h.session.face_ready());

        h.set_face(square_face(0.4));
        assert!(wait_until(|| h.session.face_ready()));
        assert_eq!(h.session.status(), LABEL_READY);

        h.set_face(square_face(0.1));
        assert!(wait_until(|| h.session.status() == LABEL_TOO_FAR));
        assert!(!h.session.face_ready());

        h.set_face(Vec::new());
        assert!(wait_until(|| h.session.status_kind() == PipelineStatus::NoFace));
    }

    #[test]
    fn test_hidden_document_pauses_then_reverts() {
        let h = harness(HarnessOptions::default());
        h.set_face(square_face(0.4));
        h.session.start();
        assert!(wait_until(|| h.session.face_ready()));

        h.display.set_hidden(true);
        assert!(wait_until(|| h.session.status() == LABEL_PAUSED));
        assert!(h.session.face_ready());

        h.display.set_hidden(false);
        assert!(wait_until(|| h.session.status() == LABEL_READY));
    }

    /// Hides the document while the visibility listener is being attached,
    /// before the registration lands, so no event is ever delivered for it.
    struct HideOnSubscribe {
        inner: InMemoryDisplayHost,
    }

    impl DisplayHost for HideOnSubscribe {
        fn rendered_size(&self) -> Option<Size> {
            self.inner.rendered_size()
        }
        fn is_hidden(&self) -> bool {
            self.inner.is_hidden()
        }
        fn add_listener(
            &self,
            kind: ListenerKind,
            handler: crate::display::domain::display_host::DisplayHandler,
        ) -> crate::display::domain::display_host::ListenerId {
            if kind == ListenerKind::Visibility {
                self.inner.set_hidden(true);
            }
            self.inner.add_listener(kind, handler)
        }
        fn remove_listener(&self, id: crate::display::domain::display_host::ListenerId) -> bool {
            self.inner.remove_listener(id)
        }
    }

    #[test]
    fn test_visibility_change_during_acquisition_is_not_lost() {
        let mut config = CaptureConfig::default();
        config.tick_interval_ms = 5;
        let parts = SessionCollaborators::new(
            Arc::new(StubCamera::new(Some(Size::new(64, 48)))),
            Arc::new(StubFactory {
                face: Arc::new(Mutex::new(square_face(0.4))),
                fail: false,
            }),
            Arc::new(HideOnSubscribe {
                inner: InMemoryDisplayHost::new(Size::new(64, 48)),
            }),
            Arc::new(AssetRegistry::new(Box::new(CountingFetcher {
                fetches: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }))),
        );
        let session = FaceCaptureSession::new(config, parts);
        session.start();

        assert!(wait_until(|| session.face_ready()));
        assert_eq!(session.status(), LABEL_PAUSED);
        session.stop_and_join();
    }

    // ── Capture ──

    #[test]
    fn test_capture_before_start_and_after_stop_is_none() {
        let h = harness(HarnessOptions::default());
        assert!(h.session.capture().is_none());
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        assert!(h.session.capture().is_some());
        h.session.stop();
        assert!(h.session.capture().is_none());
        assert!(h.session.capture_multi(3, Duration::ZERO).is_empty());
    }

    #[test]
    fn test_stop_during_batch_returns_partial_and_releases() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.ready()));

        let batch = thread::scope(|scope| {
            let batch = scope.spawn(|| h.session.capture_multi(5, Duration::from_millis(50)));
            thread::sleep(Duration::from_millis(75));
            h.session.stop();
            batch.join().unwrap()
        });

        assert!(!batch.is_empty());
        assert!(batch.len() < 5);
        assert_eq!(batch.frames.len(), batch.positions.len());
        assert!(wait_until(|| h.camera.active_count() == 0));
        assert!(wait_until(|| h.display.total_listeners() == 0));
        assert!(h.session.capture().is_none());
    }

    #[test]
    fn test_capture_without_face_uses_default_position() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.status() == LABEL_NO_FACE));
        let record = h.session.capture().unwrap();
        assert!(record.image_b64.starts_with("data:image/jpeg;base64,"));
        assert_eq!(
            record.position,
            crate::geometry::domain::bounding_box::PositionData::centered_default()
        );
    }

    #[test]
    fn test_capture_multi_collects_all_frames() {
        let h = harness(HarnessOptions::default());
        h.set_face(square_face(0.4));
        h.session.start();
        assert!(wait_until(|| h.session.face_ready()));

        let start = Instant::now();
        let batch = h.session.capture_multi(5, Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(batch.frames.len(), 5);
        assert_eq!(batch.positions.len(), 5);
        for p in &batch.positions {
            assert_relative_eq!(p.scale, 0.6, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_resize_keeps_position_stable() {
        let h = harness(HarnessOptions::default());
        h.set_face(square_face(0.3));
        h.session.start();
        assert!(wait_until(|| h.session.face_ready()));
        let before = h.session.capture().unwrap().position;

        h.display.resize_element(Size::new(200, 50));
        assert!(wait_until(|| h
            .session
            .overlay()
            .is_some_and(|o| o.dimensions() == (200, 50))));
        // Let a tick run against the new layout.
        thread::sleep(Duration::from_millis(100));
        let after = h.session.capture().unwrap().position;

        assert_relative_eq!(before.x, after.x, epsilon = 1e-9);
        assert_relative_eq!(before.y, after.y, epsilon = 1e-9);
        assert_relative_eq!(before.scale, after.scale, epsilon = 1e-9);
    }

    #[test]
    fn test_overlay_tracks_rendered_box() {
        let h = harness(HarnessOptions::default());
        h.session.start();
        assert!(wait_until(|| h.session.ready()));
        assert_eq!(h.session.overlay().unwrap().dimensions(), (64, 48));
        h.display.resize_window(Size::new(0, 30));
        assert!(wait_until(|| h
            .session
            .overlay()
            .is_some_and(|o| o.dimensions() == (1, 30))));
    }
}
