use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::capture::domain::camera::{Camera, FacingMode, MediaStream, StreamConstraints};
use crate::shared::error::SendError;
use crate::shared::frame::Frame;
use crate::shared::size::Size;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSource {
    /// A capture device opened through a libavdevice backend
    /// (`v4l2`, `avfoundation`, `dshow`). `None` picks the platform default.
    Device {
        backend: Option<String>,
        name: String,
    },
    /// A video file replayed at its own frame rate, standing in for a camera.
    File { path: PathBuf, looping: bool },
}

impl CameraSource {
    /// First camera on the platform default backend.
    pub fn default_device() -> Self {
        Self::Device {
            backend: None,
            name: default_device_name().to_string(),
        }
    }
}

pub fn default_backend() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

fn default_device_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

/// Camera backed by ffmpeg-next (libavdevice + libavcodec).
///
/// Each opened stream decodes on its own thread and keeps only the newest
/// RGB frame. ffmpeg contexts never leave that thread.
pub struct FfmpegCamera {
    source: CameraSource,
}

impl FfmpegCamera {
    pub fn new(source: CameraSource) -> Self {
        Self { source }
    }
}

impl Camera for FfmpegCamera {
    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn MediaStream>, SendError> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        if constraints.facing_mode != FacingMode::User {
            log::debug!(
                "Facing mode {:?} is advisory; opening {:?}",
                constraints.facing_mode,
                self.source
            );
        }

        let shared = Arc::new(StreamState::default());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let source = self.source.clone();
        let constraints = constraints.clone();
        let thread_state = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("camera-decoder".into())
            .spawn(move || decode_thread(source, constraints, thread_state, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Arc::new(FfmpegStream {
                state: shared,
                decoder: Mutex::new(Some(handle)),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err("camera decoder exited before opening the source".into())
            }
        }
    }
}

#[derive(Default)]
struct StreamState {
    latest: Mutex<Option<Frame>>,
    native: Mutex<Option<Size>>,
    stopped: AtomicBool,
    finished: AtomicBool,
}

struct FfmpegStream {
    state: Arc<StreamState>,
    decoder: Mutex<Option<JoinHandle<()>>>,
}

impl MediaStream for FfmpegStream {
    fn native_size(&self) -> Option<Size> {
        *self
            .state
            .native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.state
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        let handle = self
            .decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Camera decoder thread panicked");
            }
            log::info!("Camera stream stopped");
        }
    }

    fn is_active(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst) && !self.state.finished.load(Ordering::SeqCst)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Decoding thread ──

struct OpenedSource {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
    /// Replay pacing for files; live devices are paced by the device.
    frame_interval: Option<Duration>,
    looping: bool,
}

fn decode_thread(
    source: CameraSource,
    constraints: StreamConstraints,
    state: Arc<StreamState>,
    ready: Sender<Result<(), SendError>>,
) {
    let mut opened = match open_source(&source, &constraints) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    log::info!("Camera source opened: {source:?}");

    if let Err(e) = pump_frames(&mut opened, &state) {
        log::warn!("Camera stream ended with error: {e}");
    }
    state.finished.store(true, Ordering::SeqCst);
}

fn open_source(
    source: &CameraSource,
    constraints: &StreamConstraints,
) -> Result<OpenedSource, SendError> {
    let (ictx, looping) = match source {
        CameraSource::File { path, looping } => (ffmpeg_next::format::input(path)?, *looping),
        CameraSource::Device { backend, name } => {
            let backend = backend.as_deref().unwrap_or(default_backend());
            let format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == backend)
                .ok_or_else(|| format!("capture backend {backend} is not available"))?;

            let mut options = ffmpeg_next::Dictionary::new();
            options.set(
                "video_size",
                &format!("{}x{}", constraints.ideal_width, constraints.ideal_height),
            );
            options.set("framerate", &constraints.frame_rate.to_string());

            let ctx = ffmpeg_next::format::open_with(name.as_str(), &format, options)?;
            if !ctx.is_input() {
                return Err(format!("{backend} opened {name} as an output").into());
            }
            (ctx.input(), false)
        }
    };

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    let stream_index = stream.index();
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;

    let frame_interval = match source {
        CameraSource::File { .. } => {
            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                constraints.frame_rate.max(1) as f64
            };
            Some(Duration::from_secs_f64(1.0 / fps))
        }
        CameraSource::Device { .. } => None,
    };

    Ok(OpenedSource {
        ictx,
        decoder,
        stream_index,
        frame_interval,
        looping,
    })
}

fn pump_frames(opened: &mut OpenedSource, state: &StreamState) -> Result<(), SendError> {
    let mut scaler: Option<(ffmpeg_next::software::scaling::Context, u32, u32)> = None;
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    let mut sequence: u64 = 0;

    while !state.stopped.load(Ordering::SeqCst) {
        let next = opened
            .ictx
            .packets()
            .next()
            .map(|(stream, packet)| (stream.index(), packet));
        let Some((index, packet)) = next else {
            if opened.looping {
                opened.ictx.seek(0, ..)?;
                opened.decoder.flush();
                continue;
            }
            break;
        };
        if index != opened.stream_index {
            continue;
        }
        if opened.decoder.send_packet(&packet).is_err() {
            continue;
        }

        while opened.decoder.receive_frame(&mut decoded).is_ok() {
            let started = Instant::now();
            let (w, h) = (decoded.width(), decoded.height());
            let needs_scaler = !matches!(&scaler, Some((_, sw, sh)) if *sw == w && *sh == h);
            if needs_scaler {
                let ctx = ffmpeg_next::software::scaling::Context::get(
                    decoded.format(),
                    w,
                    h,
                    ffmpeg_next::format::Pixel::RGB24,
                    w,
                    h,
                    ffmpeg_next::software::scaling::Flags::BILINEAR,
                )?;
                scaler = Some((ctx, w, h));
            }
            let Some((ctx, _, _)) = scaler.as_mut() else {
                continue;
            };

            let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
            ctx.run(&decoded, &mut rgb)?;
            let frame = Frame::new(extract_rgb_pixels(&rgb, w, h), w, h, sequence);
            sequence += 1;

            publish_frame(state, frame);

            if let Some(interval) = opened.frame_interval {
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            if state.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn publish_frame(state: &StreamState, frame: Frame) {
    let size = frame.size();
    {
        let mut native = state.native.lock().unwrap_or_else(PoisonError::into_inner);
        if *native != Some(size) {
            log::debug!("Camera resolution {size}");
            *native = Some(size);
        }
    }
    *state.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row padding (stride > width * 3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let write_packets = |encoder: &mut ffmpeg_next::encoder::Video,
                                 octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = ((i * 40) % 256) as u8;
            rgb.data_mut(0).fill(value);
            let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            write_packets(&mut encoder, &mut octx);
        }
        encoder.send_eof().unwrap();
        write_packets(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(v) = probe() {
                return Some(v);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_default_backend_per_platform() {
        let backend = default_backend();
        assert!(["v4l2", "avfoundation", "dshow"].contains(&backend));
    }

    #[test]
    fn test_open_missing_file_is_an_error() {
        let camera = FfmpegCamera::new(CameraSource::File {
            path: PathBuf::from("/nonexistent/camera.mp4"),
            looping: false,
        });
        assert!(camera.open(&StreamConstraints::default()).is_err());
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let camera = FfmpegCamera::new(CameraSource::Device {
            backend: Some("no-such-backend".into()),
            name: "0".into(),
        });
        let err = camera.open(&StreamConstraints::default()).err().unwrap();
        assert!(err.to_string().contains("no-such-backend"));
    }

    #[test]
    fn test_file_replay_reports_native_size_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.mp4");
        create_test_video(&path, 10, 160, 120, 30);

        let camera = FfmpegCamera::new(CameraSource::File {
            path,
            looping: true,
        });
        let stream = camera.open(&StreamConstraints::default()).unwrap();

        let native = wait_for(|| stream.native_size()).unwrap();
        assert_eq!(native, Size::new(160, 120));
        let frame = wait_for(|| stream.latest_frame()).unwrap();
        assert_eq!(frame.data().len(), 160 * 120 * 3);
        assert!(stream.is_active());

        stream.stop();
        assert!(!stream.is_active());
        stream.stop();
    }

    #[test]
    fn test_file_without_looping_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.mp4");
        create_test_video(&path, 3, 64, 48, 30);

        let camera = FfmpegCamera::new(CameraSource::File {
            path,
            looping: false,
        });
        let stream = camera.open(&StreamConstraints::default()).unwrap();
        assert!(wait_for(|| (!stream.is_active()).then_some(())).is_some());
        assert!(stream.latest_frame().is_some());
    }
}
