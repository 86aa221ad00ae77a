//! Two-stage face mesh on ONNX Runtime via `ort`.
//!
//! Stage one is BlazeFace (short range) on the whole frame; the best face
//! becomes a square region of interest. Stage two runs the face landmark
//! model on that region. While the landmark model keeps reporting a face,
//! the next frame reuses a region derived from the previous landmarks and
//! skips stage one.

use std::path::{Path, PathBuf};

use crate::detection::domain::landmark_detector::{
    DetectionResult, DetectorFactory, DetectorOptions, LandmarkDetector, LandmarkPoint,
};
use crate::detection::domain::topology::TopologySource;
use crate::geometry::domain::point::NormalizedPoint;
use crate::shared::asset_resolver::AssetSpec;
use crate::shared::constants::{MESH_LANDMARKS, REFINED_MESH_LANDMARKS};
use crate::shared::error::SendError;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const DETECTION_INPUT_SIZE: u32 = 128;

/// Face landmark model input resolution.
const LANDMARK_INPUT_SIZE: u32 = 192;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// ROI side relative to the face box it was derived from.
const ROI_SCALE: f32 = 1.5;

/// Values per landmark in the model output (x, y, z).
const LANDMARK_STRIDE: usize = 3;

/// Square region of the frame, in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Roi {
    center_x: f32,
    center_y: f32,
    size: f32,
}

impl Roi {
    fn around(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let size = (x2 - x1).max(y2 - y1) * ROI_SCALE;
        (size.is_finite() && size >= 1.0).then_some(Self {
            center_x: (x1 + x2) / 2.0,
            center_y: (y1 + y2) / 2.0,
            size,
        })
    }

    fn left(&self) -> f32 {
        self.center_x - self.size / 2.0
    }

    fn top(&self) -> f32 {
        self.center_y - self.size / 2.0
    }
}

#[derive(Clone, Debug)]
struct RawDet {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

pub struct OnnxFaceMeshDetector {
    detection: ort::session::Session,
    landmarks: ort::session::Session,
    anchors: Vec<[f32; 2]>,
    options: DetectorOptions,
    topology: TopologySource,
    tracked: Option<Roi>,
}

impl OnnxFaceMeshDetector {
    pub fn new(
        detection_model: &Path,
        landmark_model: &Path,
        options: DetectorOptions,
        topology: TopologySource,
    ) -> Result<Self, SendError> {
        Ok(Self {
            detection: load_session(detection_model)?,
            landmarks: load_session(landmark_model)?,
            anchors: generate_anchors(),
            options,
            topology,
            tracked: None,
        })
    }

    /// Best BlazeFace detection above the detection threshold, as an ROI.
    fn detect_face(&mut self, frame: &Frame) -> Result<Option<Roi>, SendError> {
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let input = ort::value::Tensor::from_array(preprocess(frame, DETECTION_INPUT_SIZE))?;
        let outputs = self.detection.run(ort::inputs![input])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let threshold = self.options.min_detection_confidence as f32;
        let input_size = DETECTION_INPUT_SIZE as f32;
        let mut raw_dets = Vec::new();
        for (i, &raw_score) in score_data
            .iter()
            .enumerate()
            .take(self.anchors.len().min(NUM_ANCHORS))
        {
            let score = sigmoid(raw_score);
            if score < threshold {
                continue;
            }
            let offset = i * 16;
            if offset + 4 > reg_data.len() {
                break;
            }
            let anchor = self.anchors[i];
            let cx = anchor[0] + reg_data[offset] / input_size;
            let cy = anchor[1] + reg_data[offset + 1] / input_size;
            let w = reg_data[offset + 2] / input_size;
            let h = reg_data[offset + 3] / input_size;
            raw_dets.push(RawDet {
                x1: ((cx - w / 2.0) * fw).max(0.0),
                y1: ((cy - h / 2.0) * fh).max(0.0),
                x2: ((cx + w / 2.0) * fw).min(fw),
                y2: ((cy + h / 2.0) * fh).min(fh),
                score,
            });
        }

        let best = nms(&mut raw_dets, NMS_IOU_THRESH).into_iter().next();
        Ok(best.and_then(|d| Roi::around(d.x1, d.y1, d.x2, d.y2)))
    }

    /// Runs the landmark model on `roi`. Returns the face-presence score and
    /// the landmarks in frame pixels.
    fn estimate(&mut self, frame: &Frame, roi: &Roi) -> Result<(f32, Vec<[f32; 2]>), SendError> {
        let input = ort::value::Tensor::from_array(crop_preprocess(frame, roi, LANDMARK_INPUT_SIZE))?;
        let outputs = self.landmarks.run(ort::inputs![input])?;
        if outputs.len() < 2 {
            return Err(format!(
                "Face landmark model expected 2 outputs, got {}",
                outputs.len()
            )
            .into());
        }
        let coords = outputs[0].try_extract_array::<f32>()?;
        let flag = outputs[1].try_extract_array::<f32>()?;
        let coords = coords.as_slice().ok_or("Cannot get landmark slice")?;
        let presence = flag
            .as_slice()
            .and_then(|s| s.first().copied())
            .map(sigmoid)
            .ok_or("Cannot get face flag")?;

        let available = coords.len() / LANDMARK_STRIDE;
        if available < MESH_LANDMARKS {
            return Err(format!(
                "Face landmark model produced {available} points, expected at least {MESH_LANDMARKS}"
            )
            .into());
        }
        let count = landmark_count(available, self.options.refine_landmarks);
        Ok((presence, crop_to_frame(&coords[..count * LANDMARK_STRIDE], roi)))
    }
}

impl OnnxFaceMeshDetector {
    /// Landmarks for the face inside `roi`, or `None` when the landmark model
    /// does not see one there. Updates the tracked ROI on success.
    fn track(&mut self, frame: &Frame, roi: &Roi) -> Result<Option<DetectionResult>, SendError> {
        let (presence, pixels) = self.estimate(frame, roi)?;
        let min_presence = self.options.min_tracking_confidence as f32;
        if presence < min_presence {
            log::trace!("Face presence {presence:.2} below {min_presence:.2}");
            return Ok(None);
        }
        self.tracked = roi_from_landmarks(&pixels);
        let face = to_normalized(&pixels, frame.width(), frame.height());
        Ok(Some(DetectionResult {
            topology: self.topology.for_face(&face),
            faces: vec![face],
        }))
    }
}

impl LandmarkDetector for OnnxFaceMeshDetector {
    fn process(&mut self, frame: &Frame) -> Result<DetectionResult, SendError> {
        let previous = self.tracked.take();
        let was_tracking = previous.is_some();
        let roi = match previous {
            Some(roi) => Some(roi),
            None => self.detect_face(frame)?,
        };
        let Some(roi) = roi else {
            return Ok(DetectionResult::empty());
        };
        if let Some(result) = self.track(frame, &roi)? {
            return Ok(result);
        }
        if !was_tracking {
            return Ok(DetectionResult::empty());
        }

        // Lost track: one fresh detection on the same frame.
        match self.detect_face(frame)? {
            Some(roi) => Ok(self
                .track(frame, &roi)?
                .unwrap_or_else(DetectionResult::empty)),
            None => Ok(DetectionResult::empty()),
        }
    }
}

/// Builds [`OnnxFaceMeshDetector`]s from the two resolved model files.
pub struct OnnxFaceMeshFactory {
    detection_model: AssetSpec,
    landmark_model: AssetSpec,
    topology: TopologySource,
}

impl OnnxFaceMeshFactory {
    pub fn new(
        detection_model: AssetSpec,
        landmark_model: AssetSpec,
        topology: TopologySource,
    ) -> Self {
        Self {
            detection_model,
            landmark_model,
            topology,
        }
    }
}

impl DetectorFactory for OnnxFaceMeshFactory {
    fn required_assets(&self) -> Vec<AssetSpec> {
        vec![self.detection_model.clone(), self.landmark_model.clone()]
    }

    fn create(
        &self,
        assets: &[PathBuf],
        options: &DetectorOptions,
    ) -> Result<Box<dyn LandmarkDetector>, SendError> {
        let [detection, landmarks] = assets else {
            return Err(format!("expected 2 model paths, got {}", assets.len()).into());
        };
        log::info!(
            "Loading face mesh models: {} + {}",
            detection.display(),
            landmarks.display()
        );
        Ok(Box::new(OnnxFaceMeshDetector::new(
            detection,
            landmarks,
            options.clone(),
            self.topology.clone(),
        )?))
    }
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

fn load_session(model_path: &Path) -> Result<ort::session::Session, SendError> {
    let session = ort::session::Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// CoreML on macOS, DirectML on Windows, CPU elsewhere.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Samples the square `roi` into a `size × size` [0,1] NCHW tensor. Parts of
/// the ROI outside the frame stay black.
fn crop_preprocess(frame: &Frame, roi: &Roi, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let (src_w, src_h) = (frame.width() as f32, frame.height() as f32);
    let s = size as usize;
    let step = roi.size / size as f32;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let sy = roi.top() + (y as f32 + 0.5) * step;
        if sy < 0.0 || sy >= src_h {
            continue;
        }
        for x in 0..s {
            let sx = roi.left() + (x as f32 + 0.5) * step;
            if sx < 0.0 || sx >= src_w {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[sy as usize, sx as usize, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// Refined models emit iris points after the 468 mesh points; they are kept
/// only when refinement is requested.
fn landmark_count(available: usize, refine: bool) -> usize {
    if refine {
        available.min(REFINED_MESH_LANDMARKS)
    } else {
        MESH_LANDMARKS
    }
}

/// Maps model-space coordinates (pixels of the `LANDMARK_INPUT_SIZE` crop,
/// stride 3) back to frame pixels.
fn crop_to_frame(coords: &[f32], roi: &Roi) -> Vec<[f32; 2]> {
    let scale = roi.size / LANDMARK_INPUT_SIZE as f32;
    coords
        .chunks_exact(LANDMARK_STRIDE)
        .map(|p| [roi.left() + p[0] * scale, roi.top() + p[1] * scale])
        .collect()
}

fn to_normalized(pixels: &[[f32; 2]], width: u32, height: u32) -> Vec<LandmarkPoint> {
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);
    pixels
        .iter()
        .map(|p| NormalizedPoint::new(p[0] as f64 / w, p[1] as f64 / h))
        .collect()
}

fn roi_from_landmarks(pixels: &[[f32; 2]]) -> Option<Roi> {
    let (mut x1, mut y1) = (f32::INFINITY, f32::INFINITY);
    let (mut x2, mut y2) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in pixels {
        x1 = x1.min(p[0]);
        y1 = y1.min(p[1]);
        x2 = x2.max(p[0]);
        y2 = y2.max(p[1]);
    }
    Roi::around(x1, y1, x2, y2)
}

/// Generate BlazeFace anchors for the short-range model.
///
/// Two feature maps, 16×16 and 8×8, with 2 and 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = DETECTION_INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

/// Greedy NMS; the result is sorted by descending score.
fn nms(dets: &mut [RawDet], iou_thresh: f32) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDet> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(k, det) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
