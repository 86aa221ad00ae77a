use serde::{Deserialize, Serialize};

use crate::geometry::domain::bounding_box::PositionData;

/// One still: a `data:image/jpeg;base64,...` URL plus where the face was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub image_b64: String,
    pub position: PositionData,
}

/// Result of a multi-frame capture. `frames[i]` pairs with `positions[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureBatch {
    pub frames: Vec<String>,
    pub positions: Vec<PositionData>,
}

impl CaptureBatch {
    pub fn push(&mut self, record: CaptureRecord) {
        self.frames.push(record.image_b64);
        self.positions.push(record.position);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_frames_and_positions_aligned() {
        let mut batch = CaptureBatch::default();
        batch.push(CaptureRecord {
            image_b64: "data:image/jpeg;base64,AAAA".into(),
            position: PositionData::centered_default(),
        });
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.frames.len(), batch.positions.len());
    }

    #[test]
    fn test_batch_json_shape() {
        let batch = CaptureBatch::default();
        assert_eq!(
            serde_json::to_string(&batch).unwrap(),
            r#"{"frames":[],"positions":[]}"#
        );
    }
}
