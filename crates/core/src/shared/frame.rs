use ndarray::ArrayView3;

use crate::shared::size::Size;

/// One decoded camera frame: tightly packed RGB24 bytes, row-major.
///
/// Pixel format conversion happens inside the camera adapter; everything
/// downstream sees RGB at the stream's native resolution.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            sequence,
        }
    }

    /// Black frame of the given size.
    pub fn blank(size: Size) -> Self {
        let len = size.width as usize * size.height as usize * Self::CHANNELS;
        Self::new(vec![0; len], size.width, size.height, 0)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Monotonic counter assigned by the stream that produced the frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Overwrites this buffer with `other`, reallocating only when the size changed.
    pub fn copy_from(&mut self, other: &Frame) {
        self.data.clear();
        self.data.extend_from_slice(&other.data);
        self.width = other.width;
        self.height = other.height;
        self.sequence = other.sequence;
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, Self::CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }
}
