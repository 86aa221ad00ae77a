use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::capture::domain::frame_encoder::FrameEncoder;
use crate::shared::constants::JPEG_QUALITY;
use crate::shared::error::SendError;
use crate::shared::frame::Frame;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Encodes frames as `data:image/jpeg;base64,...` URLs.
pub struct JpegDataUrlEncoder {
    quality: u8,
}

impl JpegDataUrlEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegDataUrlEncoder {
    fn default() -> Self {
        Self::new(JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegDataUrlEncoder {
    fn encode(&self, frame: &Frame) -> Result<String, SendError> {
        if frame.size().is_empty() {
            return Err(format!("cannot encode an empty {} frame", frame.size()).into());
        }
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;

        let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        url.push_str(DATA_URL_PREFIX);
        BASE64_STANDARD.encode_string(&jpeg, &mut url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::size::Size;

    fn gradient(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        Frame::new(data, w, h, 0)
    }

    #[test]
    fn test_output_is_jpeg_data_url() {
        let url = JpegDataUrlEncoder::default().encode(&gradient(32, 24)).unwrap();
        let payload = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_decoded_image_keeps_native_size() {
        let url = JpegDataUrlEncoder::default().encode(&gradient(40, 30)).unwrap();
        let bytes = BASE64_STANDARD
            .decode(url.strip_prefix(DATA_URL_PREFIX).unwrap())
            .unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let frame = gradient(64, 64);
        let high = JpegDataUrlEncoder::new(95).encode(&frame).unwrap();
        let low = JpegDataUrlEncoder::new(10).encode(&frame).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        assert!(JpegDataUrlEncoder::default()
            .encode(&Frame::blank(Size::new(0, 0)))
            .is_err());
    }
}
