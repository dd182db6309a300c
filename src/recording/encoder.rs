//! H.264 encoder wrapper using openh264

use crate::errors::{DualCamError, Result};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

/// H.264 encoder for composite BGRA frames
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// openh264 infers dimensions from each YUV source; `width`/`height` are
    /// used to validate input.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width % 2 != 0 || height % 2 != 0 {
            return Err(DualCamError::Encoding(format!(
                "{}x{} is not a valid YUV420 size",
                width, height
            )));
        }
        let encoder = Encoder::new()
            .map_err(|e| DualCamError::Encoding(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode one BGRA frame into Annex B NAL units.
    pub fn encode_bgra(&mut self, bgra: &[u8]) -> Result<EncodedFrame> {
        let expected = (self.width * self.height * 4) as usize;
        if bgra.len() != expected {
            return Err(DualCamError::Encoding(format!(
                "Invalid frame size: expected {} bytes, got {}",
                expected,
                bgra.len()
            )));
        }

        let yuv = bgra_to_yuv420(bgra, self.width, self.height);
        let source = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&source)
            .map_err(|e| DualCamError::Encoding(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            is_keyframe,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
    }
}

#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Annex B data (with start codes)
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// BT.601 BGRA to planar YUV420. Chroma is taken from the top-left pixel of
/// each 2x2 block.
pub(crate) fn bgra_to_yuv420(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            let b = bgra[idx] as i32;
            let g = bgra[idx + 1] as i32;
            let r = bgra[idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_to_yuv420_size() {
        let bgra = vec![128u8; 64 * 48 * 4];
        let yuv = bgra_to_yuv420(&bgra, 64, 48);
        assert_eq!(yuv.len(), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_white_maps_to_full_luma() {
        let bgra = vec![255u8; 2 * 2 * 4];
        let yuv = bgra_to_yuv420(&bgra, 2, 2);
        assert_eq!(yuv[0], 235);
        assert_eq!(yuv[4], 128);
        assert_eq!(yuv[5], 128);
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        assert!(H264Encoder::new(641, 480).is_err());
    }

    #[test]
    fn test_encode_frame_starts_with_keyframe() {
        let mut encoder = H264Encoder::new(320, 240).expect("Encoder creation failed");
        let bgra = vec![128u8; 320 * 240 * 4];

        let encoded = encoder.encode_bgra(&bgra).expect("Encoding should succeed");
        assert!(!encoded.data.is_empty());
        assert!(
            encoded.data.starts_with(&[0x00, 0x00, 0x00, 0x01])
                || encoded.data.starts_with(&[0x00, 0x00, 0x01]),
            "Should start with Annex B start code"
        );
        assert!(encoded.is_keyframe);
        assert_eq!(encoder.frame_count(), 1);
    }
}
