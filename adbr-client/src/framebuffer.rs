//! Framebuffer header parsing and pixel repacking.

use crate::error::ClientError;
use bytes::Buf;

/// Size of the framebuffer stream header.
pub const HEADER_SIZE: usize = 52;

/// Decoded framebuffer metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferMeta {
    pub version: u32,
    pub bpp: u32,
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub red_offset: u32,
    pub red_length: u32,
    pub blue_offset: u32,
    pub blue_length: u32,
    pub green_offset: u32,
    pub green_length: u32,
    pub alpha_offset: u32,
    pub alpha_length: u32,
    /// Channel order of the raw pixel data: `rgb`, `bgr`, `rgba` or `bgra`.
    pub format: String,
}

/// Parses the 52-byte header that precedes the raw pixel data.
///
/// Version 16 identifies the legacy single-format protocol and is rejected.
pub fn parse_header(mut header: &[u8]) -> Result<FramebufferMeta, ClientError> {
    if header.len() < HEADER_SIZE {
        return Err(ClientError::PrematureEof {
            missing: HEADER_SIZE - header.len(),
        });
    }

    let version = header.get_u32_le();
    if version == 16 {
        return Err(ClientError::unexpected(
            b"16",
            "framebuffer version other than 16 (old-style raw images are not supported)",
        ));
    }

    let bpp = header.get_u32_le();
    let size = header.get_u32_le();
    let width = header.get_u32_le();
    let height = header.get_u32_le();
    let red_offset = header.get_u32_le();
    let red_length = header.get_u32_le();
    let blue_offset = header.get_u32_le();
    let blue_length = header.get_u32_le();
    let green_offset = header.get_u32_le();
    let green_length = header.get_u32_le();
    let alpha_offset = header.get_u32_le();
    let alpha_length = header.get_u32_le();

    let mut format = if blue_offset == 0 { "bgr" } else { "rgb" }.to_string();
    if bpp == 32 || alpha_length > 0 {
        format.push('a');
    }

    Ok(FramebufferMeta {
        version,
        bpp,
        size,
        width,
        height,
        red_offset,
        red_length,
        blue_offset,
        blue_length,
        green_offset,
        green_length,
        alpha_offset,
        alpha_length,
        format,
    })
}

/// Repacks raw 24/32 bpp pixels into tightly packed RGB triplets.
///
/// Partial pixels at chunk boundaries are buffered until completed.
pub struct RgbTransform {
    buffer: Vec<u8>,
    r_pos: usize,
    g_pos: usize,
    b_pos: usize,
    pixel_bytes: usize,
}

impl RgbTransform {
    pub fn new(meta: &FramebufferMeta) -> Result<Self, ClientError> {
        if meta.bpp != 24 && meta.bpp != 32 {
            return Err(ClientError::unexpected(
                meta.bpp.to_string(),
                "24 or 32 bits per pixel with 8 bits per color",
            ));
        }
        Ok(Self {
            buffer: Vec::new(),
            r_pos: (meta.red_offset / 8) as usize,
            g_pos: (meta.green_offset / 8) as usize,
            b_pos: (meta.blue_offset / 8) as usize,
            pixel_bytes: (meta.bpp / 8) as usize,
        })
    }

    /// Transforms one chunk of raw pixel data.
    pub fn transform(&mut self, input: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(input);

        let pixels = self.buffer.len() / self.pixel_bytes;
        let mut out = Vec::with_capacity(pixels * 3);
        for pixel in self.buffer.chunks_exact(self.pixel_bytes) {
            out.push(pixel[self.r_pos]);
            out.push(pixel[self.g_pos]);
            out.push(pixel[self.b_pos]);
        }
        self.buffer.drain(..pixels * self.pixel_bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u32, bpp: u32, offsets: [u32; 8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        for v in [version, bpp, 64, 4, 4] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in offsets {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_parse_rgba_header() {
        // red@0, blue@16, green@8, alpha@24, all 8 bits wide
        let meta = parse_header(&header(1, 32, [0, 8, 16, 8, 8, 8, 24, 8])).unwrap();
        assert_eq!(meta.width, 4);
        assert_eq!(meta.height, 4);
        assert_eq!(meta.format, "rgba");
    }

    #[test]
    fn test_parse_bgr_header() {
        let meta = parse_header(&header(1, 24, [16, 8, 0, 8, 8, 8, 0, 0])).unwrap();
        assert_eq!(meta.format, "bgr");
    }

    #[test]
    fn test_version_16_rejected() {
        let err = parse_header(&header(16, 32, [0, 8, 16, 8, 8, 8, 24, 8])).unwrap_err();
        assert!(err.to_string().contains("old-style"));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            parse_header(&[0u8; 20]),
            Err(ClientError::PrematureEof { missing: 32 })
        ));
    }

    #[test]
    fn test_rgb_transform_drops_alpha() {
        let meta = parse_header(&header(1, 32, [0, 8, 16, 8, 8, 8, 24, 8])).unwrap();
        let mut transform = RgbTransform::new(&meta).unwrap();
        // Two RGBA pixels.
        let out = transform.transform(&[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgb_transform_buffers_partial_pixel() {
        let meta = parse_header(&header(1, 32, [0, 8, 16, 8, 8, 8, 24, 8])).unwrap();
        let mut transform = RgbTransform::new(&meta).unwrap();
        assert_eq!(transform.transform(&[9, 8, 7]), Vec::<u8>::new());
        assert_eq!(transform.transform(&[255]), vec![9, 8, 7]);
    }

    #[test]
    fn test_rgb_transform_swizzles_bgra() {
        // blue@0, green@8, red@16
        let meta = parse_header(&header(1, 32, [16, 8, 0, 8, 8, 8, 24, 8])).unwrap();
        assert_eq!(meta.format, "bgra");
        let mut transform = RgbTransform::new(&meta).unwrap();
        assert_eq!(transform.transform(&[30, 20, 10, 0]), vec![10, 20, 30]);
    }

    #[test]
    fn test_rgb_transform_rejects_16bpp() {
        let meta = parse_header(&header(1, 16, [11, 5, 0, 5, 5, 6, 0, 0])).unwrap();
        assert!(RgbTransform::new(&meta).is_err());
    }
}
