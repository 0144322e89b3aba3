//! Frame buffers pushed to image-stream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pixel layout of a streamed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Planar Y, U, V.
    Yuv420,
    /// Y plane followed by interleaved VU.
    Nv21,
    /// Compressed JPEG in a single plane.
    Jpeg,
    /// Packed 8-bit RGB.
    Rgb8,
}

/// One plane of image data.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    /// Raw bytes of the plane.
    pub bytes: Vec<u8>,
    /// Row stride in bytes.
    pub bytes_per_row: u32,
    /// Pixel stride in bytes.
    pub bytes_per_pixel: u32,
}

impl std::fmt::Debug for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("bytes", &self.bytes.len())
            .field("bytes_per_row", &self.bytes_per_row)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .finish()
    }
}

/// A single frame delivered by the driver while an image stream is active.
#[derive(Clone)]
pub struct Frame {
    format: ImageFormat,
    width: u32,
    height: u32,
    planes: Vec<Plane>,
    /// Wall-clock capture time.
    timestamp: DateTime<Utc>,
    /// Monotonic per-stream sequence number.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame with the given parameters.
    pub fn new(
        format: ImageFormat,
        width: u32,
        height: u32,
        planes: Vec<Plane>,
        sequence: u64,
    ) -> Self {
        Self {
            format,
            width,
            height,
            planes,
            timestamp: Utc::now(),
            sequence,
        }
    }

    /// Convenience constructor for a tightly packed single-plane frame.
    pub fn packed(format: ImageFormat, width: u32, height: u32, bytes: Vec<u8>, sequence: u64) -> Self {
        let bytes_per_pixel = match format {
            ImageFormat::Rgb8 => 3,
            _ => 1,
        };
        let plane = Plane {
            bytes,
            bytes_per_row: width * bytes_per_pixel,
            bytes_per_pixel,
        };
        Self::new(format, width, height, vec![plane], sequence)
    }

    /// Returns the pixel layout.
    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the image planes.
    #[inline]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Total payload size across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.bytes.len()).sum()
    }

    /// Checks that every plane holds at least `bytes_per_row * height` bytes.
    ///
    /// Compressed formats carry no stride information and are only checked
    /// for being non-empty.
    pub fn is_valid(&self) -> bool {
        if self.planes.is_empty() {
            return false;
        }
        if self.format == ImageFormat::Jpeg {
            return self.planes.iter().all(|p| !p.bytes.is_empty());
        }
        let rows = self.height as usize;
        self.planes
            .iter()
            .enumerate()
            .all(|(index, plane)| {
                // Chroma planes of subsampled formats carry half the rows.
                let plane_rows = if index == 0 { rows } else { rows.div_ceil(2) };
                plane.bytes.len() >= plane.bytes_per_row as usize * plane_rows
            })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("planes", &self.planes.len())
            .field("bytes", &self.byte_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::packed(ImageFormat::Rgb8, 64, 48, vec![0u8; 64 * 48 * 3], 1);

        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.planes()[0].bytes_per_row, 64 * 3);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = Frame::packed(ImageFormat::Rgb8, 640, 480, vec![0u8; 100], 1);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_yuv_chroma_planes_are_half_height() {
        let luma = Plane {
            bytes: vec![0u8; 8 * 4],
            bytes_per_row: 8,
            bytes_per_pixel: 1,
        };
        let chroma = Plane {
            bytes: vec![0u8; 4 * 2],
            bytes_per_row: 4,
            bytes_per_pixel: 1,
        };
        let frame = Frame::new(
            ImageFormat::Yuv420,
            8,
            4,
            vec![luma, chroma.clone(), chroma],
            7,
        );
        assert!(frame.is_valid());
        assert_eq!(frame.byte_len(), 32 + 8 + 8);
    }
}
