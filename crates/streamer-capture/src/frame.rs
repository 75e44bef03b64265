//! Captured frame types.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Packed RGB24 pixel data, row-major.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Wall-clock time the device produced the frame.
    pub captured_at: DateTime<Utc>,

    /// Monotonically increasing device frame counter.
    pub sequence: u64,
}

impl CapturedFrame {
    /// Create a new captured frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        captured_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            captured_at,
            sequence,
        }
    }

    /// Calculate expected RGB24 buffer size for given dimensions.
    pub fn rgb24_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Validate that the frame data matches expected dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::rgb24_buffer_size(self.width, self.height)
    }
}
