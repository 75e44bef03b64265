//! JPEG frame encoder with a reusable raster buffer.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, instrument, trace};

use streamer_capture::{CaptureDevice, CapturedFrame};

use crate::error::EncoderError;
use crate::{EncodedFrame, EncoderConfig, EncoderResult, JPEG_CONTENT_TYPE};

/// Renders device frames into a raster and serialises them as JPEG.
///
/// The raster is sized to the source and reused across calls; it is only
/// reallocated when the source dimensions change.
pub struct FrameEncoder {
    config: EncoderConfig,
    raster: RgbImage,
    frames_encoded: u64,
}

impl FrameEncoder {
    /// Create a new encoder.
    #[instrument(name = "frame_encoder_new", skip_all)]
    pub fn new(config: EncoderConfig) -> EncoderResult<Self> {
        config.validate()?;
        debug!(
            quality = config.quality,
            fallback_width = config.fallback_width,
            fallback_height = config.fallback_height,
            "Initializing frame encoder"
        );

        Ok(Self {
            config,
            raster: RgbImage::new(0, 0),
            frames_encoded: 0,
        })
    }

    /// Capture the device's latest frame and encode it.
    ///
    /// The raster takes the device's natural size, or the configured fallback
    /// when the device does not report one.
    pub fn encode<D: CaptureDevice + ?Sized>(&mut self, device: &mut D) -> EncoderResult<EncodedFrame> {
        let (width, height) = device
            .dimensions()
            .filter(|&(w, h)| w > 0 && h > 0)
            .unwrap_or((self.config.fallback_width, self.config.fallback_height));

        let frame = device.grab_frame()?;
        self.encode_frame(&frame, width, height)
    }

    /// Render `frame` into a `width`×`height` raster and encode it.
    #[instrument(name = "frame_encode", skip(self, frame), fields(sequence = frame.sequence))]
    pub fn encode_frame(
        &mut self,
        frame: &CapturedFrame,
        width: u32,
        height: u32,
    ) -> EncoderResult<EncodedFrame> {
        self.render(frame, width, height)?;

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.config.quality).encode_image(&self.raster)?;
        self.frames_encoded += 1;

        trace!(bytes = data.len(), width, height, "Frame encoded");

        Ok(EncodedFrame {
            data: Bytes::from(data),
            width,
            height,
            content_type: JPEG_CONTENT_TYPE,
            source_sequence: frame.sequence,
            captured_at: frame.captured_at,
        })
    }

    /// Number of frames encoded by this encoder.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Current raster dimensions.
    pub fn raster_dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    fn render(&mut self, frame: &CapturedFrame, width: u32, height: u32) -> EncoderResult<()> {
        if !frame.is_valid() {
            return Err(EncoderError::InvalidInput(format!(
                "{} bytes for a {}x{} RGB frame",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }
        if width == 0 || height == 0 {
            return Err(EncoderError::Render(format!(
                "cannot render into {width}x{height}"
            )));
        }

        if self.raster.dimensions() != (width, height) {
            debug!(width, height, "Resizing raster");
            self.raster = RgbImage::new(width, height);
        }

        let src = frame.data.as_ref();
        let dst: &mut [u8] = &mut self.raster;

        if (frame.width, frame.height) == (width, height) {
            dst.copy_from_slice(src);
            return Ok(());
        }

        // Nearest-neighbour scale in place; imageops::resize would allocate a new buffer per frame.
        let (src_w, src_h) = (frame.width as usize, frame.height as usize);
        let (dst_w, dst_h) = (width as usize, height as usize);
        for y in 0..dst_h {
            let sy = y * src_h / dst_h;
            for x in 0..dst_w {
                let sx = x * src_w / dst_w;
                let s = (sy * src_w + sx) * 3;
                let d = (y * dst_w + x) * 3;
                dst[d..d + 3].copy_from_slice(&src[s..s + 3]);
            }
        }
        Ok(())
    }
}
