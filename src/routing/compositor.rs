//! Picture-in-picture compositor
//!
//! Draws the full-screen frame at the output size and the inset frame scaled
//! into the inset rectangle. Output buffers come from a small pool; a pooled
//! buffer is reused once every clone handed out has been dropped.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

use super::pip::NormalizedRect;
use crate::buffer::{DevicePosition, FormatDescriptor, PixelFormat, SampleBuffer, SourceId, VideoFormat};
use crate::errors::{DualCamError, Result};

/// Channel order does not matter to resampling, so BGRA frames are viewed
/// as RGBA.
type FrameView<'a> = ImageBuffer<Rgba<u8>, &'a [u8]>;

#[derive(Debug, Default)]
pub struct PipCompositor {
    output_format: Option<VideoFormat>,
    retained_buffer_hint: usize,
    pool: Vec<Arc<[u8]>>,
}

impl PipCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate state for `format` output. Calling again with the same
    /// format is a no-op; a different format discards the old pool.
    pub fn prepare(&mut self, format: VideoFormat, retained_buffer_hint: usize) -> Result<()> {
        if self.output_format == Some(format) {
            return Ok(());
        }
        if format.pixel_format != PixelFormat::Bgra32 || format.width == 0 || format.height == 0 {
            return Err(DualCamError::Compositing(format!(
                "cannot composite {:?} {}x{}",
                format.pixel_format, format.width, format.height
            )));
        }
        if self.output_format.is_some() {
            log::debug!("Compositor output format changed; dropping pool");
        }
        self.pool.clear();
        self.output_format = Some(format);
        self.retained_buffer_hint = retained_buffer_hint.max(1);
        Ok(())
    }

    /// Release pooled buffers and forget the output format.
    pub fn reset(&mut self) {
        self.pool.clear();
        self.output_format = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.output_format.is_some()
    }

    pub fn output_format(&self) -> Option<VideoFormat> {
        self.output_format
    }

    /// Buffers currently held by the pool.
    pub fn retained_buffer_count(&self) -> usize {
        self.pool.len()
    }

    /// Blend `inset` into `full_screen`. Returns `None` when unprepared, on a
    /// non-video or non-BGRA input, or when every pooled buffer is still in
    /// use.
    pub fn mix(
        &mut self,
        full_screen: &SampleBuffer,
        inset: &SampleBuffer,
        inset_rect: NormalizedRect,
        full_screen_is_secondary: bool,
    ) -> Option<SampleBuffer> {
        let Some(output) = self.output_format else {
            log::debug!("Compositor not prepared; dropping frame");
            return None;
        };
        let full_format = bgra_format(full_screen)?;
        let inset_format = bgra_format(inset)?;

        let index = self.acquire(output)?;
        let Some(target) = Arc::get_mut(&mut self.pool[index]) else {
            return None;
        };

        if let Err(e) = render(target, output, full_screen, full_format, inset, inset_format, inset_rect) {
            log::warn!("Unable to combine video: {}", e);
            return None;
        }

        let primary = if full_screen_is_secondary {
            DevicePosition::Front
        } else {
            DevicePosition::Back
        };
        match SampleBuffer::new(
            SourceId::Camera(primary),
            full_screen.pts(),
            FormatDescriptor::Video(output),
            self.pool[index].clone(),
        ) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                log::warn!("Unable to wrap composite: {}", e);
                None
            }
        }
    }

    /// Index of a pooled buffer nobody else references, growing the pool up
    /// to the retained-buffer hint.
    fn acquire(&mut self, output: VideoFormat) -> Option<usize> {
        if let Some(index) = self.pool.iter().position(|b| Arc::strong_count(b) == 1) {
            return Some(index);
        }
        if self.pool.len() < self.retained_buffer_hint {
            self.pool.push(vec![0u8; output.frame_size()].into());
            return Some(self.pool.len() - 1);
        }
        log::warn!(
            "All {} composite buffers still in use; dropping frame",
            self.pool.len()
        );
        None
    }
}

fn bgra_format(buffer: &SampleBuffer) -> Option<VideoFormat> {
    match buffer.format().video() {
        Some(format) if format.pixel_format == PixelFormat::Bgra32 => Some(*format),
        _ => {
            log::warn!("Cannot composite {} buffer {:?}", buffer.source(), buffer.format());
            None
        }
    }
}

fn view<'a>(buffer: &'a SampleBuffer, format: VideoFormat) -> Result<FrameView<'a>> {
    ImageBuffer::from_raw(format.width, format.height, buffer.payload()).ok_or_else(|| {
        DualCamError::Compositing(format!("{} payload too small", buffer.source()))
    })
}

fn render(
    target: &mut [u8],
    output: VideoFormat,
    full_screen: &SampleBuffer,
    full_format: VideoFormat,
    inset: &SampleBuffer,
    inset_format: VideoFormat,
    inset_rect: NormalizedRect,
) -> Result<()> {
    if full_format.width == output.width && full_format.height == output.height {
        target.copy_from_slice(full_screen.payload());
    } else {
        let scaled = imageops::resize(
            &view(full_screen, full_format)?,
            output.width,
            output.height,
            FilterType::Triangle,
        );
        target.copy_from_slice(scaled.as_raw());
    }

    let Some(px) = inset_rect.to_pixels(output.width, output.height) else {
        return Ok(());
    };
    let scaled_inset = imageops::resize(
        &view(inset, inset_format)?,
        px.width,
        px.height,
        FilterType::Triangle,
    );

    let mut canvas: ImageBuffer<Rgba<u8>, &mut [u8]> =
        ImageBuffer::from_raw(output.width, output.height, target)
            .ok_or_else(|| DualCamError::Compositing("output buffer too small".to_string()))?;
    imageops::replace(&mut canvas, &scaled_inset, px.x as i64, px.y as i64);
    Ok(())
}
