//! Renders a single frame without a window and reads it back.

use std::path::Path;
use std::sync::mpsc;

use image::RgbaImage;
use tracing::info;

use crate::input::Viewport;
use crate::runtime::{FixedTimeSource, TimeSource};
use crate::shader::ShaderProgram;
use crate::types::{DemoSettings, RenderError, WindowSize};

use super::context::GpuContext;
use super::geometry::QuadGeometry;
use super::program::GpuProgram;
use super::state::encode_frame;
use super::uniforms::FrameUniforms;

const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const BYTES_PER_PIXEL: u32 = 4;

/// Row geometry of the readback buffer for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CaptureLayout {
    size: WindowSize,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl CaptureLayout {
    /// Checks `size` against the device limits before any GPU object exists.
    fn new(size: WindowSize, limits: &wgpu::Limits) -> Result<Self, RenderError> {
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::Capture(format!(
                "capture size {}x{} is empty",
                size.width, size.height
            )));
        }
        let max = limits.max_texture_dimension_2d;
        if size.width > max || size.height > max {
            return Err(RenderError::Capture(format!(
                "capture size {}x{} exceeds the GPU limit of {max}x{max}",
                size.width, size.height
            )));
        }

        let too_large = || {
            RenderError::Capture(format!(
                "capture size {}x{} needs a readback buffer larger than the GPU allows",
                size.width, size.height
            ))
        };
        let unpadded_bytes_per_row = size
            .width
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or_else(too_large)?;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .checked_next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            .ok_or_else(too_large)?;
        let layout = Self {
            size,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        };
        if layout.buffer_size() > limits.max_buffer_size {
            return Err(too_large());
        }
        Ok(layout)
    }

    fn buffer_size(&self) -> u64 {
        u64::from(self.padded_bytes_per_row) * u64::from(self.size.height)
    }
}

/// Draws the configured shader pair at `seconds` into an offscreen texture of
/// the configured window size.
pub fn render_offscreen(settings: &DemoSettings, seconds: f32) -> Result<RgbaImage, RenderError> {
    let linked = ShaderProgram::create(&settings.shaders.vertex, &settings.shaders.fragment)?;
    let context =
        GpuContext::headless().map_err(|err| RenderError::GpuInit(format!("{err:#}")))?;
    let layout = CaptureLayout::new(settings.window_size, &context.device.limits())?;

    let mut program = GpuProgram::new(&context.device, &linked, CAPTURE_FORMAT)?;
    let sample = FixedTimeSource::new(seconds, settings.timing).sample();
    FrameUniforms::new(sample, settings.window_size, settings.material)
        .apply(|name, value| program.set_uniform(name, value));
    program.upload(&context.queue);

    render_frame(&context, layout, settings.clear_color, Some(&program))
}

fn render_frame(
    context: &GpuContext,
    layout: CaptureLayout,
    clear_color: [f32; 4],
    program: Option<&GpuProgram>,
) -> Result<RgbaImage, RenderError> {
    let device = &context.device;
    let size = layout.size;
    let geometry = QuadGeometry::new(device);

    let extent = wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("capture target"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: CAPTURE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("capture readback"),
        size: layout.buffer_size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("capture encoder"),
    });
    encode_frame(
        &mut encoder,
        &view,
        clear_color,
        Viewport::from_size(size.width, size.height),
        &geometry,
        program,
    );
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.padded_bytes_per_row),
                rows_per_image: Some(size.height),
            },
        },
        extent,
    );
    context.queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| RenderError::Capture(format!("device poll failed: {err}")))?;
    receiver
        .recv()
        .map_err(|_| RenderError::Capture("readback callback was dropped".into()))?
        .map_err(|err| RenderError::Capture(format!("failed to map readback buffer: {err}")))?;

    let mapped = slice.get_mapped_range();
    let row_bytes = layout.unpadded_bytes_per_row as usize;
    let mut pixels = Vec::with_capacity(row_bytes * size.height as usize);
    for row in mapped.chunks_exact(layout.padded_bytes_per_row as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    drop(mapped);
    readback.unmap();

    RgbaImage::from_raw(size.width, size.height, pixels)
        .ok_or_else(|| RenderError::Capture("readback size does not match the image".into()))
}

/// Renders one frame at `seconds` and writes it to `path` as PNG.
pub fn capture_frame(
    settings: &DemoSettings,
    seconds: f32,
    path: &Path,
) -> Result<(), RenderError> {
    let image = render_offscreen(settings, seconds)?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|err| {
            RenderError::Capture(format!("failed to write {}: {err}", path.display()))
        })?;
    info!(path = %path.display(), seconds, "frame captured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_pads_rows_to_copy_alignment() {
        let limits = wgpu::Limits::default();
        let exact = CaptureLayout::new(WindowSize::new(64, 32), &limits).unwrap();
        assert_eq!(exact.unpadded_bytes_per_row, 256);
        assert_eq!(exact.padded_bytes_per_row, 256);

        let padded = CaptureLayout::new(WindowSize::new(65, 2), &limits).unwrap();
        assert_eq!(padded.unpadded_bytes_per_row, 260);
        assert_eq!(padded.padded_bytes_per_row, 512);
        assert_eq!(padded.buffer_size(), 1024);
    }

    #[test]
    fn layout_rejects_sizes_the_device_cannot_hold() {
        let limits = wgpu::Limits::default();
        for size in [
            WindowSize::new(100_000, 1),
            WindowSize::new(1, u32::MAX),
            WindowSize::new(0, 16),
        ] {
            assert!(matches!(
                CaptureLayout::new(size, &limits),
                Err(RenderError::Capture(_))
            ));
        }

        let tight = wgpu::Limits {
            max_buffer_size: 1024,
            ..wgpu::Limits::default()
        };
        assert!(CaptureLayout::new(WindowSize::new(64, 32), &tight).is_err());
    }

    #[test]
    fn frame_without_program_is_clear_colour_only() {
        let context = match GpuContext::headless() {
            Ok(context) => context,
            Err(err) => {
                eprintln!("skipping clear-colour test: {err:#}");
                return;
            }
        };
        let layout = CaptureLayout::new(WindowSize::new(8, 4), &context.device.limits()).unwrap();
        let image = render_frame(&context, layout, [0.0, 0.0, 1.0, 1.0], None).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
        assert!(image.pixels().all(|pixel| pixel.0 == [0, 0, 255, 255]));
    }
}
