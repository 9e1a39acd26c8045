use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use winit::window::Window;

use crate::input::Viewport;
use crate::types::WindowSize;

/// Device and queue shared by the windowed and offscreen paths.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        })
    }

    fn with_adapter(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
        label: &'static str,
    ) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter,
        })
    }

    /// Device without a presentation surface, for offscreen rendering.
    pub(crate) fn headless() -> Result<Self> {
        Self::with_adapter(Self::instance(), None, "quadshade offscreen device")
    }

    /// Creates the device together with a surface for `window`.
    pub(crate) fn for_window(
        window: Arc<Window>,
        size: WindowSize,
        vsync: bool,
    ) -> Result<(Self, WindowSurface)> {
        let instance = Self::instance();
        let surface = instance
            .create_surface(window)
            .context("failed to create rendering surface")?;
        let context = Self::with_adapter(instance, Some(&surface), "quadshade device")?;

        let max_dimension = context.adapter.limits().max_texture_dimension_2d;
        if size.width > max_dimension || size.height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {}x{}",
                size.width,
                size.height
            );
        }

        let surface = WindowSurface::new(&context, surface, size, vsync);
        Ok((context, surface))
    }
}

/// Swapchain state for the demo window.
pub(crate) struct WindowSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl WindowSurface {
    fn new(
        context: &GpuContext,
        surface: wgpu::Surface<'static>,
        size: WindowSize,
        vsync: bool,
    ) -> Self {
        let caps = surface.get_capabilities(&context.adapter);

        // Shader output is written as-is, like a GL default framebuffer.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                let fallback = caps.formats[0];
                tracing::warn!(
                    ?fallback,
                    "no linear (non-sRGB) surface format available; falling back to {:?}",
                    fallback
                );
                fallback
            });

        let present_mode = select_present_mode(&caps.present_modes, vsync);
        tracing::debug!(?present_mode, vsync, ?format, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &config);

        Self { surface, config }
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(crate) fn viewport(&self) -> Viewport {
        Viewport::from_size(self.config.width, self.config.height)
    }

    /// Reconfigures the swapchain to `viewport`. Empty viewports (minimised
    /// windows) leave the current configuration in place.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, viewport: Viewport) {
        if viewport.is_empty() {
            return;
        }
        self.config.width = viewport.width;
        self.config.height = viewport.height;
        self.surface.configure(device, &self.config);
    }

    pub(crate) fn reconfigure(&self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
    }
}

/// Fifo is the swap-interval-1 mode. Without vsync prefer Immediate, then
/// Mailbox, then whatever is left.
pub(crate) fn select_present_mode(
    available: &[wgpu::PresentMode],
    vsync: bool,
) -> wgpu::PresentMode {
    let find = |wanted: wgpu::PresentMode| available.iter().copied().find(|mode| *mode == wanted);
    let fifo = find(wgpu::PresentMode::Fifo).unwrap_or(wgpu::PresentMode::Fifo);
    if vsync {
        return fifo;
    }
    find(wgpu::PresentMode::Immediate)
        .or_else(|| find(wgpu::PresentMode::Mailbox))
        .unwrap_or(fifo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_uses_fifo() {
        let modes = [wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(&modes, true), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn no_vsync_prefers_immediate_then_mailbox() {
        let all = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];
        assert_eq!(select_present_mode(&all, false), wgpu::PresentMode::Immediate);
        let no_immediate = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox];
        assert_eq!(
            select_present_mode(&no_immediate, false),
            wgpu::PresentMode::Mailbox
        );
        let fifo_only = [wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(&fifo_only, false), wgpu::PresentMode::Fifo);
    }
}
