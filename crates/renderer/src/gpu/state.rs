use std::sync::Arc;

use tracing::{info, trace, warn};
use winit::window::Window;

use crate::input::Viewport;
use crate::runtime::TimeSample;
use crate::shader::ShaderPaths;
use crate::types::{DemoSettings, Material, ReloadPolicy, RenderError, WindowSize};

use super::context::{GpuContext, WindowSurface};
use super::geometry::QuadGeometry;
use super::program::GpuProgram;
use super::uniforms::FrameUniforms;

/// Holds the active program, if any. Reloads swap the value in place and drop
/// the previous program afterwards.
#[derive(Debug)]
pub(crate) struct ProgramSlot<P> {
    active: Option<P>,
}

/// What a reload did to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadOutcome {
    Activated,
    /// The failed reload left the slot empty.
    Cleared,
    /// The failed reload was discarded and the previous program kept.
    KeptPrevious,
}

impl<P> ProgramSlot<P> {
    pub fn new(active: Option<P>) -> Self {
        Self { active }
    }

    pub fn active(&self) -> Option<&P> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut P> {
        self.active.as_mut()
    }

    /// Applies a reload result according to `policy`.
    pub fn install<E>(&mut self, result: Result<P, E>, policy: ReloadPolicy) -> ReloadOutcome {
        let (next, outcome) = match (result, policy) {
            (Ok(program), _) => (Some(program), ReloadOutcome::Activated),
            (Err(_), ReloadPolicy::KeepPrevious) if self.active.is_some() => {
                return ReloadOutcome::KeptPrevious;
            }
            (Err(_), _) => (None, ReloadOutcome::Cleared),
        };
        let previous = std::mem::replace(&mut self.active, next);
        drop(previous);
        outcome
    }
}

/// Records one frame into `view`: clear, then draw the quad with `program`
/// when there is one.
pub(crate) fn encode_frame(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    clear_color: [f32; 4],
    viewport: Viewport,
    geometry: &QuadGeometry,
    program: Option<&GpuProgram>,
) {
    let [r, g, b, a] = clear_color.map(f64::from);
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("frame pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });

    let Some(program) = program else {
        return;
    };
    if viewport.is_empty() {
        return;
    }
    pass.set_viewport(
        viewport.x as f32,
        viewport.y as f32,
        viewport.width as f32,
        viewport.height as f32,
        0.0,
        1.0,
    );
    program.use_in(&mut pass);
    geometry.draw(&mut pass);
}

/// GPU resources of the demo window.
pub(crate) struct GpuState {
    context: GpuContext,
    surface: WindowSurface,
    geometry: QuadGeometry,
    slot: ProgramSlot<GpuProgram>,
    shaders: ShaderPaths,
    reload_policy: ReloadPolicy,
    clear_color: [f32; 4],
    window_size: WindowSize,
    material: Material,
}

impl GpuState {
    pub(crate) fn new(window: Arc<Window>, settings: &DemoSettings) -> Result<Self, RenderError> {
        let (context, surface) =
            GpuContext::for_window(window, settings.window_size, settings.vsync)
                .map_err(|err| RenderError::GpuInit(format!("{err:#}")))?;
        let geometry = QuadGeometry::new(&context.device);

        // A broken program at startup is not fatal; frames show the clear colour.
        let initial = GpuProgram::load(&context.device, &settings.shaders, surface.format());
        let slot = ProgramSlot::new(initial.ok());
        if slot.active().is_some() {
            info!("shader program ready");
        } else {
            warn!("starting without a usable shader program; press space to retry");
        }

        Ok(Self {
            context,
            surface,
            geometry,
            slot,
            shaders: settings.shaders.clone(),
            reload_policy: settings.reload_policy,
            clear_color: settings.clear_color,
            window_size: settings.window_size,
            material: settings.material,
        })
    }

    pub(crate) fn viewport(&self) -> Viewport {
        self.surface.viewport()
    }

    pub(crate) fn has_program(&self) -> bool {
        self.slot.active().is_some()
    }

    pub(crate) fn resize(&mut self, viewport: Viewport) {
        self.surface.resize(&self.context.device, viewport);
    }

    /// Reconfigures the surface after it was lost or became outdated.
    pub(crate) fn recover_surface(&mut self) {
        self.surface.reconfigure(&self.context.device);
    }

    /// Recompiles the shader pair from disk and installs the result. Compile
    /// and link diagnostics have already been logged when this returns.
    pub(crate) fn reload_program(&mut self) -> ReloadOutcome {
        let result = GpuProgram::load(&self.context.device, &self.shaders, self.surface.format());
        let outcome = self.slot.install(result, self.reload_policy);
        match outcome {
            ReloadOutcome::Activated => info!("shader program reloaded"),
            ReloadOutcome::Cleared => warn!("reload failed; rendering without a shader program"),
            ReloadOutcome::KeptPrevious => warn!("reload failed; keeping previous shader program"),
        }
        outcome
    }

    pub(crate) fn render(&mut self, sample: TimeSample) -> Result<(), wgpu::SurfaceError> {
        let frame = self.surface.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = FrameUniforms::new(sample, self.window_size, self.material);
        if let Some(program) = self.slot.active_mut() {
            uniforms.apply(|name, value| program.set_uniform(name, value));
            program.upload(&self.context.queue);
        }

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        encode_frame(
            &mut encoder,
            &view,
            self.clear_color,
            self.viewport(),
            &self.geometry,
            self.slot.active(),
        );
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();

        trace!(
            time = sample.seconds,
            row = sample.row,
            frame = sample.frame_index,
            "frame presented"
        );
        Ok(())
    }
}
