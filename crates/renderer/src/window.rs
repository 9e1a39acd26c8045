use std::sync::Arc;

use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::gpu::{GpuState, ReloadOutcome};
use crate::input::{FrameControl, InputHandler, KeyboardState, Viewport};
use crate::runtime::{LoopPhase, Timeline, TimeSource};
use crate::types::{DemoSettings, RenderError};

/// Everything the event loop closure owns between frames.
struct WindowState {
    window: Arc<Window>,
    gpu: GpuState,
    keyboard: KeyboardState,
    input: InputHandler,
    timeline: Timeline,
    phase: LoopPhase,
}

/// Applies input actions to the window state for one poll.
struct LoopControl<'a> {
    gpu: &'a mut GpuState,
    close_requested: bool,
    reloads: usize,
}

impl FrameControl for LoopControl<'_> {
    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn reload_program(&mut self) {
        self.reloads += 1;
        if self.gpu.reload_program() != ReloadOutcome::Activated {
            debug!("reload did not produce a new program");
        }
    }
}

impl WindowState {
    fn new(window: Arc<Window>, settings: &DemoSettings) -> Result<Self, RenderError> {
        let gpu = GpuState::new(window.clone(), settings)?;
        Ok(Self {
            window,
            gpu,
            keyboard: KeyboardState::default(),
            input: InputHandler::new(settings.reload_trigger),
            timeline: Timeline::new(settings.timing, settings.duration),
            phase: LoopPhase::Init,
        })
    }

    /// Polls input once; returns `false` once the loop should stop.
    fn poll_input(&mut self) -> bool {
        let mut control = LoopControl {
            gpu: &mut self.gpu,
            close_requested: false,
            reloads: 0,
        };
        self.input.poll(&self.keyboard, &mut control);
        if control.reloads > 0 {
            debug!(reloads = control.reloads, "processed reload input");
        }
        !control.close_requested
    }

    fn terminate(&mut self, reason: &str) {
        if self.phase != LoopPhase::Terminated {
            info!(reason, "closing demo window");
            self.phase = LoopPhase::Terminated;
        }
    }

    /// One iteration of the running loop.
    fn frame(&mut self) {
        if !self.phase.is_running() {
            return;
        }
        if !self.poll_input() {
            self.terminate("escape pressed");
            return;
        }
        if self.timeline.finished() {
            self.terminate("run duration elapsed");
            return;
        }

        match self.gpu.render(self.timeline.sample()) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.recover_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory; exiting");
                self.terminate("surface out of memory");
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
            }
            Err(other) => {
                warn!("surface error: {other:?}; retrying next frame");
            }
        }
    }
}

/// Opens the demo window and drives frames until it is closed.
pub(crate) fn run(settings: &DemoSettings) -> Result<(), RenderError> {
    let event_loop = EventLoop::new()
        .map_err(|err| RenderError::WindowInit(format!("failed to create event loop: {err}")))?;
    let size = settings.window_size;
    let window = WindowBuilder::new()
        .with_title(settings.title.clone())
        .with_inner_size(PhysicalSize::new(size.width, size.height))
        .build(&event_loop)
        .map_err(|err| RenderError::WindowInit(format!("failed to create window: {err}")))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, settings)?;
    state.phase = LoopPhase::Running;
    info!(
        width = size.width,
        height = size.height,
        program = state.gpu.has_program(),
        "demo running"
    );
    state.window.request_redraw();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                            state.terminate("window closed");
                        }
                        WindowEvent::KeyboardInput { event, .. } => {
                            state.keyboard.handle_event(&event);
                        }
                        WindowEvent::Focused(false) => {
                            state.keyboard.clear();
                        }
                        WindowEvent::Resized(new_size) => {
                            let viewport = Viewport::from_size(new_size.width, new_size.height);
                            debug!(?viewport, "window resized");
                            state.gpu.resize(viewport);
                        }
                        WindowEvent::ScaleFactorChanged {
                            mut inner_size_writer,
                            ..
                        } => {
                            let viewport = state.gpu.viewport();
                            let size = PhysicalSize::new(viewport.width, viewport.height);
                            let _ = inner_size_writer.request_inner_size(size);
                        }
                        WindowEvent::RedrawRequested => {
                            state.frame();
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    if state.phase.is_running() {
                        state.window.request_redraw();
                    }
                }
                _ => {}
            }

            if state.phase == LoopPhase::Terminated {
                elwt.exit();
            }
        })
        .map_err(|err| RenderError::WindowInit(format!("event loop error: {err}")))
}
