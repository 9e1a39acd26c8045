//! Renderer crate for quadshade, a full-screen quad shader demo.
//!
//! The crate compiles a GLSL vertex/fragment pair, draws a quad covering the
//! window, and feeds the shader its uniforms every frame:
//!
//! ```text
//!   quadshade CLI
//!          │ DemoSettings
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ frame()
//!                                                │
//!                  InputHandler::poll ◀──────────┤
//!                  (escape / space reload)       └─▶ uniforms ─▶ draw ─▶ present
//! ```
//!
//! Shader sources go through [`ShaderProgram`], which reports compile and link
//! diagnostics per stage. A broken shader never stops the demo: the window keeps
//! clearing to the configured colour until a reload succeeds.

pub mod gpu;
pub mod input;
pub mod runtime;
pub mod shader;
pub mod types;
mod window;

use std::path::Path;

pub use gpu::{capture_frame, render_offscreen};
pub use input::{FrameControl, InputHandler, KeyStateSource, KeyboardState, Viewport};
pub use runtime::{LoopPhase, TimeSample, Timeline};
pub use shader::{ShaderError, ShaderPaths, ShaderProgram, ShaderStage};
pub use types::{
    BeatTiming, DemoSettings, Material, ReloadPolicy, ReloadTrigger, RenderError, WindowSize,
};

/// Entry point that owns the demo settings.
pub struct Renderer {
    settings: DemoSettings,
}

impl Renderer {
    pub fn new(settings: DemoSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DemoSettings {
        &self.settings
    }

    /// Opens the window and runs until Escape, a window close, or the
    /// configured duration ends.
    ///
    /// Only window and GPU initialisation failures are returned; shader errors
    /// are logged and rendering continues without a program.
    pub fn run(&self) -> Result<(), RenderError> {
        window::run(&self.settings)
    }

    /// Renders a single frame at `seconds` without opening a window and writes
    /// it to `path` as PNG.
    pub fn capture(&self, seconds: f32, path: &Path) -> Result<(), RenderError> {
        capture_frame(&self.settings, seconds, path)
    }
}
