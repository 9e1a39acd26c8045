//! GPU side of the demo.
//!
//! - `context` owns the wgpu instance/adapter/device and the window surface.
//! - `geometry` uploads the full-screen quad once.
//! - `program` turns a linked `ShaderProgram` into a render pipeline with
//!   per-stage uniform buffers.
//! - `uniforms` lists the per-frame values pushed into the program by name.
//! - `state` glues everything together for the window (`GpuState`) and holds
//!   the reload slot.
//! - `capture` renders one frame offscreen and saves it.

mod capture;
mod context;
mod geometry;
mod program;
mod state;
mod uniforms;

pub use capture::{capture_frame, render_offscreen};
pub(crate) use state::{GpuState, ReloadOutcome};
