use std::time::Duration;

use crate::shader::{ShaderError, ShaderPaths};

/// Fixed window dimensions used for the window and for `windowSize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_vec2(self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(820, 640)
    }
}

/// Lighting constants handed to the fragment stage as `material.*`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [1.0, 0.5, 0.31],
            diffuse: [1.0, 0.5, 0.31],
            specular: [0.5, 0.5, 0.5],
            shininess: 32.0,
        }
    }
}

/// Music timing used to derive the tracker row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTiming {
    pub bpm: f32,
    pub rows_per_beat: u32,
}

impl BeatTiming {
    /// Tracker rows per second.
    pub fn row_rate(&self) -> f64 {
        f64::from(self.bpm) / 60.0 * f64::from(self.rows_per_beat)
    }
}

impl Default for BeatTiming {
    fn default() -> Self {
        Self {
            bpm: 150.0,
            rows_per_beat: 8,
        }
    }
}

/// When holding the reload key triggers a recompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadTrigger {
    /// Every frame the key is down reloads the program.
    #[default]
    Held,
    /// Only the frame the key goes down reloads the program.
    Press,
}

/// What happens to the active program when a reload fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// The failed result replaces the active program; frames show only the
    /// clear colour until the next successful reload.
    #[default]
    Replace,
    /// The last good program keeps rendering.
    KeepPrevious,
}

/// Everything the renderer needs to open the window and drive the demo.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSettings {
    pub title: String,
    pub window_size: WindowSize,
    pub shaders: ShaderPaths,
    pub vsync: bool,
    pub clear_color: [f32; 4],
    pub material: Material,
    pub timing: BeatTiming,
    pub reload_trigger: ReloadTrigger,
    pub reload_policy: ReloadPolicy,
    /// Close the window once this much time has passed.
    pub duration: Option<Duration>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            title: "Graffathon2017Demo".to_string(),
            window_size: WindowSize::default(),
            shaders: ShaderPaths::default(),
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            material: Material::default(),
            timing: BeatTiming::default(),
            reload_trigger: ReloadTrigger::default(),
            reload_policy: ReloadPolicy::default(),
            duration: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create window: {0}")]
    WindowInit(String),
    #[error("failed to initialise GPU: {0}")]
    GpuInit(String),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("failed to capture frame: {0}")]
    Capture(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_constants() {
        let settings = DemoSettings::default();
        assert_eq!(settings.window_size, WindowSize::new(820, 640));
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(settings.vsync);
        assert_eq!(settings.reload_trigger, ReloadTrigger::Held);
        assert_eq!(settings.reload_policy, ReloadPolicy::Replace);
        assert_eq!(settings.material.shininess, 32.0);
    }

    #[test]
    fn default_row_rate_is_twenty_rows_per_second() {
        assert!((BeatTiming::default().row_rate() - 20.0).abs() < 1e-9);
    }
}
