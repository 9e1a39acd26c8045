use crate::runtime::TimeSample;
use crate::shader::UniformValue;
use crate::types::{Material, WindowSize};

pub(crate) const TIME_VALUE: &str = "timeValue";
pub(crate) const WINDOW_SIZE: &str = "windowSize";
pub(crate) const ROW_VALUE: &str = "rowValue";
pub(crate) const MATERIAL_AMBIENT: &str = "material.ambient";
pub(crate) const MATERIAL_DIFFUSE: &str = "material.diffuse";
pub(crate) const MATERIAL_SPECULAR: &str = "material.specular";
pub(crate) const MATERIAL_SHININESS: &str = "material.shininess";

/// Values pushed into the active program before every draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameUniforms {
    pub time: f32,
    pub row: f32,
    pub window_size: WindowSize,
    pub material: Material,
}

impl FrameUniforms {
    pub fn new(sample: TimeSample, window_size: WindowSize, material: Material) -> Self {
        Self {
            time: sample.seconds,
            row: sample.row,
            window_size,
            material,
        }
    }

    /// Name/value pairs in upload order.
    pub fn values(&self) -> [(&'static str, UniformValue); 7] {
        [
            (TIME_VALUE, UniformValue::Float(self.time)),
            (WINDOW_SIZE, UniformValue::Vec2(self.window_size.as_vec2())),
            (MATERIAL_AMBIENT, UniformValue::Vec3(self.material.ambient)),
            (MATERIAL_DIFFUSE, UniformValue::Vec3(self.material.diffuse)),
            (MATERIAL_SPECULAR, UniformValue::Vec3(self.material.specular)),
            (MATERIAL_SHININESS, UniformValue::Float(self.material.shininess)),
            (ROW_VALUE, UniformValue::Float(self.row)),
        ]
    }

    /// Writes every value through `set`; returns how many the program accepted.
    pub fn apply(&self, mut set: impl FnMut(&str, UniformValue) -> bool) -> usize {
        self.values()
            .into_iter()
            .filter(|(name, value)| set(name, *value))
            .count()
    }
}
