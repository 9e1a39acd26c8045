//! Name-based uniform access on top of std140 blocks.
//!
//! The rewritten stages carry one anonymous uniform block each. After naga has
//! laid the block out we flatten its struct members into dotted names
//! (`material.ambient`) so the render loop can keep addressing uniforms by name
//! the way `glGetUniformLocation` would, and write values into a CPU staging
//! copy that is uploaded once per frame.

use std::collections::BTreeMap;

use tracing::trace;
use wgpu::naga;

use super::ShaderStage;

/// Scalar component type of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Float,
    Int,
    Uint,
    Bool,
}

/// Shape of a reflected uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Scalar(ScalarType),
    Vector(ScalarType, u8),
    Matrix { columns: u8, rows: u8 },
    /// Arrays and other members that cannot be written by name.
    Unsupported,
}

/// A value pushed into a program by uniform name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Scalar(ScalarType::Float),
            Self::Vec2(_) => UniformKind::Vector(ScalarType::Float, 2),
            Self::Vec3(_) => UniformKind::Vector(ScalarType::Float, 3),
        }
    }

    fn write(&self, dst: &mut [u8]) {
        match self {
            Self::Float(value) => dst[..4].copy_from_slice(bytemuck::bytes_of(value)),
            Self::Vec2(value) => dst[..8].copy_from_slice(bytemuck::cast_slice(value)),
            Self::Vec3(value) => dst[..12].copy_from_slice(bytemuck::cast_slice(value)),
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            Self::Float(_) => 4,
            Self::Vec2(_) => 8,
            Self::Vec3(_) => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Reflected layout of a stage's uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    stage: ShaderStage,
    size: u64,
    slots: BTreeMap<String, UniformSlot>,
}

impl UniformLayout {
    /// Finds the stage's uniform block in a validated module. Returns `None`
    /// when the stage declares no uniforms.
    pub(crate) fn reflect(module: &naga::Module, stage: ShaderStage) -> Option<Self> {
        let binding = stage.uniform_binding();
        let (_, variable) = module.global_variables.iter().find(|(_, variable)| {
            variable.space == naga::AddressSpace::Uniform
                && variable
                    .binding
                    .as_ref()
                    .is_some_and(|rb| rb.group == 0 && rb.binding == binding)
        })?;

        let naga::TypeInner::Struct { ref members, span } = module.types[variable.ty].inner else {
            return None;
        };

        let mut slots = BTreeMap::new();
        for member in members {
            if let Some(name) = &member.name {
                flatten(module, member.ty, name.clone(), member.offset, &mut slots);
            }
        }

        // Uniform buffers are bound in 16 byte granules.
        let size = u64::from(span).max(16).next_multiple_of(16);
        Some(Self { stage, size, slots })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Size in bytes of the backing uniform buffer.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }
}

fn flatten(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    name: String,
    offset: u32,
    slots: &mut BTreeMap<String, UniformSlot>,
) {
    let kind = match module.types[ty].inner {
        naga::TypeInner::Struct { ref members, .. } => {
            for member in members {
                if let Some(member_name) = &member.name {
                    flatten(
                        module,
                        member.ty,
                        format!("{name}.{member_name}"),
                        offset + member.offset,
                        slots,
                    );
                }
            }
            return;
        }
        naga::TypeInner::Scalar(scalar) => scalar_type(scalar)
            .map(UniformKind::Scalar)
            .unwrap_or(UniformKind::Unsupported),
        naga::TypeInner::Vector { size, scalar } => scalar_type(scalar)
            .map(|scalar| UniformKind::Vector(scalar, size as u8))
            .unwrap_or(UniformKind::Unsupported),
        naga::TypeInner::Matrix { columns, rows, .. } => UniformKind::Matrix {
            columns: columns as u8,
            rows: rows as u8,
        },
        _ => UniformKind::Unsupported,
    };
    slots.insert(name, UniformSlot { offset, kind });
}

fn scalar_type(scalar: naga::Scalar) -> Option<ScalarType> {
    match scalar.kind {
        naga::ScalarKind::Float if scalar.width == 4 => Some(ScalarType::Float),
        naga::ScalarKind::Sint => Some(ScalarType::Int),
        naga::ScalarKind::Uint => Some(ScalarType::Uint),
        naga::ScalarKind::Bool => Some(ScalarType::Bool),
        _ => None,
    }
}

/// Outcome of writing a named uniform into one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformWrite {
    Written,
    /// The program has no uniform with that name (GL location `-1`).
    Missing,
    TypeMismatch { expected: UniformKind },
}

/// CPU staging copy of one stage's uniform block.
#[derive(Debug, Clone)]
pub struct UniformBlockData {
    layout: UniformLayout,
    bytes: Vec<u8>,
    dirty: bool,
}

impl UniformBlockData {
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0u8; layout.size() as usize];
        Self {
            layout,
            bytes,
            dirty: true,
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> UniformWrite {
        let Some(slot) = self.layout.slot(name) else {
            return UniformWrite::Missing;
        };
        if slot.kind != value.kind() {
            return UniformWrite::TypeMismatch { expected: slot.kind };
        }
        let start = slot.offset as usize;
        let end = start + value.byte_len();
        if end > self.bytes.len() {
            return UniformWrite::TypeMismatch { expected: slot.kind };
        }
        value.write(&mut self.bytes[start..end]);
        self.dirty = true;
        UniformWrite::Written
    }

    /// Returns the staged bytes if they changed since the last call.
    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if self.dirty {
            self.dirty = false;
            Some(&self.bytes)
        } else {
            None
        }
    }
}

/// All uniform blocks of a linked program, addressed by uniform name.
#[derive(Debug, Clone, Default)]
pub struct UniformSet {
    blocks: Vec<UniformBlockData>,
}

impl UniformSet {
    pub fn new(layouts: impl IntoIterator<Item = UniformLayout>) -> Self {
        Self {
            blocks: layouts.into_iter().map(UniformBlockData::new).collect(),
        }
    }

    /// Writes `value` into every stage that declares `name`. Returns `true`
    /// when at least one stage accepted it; unknown names are ignored.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        let mut written = false;
        for block in &mut self.blocks {
            match block.set(name, value) {
                UniformWrite::Written => written = true,
                UniformWrite::Missing => {}
                UniformWrite::TypeMismatch { expected } => {
                    trace!(
                        uniform = name,
                        stage = %block.layout().stage(),
                        ?expected,
                        provided = ?value.kind(),
                        "ignoring uniform write with mismatched type"
                    );
                }
            }
        }
        written
    }

    pub fn blocks(&self) -> &[UniformBlockData] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [UniformBlockData] {
        &mut self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::compile_glsl;

    fn fragment_layout(source: &str) -> UniformLayout {
        let module = compile_glsl(ShaderStage::Fragment, source).expect("valid shader");
        UniformLayout::reflect(&module, ShaderStage::Fragment).expect("uniform block")
    }

    const MATERIAL_SHADER: &str = r#"#version 450 core
struct Material {
    vec3 ambient;
    vec3 diffuse;
    vec3 specular;
    float shininess;
};
layout(std140, set = 0, binding = 1) uniform QuadshadeFragmentParams { float timeValue; vec2 windowSize; Material material; };
layout(location = 0) out vec4 FragColor;
void main() {
    FragColor = vec4(material.ambient * timeValue, windowSize.x);
}
"#;

    #[test]
    fn reflects_std140_offsets_with_dotted_names() {
        let layout = fragment_layout(MATERIAL_SHADER);
        assert_eq!(layout.slot("timeValue").unwrap().offset, 0);
        assert_eq!(layout.slot("windowSize").unwrap().offset, 8);
        assert_eq!(layout.slot("material.ambient").unwrap().offset, 16);
        assert_eq!(layout.slot("material.shininess").unwrap().offset, 60);
        assert_eq!(
            layout.slot("material.specular").unwrap().kind,
            UniformKind::Vector(ScalarType::Float, 3)
        );
        assert!(layout.slot("material").is_none());
        assert_eq!(layout.size() % 16, 0);
        assert!(layout.size() >= 64);
    }

    #[test]
    fn block_data_writes_little_endian_values() {
        let mut block = UniformBlockData::new(fragment_layout(MATERIAL_SHADER));
        assert_eq!(block.set("timeValue", UniformValue::Float(2.5)), UniformWrite::Written);
        assert_eq!(
            block.set("material.ambient", UniformValue::Vec3([1.0, 0.5, 0.25])),
            UniformWrite::Written
        );
        let bytes = block.take_dirty().expect("pending upload");
        assert_eq!(&bytes[0..4], &2.5f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &0.25f32.to_le_bytes());
    }

    #[test]
    fn unknown_and_mistyped_uniforms_are_rejected() {
        let mut block = UniformBlockData::new(fragment_layout(MATERIAL_SHADER));
        assert_eq!(block.set("rowValue", UniformValue::Float(1.0)), UniformWrite::Missing);
        assert!(matches!(
            block.set("windowSize", UniformValue::Float(1.0)),
            UniformWrite::TypeMismatch { .. }
        ));
    }

    #[test]
    fn dirty_flag_tracks_pending_upload() {
        let mut block = UniformBlockData::new(fragment_layout(MATERIAL_SHADER));
        assert!(block.take_dirty().is_some());
        assert!(block.take_dirty().is_none());
        block.set("timeValue", UniformValue::Float(1.0));
        assert!(block.take_dirty().is_some());
    }

    #[test]
    fn set_reports_whether_any_stage_accepted() {
        let mut set = UniformSet::new([fragment_layout(MATERIAL_SHADER)]);
        assert!(set.set("timeValue", UniformValue::Float(0.5)));
        assert!(!set.set("doesNotExist", UniformValue::Float(0.5)));
    }
}
