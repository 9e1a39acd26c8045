//! Shader loading, per-stage compilation, and program linking.
//!
//! [`ShaderProgram::create`] mirrors the classic GL flow: read both source
//! files, compile each stage, link them, and report every diagnostic along the
//! way. Compilation goes through naga's GLSL frontend plus its validator; the
//! link step matches fragment inputs to vertex outputs by name, checks uniforms
//! shared between stages agree on their type, and reflects the final uniform
//! blocks so values can be set by name.
//!
//! Errors are reported through `tracing` as they happen and returned to the
//! caller, which decides whether to keep rendering without a program.

mod source;
mod uniforms;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use wgpu::naga;

use self::source::StageSource;

pub use self::uniforms::{
    ScalarType, UniformBlockData, UniformKind, UniformLayout, UniformSet, UniformSlot,
    UniformValue, UniformWrite,
};

/// One compiled shader unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    /// Binding slot (group 0) of the stage's generated uniform block.
    pub(crate) fn uniform_binding(self) -> u32 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
        }
    }

    pub(crate) fn uniform_block_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "QuadshadeVertexParams",
            ShaderStage::Fragment => "QuadshadeFragmentParams",
        }
    }

    pub(crate) fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }

    pub(crate) fn visibility(self) -> wgpu::ShaderStages {
        match self {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to read {stage} shader {path}: {source}")]
    FileRead {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile {stage} shader:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program linking failed:\n{log}")]
    Link { log: String },
}

impl ShaderError {
    /// Stage the error belongs to; `None` for link errors.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            ShaderError::FileRead { stage, .. } | ShaderError::Compile { stage, .. } => {
                Some(*stage)
            }
            ShaderError::Link { .. } => None,
        }
    }
}

/// Locations of the two stage sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self::new("vertex.glsl", "fragment.glsl")
    }
}

/// Final GLSL and uniform layout of one linked stage.
#[derive(Debug, Clone)]
pub struct LinkedStage {
    stage: ShaderStage,
    glsl: String,
    uniforms: Option<UniformLayout>,
}

impl LinkedStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// naga-ready GLSL handed to the GPU backend.
    pub fn glsl(&self) -> &str {
        &self.glsl
    }

    pub fn uniforms(&self) -> Option<&UniformLayout> {
        self.uniforms.as_ref()
    }
}

/// A vertex + fragment pair that compiled and linked.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    paths: ShaderPaths,
    vertex: LinkedStage,
    fragment: LinkedStage,
}

impl ShaderProgram {
    /// Reads, compiles, and links the two stage files.
    ///
    /// An unreadable file short-circuits with [`ShaderError::FileRead`]
    /// before anything is compiled.
    pub fn create(
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let paths = ShaderPaths::new(vertex_path.as_ref(), fragment_path.as_ref());
        let vertex_source = read_source(ShaderStage::Vertex, &paths.vertex)?;
        let fragment_source = read_source(ShaderStage::Fragment, &paths.fragment)?;
        Self::from_sources(paths, &vertex_source, &fragment_source)
    }

    /// Recompiles the program from the same two files.
    pub fn reload(&self) -> Result<Self, ShaderError> {
        Self::create(&self.paths.vertex, &self.paths.fragment)
    }

    /// Compiles and links in-memory sources; `paths` are kept for reloads and
    /// diagnostics.
    pub fn from_sources(
        paths: ShaderPaths,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex = compile_stage(ShaderStage::Vertex, &paths.vertex, vertex_source);
        let fragment = compile_stage(ShaderStage::Fragment, &paths.fragment, fragment_source);

        // The per-stage artefacts only live until the link attempt finishes.
        let linked = match (vertex, fragment) {
            (Ok(vertex), Ok(fragment)) => link(&vertex, &fragment).map_err(|log| {
                error!("program linking failed\n{log}");
                ShaderError::Link { log }
            }),
            (Err(err), _) | (Ok(_), Err(err)) => {
                error!(
                    stage = %err.stage().map_or("program", ShaderStage::label),
                    "program linking skipped: a stage failed to compile"
                );
                Err(err)
            }
        };
        let (vertex, fragment) = linked?;

        info!(
            vertex = %paths.vertex.display(),
            fragment = %paths.fragment.display(),
            "shader program linked"
        );
        Ok(Self {
            paths,
            vertex,
            fragment,
        })
    }

    pub fn paths(&self) -> &ShaderPaths {
        &self.paths
    }

    pub fn vertex(&self) -> &LinkedStage {
        &self.vertex
    }

    pub fn fragment(&self) -> &LinkedStage {
        &self.fragment
    }

    pub fn stages(&self) -> [&LinkedStage; 2] {
        [&self.vertex, &self.fragment]
    }

    /// Fresh staging memory for every uniform block of the program.
    pub fn uniform_set(&self) -> UniformSet {
        UniformSet::new(
            self.stages()
                .into_iter()
                .filter_map(|stage| stage.uniforms().cloned()),
        )
    }
}

fn read_source(stage: ShaderStage, path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| {
        error!(%stage, path = %path.display(), error = %source, "failed to read shader source");
        ShaderError::FileRead {
            stage,
            path: path.to_path_buf(),
            source,
        }
    })
}

struct CompiledStage {
    source: StageSource,
    glsl: String,
    module: naga::Module,
}

fn compile_stage(
    stage: ShaderStage,
    path: &Path,
    text: &str,
) -> Result<CompiledStage, ShaderError> {
    let source = StageSource::parse(stage, text);
    let compiled = emit_with_default_locations(&source).and_then(|glsl| {
        let module = compile_glsl(stage, &glsl)?;
        Ok((glsl, module))
    });

    match compiled {
        Ok((glsl, module)) => {
            debug!(
                %stage,
                path = %path.display(),
                inputs = source.inputs.len(),
                outputs = source.outputs.len(),
                uniforms = source.uniforms.len(),
                "compiled shader stage"
            );
            Ok(CompiledStage {
                source,
                glsl,
                module,
            })
        }
        Err(log) => {
            error!(
                %stage,
                path = %path.display(),
                "failed to compile shader of type {stage}\n{log}"
            );
            Err(ShaderError::Compile { stage, log })
        }
    }
}

fn emit_with_default_locations(source: &StageSource) -> Result<String, String> {
    let inputs = source.default_input_locations()?;
    let outputs = source.default_output_locations()?;
    Ok(source.emit(&inputs, &outputs))
}

/// Parses and validates naga-ready GLSL, returning the rendered diagnostics on
/// failure.
pub(crate) fn compile_glsl(stage: ShaderStage, glsl: &str) -> Result<naga::Module, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.naga());
    let module = frontend
        .parse(&options, glsl)
        .map_err(|errors| errors.emit_to_string(glsl))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|err| err.emit_to_string(glsl))?;

    Ok(module)
}

fn link(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<(LinkedStage, LinkedStage), String> {
    debug_assert_eq!(vertex.source.stage(), ShaderStage::Vertex);
    debug_assert_eq!(fragment.source.stage(), ShaderStage::Fragment);

    let mut problems = Vec::new();

    let vertex_output_locations = vertex.source.default_output_locations()?;
    let mut fragment_input_locations = Vec::with_capacity(fragment.source.inputs.len());
    for input in &fragment.source.inputs {
        let matched = vertex
            .source
            .outputs
            .iter()
            .zip(&vertex_output_locations)
            .find(|(output, _)| output.name == input.name);
        match matched {
            Some((output, &location)) => {
                if output.signature() != input.signature() {
                    problems.push(format!(
                        "varying '{}' is declared as {} in the vertex stage but {} in the fragment stage",
                        input.name,
                        output.signature(),
                        input.signature()
                    ));
                }
                if let Some(explicit) = input.location {
                    if explicit != location {
                        problems.push(format!(
                            "varying '{}' uses location {explicit} in the fragment stage but {location} in the vertex stage",
                            input.name
                        ));
                    }
                }
                fragment_input_locations.push(location);
            }
            None => {
                problems.push(format!(
                    "fragment input '{}' is not written by the vertex stage",
                    input.name
                ));
                fragment_input_locations.push(0);
            }
        }
    }

    for uniform in &fragment.source.uniforms {
        let shared = vertex
            .source
            .uniforms
            .iter()
            .find(|candidate| candidate.base_name() == uniform.base_name());
        if let Some(shared) = shared {
            if shared.ty != uniform.ty || shared.name != uniform.name {
                problems.push(format!(
                    "uniform '{}' is declared as {} {} in the vertex stage but {} {} in the fragment stage",
                    uniform.base_name(),
                    shared.ty,
                    shared.name,
                    uniform.ty,
                    uniform.name
                ));
            }
        }
    }

    if !problems.is_empty() {
        return Err(problems.join("\n"));
    }

    let fragment_glsl = fragment.source.emit(
        &fragment_input_locations,
        &fragment.source.default_output_locations()?,
    );
    let fragment_module = if fragment_glsl == fragment.glsl {
        None
    } else {
        Some(compile_glsl(ShaderStage::Fragment, &fragment_glsl)?)
    };
    let fragment_module = fragment_module.as_ref().unwrap_or(&fragment.module);

    let vertex_stage = LinkedStage {
        stage: ShaderStage::Vertex,
        glsl: vertex.glsl.clone(),
        uniforms: UniformLayout::reflect(&vertex.module, ShaderStage::Vertex),
    };
    let fragment_stage = LinkedStage {
        stage: ShaderStage::Fragment,
        uniforms: UniformLayout::reflect(fragment_module, ShaderStage::Fragment),
        glsl: fragment_glsl,
    };
    Ok((vertex_stage, fragment_stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const VERTEX: &str = r#"#version 330 core
layout (location = 0) in vec3 aPos;
out vec2 uv;
uniform float timeValue;

void main() {
    uv = aPos.xy * 0.5 + 0.5;
    gl_Position = vec4(aPos, 1.0);
}
"#;

    pub(crate) const FRAGMENT: &str = r#"#version 330 core
in vec2 uv;
out vec4 FragColor;

struct Material {
    vec3 ambient;
    vec3 diffuse;
    vec3 specular;
    float shininess;
};

uniform float timeValue;
uniform vec2 windowSize;
uniform Material material;

void main() {
    vec2 p = gl_FragCoord.xy / windowSize;
    FragColor = vec4(material.ambient * uv.x * p.y, sin(timeValue));
}
"#;

    fn paths() -> ShaderPaths {
        ShaderPaths::new("test.vert", "test.frag")
    }

    #[test]
    fn valid_pair_links_and_reflects_uniforms() {
        let program = ShaderProgram::from_sources(paths(), VERTEX, FRAGMENT).expect("link");
        let vertex_uniforms = program.vertex().uniforms().expect("vertex block");
        assert!(vertex_uniforms.slot("timeValue").is_some());
        let fragment_uniforms = program.fragment().uniforms().expect("fragment block");
        assert!(fragment_uniforms.slot("material.shininess").is_some());
        assert!(fragment_uniforms.slot("windowSize").is_some());
        assert_eq!(program.uniform_set().blocks().len(), 2);
    }

    #[test]
    fn vertex_syntax_error_names_vertex_stage() {
        let broken = VERTEX.replace(
            "gl_Position = vec4(aPos, 1.0);",
            "gl_Position = vec4(aPos, 1.0;",
        );
        let err = ShaderProgram::from_sources(paths(), &broken, FRAGMENT).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn fragment_syntax_error_names_fragment_stage() {
        let broken = FRAGMENT.replace("sin(timeValue)", "sin(timeValue");
        let err = ShaderProgram::from_sources(paths(), VERTEX, &broken).unwrap_err();
        match err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_identifier_is_a_compile_error() {
        let broken = FRAGMENT.replace("sin(timeValue)", "sin(notDeclared)");
        let err = ShaderProgram::from_sources(paths(), VERTEX, &broken).unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Fragment));
    }

    #[test]
    fn missing_vertex_output_is_a_link_error() {
        let fragment = FRAGMENT
            .replace("in vec2 uv;", "in vec2 uv;\nin vec3 normal;")
            .replace("uv.x * p.y", "uv.x * p.y * normal");
        let err = ShaderProgram::from_sources(paths(), VERTEX, &fragment).unwrap_err();
        match err {
            ShaderError::Link { log } => assert!(log.contains("normal")),
            other => panic!("expected link error, got {other:?}"),
        }
    }

    #[test]
    fn varying_type_mismatch_is_a_link_error() {
        let vertex = VERTEX
            .replace("out vec2 uv;", "out vec3 uv;")
            .replace("uv = aPos.xy * 0.5 + 0.5;", "uv = aPos * 0.5 + 0.5;");
        let err = ShaderProgram::from_sources(paths(), &vertex, FRAGMENT).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn uniform_type_mismatch_across_stages_is_a_link_error() {
        let vertex = VERTEX
            .replace("uniform float timeValue;", "uniform vec2 timeValue;")
            .replace("uv = aPos.xy * 0.5 + 0.5;", "uv = aPos.xy * timeValue;");
        let err = ShaderProgram::from_sources(paths(), &vertex, FRAGMENT).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn fragment_inputs_follow_vertex_output_locations() {
        let vertex = VERTEX
            .replace("out vec2 uv;", "out vec3 tint;\nout vec2 uv;")
            .replace("uv = aPos.xy", "tint = aPos;\n    uv = aPos.xy");
        let program = ShaderProgram::from_sources(paths(), &vertex, FRAGMENT).expect("link");
        assert!(program
            .fragment()
            .glsl()
            .contains("layout(location = 1) in vec2 uv;"));
    }

    #[test]
    fn helper_between_uniforms_still_compiles() {
        let fragment = r#"#version 330 core
in vec2 uv;
out vec4 FragColor;
uniform float timeValue;
float pulse() { return sin(timeValue); }
uniform vec2 windowSize;

void main() {
    FragColor = vec4(uv * windowSize, pulse(), 1.0);
}
"#;
        let program = ShaderProgram::from_sources(paths(), VERTEX, fragment).expect("link");
        let uniforms = program.fragment().uniforms().expect("fragment block");
        assert!(uniforms.slot("timeValue").is_some());
        assert!(uniforms.slot("windowSize").is_some());
    }

    #[test]
    fn overflowing_location_is_a_vertex_compile_error() {
        let vertex = VERTEX.replace(
            "layout (location = 0) in vec3 aPos;",
            "layout (location = 0) in vec3 aPos;\nlayout(location = 4294967295) in float a;",
        );
        let err = ShaderProgram::from_sources(paths(), &vertex, FRAGMENT).unwrap_err();
        match err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(log.contains("4294967295"), "{log}");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn compile_failure_in_both_stages_reports_vertex_first() {
        let vertex = VERTEX.replace("void main()", "void main(");
        let fragment = FRAGMENT.replace("void main()", "void main(");
        let err = ShaderProgram::from_sources(paths(), &vertex, &fragment).unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Vertex));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = std::env::temp_dir().join("quadshade-missing-shader-test");
        let err = ShaderProgram::create(dir.join("nope.vert"), dir.join("nope.frag")).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::FileRead {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
    }
}
