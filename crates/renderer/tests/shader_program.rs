use std::fs;
use std::path::PathBuf;

use renderer::{ShaderError, ShaderProgram, ShaderStage};
use tempfile::TempDir;

const VERTEX: &str = r#"#version 330 core
layout (location = 0) in vec3 aPos;
out vec2 uv;

void main() {
    uv = aPos.xy * 0.5 + 0.5;
    gl_Position = vec4(aPos, 1.0);
}
"#;

const FRAGMENT: &str = r#"#version 330 core
in vec2 uv;
out vec4 FragColor;

uniform float timeValue;
uniform vec2 windowSize;

void main() {
    FragColor = vec4(uv, 0.5 + 0.5 * sin(timeValue), windowSize.x / windowSize.y);
}
"#;

fn write_pair(dir: &TempDir, vertex: &str, fragment: &str) -> (PathBuf, PathBuf) {
    let vertex_path = dir.path().join("vertex.glsl");
    let fragment_path = dir.path().join("fragment.glsl");
    fs::write(&vertex_path, vertex).unwrap();
    fs::write(&fragment_path, fragment).unwrap();
    (vertex_path, fragment_path)
}

#[test]
fn valid_files_produce_usable_program() {
    let dir = TempDir::new().unwrap();
    let (vertex, fragment) = write_pair(&dir, VERTEX, FRAGMENT);

    let program = ShaderProgram::create(&vertex, &fragment).expect("program links");
    assert_eq!(program.paths().vertex, vertex);
    let uniforms = program.fragment().uniforms().expect("fragment uniforms");
    assert!(uniforms.slot("timeValue").is_some());
    assert!(uniforms.slot("windowSize").is_some());
    assert!(program.vertex().uniforms().is_none());
}

#[test]
fn fragment_syntax_error_is_compile_error_for_fragment() {
    let dir = TempDir::new().unwrap();
    let broken = FRAGMENT.replace("FragColor = vec4(", "FragColor = vec4(;");
    let (vertex, fragment) = write_pair(&dir, VERTEX, &broken);

    let err = ShaderProgram::create(&vertex, &fragment).unwrap_err();
    assert!(matches!(
        err,
        ShaderError::Compile {
            stage: ShaderStage::Fragment,
            ..
        }
    ));
}

#[test]
fn vertex_syntax_error_is_compile_error_for_vertex() {
    let dir = TempDir::new().unwrap();
    let broken = VERTEX.replace("gl_Position = vec4(aPos, 1.0);", "gl_Position = ;");
    let (vertex, fragment) = write_pair(&dir, &broken, FRAGMENT);

    let err = ShaderProgram::create(&vertex, &fragment).unwrap_err();
    assert_eq!(err.stage(), Some(ShaderStage::Vertex));
    assert!(err.to_string().contains("vertex"));
}

#[test]
fn interface_mismatch_is_link_error_only() {
    let dir = TempDir::new().unwrap();
    let fragment_src = FRAGMENT
        .replace("in vec2 uv;", "in vec2 texCoord;")
        .replace("vec4(uv,", "vec4(texCoord,");
    let (vertex, fragment) = write_pair(&dir, VERTEX, &fragment_src);

    let err = ShaderProgram::create(&vertex, &fragment).unwrap_err();
    match err {
        ShaderError::Link { log } => assert!(log.contains("texCoord")),
        other => panic!("expected link error, got {other:?}"),
    }
}

#[test]
fn missing_fragment_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let (vertex, _) = write_pair(&dir, VERTEX, FRAGMENT);
    let missing = dir.path().join("missing.glsl");

    let err = ShaderProgram::create(&vertex, &missing).unwrap_err();
    match err {
        ShaderError::FileRead { stage, path, .. } => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert_eq!(path, missing);
        }
        other => panic!("expected read error, got {other:?}"),
    }
}

#[test]
fn reload_picks_up_edited_source() {
    let dir = TempDir::new().unwrap();
    let (vertex, fragment) = write_pair(&dir, VERTEX, FRAGMENT);
    let program = ShaderProgram::create(&vertex, &fragment).expect("program links");

    let edited = FRAGMENT
        .replace("uniform vec2 windowSize;", "uniform vec2 windowSize;\nuniform float rowValue;")
        .replace("sin(timeValue)", "sin(timeValue + rowValue)");
    fs::write(&fragment, edited).unwrap();

    let reloaded = program.reload().expect("reload links");
    let uniforms = reloaded.fragment().uniforms().expect("fragment uniforms");
    assert!(uniforms.slot("rowValue").is_some());

    fs::write(&fragment, "void main( {").unwrap();
    assert!(matches!(
        reloaded.reload().unwrap_err(),
        ShaderError::Compile {
            stage: ShaderStage::Fragment,
            ..
        }
    ));
}
