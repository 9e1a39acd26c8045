use std::fs;

use image::RgbaImage;
use renderer::{render_offscreen, DemoSettings, RenderError, ShaderPaths, WindowSize};
use tempfile::TempDir;

const VERTEX: &str = r#"#version 330 core
layout (location = 0) in vec3 aPos;
void main() {
    gl_Position = vec4(aPos, 1.0);
}
"#;

const SOLID_FRAGMENT: &str = r#"#version 330 core
out vec4 FragColor;
uniform vec2 windowSize;
void main() {
    FragColor = vec4(1.0, 0.0, windowSize.x / 64.0, 1.0);
}
"#;

fn settings_for(dir: &TempDir, vertex: &str, fragment: &str) -> DemoSettings {
    let shaders = ShaderPaths::new(
        dir.path().join("vertex.glsl"),
        dir.path().join("fragment.glsl"),
    );
    fs::write(&shaders.vertex, vertex).unwrap();
    fs::write(&shaders.fragment, fragment).unwrap();
    DemoSettings {
        window_size: WindowSize::new(64, 32),
        shaders,
        ..DemoSettings::default()
    }
}

/// Renders offscreen, or returns `None` when the machine has no usable adapter.
fn render_or_skip(settings: &DemoSettings) -> Option<RgbaImage> {
    match render_offscreen(settings, 0.0) {
        Ok(image) => Some(image),
        Err(RenderError::GpuInit(reason)) => {
            eprintln!("skipping offscreen test: {reason}");
            None
        }
        Err(other) => panic!("offscreen render failed: {other}"),
    }
}

#[test]
fn solid_shader_covers_every_pixel() {
    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir, VERTEX, SOLID_FRAGMENT);
    let Some(image) = render_or_skip(&settings) else {
        return;
    };

    assert_eq!(image.dimensions(), (64, 32));
    for pixel in image.pixels() {
        assert_eq!(pixel.0, [255, 0, 255, 255]);
    }
}

#[test]
fn half_size_quad_leaves_clear_colour_around_it() {
    let dir = TempDir::new().unwrap();
    let vertex = VERTEX.replace("vec4(aPos, 1.0)", "vec4(aPos * 0.5, 1.0)");
    let settings = settings_for(&dir, &vertex, SOLID_FRAGMENT);
    let Some(image) = render_or_skip(&settings) else {
        return;
    };

    for (x, y) in [(0, 0), (63, 0), (0, 31), (63, 31)] {
        assert_eq!(image.get_pixel(x, y).0, [0, 0, 0, 255], "corner {x},{y}");
    }
    assert_eq!(image.get_pixel(32, 16).0, [255, 0, 255, 255]);
}

#[test]
fn oversized_capture_is_an_error() {
    let dir = TempDir::new().unwrap();
    let settings = DemoSettings {
        window_size: WindowSize::new(100_000, 1),
        ..settings_for(&dir, VERTEX, SOLID_FRAGMENT)
    };

    match render_offscreen(&settings, 0.0) {
        Err(RenderError::GpuInit(reason)) => eprintln!("skipping offscreen test: {reason}"),
        Err(RenderError::Capture(reason)) => assert!(reason.contains("100000x1"), "{reason}"),
        other => panic!("expected capture error, got {other:?}"),
    }
}

#[test]
fn broken_shader_is_reported_not_rendered() {
    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir, VERTEX, "void main() { undefinedCall(); }\n");

    // Shaders are compiled before any GPU work, so this holds without an adapter.
    match render_offscreen(&settings, 0.0) {
        Err(RenderError::Shader(err)) => assert!(err.stage().is_some()),
        other => panic!("expected shader error, got {other:?}"),
    }
}
