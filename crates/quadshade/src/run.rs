//! Resolves the demo settings (built-in defaults, then the config file, then
//! CLI overrides) and launches the renderer.

use std::path::Path;

use anyhow::{Context, Result};
use democonfig::{DemoConfig, ReloadErrorSetting, ReloadTriggerSetting};
use renderer::{
    BeatTiming, DemoSettings, Material, ReloadPolicy, ReloadTrigger, Renderer, ShaderPaths,
    WindowSize,
};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;

pub fn initialise_tracing() {
    let default_filter = "warn,quadshade=info,renderer=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let settings = resolve_settings(&config, &args);
    tracing::debug!(?settings, "resolved demo settings");

    let renderer = Renderer::new(settings);
    if let Some(path) = &args.capture {
        return renderer
            .capture(args.capture_time, path)
            .with_context(|| format!("failed to capture frame to {}", path.display()));
    }

    tracing::info!(
        vertex = %renderer.settings().shaders.vertex.display(),
        fragment = %renderer.settings().shaders.fragment.display(),
        "starting demo"
    );
    renderer.run().context("demo window failed")
}

fn load_config(path: Option<&Path>) -> Result<DemoConfig> {
    match path {
        Some(path) => {
            let config = DemoConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded demo config");
            Ok(config)
        }
        None => Ok(DemoConfig::default()),
    }
}

fn resolve_settings(config: &DemoConfig, args: &RunArgs) -> DemoSettings {
    let (width, height) = args
        .size
        .unwrap_or((config.window.width, config.window.height));

    let shaders = ShaderPaths::new(
        args.vertex
            .clone()
            .unwrap_or_else(|| config.shaders.vertex.clone()),
        args.fragment
            .clone()
            .unwrap_or_else(|| config.shaders.fragment.clone()),
    );

    let reload_trigger = args
        .reload_on
        .unwrap_or(match config.shaders.reload_trigger {
            ReloadTriggerSetting::Held => ReloadTrigger::Held,
            ReloadTriggerSetting::Press => ReloadTrigger::Press,
        });

    let reload_policy = if args.keep_previous_on_error {
        ReloadPolicy::KeepPrevious
    } else {
        match config.shaders.on_reload_error {
            ReloadErrorSetting::Replace => ReloadPolicy::Replace,
            ReloadErrorSetting::KeepPrevious => ReloadPolicy::KeepPrevious,
        }
    };

    DemoSettings {
        title: args
            .title
            .clone()
            .unwrap_or_else(|| config.window.title.clone()),
        window_size: WindowSize::new(width, height),
        shaders,
        vsync: config.window.vsync && !args.no_vsync,
        clear_color: config.render.clear_color,
        material: Material {
            ambient: config.material.ambient,
            diffuse: config.material.diffuse,
            specular: config.material.specular,
            shininess: config.material.shininess,
        },
        timing: BeatTiming {
            bpm: config.timing.bpm,
            rows_per_beat: config.timing.rows_per_beat,
        },
        reload_trigger,
        reload_policy,
        duration: args.duration.or(config.render.duration),
    }
}
