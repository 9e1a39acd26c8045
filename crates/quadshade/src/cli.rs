use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use renderer::ReloadTrigger;

#[derive(Parser, Debug)]
#[command(
    name = "quadshade",
    author,
    version,
    about = "Full-screen quad GLSL demo with live shader reloading"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Demo configuration file (TOML).
    #[arg(long, value_name = "FILE", env = "QUADSHADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Vertex shader source (defaults to `vertex.glsl`).
    #[arg(long, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    /// Fragment shader source (defaults to `fragment.glsl`).
    #[arg(long, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Window size, also reported to the shader as `windowSize` (e.g. `820x640`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Window title.
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Present frames without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    /// When holding space reloads shaders: `held` (every frame) or `press` (once).
    #[arg(long, value_name = "MODE", value_parser = parse_reload_trigger)]
    pub reload_on: Option<ReloadTrigger>,

    /// Keep the last working program when a reload fails to compile or link.
    #[arg(long)]
    pub keep_previous_on_error: bool,

    /// Close the demo after this long (`90`, `1m30s`, ...).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Render a single frame to this PNG file instead of opening a window.
    #[arg(long, value_name = "FILE.png", value_parser = parse_capture_path)]
    pub capture: Option<PathBuf>,

    /// Demo time in seconds used for `--capture`.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0, requires = "capture")]
    pub capture_time: f32,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 820x640".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}' in size specification", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}' in size specification", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

pub fn parse_reload_trigger(value: &str) -> Result<ReloadTrigger, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "held" | "hold" | "repeat" => Ok(ReloadTrigger::Held),
        "press" | "once" | "edge" => Ok(ReloadTrigger::Press),
        other => Err(format!(
            "unknown reload trigger '{other}'; expected held or press"
        )),
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let duration = match trimmed.parse::<f64>() {
        Ok(seconds) if seconds.is_nan() || seconds < 0.0 => {
            return Err("duration must be a non-negative number of seconds".to_string())
        }
        Ok(seconds) => Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{trimmed}': {err}"))?,
        Err(_) => humantime::parse_duration(trimmed)
            .map_err(|err| format!("invalid duration '{trimmed}': {err}"))?,
    };

    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

pub fn parse_capture_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(path),
        None => Err("capture path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported capture format '.{other}'; expected .png"
        )),
    }
}
