use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadTriggerSetting {
    /// Recompile on every frame the reload key is down.
    #[default]
    Held,
    /// Recompile once per key press.
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadErrorSetting {
    #[default]
    Replace,
    KeepPrevious,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub shaders: ShaderSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub material: MaterialSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "Graffathon2017Demo".to_string(),
            width: 820,
            height: 640,
            vsync: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderSection {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub reload_trigger: ReloadTriggerSetting,
    pub on_reload_error: ReloadErrorSetting,
}

impl Default for ShaderSection {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("vertex.glsl"),
            fragment: PathBuf::from("fragment.glsl"),
            reload_trigger: ReloadTriggerSetting::default(),
            on_reload_error: ReloadErrorSetting::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub duration: Option<Duration>,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            duration: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub bpm: f32,
    pub rows_per_beat: u32,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            bpm: 150.0,
            rows_per_beat: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaterialSection {
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
}

impl Default for MaterialSection {
    fn default() -> Self {
        Self {
            ambient: [1.0, 0.5, 0.31],
            diffuse: [1.0, 0.5, 0.31],
            specular: [0.5, 0.5, 0.5],
            shininess: 32.0,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            window: WindowSection::default(),
            shaders: ShaderSection::default(),
            render: RenderSection::default(),
            timing: TimingSection::default(),
            material: MaterialSection::default(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl DemoConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: DemoConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a configuration file. Relative shader paths are kept
    /// as written; they resolve against the working directory like the
    /// built-in `vertex.glsl`/`fragment.glsl` defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero (got {}x{})",
                self.window.width, self.window.height
            )));
        }

        if self.shaders.vertex.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "shaders.vertex must not be empty".into(),
            ));
        }

        if self.shaders.fragment.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "shaders.fragment must not be empty".into(),
            ));
        }

        if !(self.timing.bpm.is_finite() && self.timing.bpm > 0.0) {
            return Err(ConfigError::Invalid("timing.bpm must be > 0".into()));
        }

        if self.timing.rows_per_beat == 0 {
            return Err(ConfigError::Invalid(
                "timing.rows_per_beat must be > 0".into(),
            ));
        }

        if self.material.shininess < 0.0 {
            return Err(ConfigError::Invalid(
                "material.shininess must be >= 0".into(),
            ));
        }

        if let Some(duration) = self.render.duration {
            if duration.is_zero() {
                return Err(ConfigError::Invalid(
                    "render.duration must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }
}
