use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::texture::TextureSource;

pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;
pub const WINDOW_TITLE: &str = "shape scenes";
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Runtime settings. Defaults come from the constants above, `from_env`
/// layers `SCENES_*` variables on top.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Directory holding `shape.vert` / `shape.frag`. Embedded sources are
    /// used when unset.
    pub shader_dir: Option<PathBuf>,
    /// Animate the fragment colour over time.
    pub pulse: bool,
    /// Draw the textured quad in place of the rectangle.
    pub textured: bool,
    /// Image for the textured quad. Setting it implies `textured`; the
    /// generated checker is used without it.
    pub texture: Option<PathBuf>,
    pub frames_in_flight: usize,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            title: WINDOW_TITLE.to_owned(),
            shader_dir: None,
            pulse: false,
            textured: false,
            texture: None,
            frames_in_flight: FRAMES_IN_FLIGHT,
            log_filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidNumber { var: &'static str, value: String },
    ZeroDimension { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{} is not a number: {:?}", var, value)
            }
            ConfigError::ZeroDimension { var } => write!(f, "{} must be greater than zero", var),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("SCENES_WIDTH") {
            config.width = parse_dimension("SCENES_WIDTH", &value)?;
        }
        if let Some(value) = lookup("SCENES_HEIGHT") {
            config.height = parse_dimension("SCENES_HEIGHT", &value)?;
        }
        if let Some(title) = lookup("SCENES_TITLE") {
            config.title = title;
        }
        if let Some(dir) = lookup("SCENES_SHADER_DIR") {
            if !dir.is_empty() {
                config.shader_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(value) = lookup("SCENES_PULSE") {
            config.pulse = is_truthy(&value);
        }
        if let Some(value) = lookup("SCENES_TEXTURED") {
            config.textured = is_truthy(&value);
        }
        if let Some(path) = lookup("SCENES_TEXTURE") {
            if !path.is_empty() {
                config.texture = Some(PathBuf::from(path));
                config.textured = true;
            }
        }
        config.log_filter = lookup("SCENES_LOG");

        Ok(config)
    }

    /// What the textured quad samples, or `None` for the flat rectangle.
    pub fn texture_source(&self) -> Option<TextureSource> {
        if self.textured {
            Some(TextureSource::from_path(self.texture.as_deref()))
        } else {
            None
        }
    }
}

fn parse_dimension(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    let parsed = value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_owned(),
        })?;
    if parsed == 0 {
        return Err(ConfigError::ZeroDimension { var });
    }
    Ok(parsed)
}

fn is_truthy(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        _ => false,
    }
}
