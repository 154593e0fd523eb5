use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{DreamError, DreamResult};

pub const DEFAULT_CONFIG_PATH: &str = "config/tiktok.yaml";

pub const FRAME_RATE_KEY: &str = "frame-rate";
pub const WIDTH_KEY: &str = "width";
pub const HEIGHT_KEY: &str = "height";
pub const SAVE_EVERY_KEY: &str = "save-every-freq";
pub const EXTRA_OPTIONS_KEY: &str = "extra-options";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DreamConfig {
    #[serde(default)]
    pub video: Option<VideoConfig>,
}

impl DreamConfig {
    pub fn video(&self) -> DreamResult<&VideoConfig> {
        self.video
            .as_ref()
            .ok_or_else(|| DreamError::config_field("video", "section is missing"))
    }
}

/// Raw `video` section. Values stay untyped until first use so a bad field
/// is reported when a job needs it, not when the file is read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct VideoConfig {
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub save_every: u32,
    pub extra_options: Option<String>,
}

impl VideoConfig {
    pub fn settings(&self) -> DreamResult<VideoSettings> {
        Ok(VideoSettings {
            frame_rate: self.integer(FRAME_RATE_KEY)?,
            width: self.integer(WIDTH_KEY)?,
            height: self.integer(HEIGHT_KEY)?,
            save_every: self.integer(SAVE_EVERY_KEY)?,
            extra_options: self.extra_options()?,
        })
    }

    /// Reads a required integer field. Numeric strings are accepted.
    pub fn integer(&self, key: &str) -> DreamResult<u32> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| DreamError::config_field(key, "missing required field"))?;
        match value {
            Value::Number(number) => number
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| {
                    DreamError::config_field(
                        key,
                        format!("expected a non-negative integer, got {number}"),
                    )
                }),
            Value::String(text) => text.trim().parse::<u32>().map_err(|_| {
                DreamError::config_field(key, format!("expected an integer, got '{text}'"))
            }),
            other => Err(DreamError::config_field(
                key,
                format!("expected an integer, got {}", describe_value(other)),
            )),
        }
    }

    pub fn extra_options(&self) -> DreamResult<Option<String>> {
        match self.fields.get(EXTRA_OPTIONS_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(other) => Err(DreamError::config_field(
                EXTRA_OPTIONS_KEY,
                format!("expected a string, got {}", describe_value(other)),
            )),
        }
    }
}

pub fn load_config(path: &Path) -> Result<DreamConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&text, path)
}

pub fn parse_config(text: &str, path: &Path) -> Result<DreamConfig> {
    if text.trim().is_empty() {
        return Ok(DreamConfig::default());
    }
    serde_yaml::from_str(text).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse config yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })
}

/// Resolves which config to use. An explicit path must exist; the default
/// path is optional and falls back to the job defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, DreamConfig)>> {
    if let Some(path) = explicit {
        let config = load_config(path)?;
        return Ok(Some((path.to_path_buf(), config)));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if !default_path.is_file() {
        return Ok(None);
    }
    let config = load_config(&default_path)?;
    Ok(Some((default_path, config)))
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
