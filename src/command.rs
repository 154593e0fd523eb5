use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::VideoConfig;
use crate::error::{DreamError, DreamResult};
use crate::process::Invocation;

pub const DEFAULT_DIMENSIONS: (u32, u32) = (380, 380);
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_SAVE_EVERY: u32 = 3;
pub const DEFAULT_RUNTIME: &str = "python";
pub const DEFAULT_GENERATOR_SCRIPT: &str = "generate.py";

/// The external generator: `<runtime> <script> -vid ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub runtime: String,
    pub script: PathBuf,
}

impl Generator {
    pub fn new(runtime: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            script: script.into(),
        }
    }

    pub fn base_invocation(&self) -> Invocation {
        Invocation::new(self.runtime.clone())
            .arg(self.script.to_string_lossy())
            .arg("-vid")
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME, DEFAULT_GENERATOR_SCRIPT)
    }
}

/// One script step: a single generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub command_body: String,
    pub duration_seconds: u32,
    pub seed_frame: Option<PathBuf>,
    pub dimensions: (u32, u32),
    pub frame_rate: u32,
    /// Every n'th iteration is saved as a video frame.
    pub save_every: u32,
}

impl GenerationJob {
    pub fn new(duration_seconds: u32, command_body: impl Into<String>) -> Self {
        Self {
            command_body: command_body.into().trim().to_owned(),
            duration_seconds,
            seed_frame: None,
            dimensions: DEFAULT_DIMENSIONS,
            frame_rate: DEFAULT_FRAME_RATE,
            save_every: DEFAULT_SAVE_EVERY,
        }
    }

    /// Parses `<digits><rest>`: digits are the clip length in seconds, the
    /// rest is passed to the generator untouched.
    pub fn parse_line(line: &str) -> DreamResult<Self> {
        static LINE_RE: OnceLock<Regex> = OnceLock::new();
        let pattern = LINE_RE.get_or_init(|| {
            Regex::new(r"^(?P<duration>[0-9]+)(?P<body>.*)$")
                .expect("command line regex should compile")
        });
        let trimmed = line.trim();
        let captures = pattern.captures(trimmed).ok_or_else(|| {
            DreamError::invalid_command(trimmed, "expected a leading duration in seconds")
        })?;

        let duration_seconds = captures["duration"].parse::<u32>().map_err(|_| {
            DreamError::invalid_command(trimmed, "duration does not fit in 32 bits")
        })?;

        Ok(Self::new(duration_seconds, &captures["body"]))
    }

    pub fn append_options(&mut self, extra: &str) {
        let extra = extra.trim();
        if extra.is_empty() {
            return;
        }
        if !self.command_body.is_empty() {
            self.command_body.push(' ');
        }
        self.command_body.push_str(extra);
    }

    pub fn apply_config(&mut self, config: &VideoConfig) -> DreamResult<()> {
        let settings = config.settings()?;
        self.frame_rate = settings.frame_rate;
        self.dimensions = (settings.width, settings.height);
        self.save_every = settings.save_every;
        if let Some(extra) = settings.extra_options.as_deref() {
            self.append_options(extra);
        }
        Ok(())
    }

    pub fn with_seed_frame(mut self, seed: Option<PathBuf>) -> Self {
        self.seed_frame = seed;
        self
    }

    pub fn iterations(&self) -> u64 {
        u64::from(self.frame_rate)
            .saturating_mul(u64::from(self.duration_seconds))
            .saturating_mul(u64::from(self.save_every))
    }

    /// Builds the generator invocation. Flag order is part of the contract
    /// with the generator and must not change.
    pub fn render(&self, generator: &Generator) -> DreamResult<Invocation> {
        let options = split_option_words(&self.command_body)
            .map_err(|reason| DreamError::invalid_command(&self.command_body, reason))?;

        let mut invocation = generator
            .base_invocation()
            .args(options)
            .arg("-i")
            .arg(self.iterations().to_string())
            .arg("-se")
            .arg(self.save_every.to_string())
            .arg("-vl")
            .arg(self.duration_seconds.to_string());

        if let Some(seed) = self.seed_frame.as_deref() {
            invocation = invocation.arg("-ii").arg(path_arg(seed));
        }

        Ok(invocation
            .arg("-s")
            .arg(self.dimensions.0.to_string())
            .arg(self.dimensions.1.to_string()))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Splits option text into words the way a POSIX shell would for quotes and
/// backslashes, without any expansion.
pub fn split_option_words(text: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(String::from("unterminated single quote")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\' | '$' | '`')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(String::from("unterminated double quote")),
                        },
                        Some(other) => current.push(other),
                        None => return Err(String::from("unterminated double quote")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => current.push('\\'),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}
