use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::artifacts::{ArtifactNaming, IndexedArtifact};
use crate::error::DreamError;
use crate::process::{CommandRunner, Invocation};

pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Concatenates per-step clips into `{name}.mp4` and optionally lays an
/// audio track over the result. Stream copy only, nothing is re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipAssembler {
    ffmpeg: String,
}

impl Default for ClipAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG)
    }
}

impl ClipAssembler {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn merge(
        &self,
        runner: &mut dyn CommandRunner,
        naming: &ArtifactNaming,
        audio: Option<&Path>,
    ) -> Result<PathBuf> {
        let folder = fs::canonicalize(naming.folder()).with_context(|| {
            format!("failed to resolve output folder {}", naming.folder().display())
        })?;
        let naming = ArtifactNaming::new(&folder, naming.name());
        let output = naming.final_video_path();
        let temp_output = naming.temp_video_path();

        remove_if_exists(&output)?;
        remove_if_exists(&temp_output)?;

        let audio = audio
            .map(|audio| {
                fs::canonicalize(audio).map_err(|error| {
                    DreamError::merge(format!("audio file {}: {error}", audio.display()))
                })
            })
            .transpose()?;

        let clips = naming.video_clips()?;
        if clips.is_empty() {
            return Err(DreamError::merge(format!(
                "no clips named {}<N>.mp4 found in {}",
                naming.name(),
                folder.display()
            ))
            .into());
        }

        tracing::info!(clips = clips.len(), "merging clips");
        let mut merged = self.concat(runner, &folder, &clips, &output);
        if merged.is_ok() {
            if let Some(audio) = &audio {
                merged = self.add_audio(runner, &folder, &output, audio, &temp_output);
            }
        }
        if let Err(error) = merged {
            // A failed merge publishes nothing, not even a video-only output.
            for partial in [&temp_output, &output] {
                if let Err(cleanup) = remove_if_exists(partial) {
                    tracing::warn!(error = %cleanup, "failed to remove partial output");
                }
            }
            return Err(error);
        }

        tracing::info!(output = %output.display(), "created final video");
        Ok(output)
    }

    fn concat(
        &self,
        runner: &mut dyn CommandRunner,
        cwd: &Path,
        clips: &[IndexedArtifact],
        output: &Path,
    ) -> Result<()> {
        let mut manifest =
            NamedTempFile::new().context("failed to create concat manifest file")?;
        manifest
            .write_all(manifest_contents(clips).as_bytes())
            .and_then(|()| manifest.flush())
            .context("failed to write concat manifest")?;

        let invocation = concat_invocation(&self.ffmpeg, manifest.path(), output);
        tracing::info!(command = %invocation, "running merge command");
        let result = runner.run(&invocation, cwd);

        if let Err(error) = manifest.close() {
            tracing::warn!(%error, "failed to remove concat manifest");
        }

        check_exit(result, &invocation, "concatenation")
    }

    fn add_audio(
        &self,
        runner: &mut dyn CommandRunner,
        cwd: &Path,
        output: &Path,
        audio: &Path,
        temp_output: &Path,
    ) -> Result<()> {
        let invocation = audio_mux_invocation(&self.ffmpeg, output, audio, temp_output);
        tracing::info!(command = %invocation, "adding audio track");
        let result = runner.run(&invocation, cwd);
        check_exit(result, &invocation, "audio mux")?;

        fs::rename(temp_output, output).with_context(|| {
            format!(
                "failed to replace {} with {}",
                output.display(),
                temp_output.display()
            )
        })
    }
}

/// One `file <absolute path>` line per clip, in the order given.
pub fn manifest_contents(clips: &[IndexedArtifact]) -> String {
    clips
        .iter()
        .map(|clip| format!("file {}\n", clip.path.display()))
        .collect()
}

pub fn concat_invocation(ffmpeg: &str, manifest: &Path, output: &Path) -> Invocation {
    Invocation::new(ffmpeg)
        .args(["-fflags", "+igndts", "-f", "concat", "-safe", "0", "-i"])
        .arg(manifest.to_string_lossy())
        .args(["-c", "copy", "-copytb", "1"])
        .arg(output.to_string_lossy())
}

pub fn audio_mux_invocation(
    ffmpeg: &str,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Invocation {
    Invocation::new(ffmpeg)
        .arg("-i")
        .arg(video.to_string_lossy())
        .arg("-i")
        .arg(audio.to_string_lossy())
        .args(["-map", "0", "-map", "1:a", "-c", "copy", "-shortest"])
        .arg(output.to_string_lossy())
}

fn check_exit(result: Result<i32>, invocation: &Invocation, step: &str) -> Result<()> {
    match result {
        Ok(0) => Ok(()),
        Ok(code) => Err(DreamError::merge(format!(
            "{step} exited with code {code}: {invocation}"
        ))
        .into()),
        Err(error) => Err(DreamError::merge(format!("{step} could not run: {error:#}")).into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!("failed to remove {}", path.display()))
        }
    }
}
