use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::artifacts::{ArtifactNaming, SCRATCH_IMAGE, SCRATCH_VIDEO};
use crate::assemble::ClipAssembler;
use crate::chain::{nearest_before, resolve_seed};
use crate::command::{GenerationJob, Generator};
use crate::config::DreamConfig;
use crate::error::DreamError;
use crate::process::CommandRunner;
use crate::script::LogicalLine;

pub const DEFAULT_OUTPUT_FOLDER: &str = "dream-outputs";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_folder: PathBuf,
    pub force: bool,
    /// Generator cwd; its scratch image and video appear here.
    pub work_dir: PathBuf,
    pub generator: Generator,
    pub config: Option<DreamConfig>,
    pub audio: Option<PathBuf>,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(output_folder: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            force: false,
            work_dir: work_dir.into(),
            generator: Generator::default(),
            config: None,
            audio: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub index: usize,
    pub duration_seconds: u32,
    pub seed_frame: Option<String>,
    pub command: Vec<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub output_folder: String,
    pub dry_run: bool,
    pub jobs: Vec<JobRecord>,
    pub final_video: Option<String>,
}

pub struct DreamRun<'a> {
    options: RunOptions,
    naming: ArtifactNaming,
    runner: &'a mut dyn CommandRunner,
    assembler: ClipAssembler,
    prepared: bool,
}

impl<'a> DreamRun<'a> {
    pub fn new(
        options: RunOptions,
        runner: &'a mut dyn CommandRunner,
        assembler: ClipAssembler,
    ) -> Result<Self> {
        let naming = ArtifactNaming::for_output_folder(&options.output_folder)?;
        Ok(Self {
            options,
            naming,
            runner,
            assembler,
            prepared: false,
        })
    }

    pub fn with_config(mut self, config: Option<DreamConfig>) -> Self {
        self.options.config = config;
        self
    }

    /// Checks the output folder: reused only with `force`, created otherwise.
    pub fn prepare_output_folder(&mut self) -> Result<()> {
        let folder = &self.options.output_folder;
        if folder.is_dir() {
            if !self.options.force {
                return Err(DreamError::OutputFolderExists {
                    path: folder.clone(),
                }
                .into());
            }
            tracing::info!(folder = %folder.display(), "using existing output folder");
        } else if !self.options.dry_run {
            fs::create_dir_all(folder)
                .with_context(|| format!("failed to create output folder {}", folder.display()))?;
        }
        self.prepared = true;
        Ok(())
    }

    /// Runs every step in order, then merges the clips.
    pub fn execute(&mut self, lines: &[LogicalLine]) -> Result<RunSummary> {
        if !self.prepared {
            self.prepare_output_folder()?;
        }

        let mut jobs = Vec::with_capacity(lines.len());
        let mut planned = Vec::new();
        for line in lines {
            let record = self.run_step(line, &planned)?;
            if self.options.dry_run {
                planned.push(line.index);
            }
            jobs.push(record);
        }

        let final_video = if self.options.dry_run {
            None
        } else {
            let output = self.assembler.merge(
                &mut *self.runner,
                &self.naming,
                self.options.audio.as_deref(),
            )?;
            Some(output.to_string_lossy().into_owned())
        };

        Ok(RunSummary {
            output_folder: self.options.output_folder.to_string_lossy().into_owned(),
            dry_run: self.options.dry_run,
            jobs,
            final_video,
        })
    }

    fn run_step(&mut self, line: &LogicalLine, planned: &[usize]) -> Result<JobRecord> {
        let mut job = GenerationJob::parse_line(&line.text)?;
        job.append_options(&line.global_options);
        job.seed_frame = self.seed_for(line.index, planned)?;
        if let Some(config) = self.options.config.as_ref() {
            job.apply_config(config.video()?)?;
        }
        let invocation = job.render(&self.options.generator)?;

        let mut record = JobRecord {
            index: line.index,
            duration_seconds: job.duration_seconds,
            seed_frame: job
                .seed_frame
                .as_deref()
                .map(|path| path.to_string_lossy().into_owned()),
            command: std::iter::once(invocation.program.clone())
                .chain(invocation.args.iter().cloned())
                .collect(),
            image: None,
            video: None,
        };

        if self.options.dry_run {
            println!("[dry-run] {invocation}");
            return Ok(record);
        }

        tracing::info!(step = line.index, command = %invocation, "running generator");
        let exit_code = self
            .runner
            .run(&invocation, &self.options.work_dir)
            .with_context(|| format!("failed to run generation job {}", line.index))?;
        if exit_code != 0 {
            return Err(DreamError::GenerationJobFailed {
                index: line.index,
                exit_code,
                invocation: invocation.to_string(),
            }
            .into());
        }

        let (image, video) = self.collect_artifacts(line.index)?;
        tracing::info!(
            step = line.index,
            image = %image.display(),
            video = %video.display(),
            "generated step artifacts"
        );
        record.image = Some(image.to_string_lossy().into_owned());
        record.video = Some(video.to_string_lossy().into_owned());
        Ok(record)
    }

    /// Seeds come from disk. A dry run also counts the steps it would have
    /// produced so the printed chain matches a real run.
    fn seed_for(&self, step_index: usize, planned: &[usize]) -> Result<Option<PathBuf>> {
        if planned.is_empty() {
            return resolve_seed(step_index, &self.naming);
        }
        let mut indices = self.naming.image_indices()?;
        indices.extend_from_slice(planned);
        indices.sort_unstable();
        indices.dedup();
        Ok(nearest_before(&indices, step_index).map(|index| self.naming.image_path(index)))
    }

    /// Copies the generator's scratch output under this step's index. The
    /// scratch files stay in place for the next step to overwrite.
    fn collect_artifacts(&self, index: usize) -> Result<(PathBuf, PathBuf)> {
        let image = self.naming.image_path(index);
        let video = self.naming.video_path(index);
        copy_artifact(&self.options.work_dir.join(SCRATCH_IMAGE), &image)?;
        copy_artifact(&self.options.work_dir.join(SCRATCH_VIDEO), &video)?;
        Ok((image, video))
    }
}

fn copy_artifact(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)
        .map(|_| ())
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))
}
