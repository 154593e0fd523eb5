use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::error::DreamError;

/// Scratch files the generator overwrites on every run, relative to its cwd.
pub const SCRATCH_IMAGE: &str = "output.png";
pub const SCRATCH_VIDEO: &str = "output.mp4";

pub const IMAGE_EXT: &str = ".png";
pub const VIDEO_EXT: &str = ".mp4";

/// Per-step artifacts live in the output folder as `{name}{index}{ext}`,
/// where `name` is the folder's own file name. The directory listing is the
/// only record of which steps have completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    folder: PathBuf,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedArtifact {
    pub index: usize,
    pub path: PathBuf,
}

impl ArtifactNaming {
    pub fn new(folder: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }

    pub fn for_output_folder(folder: &Path) -> Result<Self> {
        let name = folder
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "output folder {} has no usable file name to prefix artifacts with",
                    folder.display()
                )
            })?;
        Ok(Self::new(folder, name))
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_path(&self, index: usize) -> PathBuf {
        self.folder.join(format!("{}{index}{IMAGE_EXT}", self.name))
    }

    pub fn video_path(&self, index: usize) -> PathBuf {
        self.folder.join(format!("{}{index}{VIDEO_EXT}", self.name))
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.folder.join(format!("{}{VIDEO_EXT}", self.name))
    }

    pub fn temp_video_path(&self) -> PathBuf {
        self.folder.join(format!("{}.tmp{VIDEO_EXT}", self.name))
    }

    /// Indices of every well-formed image artifact, ascending. Names that
    /// only loosely match are ignored.
    pub fn image_indices(&self) -> Result<Vec<usize>> {
        let pattern = self.index_pattern(IMAGE_EXT)?;
        let mut indices = self
            .glob(IMAGE_EXT)?
            .into_iter()
            .filter_map(|path| parse_index(&pattern, &path))
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Every per-step clip, ascending by index. A file that matches
    /// `{name}*{ext}` but not `{name}{digits}{ext}` is an error.
    pub fn video_clips(&self) -> Result<Vec<IndexedArtifact>> {
        let pattern = self.index_pattern(VIDEO_EXT)?;
        let mut clips = Vec::new();
        for path in self.glob(VIDEO_EXT)? {
            let index = parse_index(&pattern, &path)
                .ok_or_else(|| DreamError::MalformedArtifactName { path: path.clone() })?;
            clips.push(IndexedArtifact { index, path });
        }
        clips.sort_by_key(|clip| clip.index);
        Ok(clips)
    }

    fn index_pattern(&self, ext: &str) -> Result<Regex> {
        Regex::new(&format!(
            r"^{}(?P<index>[0-9]+){}$",
            regex::escape(&self.name),
            regex::escape(ext)
        ))
        .context("failed to build artifact name regex")
    }

    fn glob(&self, ext: &str) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to list output folder {}", self.folder.display())
                })
            }
        };

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read entry in {}", self.folder.display())
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.len() >= self.name.len() + ext.len()
                && file_name.starts_with(&self.name)
                && file_name.ends_with(ext)
            {
                matches.push(path);
            }
        }
        Ok(matches)
    }
}

fn parse_index(pattern: &Regex, path: &Path) -> Option<usize> {
    let file_name = path.file_name()?.to_str()?;
    pattern
        .captures(file_name)?
        .name("index")?
        .as_str()
        .parse::<usize>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"x").expect("write artifact");
    }

    #[test]
    fn names_follow_folder_name_and_index() {
        let naming = ArtifactNaming::for_output_folder(Path::new("renders/dream-outputs"))
            .expect("naming");
        assert_eq!(naming.name(), "dream-outputs");
        assert_eq!(
            naming.image_path(4),
            PathBuf::from("renders/dream-outputs/dream-outputs4.png")
        );
        assert_eq!(
            naming.video_path(12),
            PathBuf::from("renders/dream-outputs/dream-outputs12.mp4")
        );
        assert_eq!(
            naming.final_video_path(),
            PathBuf::from("renders/dream-outputs/dream-outputs.mp4")
        );
        assert_eq!(
            naming.temp_video_path(),
            PathBuf::from("renders/dream-outputs/dream-outputs.tmp.mp4")
        );
    }

    #[test]
    fn folder_without_name_is_rejected() {
        assert!(ArtifactNaming::for_output_folder(Path::new("/")).is_err());
    }

    #[test]
    fn image_indices_are_numeric_and_skip_strays() {
        let temp = tempfile::tempdir().expect("tempdir");
        let naming = ArtifactNaming::new(temp.path(), "out");
        for name in ["out10.png", "out2.png", "out0.png", "outtake.png", "out3.mp4", "other1.png"] {
            touch(&temp.path().join(name));
        }
        assert_eq!(naming.image_indices().expect("scan"), vec![0, 2, 10]);
    }

    #[test]
    fn missing_folder_scans_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let naming = ArtifactNaming::new(temp.path().join("absent"), "absent");
        assert!(naming.image_indices().expect("scan").is_empty());
        assert!(naming.video_clips().expect("scan").is_empty());
    }

    #[test]
    fn video_clips_sort_by_index_not_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let naming = ArtifactNaming::new(temp.path(), "out");
        for name in ["out2.mp4", "out10.mp4", "out0.mp4", "out1.mp4", "out1.png"] {
            touch(&temp.path().join(name));
        }
        let indices = naming
            .video_clips()
            .expect("scan")
            .into_iter()
            .map(|clip| clip.index)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[test]
    fn video_clips_reject_loose_matches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let naming = ArtifactNaming::new(temp.path(), "out");
        touch(&temp.path().join("out0.mp4"));
        touch(&temp.path().join("out-final.mp4"));

        let error = naming.video_clips().expect_err("loose match should fail");
        match crate::error::find_dream_error(&error) {
            Some(DreamError::MalformedArtifactName { path }) => {
                assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("out-final.mp4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_artifacts_are_scanned() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = temp.path().join("out");
        fs::create_dir_all(&folder).expect("create out");
        let stash = temp.path().join("stash.mp4");
        touch(&stash);
        touch(&folder.join("out0.mp4"));
        std::os::unix::fs::symlink(&stash, folder.join("out1.mp4")).expect("symlink clip");
        std::os::unix::fs::symlink(&stash, folder.join("out1.png")).expect("symlink frame");

        let naming = ArtifactNaming::new(&folder, "out");
        let indices = naming
            .video_clips()
            .expect("scan")
            .into_iter()
            .map(|clip| clip.index)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(naming.image_indices().expect("scan"), vec![1]);
    }
}
