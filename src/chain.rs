use std::path::PathBuf;

use anyhow::Result;

use crate::artifacts::ArtifactNaming;

/// Finds the frame that should seed `step_index`: the image of the closest
/// earlier step that actually produced one. Re-derived from disk on every
/// call so commented-out or skipped steps resume from the last real frame.
pub fn resolve_seed(step_index: usize, naming: &ArtifactNaming) -> Result<Option<PathBuf>> {
    let indices = naming.image_indices()?;
    Ok(nearest_before(&indices, step_index).map(|index| naming.image_path(index)))
}

/// Greatest value in the ascending `indices` strictly below `step_index`.
pub fn nearest_before(indices: &[usize], step_index: usize) -> Option<usize> {
    if indices.is_empty() {
        return None;
    }
    let insertion = indices.partition_point(|&index| index < step_index);
    if insertion == 0 {
        return None;
    }
    Some(indices[insertion - 1])
}
