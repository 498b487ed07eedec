//! Primary/secondary matching for layering.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::fs::file_exists;
use crate::output::parse_output_path;

/// One layering unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairedFiles {
    pub primary_path: PathBuf,
    pub secondary_path: PathBuf,
    /// Model-run partition both files share.
    pub subdirectory: String,
    /// Canonical name of the layered output file.
    pub layered_filename: String,
}

impl PairedFiles {
    /// Output location of the layered file under `root`.
    pub fn layered_path_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref()
            .join(&self.subdirectory)
            .join(&self.layered_filename)
    }
}

/// Pair each primary file with the secondary file of the same model run and
/// valid time, when one exists under `secondary_root`.
pub fn find_pairs(primary_files: &[PathBuf], secondary_root: impl AsRef<Path>) -> Result<Vec<PairedFiles>> {
    find_pairs_with_suffix(primary_files, secondary_root, "")
}

/// Like [`find_pairs`], for secondary trees whose filenames carry a literal
/// tag after the canonical suffix.
///
/// Results follow the order of `primary_files`. A missing secondary file is
/// expected (coverage gaps) and simply skipped; a primary path that is not
/// canonical aborts the whole run.
pub fn find_pairs_with_suffix(
    primary_files: &[PathBuf],
    secondary_root: impl AsRef<Path>,
    secondary_suffix: &str,
) -> Result<Vec<PairedFiles>> {
    let secondary_root = secondary_root.as_ref();
    let mut pairs = Vec::new();

    for primary in primary_files {
        let canonical = parse_output_path(primary)?;
        let identity = canonical.identity();
        let secondary_path = identity
            .directory_under(secondary_root)
            .join(format!("{}{}", identity.filename, secondary_suffix));

        if !file_exists(&secondary_path) {
            debug!(
                primary = %primary.display(),
                secondary = %secondary_path.display(),
                "No secondary file for this model run and valid time"
            );
            continue;
        }

        pairs.push(PairedFiles {
            primary_path: primary.clone(),
            secondary_path,
            subdirectory: identity.subdirectory,
            layered_filename: identity.filename,
        });
    }

    info!(
        primaries = primary_files.len(),
        pairs = pairs.len(),
        "Matched layering pairs"
    );
    Ok(pairs)
}
