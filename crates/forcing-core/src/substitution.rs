//! Zero-hour forecast substitution.
//!
//! Some products (RAP, GFS) publish zero-hour files with missing fields.
//! Instead of processing those, the file from the previous model run that
//! is valid at the same time is copied into place. Only one run back is
//! tried.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::error::{ForcingError, Result};
use crate::fs::{copy_file, ensure_directory, file_exists};
use crate::output::OutputIdentity;
use crate::product::ProductKind;

/// Finds and copies substitutes within one product's downscaled tree.
#[derive(Debug, Clone)]
pub struct SubstitutionResolver {
    root: PathBuf,
}

impl SubstitutionResolver {
    /// `root` is the product's downscaling output directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the substitute for `missing` would have to be.
    ///
    /// Same filename (same valid time) one init cycle earlier; that run's
    /// forecast hour for this valid time is one cycle longer.
    pub fn candidate_path(&self, product: ProductKind, missing: &OutputIdentity) -> Result<PathBuf> {
        let interval = product.spec().cycle_interval_hours;
        let previous = missing
            .model_run()
            .and_then(|run| run.previous(interval))
            .ok_or_else(|| ForcingError::MalformedOutputPath {
                path: missing.path_under(&self.root),
            })?;
        Ok(self
            .root
            .join(previous.subdirectory())
            .join(&missing.filename))
    }

    /// Copy the earlier run's file into the missing file's location.
    ///
    /// Returns the destination path. Fails with
    /// [`ForcingError::SubstituteNotFound`] without creating anything at the
    /// destination when no earlier-run file exists.
    #[instrument(skip(self, product, missing), fields(product = %product, file = %missing.filename))]
    pub fn resolve_substitute(&self, product: ProductKind, missing: &OutputIdentity) -> Result<PathBuf> {
        let target = missing.path_under(&self.root);
        let candidate = self.candidate_path(product, missing)?;

        if !file_exists(&candidate) {
            warn!(
                candidate = %candidate.display(),
                target = %target.display(),
                "No earlier model run available for zero-hour substitution"
            );
            return Err(ForcingError::SubstituteNotFound {
                product,
                candidate,
                target,
            });
        }

        ensure_directory(missing.directory_under(&self.root))?;
        copy_file(&candidate, &target)?;
        info!(
            source = %candidate.display(),
            target = %target.display(),
            "Substituted zero-hour forecast"
        );
        Ok(target)
    }
}
