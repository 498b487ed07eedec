//! Canonical output naming.
//!
//! Layout shared with the hydrological model:
//! `<root>/<PRODUCT>/<YYYYMMDD><HH>/<YYYYMMDD><hh>00.LDASIN_DOMAIN1`
//! where `HH` is the model run hour and `hh` the valid hour. The valid date
//! in the filename may differ from the run date when the forecast crosses
//! midnight.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ForcingError, Result};
use crate::filename::FileIdentity;
use crate::product::ProductKind;
use crate::time::{ModelRun, ValidTime, DATE_FORMAT};

/// Literal suffix of every processed file, whatever the source product.
pub const CANONICAL_SUFFIX: &str = ".LDASIN_DOMAIN1";

static CANONICAL_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{8})([0-9]{2})00\.LDASIN_DOMAIN1(.*)$").expect("canonical filename pattern")
});

/// Where a processed file lives relative to its product root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputIdentity {
    /// Model-run partition, `YYYYMMDDHH`
    pub subdirectory: String,
    /// `YYYYMMDDhh00.LDASIN_DOMAIN1` for the valid date and hour
    pub filename: String,
}

impl OutputIdentity {
    pub fn new(run: ModelRun, valid: ValidTime) -> Self {
        Self {
            subdirectory: run.subdirectory(),
            filename: canonical_filename(valid),
        }
    }

    /// `<subdirectory>/<filename>`
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.subdirectory).join(&self.filename)
    }

    /// Full path of this file under a product root.
    pub fn path_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(self.relative_path())
    }

    /// Directory holding this file under a product root.
    pub fn directory_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(&self.subdirectory)
    }

    /// The model run encoded in the subdirectory.
    pub fn model_run(&self) -> Option<ModelRun> {
        ModelRun::from_subdirectory(&self.subdirectory)
    }
}

/// `YYYYMMDDhh00.LDASIN_DOMAIN1`
pub fn canonical_filename(valid: ValidTime) -> String {
    format!("{}{}", valid_stem(valid), CANONICAL_SUFFIX)
}

fn valid_stem(valid: ValidTime) -> String {
    format!("{}00", valid.compact())
}

/// Build the output identity of a parsed input file.
///
/// Identities that denote the same model run and valid time always produce
/// byte-identical results; observations degenerate naturally because their
/// forecast hour is 0.
pub fn build_output_identity(product: ProductKind, identity: &FileIdentity) -> Result<OutputIdentity> {
    let valid = identity
        .valid_time()
        .ok_or_else(|| ForcingError::MalformedFilename {
            product,
            filename: format!(
                "{}_i{:02}_f{:03}",
                identity.date.format(DATE_FORMAT),
                identity.init_hour,
                identity.forecast_hour
            ),
        })?;
    Ok(OutputIdentity::new(identity.model_run(), valid))
}

/// A processed file path decomposed into its canonical parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    pub path: PathBuf,
    /// Product named by the directory above the model-run partition, if any.
    pub product: Option<ProductKind>,
    pub run: ModelRun,
    pub valid: ValidTime,
    /// Anything following the canonical suffix in the filename.
    pub tag: String,
}

impl CanonicalPath {
    /// Identity of this file, ignoring any trailing tag.
    pub fn identity(&self) -> OutputIdentity {
        OutputIdentity::new(self.run, self.valid)
    }
}

/// Parse a path produced by an earlier pipeline stage.
///
/// Anything that does not follow the canonical layout is a
/// [`ForcingError::MalformedOutputPath`], which points at a bug upstream.
pub fn parse_output_path(path: impl AsRef<Path>) -> Result<CanonicalPath> {
    let path = path.as_ref();
    let malformed = || ForcingError::MalformedOutputPath {
        path: path.to_path_buf(),
    };

    let filename = path.file_name().and_then(|s| s.to_str()).ok_or_else(malformed)?;
    let caps = CANONICAL_FILENAME.captures(filename).ok_or_else(malformed)?;

    let valid_date =
        NaiveDate::parse_from_str(&caps[1], DATE_FORMAT).map_err(|_| malformed())?;
    let valid_hour: u32 = caps[2].parse().map_err(|_| malformed())?;
    if valid_hour >= 24 {
        return Err(malformed());
    }

    let run_dir = path.parent().ok_or_else(malformed)?;
    let run = run_dir
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(ModelRun::from_subdirectory)
        .ok_or_else(malformed)?;

    let product = run_dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .and_then(|name| name.parse::<ProductKind>().ok());

    Ok(CanonicalPath {
        path: path.to_path_buf(),
        product,
        run,
        valid: ValidTime {
            date: valid_date,
            hour: valid_hour,
        },
        tag: caps[3].to_string(),
    })
}
