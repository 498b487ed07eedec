//! Forcing data naming and substitution library.
//!
//! Derives canonical identities (date, model run, forecast hour, valid time)
//! from meteorological input filenames and lays processed files out in the
//! directory tree the hydrological model reads from.
//!
//! # Architecture
//!
//! The pure naming pieces compose linearly:
//!
//! - [`filename`] parses a raw input name into a [`FileIdentity`]
//! - [`time`] turns init hour + forecast hour into a [`ValidTime`]
//! - [`output`] builds the canonical [`OutputIdentity`] for a file
//!
//! Around them sit the pieces that touch the filesystem:
//!
//! - [`substitution`] replaces missing zero-hour forecasts with an
//!   earlier model run's file for the same valid time
//! - [`pairing`] matches primary/secondary files for layering
//! - [`stages`] drives regridding, downscaling and layering through an
//!   injected [`Transformer`]

pub mod config;
pub mod error;
pub mod filename;
pub mod fs;
pub mod output;
pub mod pairing;
pub mod product;
pub mod stages;
pub mod substitution;
pub mod time;
pub mod transform;

// Re-exports
pub use config::ForcingConfig;
pub use error::{ForcingError, Result};
pub use filename::{parse, FileIdentity};
pub use output::{
    build_output_identity, parse_output_path, CanonicalPath, OutputIdentity, CANONICAL_SUFFIX,
};
pub use pairing::{find_pairs, PairedFiles};
pub use product::{ProductKind, ProductSpec};
pub use stages::ForcingEngine;
pub use substitution::SubstitutionResolver;
pub use time::{compute_valid_time, ValidTime};
pub use transform::{
    DryRunTransformer, NclTransformer, TransformRequest, TransformStatus, Transformer,
};
