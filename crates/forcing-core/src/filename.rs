//! Input filename grammars.
//!
//! Parsing is purely lexical: no file is opened and only the final path
//! component is considered.

use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{ForcingError, Result};
use crate::product::{Grammar, ProductKind};
use crate::time::{compute_valid_time, ModelRun, ValidTime, DATE_FORMAT};

/// `20150723_i23_f010_HRRR.grb2`
static MODEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^0-9])([0-9]{8})_i([0-9]{2})_f([0-9]{3,4})(?:[^0-9]|$)")
        .expect("model filename pattern")
});

/// `GaugeCorr_QPE_00.00_20150723_010000.grib2`
static GAUGE_CORRECTED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"GaugeCorr_QPE_00\.00_([0-9]{8})_([0-9]{6})(?:[^0-9]|$)")
        .expect("gauge-corrected filename pattern")
});

/// `20150723_01_MRMS.grb2`
static OBSERVATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^0-9])([0-9]{8})_([0-9]{2})(?:[^0-9]|$)")
        .expect("observation filename pattern")
});

/// Canonical identity of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub product: ProductKind,
    pub date: NaiveDate,
    /// Model run hour, `0..24`. For observations this is the observation hour.
    pub init_hour: u32,
    /// Hours since `init_hour`; always 0 for observations.
    pub forecast_hour: u32,
}

impl FileIdentity {
    pub fn model_run(&self) -> ModelRun {
        ModelRun::new(self.date, self.init_hour)
    }

    pub fn valid_time(&self) -> Option<ValidTime> {
        compute_valid_time(self.date, self.init_hour, self.forecast_hour)
    }

    /// The model's initial-condition analysis.
    pub fn is_zero_hour(&self) -> bool {
        self.forecast_hour == 0
    }
}

/// Parse a raw input filename with the grammar of `product`.
///
/// Fails with [`ForcingError::MalformedFilename`] when the name does not
/// match, or when it matches lexically but names an impossible date or hour.
pub fn parse(product: ProductKind, filename: &str) -> Result<FileIdentity> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let parsed = match product.spec().grammar {
        Grammar::Model => parse_model(name),
        Grammar::Observation => parse_gauge_corrected(name).or_else(|| parse_observation(name)),
    };

    let (date, init_hour, forecast_hour) = parsed.ok_or_else(|| ForcingError::MalformedFilename {
        product,
        filename: filename.to_string(),
    })?;

    Ok(FileIdentity {
        product,
        date,
        init_hour,
        forecast_hour,
    })
}

fn parse_model(name: &str) -> Option<(NaiveDate, u32, u32)> {
    let caps = MODEL_PATTERN.captures(name)?;
    let date = capture_date(&caps, 1)?;
    let init_hour = capture_hour(&caps, 2)?;
    // Width varies (f006, f0120); the value is what matters
    let forecast_hour = caps.get(3)?.as_str().parse().ok()?;
    Some((date, init_hour, forecast_hour))
}

fn parse_gauge_corrected(name: &str) -> Option<(NaiveDate, u32, u32)> {
    let caps = GAUGE_CORRECTED_PATTERN.captures(name)?;
    let date = capture_date(&caps, 1)?;
    let hour: u32 = caps.get(2)?.as_str()[..2].parse().ok()?;
    (hour < 24).then_some((date, hour, 0))
}

fn parse_observation(name: &str) -> Option<(NaiveDate, u32, u32)> {
    let caps = OBSERVATION_PATTERN.captures(name)?;
    let date = capture_date(&caps, 1)?;
    let hour = capture_hour(&caps, 2)?;
    Some((date, hour, 0))
}

fn capture_date(caps: &Captures<'_>, index: usize) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(caps.get(index)?.as_str(), DATE_FORMAT).ok()
}

fn capture_hour(caps: &Captures<'_>, index: usize) -> Option<u32> {
    let hour: u32 = caps.get(index)?.as_str().parse().ok()?;
    (hour < 24).then_some(hour)
}
