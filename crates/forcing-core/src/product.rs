//! Product capability table.
//!
//! Every per-product decision (filename grammar, run cadence, forecast
//! horizon, zero-hour substitution) is resolved once through
//! [`ProductKind::spec`] instead of being re-derived at each call site.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ForcingConfig;
use crate::error::{ForcingError, Result};
use crate::filename::{self, FileIdentity};

/// Meteorological data products handled by the forcing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductKind {
    /// High-Resolution Rapid Refresh
    Hrrr,
    /// Multi-Radar Multi-Sensor (observational)
    Mrms,
    /// North American Mesoscale model
    Nam,
    /// Global Forecast System
    Gfs,
    /// Rapid Refresh
    Rap,
    /// Climate Forecast System
    Cfs,
}

/// Filename grammar family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `<YYYYMMDD>_i<HH>_f<FFF[F]>...`
    Model,
    /// `<YYYYMMDD>_<HH>...` or `GaugeCorr_QPE_00.00_<YYYYMMDD>_<HHMMSS>...`
    Observation,
}

/// Static capabilities of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSpec {
    pub kind: ProductKind,
    pub grammar: Grammar,
    /// Hours between consecutive model runs.
    pub cycle_interval_hours: u32,
    /// Forecast horizon used when the configuration does not set one.
    /// `None` for observations, which have no forecast component.
    pub default_max_forecast_hour: Option<u32>,
    /// Zero-hour files lack fields and are replaced from the previous run.
    pub substitutes_zero_hour: bool,
    /// The downscaling tools exist for this product.
    pub downscalable: bool,
}

static HRRR: ProductSpec = ProductSpec {
    kind: ProductKind::Hrrr,
    grammar: Grammar::Model,
    cycle_interval_hours: 1,
    default_max_forecast_hour: Some(18),
    substitutes_zero_hour: false,
    downscalable: true,
};

static MRMS: ProductSpec = ProductSpec {
    kind: ProductKind::Mrms,
    grammar: Grammar::Observation,
    cycle_interval_hours: 1,
    default_max_forecast_hour: None,
    substitutes_zero_hour: false,
    downscalable: false,
};

static NAM: ProductSpec = ProductSpec {
    kind: ProductKind::Nam,
    grammar: Grammar::Model,
    cycle_interval_hours: 6,
    default_max_forecast_hour: Some(84),
    substitutes_zero_hour: false,
    downscalable: true,
};

static GFS: ProductSpec = ProductSpec {
    kind: ProductKind::Gfs,
    grammar: Grammar::Model,
    cycle_interval_hours: 6,
    default_max_forecast_hour: Some(384),
    substitutes_zero_hour: true,
    downscalable: true,
};

static RAP: ProductSpec = ProductSpec {
    kind: ProductKind::Rap,
    grammar: Grammar::Model,
    cycle_interval_hours: 1,
    default_max_forecast_hour: Some(18),
    substitutes_zero_hour: true,
    downscalable: true,
};

static CFS: ProductSpec = ProductSpec {
    kind: ProductKind::Cfs,
    grammar: Grammar::Model,
    cycle_interval_hours: 6,
    default_max_forecast_hour: Some(384),
    substitutes_zero_hour: false,
    downscalable: false,
};

impl ProductKind {
    pub const ALL: [ProductKind; 6] = [
        ProductKind::Hrrr,
        ProductKind::Mrms,
        ProductKind::Nam,
        ProductKind::Gfs,
        ProductKind::Rap,
        ProductKind::Cfs,
    ];

    /// Upper-case name, as used in filenames, directories and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Hrrr => "HRRR",
            ProductKind::Mrms => "MRMS",
            ProductKind::Nam => "NAM",
            ProductKind::Gfs => "GFS",
            ProductKind::Rap => "RAP",
            ProductKind::Cfs => "CFS",
        }
    }

    /// Look up this product's capability record.
    pub fn spec(&self) -> &'static ProductSpec {
        match self {
            ProductKind::Hrrr => &HRRR,
            ProductKind::Mrms => &MRMS,
            ProductKind::Nam => &NAM,
            ProductKind::Gfs => &GFS,
            ProductKind::Rap => &RAP,
            ProductKind::Cfs => &CFS,
        }
    }

    pub fn is_observation(&self) -> bool {
        self.spec().grammar == Grammar::Observation
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = ForcingError;

    fn from_str(s: &str) -> Result<Self> {
        ProductKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ForcingError::UnknownProduct(s.to_string()))
    }
}

impl ProductSpec {
    /// Parse an input filename with this product's grammar.
    pub fn parse(&self, filename: &str) -> Result<FileIdentity> {
        filename::parse(self.kind, filename)
    }

    /// Forecast horizon for this product.
    ///
    /// Reads `[fcsthr_max] <P>_fcsthr_max`, falling back to the table
    /// default. Observations return `None`: every file is in range.
    pub fn max_forecast_hour(&self, config: &ForcingConfig) -> Result<Option<u32>> {
        if self.grammar == Grammar::Observation {
            return Ok(None);
        }
        let key = format!("{}_fcsthr_max", self.kind);
        match config.try_get_parsed::<u32>("fcsthr_max", &key)? {
            Some(max) => Ok(Some(max)),
            None => Ok(self.default_max_forecast_hour),
        }
    }
}
