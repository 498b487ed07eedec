//! Regrid, downscale and layer stages.
//!
//! The engine owns the configuration and the [`Transformer`] for one
//! pipeline run. Each call handles a single file (or, for layering, a single
//! directory scan); failures are returned to the caller, who decides
//! whether they end the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::config::{DownscaleSettings, ForcingConfig, LayerSettings, RegridSettings};
use crate::error::{ForcingError, Result};
use crate::filename::{self, FileIdentity};
use crate::fs::{ensure_directory, list_files_recursive, touch};
use crate::output::{build_output_identity, parse_output_path};
use crate::pairing::{find_pairs_with_suffix, PairedFiles};
use crate::product::ProductKind;
use crate::substitution::SubstitutionResolver;
use crate::time::DATE_FORMAT;
use crate::transform::{TransformRequest, TransformStatus, Transformer};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Regridded and downscaled to `path`.
    Processed { path: PathBuf },
    /// Zero-hour file replaced by an earlier run's output at `path`.
    Substituted { path: PathBuf },
    /// Beyond the product's forecast horizon.
    Skipped { forecast_hour: u32, max_forecast_hour: u32 },
}

/// Result of a layering run.
#[derive(Debug, Default)]
pub struct LayerReport {
    /// Number of primary/secondary pairs found.
    pub pairs: usize,
    pub layered: Vec<PathBuf>,
    pub failed: Vec<(PairedFiles, ForcingError)>,
}

/// Drives the external stages for one pipeline run.
pub struct ForcingEngine {
    config: ForcingConfig,
    transformer: Arc<dyn Transformer>,
    substitution_products: Vec<ProductKind>,
}

impl ForcingEngine {
    pub fn new(config: ForcingConfig, transformer: Arc<dyn Transformer>) -> Result<Self> {
        let substitution_products = config.substitution_products()?;
        Ok(Self {
            config,
            transformer,
            substitution_products,
        })
    }

    pub fn config(&self) -> &ForcingConfig {
        &self.config
    }

    /// Whether a file falls inside its product's forecast horizon.
    pub fn is_in_forecast_range(&self, identity: &FileIdentity) -> Result<bool> {
        match identity.product.spec().max_forecast_hour(&self.config)? {
            Some(max) => Ok(identity.forecast_hour < max),
            None => Ok(true),
        }
    }

    /// Zero-hour file of a product whose analysis lacks fields.
    ///
    /// Only downscaled products can be substituted; observations always
    /// have forecast hour 0 and are never candidates.
    pub fn needs_substitution(&self, identity: &FileIdentity) -> bool {
        identity.is_zero_hour()
            && identity.product.spec().downscalable
            && self.substitution_products.contains(&identity.product)
    }

    /// Regrid and downscale one input file.
    #[instrument(skip(self, product), fields(product = %product))]
    pub async fn process_file(
        &self,
        product: ProductKind,
        input_file: &str,
        downscale_shortwave: bool,
    ) -> Result<FileOutcome> {
        let identity = filename::parse(product, input_file)?;

        if !self.is_in_forecast_range(&identity)? {
            let max = product
                .spec()
                .max_forecast_hour(&self.config)?
                .unwrap_or_default();
            info!(
                forecast_hour = identity.forecast_hour,
                max_forecast_hour = max,
                "Skipping file outside of forecast range"
            );
            return Ok(FileOutcome::Skipped {
                forecast_hour: identity.forecast_hour,
                max_forecast_hour: max,
            });
        }

        let substitute = self.needs_substitution(&identity);
        let regridded = self.regrid(product, input_file, substitute).await?;

        if !product.spec().downscalable {
            // Observations go to the model straight from regridding
            return Ok(FileOutcome::Processed { path: regridded });
        }

        let path = self
            .downscale(product, &regridded, downscale_shortwave, substitute)
            .await?;
        if substitute {
            Ok(FileOutcome::Substituted { path })
        } else {
            Ok(FileOutcome::Processed { path })
        }
    }

    /// Regrid one input file onto the hydrological grid.
    ///
    /// With `substitute` set nothing is regridded: an empty placeholder is
    /// created at the canonical location and the downscale stage fills in
    /// the file from an earlier run. Returns the regridded file path.
    #[instrument(skip(self, product), fields(product = %product))]
    pub async fn regrid(&self, product: ProductKind, input_file: &str, substitute: bool) -> Result<PathBuf> {
        let settings = RegridSettings::resolve(&self.config, product)?;
        let identity = filename::parse(product, input_file)?;
        let output = build_output_identity(product, &identity)?;

        let output_dir = output.directory_under(&settings.output_dir);
        let regridded = output.path_under(&settings.output_dir);
        ensure_directory(&output_dir)?;

        if substitute {
            info!(path = %regridded.display(), "Zero-hour forecast, creating placeholder");
            touch(&regridded)?;
            return Ok(regridded);
        }

        let source = source_path(&settings.data_dir, &identity, input_file);
        // The MRMS script has no usable outdir input and takes a full path
        let out_file = if product.is_observation() {
            regridded.display().to_string()
        } else {
            output.filename.clone()
        };

        let request = TransformRequest::new(&settings.ncl_exe, &settings.script)
            .param("srcfilename", source.display())
            .param("wgtFileName_in", &settings.weight_file)
            .param("dstGridName", &settings.dst_grid_name)
            .param("outdir", output_dir.display())
            .param("outFile", out_file);

        self.run(RegridSettings::STAGE, &request, &regridded).await?;
        debug!(path = %regridded.display(), "Regridded");
        Ok(regridded)
    }

    /// Downscale one regridded file.
    ///
    /// With `substitute` set the earlier model run's downscaled file is
    /// copied into place instead. Returns the downscaled file path.
    #[instrument(skip(self, product, regridded), fields(product = %product, file = %regridded.display()))]
    pub async fn downscale(
        &self,
        product: ProductKind,
        regridded: &Path,
        downscale_shortwave: bool,
        substitute: bool,
    ) -> Result<PathBuf> {
        let settings = DownscaleSettings::resolve(&self.config, product)?;
        let output = parse_output_path(regridded)?.identity();

        if substitute {
            info!("Searching for zero-hour substitute");
            return SubstitutionResolver::new(&settings.output_dir).resolve_substitute(product, &output);
        }

        let downscaled = output.path_under(&settings.output_dir);
        ensure_directory(output.directory_under(&settings.output_dir))?;

        let request = TransformRequest::new(&settings.ncl_exe, &settings.script)
            .param("inputFile1", &settings.hgt_data)
            .param("inputFile2", &settings.geo_data)
            .param("inputFile3", regridded.display())
            .param("lapseFile", &settings.lapse_rate_file)
            .param("outFile", downscaled.display());
        self.run(DownscaleSettings::STAGE, &request, &downscaled).await?;

        if downscale_shortwave {
            let script = settings
                .shortwave_script
                .as_deref()
                .ok_or_else(|| ForcingError::MissingConfig {
                    section: "exe".to_string(),
                    key: "shortwave_downscaling_exe".to_string(),
                })?;
            info!("Shortwave downscaling requested");
            // Rewrites the downscaled file in place
            let request = TransformRequest::new(&settings.ncl_exe, script)
                .param("inputGeo", &settings.geo_data)
                .param("outFile", downscaled.display());
            self.run(DownscaleSettings::STAGE, &request, &downscaled).await?;
        }

        Ok(downscaled)
    }

    /// Pairs available for layering under the configured roots.
    pub fn layering_pairs(&self) -> Result<Vec<PairedFiles>> {
        let settings = LayerSettings::resolve(&self.config)?;
        let primaries = list_files_recursive(&settings.primary_dir)?;
        find_pairs_with_suffix(&primaries, &settings.secondary_dir, &settings.secondary_suffix)
    }

    /// Layer every primary file that has a matching secondary file.
    ///
    /// A malformed primary path aborts the run; a failed pair is recorded
    /// and the remaining pairs are still layered.
    #[instrument(skip(self))]
    pub async fn layer(&self) -> Result<LayerReport> {
        let settings = LayerSettings::resolve(&self.config)?;
        let pairs = self.layering_pairs()?;
        let mut report = LayerReport {
            pairs: pairs.len(),
            ..LayerReport::default()
        };

        for pair in pairs {
            match self.layer_pair(&settings, &pair).await {
                Ok(path) => report.layered.push(path),
                Err(e) => {
                    error!(
                        primary = %pair.primary_path.display(),
                        secondary = %pair.secondary_path.display(),
                        error = %e,
                        "Layering failed"
                    );
                    report.failed.push((pair, e));
                }
            }
        }

        info!(
            pairs = report.pairs,
            layered = report.layered.len(),
            failed = report.failed.len(),
            "Layering complete"
        );
        Ok(report)
    }

    async fn layer_pair(&self, settings: &LayerSettings, pair: &PairedFiles) -> Result<PathBuf> {
        let layered = pair.layered_path_under(&settings.output_dir);
        ensure_directory(settings.output_dir.join(&pair.subdirectory))?;

        // Initialisation pass, then the indexed pass
        for index_flag in [false, true] {
            let request = TransformRequest::new(&settings.ncl_exe, &settings.script)
                .param("hrrrFile", pair.primary_path.display())
                .param("rapFile", pair.secondary_path.display())
                .param("indexFlag", index_flag)
                .param("outFile", layered.display());
            self.run(LayerSettings::STAGE, &request, &layered).await?;
        }
        Ok(layered)
    }

    async fn run(&self, stage: &'static str, request: &TransformRequest, target: &Path) -> Result<()> {
        let status = self.transformer.apply(request).await?;
        check_status(stage, request, target, status)
    }
}

fn check_status(
    stage: &'static str,
    request: &TransformRequest,
    target: &Path,
    status: TransformStatus,
) -> Result<()> {
    if status.success {
        return Ok(());
    }
    error!(
        stage,
        script = %request.script,
        target = %target.display(),
        code = ?status.code,
        "External transform failed"
    );
    Err(ForcingError::ExternalToolFailure {
        stage,
        tool: request.script.clone(),
        target: target.to_path_buf(),
        code: status.code,
    })
}

/// Location of the raw input.
///
/// Bare filenames live under `<data_dir>/<YYYYMMDD>/`; anything with a
/// directory component is taken as given.
fn source_path(data_dir: &Path, identity: &FileIdentity, input_file: &str) -> PathBuf {
    let input = Path::new(input_file);
    let has_directory = input
        .parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false);
    if has_directory {
        input.to_path_buf()
    } else {
        data_dir
            .join(identity.date.format(DATE_FORMAT).to_string())
            .join(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_source_path_bare_filename() {
        let identity = FileIdentity {
            product: ProductKind::Hrrr,
            date: NaiveDate::from_ymd_opt(2015, 7, 23).unwrap(),
            init_hour: 23,
            forecast_hour: 10,
        };
        assert_eq!(
            source_path(Path::new("/data/HRRR"), &identity, "20150723_i23_f010_HRRR.grb2"),
            PathBuf::from("/data/HRRR/20150723/20150723_i23_f010_HRRR.grb2")
        );
        assert_eq!(
            source_path(Path::new("/data/HRRR"), &identity, "/in/20150723_i23_f010_HRRR.grb2"),
            PathBuf::from("/in/20150723_i23_f010_HRRR.grb2")
        );
    }

    #[test]
    fn test_observations_are_never_substituted() {
        let engine = ForcingEngine {
            config: ForcingConfig::default(),
            transformer: Arc::new(crate::transform::DryRunTransformer::new()),
            substitution_products: ProductKind::ALL.to_vec(),
        };
        let date = NaiveDate::from_ymd_opt(2015, 7, 23).unwrap();
        let identity = |product| FileIdentity {
            product,
            date,
            init_hour: 5,
            forecast_hour: 0,
        };

        assert!(!engine.needs_substitution(&identity(ProductKind::Mrms)));
        assert!(!engine.needs_substitution(&identity(ProductKind::Cfs)));
        assert!(engine.needs_substitution(&identity(ProductKind::Rap)));
    }

    #[test]
    fn test_check_status_maps_failure() {
        let request = TransformRequest::new("ncl", "combine.ncl");
        assert!(check_status("layer", &request, Path::new("/x"), TransformStatus::SUCCESS).is_ok());

        let err = check_status("layer", &request, Path::new("/x"), TransformStatus::failed(2))
            .unwrap_err();
        match err {
            ForcingError::ExternalToolFailure { stage, tool, code, .. } => {
                assert_eq!(stage, "layer");
                assert_eq!(tool, "combine.ncl");
                assert_eq!(code, Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
