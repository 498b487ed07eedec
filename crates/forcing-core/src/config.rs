//! Pipeline configuration.
//!
//! A flat `(section, key) -> string` store loaded from YAML. Values are
//! opaque to the pipeline apart from integer coercion; per-stage settings
//! records are resolved from it once per product.
//!
//! Supports environment variable substitution using `${VAR}` and
//! `${VAR:-default}` syntax.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::Value;

use crate::error::{ForcingError, Result};
use crate::product::ProductKind;

/// Section/key store backing every stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcingConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ForcingConfig {
    /// Load a YAML configuration file, expanding environment variables first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ForcingError::io(path, e))?;
        let expanded = expand_env_vars(&content)?;
        Self::from_yaml_str(&expanded)
    }

    /// Parse YAML content (no environment expansion).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, Option<BTreeMap<String, Value>>> =
            serde_yaml::from_str(content).map_err(|e| ForcingError::InvalidConfig(e.to_string()))?;

        let mut config = Self::default();
        for (section, entries) in raw {
            for (key, value) in entries.unwrap_or_default() {
                let value = scalar_to_string(&value).ok_or_else(|| {
                    ForcingError::InvalidConfig(format!("[{section}] {key} must be a scalar value"))
                })?;
                config.set(&section, &key, value);
            }
        }
        Ok(config)
    }

    /// Insert or replace one value.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) -> &mut Self {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    pub fn try_get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn get(&self, section: &str, key: &str) -> Result<&str> {
        self.try_get(section, key)
            .ok_or_else(|| ForcingError::MissingConfig {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_or<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.try_get(section, key).unwrap_or(default)
    }

    pub fn get_path(&self, section: &str, key: &str) -> Result<PathBuf> {
        self.get(section, key).map(PathBuf::from)
    }

    pub fn get_parsed<T>(&self, section: &str, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(section, key)?;
        parse_value(section, key, raw)
    }

    pub fn try_get_parsed<T>(&self, section: &str, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.try_get(section, key)
            .map(|raw| parse_value(section, key, raw))
            .transpose()
    }

    /// Products whose zero-hour files are substituted (`[substitution] products`).
    ///
    /// Defaults to the capability table when unset. Substitutes come from
    /// the downscaled tree, so a product without a downscaling stage is
    /// rejected.
    pub fn substitution_products(&self) -> Result<Vec<ProductKind>> {
        let Some(list) = self.try_get("substitution", "products") else {
            return Ok(ProductKind::ALL
                .into_iter()
                .filter(|p| p.spec().substitutes_zero_hour)
                .collect());
        };

        let products = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| name.parse::<ProductKind>())
            .collect::<Result<Vec<_>>>()?;

        if let Some(product) = products.iter().find(|p| !p.spec().downscalable) {
            return Err(ForcingError::InvalidConfig(format!(
                "[substitution] products: {product} has no downscaled output to substitute from"
            )));
        }
        Ok(products)
    }

    /// `[log_level] forcing_engine_log_level`
    pub fn log_level(&self) -> Option<&str> {
        self.try_get("log_level", "forcing_engine_log_level")
    }
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        ForcingError::InvalidConfig(format!("[{section}] {key} = {raw:?}: {e}"))
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Settings for the regridding stage of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegridSettings {
    pub ncl_exe: String,
    pub script: String,
    pub weight_file: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dst_grid_name: String,
}

impl RegridSettings {
    pub const STAGE: &'static str = "regrid";

    /// A product is regriddable when its output directory is configured.
    pub fn resolve(config: &ForcingConfig, product: ProductKind) -> Result<Self> {
        let output_key = format!("{product}_output_dir");
        let output_dir = config
            .try_get("regridding", &output_key)
            .map(PathBuf::from)
            .ok_or(ForcingError::UnsupportedProduct {
                product,
                stage: Self::STAGE,
            })?;

        Ok(Self {
            ncl_exe: config.get("exe", "ncl_exe")?.to_string(),
            script: config.get("exe", &format!("{product}_regridding_exe"))?.to_string(),
            weight_file: config
                .get("regridding", &format!("{product}_wgt_bilinear"))?
                .to_string(),
            data_dir: config.get_path("data_dir", &format!("{product}_data"))?,
            output_dir,
            dst_grid_name: config
                .get("regridding", &format!("{product}_dst_grid_name"))?
                .to_string(),
        })
    }
}

/// Settings for the downscaling stage of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownscaleSettings {
    pub ncl_exe: String,
    pub script: String,
    pub lapse_rate_file: String,
    pub hgt_data: String,
    pub geo_data: String,
    pub output_dir: PathBuf,
    /// Only required when shortwave downscaling is requested.
    pub shortwave_script: Option<String>,
}

impl DownscaleSettings {
    pub const STAGE: &'static str = "downscale";

    pub fn resolve(config: &ForcingConfig, product: ProductKind) -> Result<Self> {
        if !product.spec().downscalable {
            return Err(ForcingError::UnsupportedProduct {
                product,
                stage: Self::STAGE,
            });
        }

        Ok(Self {
            ncl_exe: config.get("exe", "ncl_exe")?.to_string(),
            script: config.get("exe", &format!("{product}_downscaling_exe"))?.to_string(),
            lapse_rate_file: config.get("downscaling", "lapse_rate_file")?.to_string(),
            hgt_data: config.get("downscaling", &format!("{product}_hgt_data"))?.to_string(),
            geo_data: config.get("downscaling", &format!("{product}_geo_data"))?.to_string(),
            output_dir: config.get_path("downscaling", &format!("{product}_downscale_output_dir"))?,
            shortwave_script: config
                .try_get("exe", "shortwave_downscaling_exe")
                .map(str::to_string),
        })
    }
}

/// Settings for the layering stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSettings {
    pub ncl_exe: String,
    pub script: String,
    pub primary_dir: PathBuf,
    pub secondary_dir: PathBuf,
    pub output_dir: PathBuf,
    pub secondary_suffix: String,
}

impl LayerSettings {
    pub const STAGE: &'static str = "layer";

    pub fn resolve(config: &ForcingConfig) -> Result<Self> {
        Ok(Self {
            ncl_exe: config.get("exe", "ncl_exe")?.to_string(),
            script: config.get("exe", "Analysis_Assimilation_layering")?.to_string(),
            primary_dir: config.get_path("layering", "analysis_assimilation_primary")?,
            secondary_dir: config.get_path("layering", "analysis_assimilation_secondary")?,
            output_dir: config.get_path("layering", "output_dir")?,
            secondary_suffix: config.get_or("layering", "secondary_suffix", "").to_string(),
        })
    }
}

/// Environment handed to the external NCL tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NclEnvironment {
    pub ncarg_root: Option<String>,
    pub ncl_def_lib_dir: Option<String>,
}

impl NclEnvironment {
    pub fn resolve(config: &ForcingConfig) -> Self {
        Self {
            ncarg_root: config
                .try_get("default_env_vars", "ncarg_root")
                .map(str::to_string),
            ncl_def_lib_dir: config
                .try_get("default_env_vars", "ncl_def_lib_dir")
                .map(str::to_string),
        }
    }

    /// Variables to set on the child process. `NCARG_ROOT` from the parent
    /// environment wins over the configured default.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if std::env::var_os("NCARG_ROOT").is_none() {
            if let Some(root) = &self.ncarg_root {
                vars.push(("NCARG_ROOT", root.clone()));
            }
        }
        if let Some(dir) = &self.ncl_def_lib_dir {
            vars.push(("NCL_DEF_LIB_DIR", dir.clone()));
        }
        vars
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references, line by line.
///
/// An unset variable without a default, or an unclosed reference, is an
/// `InvalidConfig` naming the offending line.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut expanded = String::with_capacity(content.len());
    for (index, line) in content.split_inclusive('\n').enumerate() {
        expand_line(line, &mut expanded).map_err(|reason| {
            ForcingError::InvalidConfig(format!("line {}: {reason}", index + 1))
        })?;
    }
    Ok(expanded)
}

fn expand_line(mut rest: &str, out: &mut String) -> std::result::Result<(), String> {
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let end = reference
            .find('}')
            .ok_or_else(|| format!("unclosed variable reference ${{{}", reference.trim_end()))?;
        out.push_str(&lookup_var(&reference[..end])?);
        rest = &reference[end + 1..];
    }
    out.push_str(rest);
    Ok(())
}

/// Value of `VAR` or `VAR:-default`. An empty variable takes the default.
fn lookup_var(reference: &str) -> std::result::Result<String, String> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name.trim(), Some(default)),
        None => (reference.trim(), None),
    };
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        value => match default {
            Some(default) => Ok(default.to_string()),
            None => value.map_err(|_| format!("environment variable {name} is not set")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
exe:
  ncl_exe: /usr/bin/ncl
  RAP_regridding_exe: /opt/forcing/RAP-2-WRF_Hydro.ncl
  RAP_downscaling_exe: /opt/forcing/RAP_downscale.ncl
data_dir:
  RAP_data: /data/RAP
regridding:
  RAP_wgt_bilinear: /weights/RAP2HYDRO_bilinear.nc
  RAP_output_dir: /regridded/RAP
  RAP_dst_grid_name: /geo/geo_dst.nc
downscaling:
  lapse_rate_file: /geo/lapse.nc
  RAP_hgt_data: /geo/rap_hgt.nc
  RAP_geo_data: /geo/geo_em.nc
  RAP_downscale_output_dir: /downscaled/RAP
fcsthr_max:
  RAP_fcsthr_max: 18
log_level:
  forcing_engine_log_level: DEBUG
empty_section:
"#;

    #[test]
    fn test_lookup_and_coercion() {
        let config = ForcingConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.get("exe", "ncl_exe").unwrap(), "/usr/bin/ncl");
        assert_eq!(config.get_parsed::<u32>("fcsthr_max", "RAP_fcsthr_max").unwrap(), 18);
        assert_eq!(config.log_level(), Some("DEBUG"));
        assert_eq!(config.get_or("layering", "secondary_suffix", "none"), "none");
    }

    #[test]
    fn test_missing_key_names_section_and_key() {
        let config = ForcingConfig::from_yaml_str(SAMPLE).unwrap();
        match config.get("exe", "HRRR_regridding_exe").unwrap_err() {
            ForcingError::MissingConfig { section, key } => {
                assert_eq!(section, "exe");
                assert_eq!(key, "HRRR_regridding_exe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_integer_is_invalid_config() {
        let mut config = ForcingConfig::default();
        config.set("fcsthr_max", "RAP_fcsthr_max", "eighteen");
        let err = config.get_parsed::<u32>("fcsthr_max", "RAP_fcsthr_max").unwrap_err();
        assert!(matches!(err, ForcingError::InvalidConfig(_)));
    }

    #[test]
    fn test_non_scalar_rejected() {
        let err = ForcingConfig::from_yaml_str("exe:\n  ncl_exe: [a, b]\n").unwrap_err();
        assert!(matches!(err, ForcingError::InvalidConfig(_)));
    }

    #[test]
    fn test_regrid_settings() {
        let config = ForcingConfig::from_yaml_str(SAMPLE).unwrap();
        let settings = RegridSettings::resolve(&config, ProductKind::Rap).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/regridded/RAP"));
        assert_eq!(settings.data_dir, PathBuf::from("/data/RAP"));

        let err = RegridSettings::resolve(&config, ProductKind::Hrrr).unwrap_err();
        assert!(matches!(err, ForcingError::UnsupportedProduct { stage: "regrid", .. }));
    }

    #[test]
    fn test_downscale_settings() {
        let config = ForcingConfig::from_yaml_str(SAMPLE).unwrap();
        let settings = DownscaleSettings::resolve(&config, ProductKind::Rap).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/downscaled/RAP"));
        assert_eq!(settings.shortwave_script, None);

        let err = DownscaleSettings::resolve(&config, ProductKind::Mrms).unwrap_err();
        assert!(matches!(err, ForcingError::UnsupportedProduct { stage: "downscale", .. }));

        let err = DownscaleSettings::resolve(&config, ProductKind::Hrrr).unwrap_err();
        assert!(matches!(err, ForcingError::MissingConfig { .. }));
    }

    #[test]
    fn test_substitution_products() {
        let mut config = ForcingConfig::default();
        assert_eq!(
            config.substitution_products().unwrap(),
            vec![ProductKind::Gfs, ProductKind::Rap]
        );

        config.set("substitution", "products", "rap");
        assert_eq!(config.substitution_products().unwrap(), vec![ProductKind::Rap]);

        config.set("substitution", "products", "RAP, GOES");
        assert!(config.substitution_products().is_err());
    }

    #[test]
    fn test_substitution_products_must_be_downscalable() {
        let mut config = ForcingConfig::default();
        for list in ["RAP,GFS,MRMS", "CFS"] {
            config.set("substitution", "products", list);
            let err = config.substitution_products().unwrap_err();
            assert!(matches!(err, ForcingError::InvalidConfig(_)), "{list}: {err}");
        }
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("FORCING_TEST_ROOT", "/scratch");
        let result = expand_env_vars("out: ${FORCING_TEST_ROOT}/RAP").unwrap();
        assert_eq!(result, "out: /scratch/RAP");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("FORCING_TEST_UNSET");
        let result = expand_env_vars("${FORCING_TEST_UNSET:-/d4/hydro}/data").unwrap();
        assert_eq!(result, "/d4/hydro/data");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("FORCING_TEST_REQUIRED");
        assert!(expand_env_vars("${FORCING_TEST_REQUIRED}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_expand_env_vars_error_names_line() {
        std::env::remove_var("FORCING_TEST_MISSING_LINE");
        let content = "exe:\n  ncl_exe: ncl\n  RAP_regridding_exe: ${FORCING_TEST_MISSING_LINE}/rap.ncl\n";
        match expand_env_vars(content).unwrap_err() {
            ForcingError::InvalidConfig(message) => {
                assert!(message.starts_with("line 3:"), "{message}");
                assert!(message.contains("FORCING_TEST_MISSING_LINE"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expand_env_vars_keeps_plain_text() {
        std::env::set_var("FORCING_TEST_EMPTY", "");
        let content = "a: $HOME\nb: ${FORCING_TEST_EMPTY:-fallback}\nc: 50$\n";
        assert_eq!(
            expand_env_vars(content).unwrap(),
            "a: $HOME\nb: fallback\nc: 50$\n"
        );
    }

    #[test]
    fn test_bundled_config_resolves() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/forcing.yaml");
        let config = ForcingConfig::from_file(path).unwrap();

        for product in [ProductKind::Hrrr, ProductKind::Rap, ProductKind::Gfs] {
            RegridSettings::resolve(&config, product).unwrap();
            DownscaleSettings::resolve(&config, product).unwrap();
        }
        RegridSettings::resolve(&config, ProductKind::Mrms).unwrap();
        LayerSettings::resolve(&config).unwrap();
        assert_eq!(
            config.substitution_products().unwrap(),
            vec![ProductKind::Rap, ProductKind::Gfs]
        );
    }

    #[test]
    fn test_from_file_expands_environment() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("forcing.yaml");
        std::env::set_var("FORCING_TEST_FILE_ROOT", "/expanded");
        std::fs::write(&path, "layering:\n  output_dir: ${FORCING_TEST_FILE_ROOT}/layered\n").unwrap();

        let config = ForcingConfig::from_file(&path).unwrap();
        assert_eq!(config.get("layering", "output_dir").unwrap(), "/expanded/layered");
    }
}
