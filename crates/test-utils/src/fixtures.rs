//! Forcing tree fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Products with regridding settings in [`ForcingTree::config_yaml`].
pub const PRODUCTS: [&str; 5] = ["HRRR", "MRMS", "NAM", "GFS", "RAP"];

/// Canonical suffix of processed files.
pub const SUFFIX: &str = ".LDASIN_DOMAIN1";

/// Pipeline stages with their own output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Data,
    Regridded,
    Downscaled,
    Layered,
}

impl Stage {
    fn dir_name(&self) -> &'static str {
        match self {
            Stage::Data => "data",
            Stage::Regridded => "regridded",
            Stage::Downscaled => "downscaled",
            Stage::Layered => "layered",
        }
    }
}

/// A temporary root holding one directory per stage and product.
///
/// Removed when dropped.
pub struct ForcingTree {
    dir: TempDir,
}

impl Default for ForcingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ForcingTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temporary forcing tree"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// `<root>/<stage>`
    pub fn stage_root(&self, stage: Stage) -> PathBuf {
        self.root().join(stage.dir_name())
    }

    /// `<root>/<stage>/<PRODUCT>`
    pub fn product_root(&self, stage: Stage, product: &str) -> PathBuf {
        self.stage_root(stage).join(product)
    }

    /// Write a file (creating parents) and return its path.
    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> PathBuf {
        let path = self.root().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture directory");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Raw input at `<root>/data/<PRODUCT>/<YYYYMMDD>/<filename>`.
    pub fn write_input(&self, product: &str, date: &str, filename: &str) -> PathBuf {
        let rel = Path::new(Stage::Data.dir_name())
            .join(product)
            .join(date)
            .join(filename);
        self.write(rel, b"GRIB")
    }

    /// Downscaled file at `<root>/downscaled/<PRODUCT>/<run>/<filename>`.
    pub fn write_downscaled(&self, product: &str, run: &str, filename: &str, contents: &[u8]) -> PathBuf {
        let rel = Path::new(Stage::Downscaled.dir_name())
            .join(product)
            .join(run)
            .join(filename);
        self.write(rel, contents)
    }

    /// Configuration pointing every stage into this tree.
    ///
    /// Executables are placeholders; pair it with a fake transformer.
    /// Layering uses HRRR as primary and RAP as secondary.
    pub fn config_yaml(&self) -> String {
        let mut exe = String::from("exe:\n  ncl_exe: ncl\n");
        exe.push_str("  shortwave_downscaling_exe: topo_adj.ncl\n");
        exe.push_str("  Analysis_Assimilation_layering: combine.ncl\n");
        let mut data_dir = String::from("data_dir:\n");
        let mut regridding = String::from("regridding:\n");
        let mut downscaling = String::from("downscaling:\n  lapse_rate_file: /geo/lapse.nc\n");

        for product in PRODUCTS {
            exe.push_str(&format!("  {product}_regridding_exe: {product}-2-WRF_Hydro.ncl\n"));
            exe.push_str(&format!("  {product}_downscaling_exe: {product}_downscale.ncl\n"));
            data_dir.push_str(&format!(
                "  {product}_data: {}\n",
                self.product_root(Stage::Data, product).display()
            ));
            regridding.push_str(&format!("  {product}_wgt_bilinear: /weights/{product}_bilinear.nc\n"));
            regridding.push_str(&format!(
                "  {product}_output_dir: {}\n",
                self.product_root(Stage::Regridded, product).display()
            ));
            regridding.push_str(&format!("  {product}_dst_grid_name: /geo/geo_dst.nc\n"));
            downscaling.push_str(&format!("  {product}_hgt_data: /geo/{product}_hgt.nc\n"));
            downscaling.push_str(&format!("  {product}_geo_data: /geo/geo_em.nc\n"));
            downscaling.push_str(&format!(
                "  {product}_downscale_output_dir: {}\n",
                self.product_root(Stage::Downscaled, product).display()
            ));
        }

        let layering = format!(
            "layering:\n  analysis_assimilation_primary: {}\n  analysis_assimilation_secondary: {}\n  output_dir: {}\n",
            self.product_root(Stage::Downscaled, "HRRR").display(),
            self.product_root(Stage::Downscaled, "RAP").display(),
            self.stage_root(Stage::Layered).display(),
        );
        let fcsthr_max = "fcsthr_max:\n  HRRR_fcsthr_max: 18\n  RAP_fcsthr_max: 18\n  GFS_fcsthr_max: 240\n  NAM_fcsthr_max: 84\n";

        format!("{exe}{data_dir}{regridding}{downscaling}{layering}{fcsthr_max}")
    }
}
