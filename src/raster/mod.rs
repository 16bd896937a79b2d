pub mod assemble;
pub mod poppler;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use assemble::assemble_pdf;
pub use poppler::PopplerRasterizer;

/// Fixed output resolution of every rendered page.
pub const RASTER_DPI: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterDiag {
    pub exe: String,
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Renders every page of a PDF to an image.
pub trait Rasterizer {
    fn diagnose(&self) -> Result<RasterDiag>;

    /// Pages in document order. `work_dir` is scratch space owned by the caller.
    fn rasterize(&self, pdf: &Path, dpi: u32, work_dir: &Path) -> Result<Vec<RgbImage>>;
}

impl<R: Rasterizer + ?Sized> Rasterizer for &R {
    fn diagnose(&self) -> Result<RasterDiag> {
        (**self).diagnose()
    }

    fn rasterize(&self, pdf: &Path, dpi: u32, work_dir: &Path) -> Result<Vec<RgbImage>> {
        (**self).rasterize(pdf, dpi, work_dir)
    }
}
