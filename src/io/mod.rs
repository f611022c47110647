//! Raster I/O backend interfaces used by the coordinator.
//!
//! The engine never touches a file format directly: it opens sources and
//! creates destinations through a [`RasterBackend`]. [`geotiff::GdalBackend`]
//! reads and writes GeoTIFF through GDAL; [`memory::MemoryBackend`] keeps
//! rasters in process.

#[cfg(feature = "gdal")]
pub mod geotiff;
pub mod memory;

use std::path::Path;

use ndarray::Array2;

use crate::error::Result;
use crate::pixel::PixelType;
use crate::tiling::Window;

/// Geotransform plus projection WKT, copied verbatim to outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Georeference {
    pub geotransform: [f64; 6],
    pub projection: String,
}

/// Everything needed to create a destination raster.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub width: usize,
    pub height: usize,
    pub dtype: PixelType,
    /// One entry per band; used as band descriptions.
    pub band_names: Vec<String>,
    pub nodata: Option<f64>,
    pub georeference: Option<Georeference>,
}

impl OutputSpec {
    pub fn band_count(&self) -> usize {
        self.band_names.len()
    }
}

/// Read side of a raster. Bands are 1-based.
pub trait RasterSource {
    fn dimensions(&self) -> (usize, usize);

    fn band_count(&self) -> usize;

    fn dtype(&self, band: usize) -> Result<PixelType>;

    fn nodata(&self, band: usize) -> Result<Option<f64>>;

    /// Native block size of a band, if the format has one.
    fn block_size(&self, _band: usize) -> Option<(usize, usize)> {
        None
    }

    fn georeference(&self) -> Option<Georeference>;

    /// Fails with `WindowOutOfBounds` if `window` exceeds the raster extent.
    fn read(&self, band: usize, window: &Window) -> Result<Array2<f64>>;
}

/// Write side of a raster. A sink has exactly one owner.
pub trait RasterSink {
    fn write(&mut self, band: usize, window: &Window, buffer: &Array2<f64>) -> Result<()>;

    /// Flush and close.
    fn finish(self) -> Result<()>;
}

pub trait RasterBackend: Sync {
    type Source: RasterSource;
    type Sink: RasterSink;

    /// Fails with `SourceUnreadable`.
    fn open(&self, path: &Path) -> Result<Self::Source>;

    /// Fails with `DestinationUnwritable`.
    fn create(&self, path: &Path, spec: &OutputSpec) -> Result<Self::Sink>;
}
