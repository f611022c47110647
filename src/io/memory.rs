use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use ndarray::{s, Array2};

use super::{Georeference, OutputSpec, RasterBackend, RasterSink, RasterSource};
use crate::error::{ReclassifyError, Result};
use crate::pixel::PixelType;
use crate::tiling::Window;

/// A raster held entirely in memory. All bands share one shape and dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    pub bands: Vec<Array2<f64>>,
    pub dtype: PixelType,
    pub band_names: Vec<String>,
    pub nodata: Option<f64>,
    pub georeference: Option<Georeference>,
}

impl MemoryRaster {
    pub fn single_band(data: Array2<f64>, dtype: PixelType) -> Self {
        Self {
            bands: vec![data],
            dtype,
            band_names: vec![String::new()],
            nodata: None,
            georeference: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.bands
            .first()
            .map(|band| (band.ncols(), band.nrows()))
            .unwrap_or((0, 0))
    }

    /// Band by 1-based index.
    pub fn band(&self, band: usize) -> Option<&Array2<f64>> {
        band.checked_sub(1).and_then(|i| self.bands.get(i))
    }
}

#[derive(Debug, Default)]
struct Store {
    rasters: Mutex<HashMap<PathBuf, Arc<MemoryRaster>>>,
    reads: AtomicUsize,
    read_only: AtomicBool,
}

/// Path-keyed raster store. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, raster: MemoryRaster) {
        self.rasters().insert(path.into(), Arc::new(raster));
    }

    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<Arc<MemoryRaster>> {
        self.rasters().get(path.as_ref()).cloned()
    }

    /// Number of window reads served so far.
    pub fn reads(&self) -> usize {
        self.store.reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent `create` fail.
    pub fn set_read_only(&self, read_only: bool) {
        self.store.read_only.store(read_only, Ordering::SeqCst);
    }

    fn rasters(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<MemoryRaster>>> {
        // A poisoned map is still consistent: every insert is a single call.
        self.store
            .rasters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MemorySource {
    raster: Arc<MemoryRaster>,
    store: Arc<Store>,
}

impl MemorySource {
    fn band(&self, band: usize) -> Result<&Array2<f64>> {
        self.raster.band(band).ok_or(ReclassifyError::InvalidBand {
            band,
            count: self.raster.bands.len(),
        })
    }
}

impl RasterSource for MemorySource {
    fn dimensions(&self) -> (usize, usize) {
        self.raster.dimensions()
    }

    fn band_count(&self) -> usize {
        self.raster.bands.len()
    }

    fn dtype(&self, band: usize) -> Result<PixelType> {
        self.band(band)?;
        Ok(self.raster.dtype)
    }

    fn nodata(&self, band: usize) -> Result<Option<f64>> {
        self.band(band)?;
        Ok(self.raster.nodata)
    }

    fn georeference(&self) -> Option<Georeference> {
        self.raster.georeference.clone()
    }

    fn read(&self, band: usize, window: &Window) -> Result<Array2<f64>> {
        let (width, height) = self.dimensions();
        if !window.fits_within(width, height) {
            return Err(ReclassifyError::WindowOutOfBounds {
                window: *window,
                width,
                height,
            });
        }
        let data = self.band(band)?;
        self.store.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data
            .slice(s![window.row_off..window.row_end(), window.col_off..window.col_end()])
            .to_owned())
    }
}

pub struct MemorySink {
    path: PathBuf,
    raster: MemoryRaster,
    store: Arc<Store>,
}

impl RasterSink for MemorySink {
    fn write(&mut self, band: usize, window: &Window, buffer: &Array2<f64>) -> Result<()> {
        let (width, height) = self.raster.dimensions();
        if !window.fits_within(width, height) {
            return Err(ReclassifyError::WindowOutOfBounds {
                window: *window,
                width,
                height,
            });
        }
        if buffer.dim() != window.shape() {
            return Err(ReclassifyError::InvalidParameter(format!(
                "buffer {:?} does not match window {}",
                buffer.dim(),
                window
            )));
        }
        let count = self.raster.bands.len();
        let dtype = self.raster.dtype;
        let target = band
            .checked_sub(1)
            .and_then(|i| self.raster.bands.get_mut(i))
            .ok_or(ReclassifyError::InvalidBand { band, count })?;

        target
            .slice_mut(s![window.row_off..window.row_end(), window.col_off..window.col_end()])
            .zip_mut_with(buffer, |cell, &value| *cell = dtype.cast(value));

        debug!("Wrote window {} to band {} of {}", window, band, self.path.display());
        Ok(())
    }

    fn finish(self) -> Result<()> {
        let backend = MemoryBackend { store: self.store };
        backend.insert(self.path, self.raster);
        Ok(())
    }
}

impl RasterBackend for MemoryBackend {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn open(&self, path: &Path) -> Result<MemorySource> {
        let raster = self
            .get(path)
            .ok_or_else(|| ReclassifyError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: "no such raster".to_string(),
            })?;
        Ok(MemorySource {
            raster,
            store: Arc::clone(&self.store),
        })
    }

    fn create(&self, path: &Path, spec: &OutputSpec) -> Result<MemorySink> {
        if self.store.read_only.load(Ordering::SeqCst) {
            return Err(ReclassifyError::DestinationUnwritable {
                path: path.to_path_buf(),
                reason: "backend is read-only".to_string(),
            });
        }
        let initial = spec.nodata.unwrap_or(0.0);
        let raster = MemoryRaster {
            bands: (0..spec.band_count())
                .map(|_| Array2::from_elem((spec.height, spec.width), initial))
                .collect(),
            dtype: spec.dtype,
            band_names: spec.band_names.clone(),
            nodata: spec.nodata,
            georeference: spec.georeference.clone(),
        };
        Ok(MemorySink {
            path: path.to_path_buf(),
            raster,
            store: Arc::clone(&self.store),
        })
    }
}
