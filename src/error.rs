use std::path::PathBuf;

use thiserror::Error;

use crate::tiling::Window;

#[derive(Error, Debug)]
pub enum ReclassifyError {
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Raster has invalid extent: {0}x{1}")]
    InvalidExtent(usize, usize),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Duplicate key in lookup table: {0}")]
    DuplicateKey(i64),

    #[error("Cannot read source raster {}: {}", .path.display(), .reason)]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Cannot write destination raster {}: {}", .path.display(), .reason)]
    DestinationUnwritable { path: PathBuf, reason: String },

    #[error("Window {window} exceeds raster extent {width}x{height}")]
    WindowOutOfBounds {
        window: Window,
        width: usize,
        height: usize,
    },

    #[error("Invalid band {band} (raster has {count} bands)")]
    InvalidBand { band: usize, count: usize },

    #[error("Cannot read table {}: {}", .path.display(), .reason)]
    TableUnreadable { path: PathBuf, reason: String },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid table value {value:?} in column {column} at line {line}")]
    InvalidTableValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),

    #[error("Window {window} failed: {source}")]
    WorkerFailure {
        window: Window,
        #[source]
        source: Box<ReclassifyError>,
    },

    #[error("Writing window {window} failed: {source}")]
    WriteFailure {
        window: Window,
        #[source]
        source: Box<ReclassifyError>,
    },

    #[error("Job cancelled before all windows were processed")]
    Cancelled,

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

impl ReclassifyError {
    /// Tag an error raised while processing `window`.
    pub fn in_window(self, window: Window) -> Self {
        match self {
            already @ (ReclassifyError::WorkerFailure { .. } | ReclassifyError::Cancelled) => {
                already
            }
            other => ReclassifyError::WorkerFailure {
                window,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ReclassifyError>;
