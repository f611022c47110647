use std::path::PathBuf;

use log::info;

use crate::coordinator::{self, default_worker_count, Destination, EngineConfig, JobResult};
use crate::error::Result;
use crate::io::RasterBackend;
use crate::loader::load_table;
use crate::reclassify::Unmatched;
use crate::table::LookupTable;

/// A complete reclassification request, as a caller would describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub source: PathBuf,
    pub table: PathBuf,
    pub key_column: String,
    pub fields: Vec<String>,
    /// 1-based.
    pub band: usize,
    /// Empty for in-memory results, one path per field, or one path for a
    /// band-per-field raster.
    pub outputs: Vec<PathBuf>,
    pub workers: Option<usize>,
    pub windows_per_axis: usize,
    pub align_to_blocks: bool,
    pub unmatched_fill: Option<f64>,
}

impl JobSpec {
    pub fn new<S, T>(source: S, table: T, key_column: &str, fields: &[&str]) -> Self
    where
        S: Into<PathBuf>,
        T: Into<PathBuf>,
    {
        Self {
            source: source.into(),
            table: table.into(),
            key_column: key_column.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            band: 1,
            outputs: Vec::new(),
            workers: None,
            windows_per_axis: EngineConfig::default().windows_per_axis,
            align_to_blocks: false,
            unmatched_fill: None,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers.unwrap_or_else(default_worker_count),
            windows_per_axis: self.windows_per_axis,
            align_to_blocks: self.align_to_blocks,
        }
    }
}

/// Load the table, then run the job. Table errors surface before any raster
/// window is read.
pub fn reclassify<B: RasterBackend>(backend: &B, spec: &JobSpec) -> Result<JobResult> {
    let rows = load_table(&spec.table, &spec.key_column, &spec.fields)?;
    let table = LookupTable::build(spec.fields.clone(), rows)?;
    info!(
        "Lookup table {}: {} keys, fields {:?}",
        spec.table.display(),
        table.len(),
        table.fields()
    );

    let job = coordinator::ReclassificationJob {
        source: spec.source.clone(),
        table: &table,
        band: spec.band,
        fields: spec.fields.clone(),
        destination: Destination::from_outputs(spec.outputs.clone(), spec.fields.len())?,
        unmatched: spec.unmatched_fill.map_or(Unmatched::Keep, Unmatched::Fill),
    };

    coordinator::run(backend, &job, &spec.engine_config())
}
