//! Runs a reclassification job: tiles the source, remaps windows on a
//! bounded worker pool and reassembles the results.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use log::{debug, info};
use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::error::{ReclassifyError, Result};
use crate::io::{OutputSpec, RasterBackend, RasterSink, RasterSource};
use crate::pixel::PixelType;
use crate::reclassify::{Remap, Unmatched};
use crate::table::LookupTable;
use crate::tiling::{Window, WindowTiler};

/// Per-run engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub workers: usize,
    pub windows_per_axis: usize,
    pub align_to_blocks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            windows_per_axis: 15,
            align_to_blocks: false,
        }
    }
}

/// Three quarters of the available hardware threads, leaving room for I/O.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| (n.get() * 3 / 4).max(1))
        .unwrap_or(1)
}

/// Where reclassified windows go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Collect results in memory.
    Memory,
    /// One single-band raster per field, in field order.
    PerField(Vec<PathBuf>),
    /// One raster with a band per field.
    Multiband(PathBuf),
}

impl Destination {
    /// Resolve output paths against the number of requested fields.
    pub fn from_outputs(outputs: Vec<PathBuf>, field_count: usize) -> Result<Self> {
        match outputs.len() {
            0 => Ok(Destination::Memory),
            n if n == field_count => Ok(Destination::PerField(outputs)),
            1 => Ok(Destination::Multiband(outputs.into_iter().next().unwrap_or_default())),
            n => Err(ReclassifyError::InvalidParameter(format!(
                "{} outputs given for {} fields (expected 0, 1 or {})",
                n, field_count, field_count
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReclassificationJob<'t> {
    pub source: PathBuf,
    pub table: &'t LookupTable,
    /// 1-based source band.
    pub band: usize,
    pub fields: Vec<String>,
    pub destination: Destination,
    pub unmatched: Unmatched,
}

impl<'t> ReclassificationJob<'t> {
    pub fn new<P: Into<PathBuf>>(source: P, table: &'t LookupTable, field: &str) -> Self {
        Self {
            source: source.into(),
            table,
            band: 1,
            fields: vec![field.to_string()],
            destination: Destination::Memory,
            unmatched: Unmatched::Keep,
        }
    }
}

/// Reclassified windows of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutput {
    pub field: String,
    pub dtype: PixelType,
    pub width: usize,
    pub height: usize,
    pub windows: Vec<(Window, Array2<f64>)>,
}

impl FieldOutput {
    /// Reassemble the windows into one full-extent array.
    pub fn mosaic(&self) -> Array2<f64> {
        let mut full = Array2::zeros((self.height, self.width));
        for (window, buffer) in &self.windows {
            full.slice_mut(s![window.row_off..window.row_end(), window.col_off..window.col_end()])
                .assign(buffer);
        }
        full
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    InMemory(Vec<FieldOutput>),
    Written { outputs: Vec<PathBuf>, windows: usize },
}

impl JobResult {
    pub fn field(&self, name: &str) -> Option<&FieldOutput> {
        match self {
            JobResult::InMemory(outputs) => outputs.iter().find(|o| o.field == name),
            JobResult::Written { .. } => None,
        }
    }
}

/// Everything the workers share, fixed before dispatch.
struct Plan<'a> {
    source: &'a Path,
    band: usize,
    remaps: Vec<Remap<'a>>,
    dtypes: Vec<PixelType>,
    windows: Vec<Window>,
    width: usize,
    height: usize,
    output: OutputSpec,
}

type WindowOutput = (Window, Vec<Array2<f64>>);

pub fn run<B: RasterBackend>(
    backend: &B,
    job: &ReclassificationJob<'_>,
    config: &EngineConfig,
) -> Result<JobResult> {
    if config.workers < 1 {
        return Err(ReclassifyError::InvalidParameter(
            "worker count must be at least 1".to_string(),
        ));
    }
    if job.fields.is_empty() {
        return Err(ReclassifyError::InvalidParameter(
            "at least one output field is required".to_string(),
        ));
    }
    if let Destination::PerField(paths) = &job.destination {
        if paths.len() != job.fields.len() {
            return Err(ReclassifyError::InvalidParameter(format!(
                "{} output paths for {} fields",
                paths.len(),
                job.fields.len()
            )));
        }
    }

    let plan = prepare(backend, job, config)?;
    info!(
        "Reclassifying {} ({}x{}, band {}) in {} windows with {} workers",
        job.source.display(),
        plan.width,
        plan.height,
        job.band,
        plan.windows.len(),
        config.workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("reclassify-{}", i))
        .build()?;

    match &job.destination {
        Destination::Memory => collect_in_memory(backend, job, &plan, &pool),
        Destination::PerField(paths) => {
            let routes = (0..paths.len()).map(|i| (i, 1)).collect();
            let specs = job
                .fields
                .iter()
                .zip(&plan.dtypes)
                .map(|(field, &dtype)| OutputSpec {
                    dtype,
                    band_names: vec![field.clone()],
                    ..plan.output.clone()
                })
                .collect::<Vec<_>>();
            write_destination(backend, &plan, &pool, paths, &specs, routes)
        }
        Destination::Multiband(path) => {
            let dtype = plan
                .dtypes
                .iter()
                .fold(plan.dtypes[0], |acc, &t| acc.widen(t));
            let spec = OutputSpec {
                dtype,
                band_names: job.fields.clone(),
                ..plan.output.clone()
            };
            let routes = (0..job.fields.len()).map(|i| (0, i + 1)).collect();
            write_destination(
                backend,
                &plan,
                &pool,
                std::slice::from_ref(path),
                std::slice::from_ref(&spec),
                routes,
            )
        }
    }
}

/// Validate the job against the source and fix windows, remaps and dtypes.
/// Nothing here reads pixel data.
fn prepare<'a, B: RasterBackend>(
    backend: &B,
    job: &'a ReclassificationJob<'_>,
    config: &EngineConfig,
) -> Result<Plan<'a>> {
    let source = backend.open(&job.source)?;
    let (width, height) = source.dimensions();

    let band_count = source.band_count();
    if job.band < 1 || job.band > band_count {
        return Err(ReclassifyError::InvalidBand {
            band: job.band,
            count: band_count,
        });
    }
    let source_type = source.dtype(job.band)?;
    let nodata = source.nodata(job.band)?;

    let mut remaps = Vec::with_capacity(job.fields.len());
    let mut dtypes = Vec::with_capacity(job.fields.len());
    for field in &job.fields {
        let remap = Remap::for_field(job.table, field)?
            .unmatched(job.unmatched)
            .preserve(nodata);
        let dtype = remap.derive_output_type(source_type);
        if dtype != source_type {
            info!(
                "Field {} needs {} output (source band is {})",
                field, dtype, source_type
            );
        }
        remaps.push(remap.output_type(dtype));
        dtypes.push(dtype);
    }

    let mut tiler = WindowTiler::new(config.windows_per_axis)?;
    if config.align_to_blocks {
        if let Some(block) = source.block_size(job.band) {
            debug!("Aligning windows to {}x{} blocks", block.0, block.1);
            tiler = tiler.aligned_to(block);
        }
    }
    let windows = tiler.tile(width, height)?;

    let output = OutputSpec {
        width,
        height,
        dtype: source_type,
        band_names: Vec::new(),
        nodata,
        georeference: source.georeference(),
    };

    Ok(Plan {
        source: &job.source,
        band: job.band,
        remaps,
        dtypes,
        windows,
        width,
        height,
        output,
    })
}

/// Read one window once and remap it against every field.
fn process_window<S: RasterSource>(
    source: &std::result::Result<S, String>,
    plan: &Plan<'_>,
    window: &Window,
) -> Result<Vec<Array2<f64>>> {
    let source = source
        .as_ref()
        .map_err(|reason| ReclassifyError::SourceUnreadable {
            path: plan.source.to_path_buf(),
            reason: reason.clone(),
        })?;
    let buffer = source.read(plan.band, window)?;
    debug!("Remapping window {}", window);
    Ok(plan.remaps.iter().map(|remap| remap.apply(&buffer)).collect())
}

fn open_worker_source<B: RasterBackend>(
    backend: &B,
    path: &Path,
) -> std::result::Result<B::Source, String> {
    // Every window on this split reports the open error, and `ReclassifyError` is not `Clone`.
    backend.open(path).map_err(|e| e.to_string())
}

fn collect_in_memory<B: RasterBackend>(
    backend: &B,
    job: &ReclassificationJob<'_>,
    plan: &Plan<'_>,
    pool: &rayon::ThreadPool,
) -> Result<JobResult> {
    let results: Vec<WindowOutput> = pool.install(|| {
        plan.windows
            .par_iter()
            .map_init(
                || open_worker_source(backend, plan.source),
                |source, window| {
                    process_window(source, plan, window)
                        .map(|buffers| (*window, buffers))
                        .map_err(|e| e.in_window(*window))
                },
            )
            .collect::<Result<Vec<_>>>()
    })?;

    let mut outputs: Vec<FieldOutput> = job
        .fields
        .iter()
        .zip(&plan.dtypes)
        .map(|(field, &dtype)| FieldOutput {
            field: field.clone(),
            dtype,
            width: plan.width,
            height: plan.height,
            windows: Vec::with_capacity(results.len()),
        })
        .collect();

    for (window, buffers) in results {
        for (output, buffer) in outputs.iter_mut().zip(buffers) {
            output.windows.push((window, buffer));
        }
    }

    info!("Reclassified {} windows in memory", plan.windows.len());
    Ok(JobResult::InMemory(outputs))
}

/// Workers compute windows in parallel; this thread owns every sink and is
/// the only writer. `routes[i]` is the (sink, band) receiving field `i`.
fn write_destination<B: RasterBackend>(
    backend: &B,
    plan: &Plan<'_>,
    pool: &rayon::ThreadPool,
    paths: &[PathBuf],
    specs: &[OutputSpec],
    routes: Vec<(usize, usize)>,
) -> Result<JobResult> {
    let mut sinks = paths
        .iter()
        .zip(specs)
        .map(|(path, spec)| backend.create(path, spec))
        .collect::<Result<Vec<_>>>()?;

    let capacity = pool.current_num_threads() * 2;
    let (tx, rx) = mpsc::sync_channel::<WindowOutput>(capacity);

    let (produced, written) = thread::scope(|scope| {
        let producer = scope.spawn(move || {
            pool.install(|| {
                plan.windows
                    .par_iter()
                    .map_init(
                        || open_worker_source(backend, plan.source),
                        |source, window| {
                            process_window(source, plan, window)
                                .map(|buffers| (*window, buffers))
                                .map_err(|e| e.in_window(*window))
                        },
                    )
                    .try_for_each_with(tx, |tx, output| {
                        tx.send(output?).map_err(|_| ReclassifyError::Cancelled)
                    })
            })
        });

        let mut written = Ok(0usize);
        for (window, buffers) in rx.iter() {
            let result = buffers
                .iter()
                .zip(&routes)
                .try_for_each(|(buffer, &(sink, band))| sinks[sink].write(band, &window, buffer));
            match result {
                Ok(()) => {
                    if let Ok(count) = written.as_mut() {
                        *count += 1;
                    }
                }
                Err(e) => {
                    written = Err(ReclassifyError::WriteFailure {
                        window,
                        source: Box::new(e),
                    });
                    break;
                }
            }
        }
        // Workers blocked on a full channel fail their send once the receiver is gone.
        drop(rx);

        let produced = producer
            .join()
            .unwrap_or(Err(ReclassifyError::WorkerPanicked));
        (produced, written)
    });

    let written = match (produced, written) {
        (_, Err(write_error)) => return Err(write_error),
        (Err(worker_error), Ok(_)) => return Err(worker_error),
        (Ok(()), Ok(count)) => count,
    };

    for sink in sinks {
        sink.finish()?;
    }

    info!(
        "Wrote {} windows to {} output(s)",
        written,
        paths.len()
    );
    Ok(JobResult::Written {
        outputs: paths.to_vec(),
        windows: written,
    })
}
