use std::path::PathBuf;

use clap::Parser;

use crate::job::JobSpec;

#[derive(Parser, Debug)]
#[command(name = "reclassify")]
#[command(about = "Reclassify a raster band through a lookup table, window by window")]
#[command(version)]
pub struct Args {
    /// Input raster path (8, 16 or 32-bit integer or float band; 64-bit integers are not supported)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Lookup table (CSV, or TSV by extension)
    #[arg(short, long, value_name = "FILE")]
    pub table: PathBuf,

    /// Table column holding the raster values to match
    #[arg(short, long, value_name = "COLUMN", default_value = "mukey")]
    pub key: String,

    /// Table column supplying output values (repeat for several outputs)
    #[arg(short, long = "field", value_name = "COLUMN", default_value = "di")]
    pub fields: Vec<String>,

    /// Source band (1-based)
    #[arg(short, long, value_name = "N", default_value_t = 1)]
    pub band: usize,

    /// Output raster: one per field, or one for a band-per-field stack.
    /// Without outputs the job runs in memory and prints a summary.
    #[arg(short, long = "output", value_name = "FILE")]
    pub outputs: Vec<PathBuf>,

    /// Worker threads (default: three quarters of available threads)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Approximate number of windows along each axis
    #[arg(long, value_name = "N", default_value_t = 15)]
    pub windows_per_axis: usize,

    /// Round window sizes to the source's native block size
    #[arg(long)]
    pub align_blocks: bool,

    /// Value written to cells that match no table key (default: leave them)
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pub unmatched_fill: Option<f64>,

    /// Output compression (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, default_value = "DEFLATE")]
    pub compression: String,

    /// Output tile size in pixels (multiple of 16)
    #[arg(long, default_value_t = 256)]
    pub tile_size: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn job_spec(&self) -> JobSpec {
        JobSpec {
            source: self.input.clone(),
            table: self.table.clone(),
            key_column: self.key.clone(),
            fields: self.fields.clone(),
            band: self.band,
            outputs: self.outputs.clone(),
            workers: self.threads,
            windows_per_axis: self.windows_per_axis,
            align_to_blocks: self.align_blocks,
            unmatched_fill: self.unmatched_fill,
        }
    }
}
