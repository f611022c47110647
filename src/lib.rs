// Library exports for testing and reuse

pub mod cli;
pub mod coordinator;
pub mod creation;
pub mod error;
pub mod io;
pub mod job;
pub mod loader;
pub mod pixel;
pub mod reclassify;
pub mod table;
pub mod tiling;

// Re-export commonly used types
pub use coordinator::{run, Destination, EngineConfig, FieldOutput, JobResult, ReclassificationJob};
pub use error::{ReclassifyError, Result};
pub use job::{reclassify, JobSpec};
pub use pixel::PixelType;
pub use reclassify::{reclassify_window, Remap, Unmatched};
pub use table::{FieldIndex, LookupTable, TableRow};
pub use tiling::{Window, WindowTiler};
