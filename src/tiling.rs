use std::fmt;

use log::debug;

use crate::error::{ReclassifyError, Result};

/// A rectangle of raster cells: column/row offset plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    pub fn col_end(&self) -> usize {
        self.col_off + self.width
    }

    pub fn row_end(&self) -> usize {
        self.row_off + self.height
    }

    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Shape as ndarray expects it: (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.col_end() <= width && self.row_end() <= height
    }

    pub fn intersects(&self, other: &Window) -> bool {
        self.col_off < other.col_end()
            && other.col_off < self.col_end()
            && self.row_off < other.row_end()
            && other.row_off < self.row_end()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}-{}, {}-{}]",
            self.col_off,
            self.col_end(),
            self.row_off,
            self.row_end()
        )
    }
}

/// Splits a raster extent into a roughly `windows_per_axis` × `windows_per_axis`
/// grid of windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowTiler {
    windows_per_axis: usize,
    block: Option<(usize, usize)>,
}

impl WindowTiler {
    pub fn new(windows_per_axis: usize) -> Result<Self> {
        if windows_per_axis < 1 {
            return Err(ReclassifyError::InvalidParameter(format!(
                "target window count must be at least 1, got {}",
                windows_per_axis
            )));
        }
        Ok(Self {
            windows_per_axis,
            block: None,
        })
    }

    /// Round window sides down to whole multiples of a native block size.
    pub fn aligned_to(mut self, block: (usize, usize)) -> Self {
        if block.0 > 0 && block.1 > 0 {
            self.block = Some(block);
        }
        self
    }

    pub fn grid(&self, width: usize, height: usize) -> Result<WindowGrid> {
        if width == 0 || height == 0 {
            return Err(ReclassifyError::InvalidExtent(width, height));
        }

        let mut side_x = tile_side(width, self.windows_per_axis);
        let mut side_y = tile_side(height, self.windows_per_axis);
        if let Some((block_x, block_y)) = self.block {
            side_x = align_side(side_x, block_x);
            side_y = align_side(side_y, block_y);
        }

        Ok(WindowGrid::new(width, height, side_x, side_y))
    }

    pub fn tile(&self, width: usize, height: usize) -> Result<Vec<Window>> {
        Ok(self.grid(width, height)?.iter().collect())
    }
}

/// Largest side for which `extent / side` does not drop below `target`.
fn tile_side(extent: usize, target: usize) -> usize {
    (extent / target).max(1)
}

fn align_side(side: usize, block: usize) -> usize {
    ((side / block) * block).max(block)
}

pub struct WindowGrid {
    raster_width: usize,
    raster_height: usize,
    side_x: usize,
    side_y: usize,
    pub num_windows_x: usize,
    pub num_windows_y: usize,
    pub total_windows: usize,
}

impl WindowGrid {
    fn new(raster_width: usize, raster_height: usize, side_x: usize, side_y: usize) -> Self {
        let num_windows_x = raster_width.div_ceil(side_x);
        let num_windows_y = raster_height.div_ceil(side_y);
        let total_windows = num_windows_x * num_windows_y;

        debug!(
            "WindowGrid: {}x{} raster, window={}x{} → {}x{} windows ({} total)",
            raster_width, raster_height, side_x, side_y, num_windows_x, num_windows_y, total_windows
        );

        Self {
            raster_width,
            raster_height,
            side_x,
            side_y,
            num_windows_x,
            num_windows_y,
            total_windows,
        }
    }

    pub fn window_size(&self) -> (usize, usize) {
        (self.side_x, self.side_y)
    }

    pub fn iter(&self) -> WindowIterator<'_> {
        WindowIterator {
            grid: self,
            current_idx: 0,
        }
    }

    /// Window at a row-major linear index. Last row and column are clipped to the extent.
    pub fn get_window(&self, idx: usize) -> Window {
        let window_y = idx / self.num_windows_x;
        let window_x = idx % self.num_windows_x;

        let col_off = window_x * self.side_x;
        let row_off = window_y * self.side_y;
        let col_end = (col_off + self.side_x).min(self.raster_width);
        let row_end = (row_off + self.side_y).min(self.raster_height);

        Window::new(col_off, row_off, col_end - col_off, row_end - row_off)
    }
}

pub struct WindowIterator<'a> {
    grid: &'a WindowGrid,
    current_idx: usize,
}

impl Iterator for WindowIterator<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_windows {
            let window = self.grid.get_window(self.current_idx);
            self.current_idx += 1;
            Some(window)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total_windows - self.current_idx;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowIterator<'_> {}
