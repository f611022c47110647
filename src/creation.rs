use crate::error::{ReclassifyError, Result};

const VALID_COMPRESSION: [&str; 4] = ["DEFLATE", "LZW", "ZSTD", "NONE"];

/// GeoTIFF creation options for destination rasters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    compression: String,
    tile_size: usize,
}

impl CreationOptions {
    pub fn new(compression: &str, tile_size: usize) -> Result<Self> {
        let compression = compression.to_ascii_uppercase();
        validate_compression(&compression)?;
        validate_tile_size(tile_size)?;
        Ok(Self {
            compression,
            tile_size,
        })
    }

    pub fn compression(&self) -> &str {
        &self.compression
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// GDAL `KEY=VALUE` creation options for a tiled GeoTIFF.
    pub fn to_options(&self) -> Vec<String> {
        vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.tile_size),
            format!("BLOCKYSIZE={}", self.tile_size),
            "BIGTIFF=IF_SAFER".to_string(),
        ]
    }
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            tile_size: 256,
        }
    }
}

pub fn validate_compression(compression: &str) -> Result<()> {
    if !VALID_COMPRESSION.contains(&compression) {
        return Err(ReclassifyError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Tile size must be a positive multiple of 16.
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(ReclassifyError::InvalidTileSize(tile_size));
    }
    Ok(())
}
