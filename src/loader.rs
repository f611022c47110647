use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::error::{ReclassifyError, Result};
use crate::table::TableRow;

/// Load key/value rows from a delimited text table (CSV, or TSV by extension).
pub fn load_table<P: AsRef<Path>>(
    path: P,
    key_column: &str,
    value_columns: &[String],
) -> Result<Vec<TableRow>> {
    let path = path.as_ref();
    info!("Loading lookup table: {}", path.display());

    let file = File::open(path).map_err(|e| ReclassifyError::TableUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };

    read_table(file, delimiter, key_column, value_columns).map_err(|e| match e {
        ReclassifyError::Csv(err) => ReclassifyError::TableUnreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
        other => other,
    })
}

/// Parse rows from any reader. The first record is the header.
pub fn read_table<R: Read>(
    reader: R,
    delimiter: u8,
    key_column: &str,
    value_columns: &[String],
) -> Result<Vec<TableRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let column_position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReclassifyError::MissingColumn(name.to_string()))
    };

    let key_position = column_position(key_column)?;
    let value_positions = value_columns
        .iter()
        .map(|name| column_position(name))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let cell = |position: usize| record.get(position).unwrap_or("");

        let key_text = cell(key_position);
        let key = parse_key(key_text).ok_or_else(|| ReclassifyError::InvalidTableValue {
            line,
            column: key_column.to_string(),
            value: key_text.to_string(),
        })?;

        let values = value_positions
            .iter()
            .zip(value_columns)
            .map(|(&position, name)| {
                let text = cell(position);
                text.parse::<f64>()
                    .map_err(|_| ReclassifyError::InvalidTableValue {
                        line,
                        column: name.clone(),
                        value: text.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        rows.push(TableRow::new(key, values));
    }

    debug!("Read {} table rows", rows.len());
    Ok(rows)
}

/// Integer keys, also accepting integral float text such as "5.0".
fn parse_key(text: &str) -> Option<i64> {
    if let Ok(key) = text.parse::<i64>() {
        return Some(key);
    }
    let value = text.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
