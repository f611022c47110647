use std::collections::HashMap;

use log::debug;

use crate::error::{ReclassifyError, Result};

/// One table row as produced by a loader: the key plus one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: i64,
    pub values: Vec<f64>,
}

impl TableRow {
    pub fn new(key: i64, values: Vec<f64>) -> Self {
        Self { key, values }
    }
}

/// Position of an output field within a [`LookupTable`], resolved once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIndex(usize);

/// Immutable key → field values mapping.
///
/// Rows are kept sorted by key in a flat row-major arena; a hash index maps
/// each key to its row so per-cell lookups are O(1).
#[derive(Debug, Clone)]
pub struct LookupTable {
    fields: Vec<String>,
    keys: Vec<i64>,
    values: Vec<f64>,
    index: HashMap<i64, usize>,
}

impl LookupTable {
    pub fn build(fields: Vec<String>, mut rows: Vec<TableRow>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.values.len() != fields.len()) {
            return Err(ReclassifyError::InvalidParameter(format!(
                "row with key {} has {} values, expected {}",
                row.key,
                row.values.len(),
                fields.len()
            )));
        }

        rows.sort_unstable_by_key(|row| row.key);
        if let Some(pair) = rows.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(ReclassifyError::DuplicateKey(pair[0].key));
        }

        let mut keys = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * fields.len());
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.into_iter().enumerate() {
            index.insert(row.key, position);
            keys.push(row.key);
            values.extend(row.values);
        }

        debug!(
            "Lookup table: {} rows, fields {:?}",
            keys.len(),
            fields
        );

        Ok(Self {
            fields,
            keys,
            values,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    pub fn field(&self, name: &str) -> Result<FieldIndex> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(FieldIndex)
            .ok_or_else(|| ReclassifyError::MissingColumn(name.to_string()))
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.index.contains_key(&key)
    }

    pub fn lookup(&self, key: i64, field: FieldIndex) -> Option<f64> {
        self.index
            .get(&key)
            .map(|&row| self.values[row * self.fields.len() + field.0])
    }

    /// Lookup by field name; `None` for an unknown key or field.
    pub fn get(&self, key: i64, field: &str) -> Option<f64> {
        let field = self.field(field).ok()?;
        self.lookup(key, field)
    }

    /// All values of one field, in key order.
    pub fn field_values(&self, field: FieldIndex) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(field.0)
            .step_by(self.fields.len().max(1))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lookup_by_field() {
        let table = LookupTable::build(
            fields(&["di", "pi"]),
            vec![
                TableRow::new(30, vec![3.0, 0.3]),
                TableRow::new(10, vec![1.0, 0.1]),
                TableRow::new(20, vec![2.0, 0.2]),
            ],
        )
        .unwrap();

        let di = table.field("di").unwrap();
        let pi = table.field("pi").unwrap();
        assert_eq!(table.lookup(10, di), Some(1.0));
        assert_eq!(table.lookup(20, pi), Some(0.2));
        assert_eq!(table.lookup(40, di), None);
        assert_eq!(table.get(30, "pi"), Some(0.3));
        assert_eq!(table.get(30, "nope"), None);
    }

    #[test]
    fn test_keys_sorted() {
        let table = LookupTable::build(
            fields(&["v"]),
            vec![
                TableRow::new(5, vec![0.0]),
                TableRow::new(-2, vec![0.0]),
                TableRow::new(3, vec![0.0]),
            ],
        )
        .unwrap();
        assert_eq!(table.keys(), &[-2, 3, 5]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = LookupTable::build(
            fields(&["v"]),
            vec![
                TableRow::new(5, vec![1.0]),
                TableRow::new(6, vec![2.0]),
                TableRow::new(5, vec![3.0]),
            ],
        );
        assert!(matches!(result, Err(ReclassifyError::DuplicateKey(5))));
    }

    #[test]
    fn test_row_width_mismatch() {
        let result = LookupTable::build(fields(&["a", "b"]), vec![TableRow::new(1, vec![1.0])]);
        assert!(matches!(result, Err(ReclassifyError::InvalidParameter(_))));
    }

    #[test]
    fn test_missing_field() {
        let table = LookupTable::build(fields(&["di"]), vec![]).unwrap();
        assert!(table.is_empty());
        assert!(matches!(
            table.field("pi"),
            Err(ReclassifyError::MissingColumn(name)) if name == "pi"
        ));
    }

    #[test]
    fn test_field_values_in_key_order() {
        let table = LookupTable::build(
            fields(&["a", "b"]),
            vec![TableRow::new(2, vec![20.0, 0.2]), TableRow::new(1, vec![10.0, 0.1])],
        )
        .unwrap();
        let b = table.field("b").unwrap();
        assert_eq!(table.field_values(b).collect::<Vec<_>>(), vec![0.1, 0.2]);
    }
}
