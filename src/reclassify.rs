use ndarray::Array2;

use crate::error::Result;
use crate::pixel::PixelType;
use crate::table::{FieldIndex, LookupTable};

/// What happens to cells whose value is not a table key.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Unmatched {
    /// Leave the cell as it is.
    #[default]
    Keep,
    /// Overwrite the cell with a constant.
    Fill(f64),
}

/// Per-cell remapping of one window against one table field.
///
/// Every cell is looked up once, by its input value, so substitutions never
/// chain within a pass and key order has no effect on the result.
#[derive(Debug, Clone, Copy)]
pub struct Remap<'a> {
    table: &'a LookupTable,
    field: FieldIndex,
    unmatched: Unmatched,
    preserve: Option<f64>,
    output_type: PixelType,
}

impl<'a> Remap<'a> {
    pub fn new(table: &'a LookupTable, field: FieldIndex) -> Self {
        Self {
            table,
            field,
            unmatched: Unmatched::Keep,
            preserve: None,
            output_type: PixelType::Float64,
        }
    }

    pub fn for_field(table: &'a LookupTable, name: &str) -> Result<Self> {
        Ok(Self::new(table, table.field(name)?))
    }

    pub fn unmatched(mut self, unmatched: Unmatched) -> Self {
        self.unmatched = unmatched;
        self
    }

    /// A value (typically the source nodata) that the fill step never touches.
    pub fn preserve(mut self, value: Option<f64>) -> Self {
        self.preserve = value;
        self
    }

    pub fn output_type(mut self, output_type: PixelType) -> Self {
        self.output_type = output_type;
        self
    }

    /// Narrowest type holding the source band type and every value this
    /// remap can produce.
    pub fn derive_output_type(&self, source: PixelType) -> PixelType {
        let fill = match self.unmatched {
            Unmatched::Fill(value) => Some(value),
            Unmatched::Keep => None,
        };
        source.fitting(self.table.field_values(self.field).chain(fill))
    }

    pub fn value(&self, cell: f64) -> f64 {
        let mapped = match cell_key(cell).and_then(|key| self.table.lookup(key, self.field)) {
            Some(value) => value,
            None => match self.unmatched {
                Unmatched::Fill(fill) if !self.is_preserved(cell) => fill,
                _ => cell,
            },
        };
        self.output_type.cast(mapped)
    }

    fn is_preserved(&self, cell: f64) -> bool {
        match self.preserve {
            Some(nodata) if nodata.is_nan() => cell.is_nan(),
            Some(nodata) => cell == nodata,
            None => false,
        }
    }

    pub fn apply(&self, buffer: &Array2<f64>) -> Array2<f64> {
        buffer.mapv(|cell| self.value(cell))
    }

    pub fn apply_in_place(&self, buffer: &mut Array2<f64>) {
        buffer.mapv_inplace(|cell| self.value(cell));
    }
}

/// Reclassify one window buffer; unmatched cells pass through unchanged.
pub fn reclassify_window(
    mut buffer: Array2<f64>,
    table: &LookupTable,
    field: FieldIndex,
) -> Array2<f64> {
    Remap::new(table, field).apply_in_place(&mut buffer);
    buffer
}

/// Cells match a key only when finite and integral.
fn cell_key(cell: f64) -> Option<i64> {
    if cell.is_finite() && cell.fract() == 0.0 && cell.abs() < i64::MAX as f64 {
        Some(cell as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableRow;
    use ndarray::arr2;

    fn table(pairs: &[(i64, f64)]) -> LookupTable {
        LookupTable::build(
            vec!["v".to_string()],
            pairs
                .iter()
                .map(|&(k, v)| TableRow::new(k, vec![v]))
                .collect(),
        )
        .unwrap()
    }

    fn field(table: &LookupTable) -> FieldIndex {
        table.field("v").unwrap()
    }

    #[test]
    fn test_matched_cells_replaced() {
        let t = table(&[(1, 10.0), (3, 30.0)]);
        let data = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let out = reclassify_window(data, &t, field(&t));
        assert_eq!(out, arr2(&[[10.0, 2.0], [30.0, 4.0]]));
    }

    #[test]
    fn test_unmatched_cells_never_zeroed() {
        // A window with none of the table keys must come back untouched.
        let t = table(&[(100, 1.0), (200, 2.0)]);
        for fill in [-3.0, 0.0, 7.5, 99.0] {
            let data = Array2::from_elem((3, 4), fill);
            let out = reclassify_window(data.clone(), &t, field(&t));
            assert_eq!(out, data);
        }

        let data = arr2(&[[5.0, 6.0, 7.0], [8.0, 100.0, 9.0]]);
        let out = reclassify_window(data, &t, field(&t));
        assert_eq!(out, arr2(&[[5.0, 6.0, 7.0], [8.0, 1.0, 9.0]]));
    }

    #[test]
    fn test_empty_table_is_noop() {
        let t = table(&[]);
        let data = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(reclassify_window(data.clone(), &t, field(&t)), data);
    }

    #[test]
    fn test_identity_table() {
        let data = arr2(&[[1.0, 2.0, 3.0], [3.0, 2.0, 1.0]]);
        let t = table(&[(1, 1.0), (2, 2.0), (3, 3.0)]);
        assert_eq!(reclassify_window(data.clone(), &t, field(&t)), data);
    }

    #[test]
    fn test_no_chaining_within_pass() {
        // 1→2 and 2→3: a cell holding 1 ends as 2, not 3.
        let t = table(&[(1, 2.0), (2, 3.0)]);
        let data = arr2(&[[1.0, 2.0, 3.0]]);
        let once = reclassify_window(data, &t, field(&t));
        assert_eq!(once, arr2(&[[2.0, 3.0, 3.0]]));

        // Outputs that are also keys move again on a second pass.
        let twice = reclassify_window(once, &t, field(&t));
        assert_eq!(twice, arr2(&[[3.0, 3.0, 3.0]]));
    }

    #[test]
    fn test_idempotent_when_outputs_disjoint_from_keys() {
        let t = table(&[(1, 10.0), (2, 20.0)]);
        let data = arr2(&[[1.0, 2.0], [5.0, 1.0]]);
        let once = reclassify_window(data, &t, field(&t));
        let twice = reclassify_window(once.clone(), &t, field(&t));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fill_unmatched_preserves_nodata() {
        let t = table(&[(1, 10.0)]);
        let remap = Remap::new(&t, field(&t))
            .unmatched(Unmatched::Fill(0.0))
            .preserve(Some(-9999.0));
        let data = arr2(&[[1.0, 2.0], [-9999.0, 3.5]]);
        assert_eq!(remap.apply(&data), arr2(&[[10.0, 0.0], [-9999.0, 0.0]]));
    }

    #[test]
    fn test_table_entry_for_nodata_wins() {
        let t = table(&[(-9999, 0.0)]);
        let remap = Remap::new(&t, field(&t))
            .unmatched(Unmatched::Fill(1.0))
            .preserve(Some(-9999.0));
        let data = arr2(&[[-9999.0, 4.0]]);
        assert_eq!(remap.apply(&data), arr2(&[[0.0, 1.0]]));
    }

    #[test]
    fn test_fractional_and_nan_cells_never_match() {
        let t = table(&[(1, 10.0)]);
        let remap = Remap::new(&t, field(&t));
        assert_eq!(remap.value(1.5), 1.5);
        assert!(remap.value(f64::NAN).is_nan());
        assert_eq!(remap.value(1.0), 10.0);
    }

    #[test]
    fn test_output_type_casts_values() {
        let t = table(&[(1, 0.1)]);
        let remap = Remap::new(&t, field(&t)).output_type(PixelType::Float32);
        assert_eq!(remap.value(1.0), 0.1f32 as f64);
    }

    #[test]
    fn test_derive_output_type() {
        let t = table(&[(5, 42.0)]);
        let remap = Remap::new(&t, field(&t));
        assert_eq!(remap.derive_output_type(PixelType::Int32), PixelType::Int32);

        let t = table(&[(5, 0.5)]);
        let remap = Remap::new(&t, field(&t));
        assert_eq!(remap.derive_output_type(PixelType::Int32), PixelType::Float64);
        assert_eq!(remap.derive_output_type(PixelType::UInt8), PixelType::Float32);

        let t = table(&[(5, 1.0)]);
        let remap = Remap::new(&t, field(&t)).unmatched(Unmatched::Fill(-1.0));
        assert_eq!(remap.derive_output_type(PixelType::UInt8), PixelType::Int16);
    }
}
