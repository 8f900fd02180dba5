use datafusion::arrow::array::{
    Array, ArrayRef, AsArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray, StringViewArray, UInt64Array,
};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Float64Type};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;

use marketlens_types::{Cell, Row};

use super::QueryError;

// ─────────────────────────────────────────────────────────────────────────────
// Generic Column Extractors (handles Arrow type variations automatically)
// ─────────────────────────────────────────────────────────────────────────────

fn column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a ArrayRef, QueryError> {
    if idx >= batch.num_columns() {
        return Err(QueryError::ColumnNotFound {
            name: format!("#{idx}"),
        });
    }
    Ok(batch.column(idx))
}

fn unexpected(batch: &RecordBatch, idx: usize, expected: &'static str) -> QueryError {
    QueryError::UnexpectedColumnType {
        name: batch.schema().field(idx).name().clone(),
        expected,
        actual: format!("{:?}", batch.column(idx).data_type()),
    }
}

/// Strings of a column. Non-string columns are rendered with Arrow's display
/// formatter; nulls become empty strings.
pub fn col_strings(batch: &RecordBatch, idx: usize) -> Result<Vec<String>, QueryError> {
    let col = column(batch, idx)?;
    if let Some(a) = col.as_any().downcast_ref::<StringViewArray>() {
        return Ok((0..a.len()).map(|i| a.value(i).to_string()).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<StringArray>() {
        return Ok((0..a.len()).map(|i| a.value(i).to_string()).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<LargeStringArray>() {
        return Ok((0..a.len()).map(|i| a.value(i).to_string()).collect());
    }
    (0..col.len())
        .map(|i| {
            if col.is_null(i) {
                Ok(String::new())
            } else {
                array_value_to_string(col, i).map_err(QueryError::from)
            }
        })
        .collect()
}

pub fn col_i64(batch: &RecordBatch, idx: usize) -> Result<Vec<i64>, QueryError> {
    let col = column(batch, idx)?;
    if let Some(a) = col.as_any().downcast_ref::<Int64Array>() {
        return Ok((0..a.len()).map(|i| a.value(i)).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<Int32Array>() {
        return Ok((0..a.len()).map(|i| a.value(i) as i64).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<UInt64Array>() {
        return Ok((0..a.len()).map(|i| a.value(i) as i64).collect());
    }
    Err(unexpected(batch, idx, "int"))
}

/// Floats of a column. Nulls read as 0; decimals and other numeric types are
/// cast to Float64.
pub fn col_f64(batch: &RecordBatch, idx: usize) -> Result<Vec<f64>, QueryError> {
    let col = column(batch, idx)?;
    let read = |i: usize, v: f64| if col.is_null(i) { 0.0 } else { v };
    if let Some(a) = col.as_any().downcast_ref::<Float64Array>() {
        return Ok((0..a.len()).map(|i| read(i, a.value(i))).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<Float32Array>() {
        return Ok((0..a.len()).map(|i| read(i, a.value(i) as f64)).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<Int64Array>() {
        return Ok((0..a.len()).map(|i| read(i, a.value(i) as f64)).collect());
    }
    if let Some(a) = col.as_any().downcast_ref::<Int32Array>() {
        return Ok((0..a.len()).map(|i| read(i, a.value(i) as f64)).collect());
    }
    if col.data_type().is_numeric() {
        let casted = cast(col, &DataType::Float64)?;
        let a = casted.as_primitive::<Float64Type>();
        return Ok((0..a.len()).map(|i| read(i, a.value(i))).collect());
    }
    Err(unexpected(batch, idx, "float"))
}

/// First value of the first column, or 0 for an empty result.
pub fn scalar_f64(batches: &[RecordBatch], idx: usize) -> Result<f64, QueryError> {
    match batches.iter().find(|b| b.num_rows() > 0) {
        Some(b) => Ok(col_f64(b, idx)?.first().copied().unwrap_or(0.0)),
        None => Ok(0.0),
    }
}

pub fn scalar_i64(batches: &[RecordBatch], idx: usize) -> Result<i64, QueryError> {
    match batches.iter().find(|b| b.num_rows() > 0) {
        Some(b) => Ok(col_i64(b, idx)?.first().copied().unwrap_or(0)),
        None => Ok(0),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Untyped Rows
// ─────────────────────────────────────────────────────────────────────────────

enum ColumnReader {
    Number(ArrayRef),
    Text(ArrayRef),
}

impl ColumnReader {
    fn new(col: &ArrayRef) -> Result<Self, QueryError> {
        let dt = col.data_type();
        if dt.is_numeric() {
            return Ok(Self::Number(cast(col, &DataType::Float64)?));
        }
        if matches!(dt, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View) {
            return Ok(Self::Text(cast(col, &DataType::Utf8)?));
        }
        Ok(Self::Text(col.clone()))
    }

    fn cell(&self, row: usize) -> Result<Cell, QueryError> {
        match self {
            Self::Number(a) if a.is_null(row) => Ok(Cell::Null),
            Self::Text(a) if a.is_null(row) => Ok(Cell::Null),
            Self::Number(a) => Ok(Cell::Number(a.as_primitive::<Float64Type>().value(row))),
            Self::Text(a) => match a.as_string_opt::<i32>() {
                Some(s) => Ok(Cell::Text(s.value(row).to_string())),
                None => Ok(Cell::Text(array_value_to_string(a, row)?)),
            },
        }
    }
}

/// Convert record batches into name/value rows in projection order.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, QueryError> {
    let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in batches {
        let schema = batch.schema();
        let names: Vec<&String> = schema.fields().iter().map(|f| f.name()).collect();
        let readers = batch
            .columns()
            .iter()
            .map(ColumnReader::new)
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..batch.num_rows() {
            let values = names
                .iter()
                .zip(&readers)
                .map(|(name, reader)| Ok(((*name).clone(), reader.cell(i)?)))
                .collect::<Result<Vec<_>, QueryError>>()?;
            rows.push(Row { values });
        }
    }
    Ok(rows)
}
