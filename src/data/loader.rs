use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{NoiseReference, Scan};

/// Raman-shift axis column of the instrument's wide tables.
pub const RAMAN_SHIFT_COLUMN: &str = "Raman shift (cm-1)";

/// Instrument axis columns that carry no intensity data.
const AXIS_COLUMNS: &[&str] = &["CCD pixel", "wavelength (nm)", RAMAN_SHIFT_COLUMN];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a scan from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – wide table: a `Raman shift (cm-1)` column plus one column per point
/// * `.json`    – `[{ "x": [...], "y": [...] }, ...]`, one record per point
/// * `.parquet` – `x` and `y` list columns, one row per point
///
/// The scan is named after the file stem.
pub fn load_scan(path: &Path) -> Result<Scan> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scan")
        .to_string();

    let (x, points) = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    Scan::new(name, x, points).with_context(|| format!("assembling scan from {}", path.display()))
}

/// Load a stowed-arm noise table (wide CSV, one column per measurement) and
/// reduce it to a single reference by per-sample median.
pub fn load_noise_table(path: &Path) -> Result<NoiseReference> {
    let table = read_wide_csv(path)?;
    if table.columns.is_empty() {
        bail!("{}: no noise measurement columns", path.display());
    }
    let measurements: Vec<Vec<f64>> = table.columns.into_iter().map(|(_, v)| v).collect();
    NoiseReference::median_of(&measurements)
        .with_context(|| format!("reducing noise table {}", path.display()))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

struct WideTable {
    raman_shift: Option<Vec<f64>>,
    columns: Vec<(String, Vec<f64>)>,
}

/// CSV layout: header row with column names, one row per x sample.
/// Axis columns (`CCD pixel`, `wavelength (nm)`, `Raman shift (cm-1)`) are
/// split off; every other column is an intensity trace.
fn read_wide_csv(path: &Path) -> Result<WideTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let shift_idx = headers.iter().position(|h| h == RAMAN_SHIFT_COLUMN);
    let data_idx: Vec<usize> = (0..headers.len())
        .filter(|&i| !AXIS_COLUMNS.contains(&headers[i].as_str()))
        .collect();

    let mut raman_shift = shift_idx.map(|_| Vec::new());
    let mut columns: Vec<(String, Vec<f64>)> = data_idx
        .iter()
        .map(|&i| (headers[i].clone(), Vec::new()))
        .collect();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        if let (Some(idx), Some(axis)) = (shift_idx, raman_shift.as_mut()) {
            axis.push(parse_cell(record.get(idx), row_no, RAMAN_SHIFT_COLUMN)?);
        }
        for (&col_idx, (name, values)) in data_idx.iter().zip(columns.iter_mut()) {
            values.push(parse_cell(record.get(col_idx), row_no, name)?);
        }
    }

    Ok(WideTable {
        raman_shift,
        columns,
    })
}

fn load_csv(path: &Path) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let table = read_wide_csv(path)?;
    let x = table
        .raman_shift
        .with_context(|| format!("CSV missing '{RAMAN_SHIFT_COLUMN}' column"))?;
    let points = table.columns.into_iter().map(|(_, v)| v).collect();
    Ok((x, points))
}

fn parse_cell(cell: Option<&str>, row: usize, col: &str) -> Result<f64> {
    let tok = cell.unwrap_or("").trim();
    tok.parse::<f64>()
        .with_context(|| format!("Row {row}, column '{col}': '{tok}' is not a number"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "x": [700.0, 700.5, ...], "y": [12.0, 14.1, ...] },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut axis = SharedAxis::default();
    let mut points = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;

        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }
        axis.check(x, i)?;
        points.push(y);
    }

    Ok((axis.finish()?, points))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one point per row.
///
/// Expected schema:
/// - `x`: List<Float64> or LargeList<Float64> – Raman shift, identical on every row
/// - `y`: List<Float64> or LargeList<Float64> – intensity
/// - Any other columns are ignored
fn load_parquet(path: &Path) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut axis = SharedAxis::default();
    let mut points = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        for row in 0..batch.num_rows() {
            let point = points.len();
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {point}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {point}: failed to read 'y'"))?;

            if x.len() != y.len() {
                bail!("Row {point}: x has {} values but y has {}", x.len(), y.len());
            }
            axis.check(x, point)?;
            points.push(y);
        }
    }

    Ok((axis.finish()?, points))
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

// -- shared x-axis bookkeeping for row-oriented formats --

#[derive(Default)]
struct SharedAxis {
    x: Option<Vec<f64>>,
}

impl SharedAxis {
    fn check(&mut self, x: Vec<f64>, row: usize) -> Result<()> {
        match &self.x {
            None => self.x = Some(x),
            Some(first) if *first == x => {}
            Some(_) => bail!("Row {row}: x-axis differs from row 0; a scan must share one axis"),
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<f64>> {
        self.x.context("file contains no spectra")
    }
}
