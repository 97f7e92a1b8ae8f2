use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{SpectrumData, Unit};
use super::source::{data_name, is_fully_specified, parse_source};

// ---------------------------------------------------------------------------
// Read options: which table, which columns, which units
// ---------------------------------------------------------------------------

/// How to pull one spectrum out of a tabular file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Zero-based extension index. Selects the row for list-column layouts.
    pub ext: usize,
    /// Name of the dispersion column.
    pub dispersion: String,
    /// Name of the flux column.
    pub flux: String,
    pub dispersion_unit: Unit,
    pub flux_unit: Unit,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            ext: 0,
            dispersion: "x".to_string(),
            flux: "y".to_string(),
            dispersion_unit: Unit::dimensionless(),
            flux_unit: Unit::dimensionless(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load one spectrum from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – list columns (one spectrum per row, `ext` picks the row)
///   or scalar float columns (one sample per row)
/// * `.json`    – `[{ "<dispersion>": [...], "<flux>": [...] }, ...]`
/// * `.csv`     – scalar columns, or cells of semicolon-separated floats
///
/// The returned spectrum always has an ascending dispersion axis.
pub fn load_spectrum(path: &Path, opts: &ReadOptions) -> Result<SpectrumData> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (x, y) = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path, opts),
        "json" => load_json(path, opts),
        "csv" => load_csv(path, opts),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    if x.len() != y.len() {
        bail!(
            "'{}' has {} values but '{}' has {}",
            opts.dispersion,
            x.len(),
            opts.flux,
            y.len()
        );
    }
    let (x, y) = ensure_ascending(x, y);

    log::debug!(
        "Read {} samples from {} (ext {}, columns {}/{})",
        x.len(),
        path.display(),
        opts.ext,
        opts.dispersion,
        opts.flux
    );

    Ok(SpectrumData::from_vecs(
        x,
        opts.dispersion_unit.clone(),
        y,
        opts.flux_unit.clone(),
    )?)
}

/// Load `path[ext,DISPERSION,FLUX]` (blank units) or a plain path read with
/// `defaults`. Returns the data name, taken from the file stem, and the
/// spectrum.
pub fn open_path(path_spec: &str, defaults: &ReadOptions) -> Result<(String, SpectrumData)> {
    let (path, opts) = if is_fully_specified(path_spec) {
        let spec = parse_source(path_spec)?;
        let opts = ReadOptions {
            ext: spec.ext,
            dispersion: spec.dispersion,
            flux: spec.flux,
            dispersion_unit: Unit::dimensionless(),
            flux_unit: Unit::dimensionless(),
        };
        (spec.path, opts)
    } else {
        (PathBuf::from(path_spec), defaults.clone())
    };

    let spectrum = load_spectrum(&path, &opts)?;
    Ok((data_name(&path), spectrum))
}

/// Reverse both arrays when the dispersion axis runs high → low.
fn ensure_ascending(mut x: Vec<f64>, mut y: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    if let (Some(first), Some(last)) = (x.first(), x.last()) {
        if first > last {
            x.reverse();
            y.reverse();
        }
    }
    (x, y)
}

fn no_such_ext(ext: usize, available: usize) -> anyhow::Error {
    anyhow::anyhow!("Extension {ext} out of range: file holds {available} spectra")
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "WAVELENGTH": [6500.0, 6501.0, ...], "FLUX": [1.02, 0.98, ...] },
///   ...
/// ]
/// ```
///
/// A single top-level object is accepted as extension 0.
fn load_json(path: &Path, opts: &ReadOptions) -> Result<(Vec<f64>, Vec<f64>)> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let record = match &root {
        JsonValue::Array(records) => records
            .get(opts.ext)
            .ok_or_else(|| no_such_ext(opts.ext, records.len()))?,
        JsonValue::Object(_) if opts.ext == 0 => &root,
        JsonValue::Object(_) => return Err(no_such_ext(opts.ext, 1)),
        _ => bail!("Expected top-level JSON array or object"),
    };

    let obj = record
        .as_object()
        .with_context(|| format!("Record {} is not a JSON object", opts.ext))?;

    let x = json_array_to_f64(obj.get(&opts.dispersion), opts.ext, &opts.dispersion)?;
    let y = json_array_to_f64(obj.get(&opts.flux), opts.ext, &opts.flux)?;
    Ok((x, y))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Record {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Record {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names.
///
/// Either every row is one sample (plain float cells, `ext` must be 0), or
/// every row is one spectrum whose cells hold semicolon-separated floats:
///   `"6500.0;6501.0;6502.0"`, `"1.02;0.98;1.01"`
fn load_csv(path: &Path, opts: &ReadOptions) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| *h == opts.dispersion)
        .with_context(|| format!("CSV missing '{}' column", opts.dispersion))?;
    let y_idx = headers
        .iter()
        .position(|h| *h == opts.flux)
        .with_context(|| format!("CSV missing '{}' column", opts.flux))?;

    let records = reader
        .records()
        .enumerate()
        .map(|(row_no, r)| r.with_context(|| format!("CSV row {row_no}")))
        .collect::<Result<Vec<_>>>()?;

    let packed = records
        .first()
        .and_then(|r| r.get(x_idx))
        .is_some_and(|cell| cell.contains(';'));

    if packed {
        let record = records
            .get(opts.ext)
            .ok_or_else(|| no_such_ext(opts.ext, records.len()))?;
        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), opts.ext, &opts.dispersion)?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), opts.ext, &opts.flux)?;
        return Ok((x, y));
    }

    if opts.ext != 0 {
        return Err(no_such_ext(opts.ext, 1));
    }
    let mut x = Vec::with_capacity(records.len());
    let mut y = Vec::with_capacity(records.len());
    for (row_no, record) in records.iter().enumerate() {
        x.push(parse_float(record.get(x_idx).unwrap_or(""), row_no, &opts.dispersion)?);
        y.push(parse_float(record.get(y_idx).unwrap_or(""), row_no, &opts.flux)?);
    }
    Ok((x, y))
}

fn parse_float(s: &str, row: usize, col: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a spectrum from a Parquet file.
///
/// Both named columns must share a layout:
/// - `List<Float64>` / `LargeList<Float64>` (or Float32): one spectrum per
///   row, `ext` selects the row across all record batches
/// - `Float64` / `Float32`: one sample per row, `ext` must be 0
fn load_parquet(path: &Path, opts: &ReadOptions) -> Result<(Vec<f64>, Vec<f64>)> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut rows_seen = 0usize;
    let mut list_layout = None;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of(&opts.dispersion)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{}' column", opts.dispersion))?;
        let y_idx = schema
            .index_of(&opts.flux)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{}' column", opts.flux))?;

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);
        let is_list = matches!(
            x_col.data_type(),
            DataType::List(_) | DataType::LargeList(_)
        );
        list_layout.get_or_insert(is_list);

        if is_list {
            let n_rows = batch.num_rows();
            if opts.ext < rows_seen + n_rows {
                let row = opts.ext - rows_seen;
                let x = extract_f64_list(x_col, row)
                    .with_context(|| format!("Row {}: failed to read '{}'", opts.ext, opts.dispersion))?;
                let y = extract_f64_list(y_col, row)
                    .with_context(|| format!("Row {}: failed to read '{}'", opts.ext, opts.flux))?;
                return Ok((x, y));
            }
            rows_seen += n_rows;
        } else {
            x.extend(extract_f64_column(x_col).with_context(|| format!("column '{}'", opts.dispersion))?);
            y.extend(extract_f64_column(y_col).with_context(|| format!("column '{}'", opts.flux))?);
        }
    }

    match list_layout {
        Some(true) => Err(no_such_ext(opts.ext, rows_seen)),
        _ if opts.ext != 0 => Err(no_such_ext(opts.ext, 1)),
        _ => Ok((x, y)),
    }
}

// -- Parquet / Arrow helpers --

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

    extract_f64_column(&values_array)
}

/// Read a flat Float64 or Float32 array, nulls becoming NaN.
fn extract_f64_column(col: &Arc<dyn Array>) -> Result<Vec<f64>> {
    if let Some(f64_arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "Column type is {:?}, expected Float64 or Float32",
            col.data_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_tmp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn opts(disp: &str, flux: &str) -> ReadOptions {
        ReadOptions {
            dispersion: disp.to_string(),
            flux: flux.to_string(),
            dispersion_unit: Unit::new("Angstrom"),
            flux_unit: Unit::new("Jy"),
            ..Default::default()
        }
    }

    #[test]
    fn reads_flat_csv_with_units() {
        let file = write_tmp(".csv", "WAVE,FLUX,ERR\n1.0,10.0,0.1\n2.0,11.0,0.1\n3.0,12.0,0.1\n");
        let sp = load_spectrum(file.path(), &opts("WAVE", "FLUX")).unwrap();
        assert_eq!(sp.x(), &[1.0, 2.0, 3.0]);
        assert_eq!(sp.y(), &[10.0, 11.0, 12.0]);
        assert_eq!(sp.x_unit().as_str(), "Angstrom");
        assert_eq!(sp.y_unit().as_str(), "Jy");
    }

    #[test]
    fn packed_csv_selects_row_by_ext() {
        let file = write_tmp(".csv", "x,y\n\"1;2\",\"5;6\"\n\"3;2;1\",\"7;8;9\"\n");
        let sp = load_spectrum(file.path(), &ReadOptions { ext: 1, ..Default::default() }).unwrap();
        // descending input is flipped
        assert_eq!(sp.x(), &[1.0, 2.0, 3.0]);
        assert_eq!(sp.y(), &[9.0, 8.0, 7.0]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let file = write_tmp(".csv", "WAVE,FLUX\n1.0,2.0\n");
        let err = load_spectrum(file.path(), &opts("WAVELENGTH", "FLUX")).unwrap_err();
        assert!(format!("{err:#}").contains("WAVELENGTH"));
    }

    #[test]
    fn flat_csv_rejects_nonzero_ext() {
        let file = write_tmp(".csv", "x,y\n1.0,2.0\n");
        let err = load_spectrum(file.path(), &ReadOptions { ext: 2, ..Default::default() });
        assert!(err.is_err());
    }

    #[test]
    fn json_records_select_by_ext() {
        let file = write_tmp(
            ".json",
            r#"[{"w": [1, 2], "f": [3, 4]}, {"w": [5, 6, 7], "f": [8, 9, 10]}]"#,
        );
        let sp = load_spectrum(file.path(), &ReadOptions { ext: 1, ..opts("w", "f") }).unwrap();
        assert_eq!(sp.len(), 3);
        assert_eq!(sp.y(), &[8.0, 9.0, 10.0]);
    }

    #[test]
    fn json_length_mismatch_is_rejected() {
        let file = write_tmp(".json", r#"{"x": [1, 2, 3], "y": [1, 2]}"#);
        assert!(load_spectrum(file.path(), &ReadOptions::default()).is_err());
    }

    #[test]
    fn unsupported_extension() {
        let file = write_tmp(".fits", "");
        let err = load_spectrum(file.path(), &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    fn write_parquet(columns: Vec<(&str, arrow::array::ArrayRef)>) -> tempfile::NamedTempFile {
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let batch = RecordBatch::try_from_iter(columns).unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        file
    }

    fn list_array(rows: &[&[f64]]) -> arrow::array::ArrayRef {
        use arrow::array::{Float64Builder, ListBuilder};

        let mut builder = ListBuilder::new(Float64Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    #[test]
    fn parquet_list_rows_select_by_ext() {
        let file = write_parquet(vec![
            ("x", list_array(&[&[1.0, 2.0], &[10.0, 20.0, 30.0]])),
            ("y", list_array(&[&[5.0, 6.0], &[7.0, 8.0, 9.0]])),
        ]);
        let sp = load_spectrum(file.path(), &ReadOptions { ext: 1, ..Default::default() }).unwrap();
        assert_eq!(sp.x(), &[10.0, 20.0, 30.0]);
        assert_eq!(sp.y(), &[7.0, 8.0, 9.0]);

        let err = load_spectrum(file.path(), &ReadOptions { ext: 2, ..Default::default() });
        assert!(format!("{:#}", err.unwrap_err()).contains("out of range"));
    }

    #[test]
    fn parquet_flat_columns() {
        let file = write_parquet(vec![
            ("WAVE", Arc::new(Float64Array::from(vec![3.0, 2.0, 1.0])) as _),
            ("FLUX", Arc::new(Float32Array::from(vec![0.5f32, 1.5, 2.5])) as _),
        ]);
        let sp = load_spectrum(file.path(), &opts("WAVE", "FLUX")).unwrap();
        assert_eq!(sp.x(), &[1.0, 2.0, 3.0]);
        assert_eq!(sp.y(), &[2.5, 1.5, 0.5]);
    }

    #[test]
    fn open_path_uses_bracket_columns_and_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o4st09020_sx1.csv");
        std::fs::write(&path, "WAVE,FLUX\n1.0,2.0\n2.0,3.0\n").unwrap();

        let spec = format!("{}[0,WAVE,FLUX]", path.display());
        let (name, sp) = open_path(&spec, &opts("x", "y")).unwrap();
        assert_eq!(name, "o4st09020_sx1");
        assert_eq!(sp.y(), &[2.0, 3.0]);
        // bracket notation carries no units
        assert!(sp.x_unit().is_dimensionless());

        let (_, sp) = open_path(path.to_str().unwrap(), &opts("WAVE", "FLUX")).unwrap();
        assert_eq!(sp.x_unit().as_str(), "Angstrom");
    }

    #[test]
    fn open_path_rejects_malformed_brackets() {
        assert!(open_path("spec.csv[0,WAVE]", &ReadOptions::default()).is_err());
    }
}
