//! Write synthetic absorption-line spectra for trying out the analysis
//! commands:
//!
//! * `sample_spectra.parquet` – list columns `x`/`y`, one spectrum per row
//!   (select one with `--ext` or `file[ext,x,y]`)
//! * `sample_spectrum.csv` – flat `WAVELENGTH`/`FLUX` columns, first row only

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::SeedableRng;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use statrs::distribution::Normal;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Sloped continuum with Gaussian absorption lines `(centre, sigma, depth)`
/// plus white noise.
fn generate_spectrum(
    wavelengths: &[f64],
    lines: &[(f64, f64, f64)],
    noise: &Normal,
    rng: &mut StdRng,
) -> Vec<f64> {
    wavelengths
        .iter()
        .map(|&wl| {
            let continuum = 1.0 + 2e-5 * (wl - 6500.0);
            let absorption: f64 = lines
                .iter()
                .map(|&(mu, sigma, depth)| gaussian(wl, mu, sigma, depth))
                .sum();
            continuum - absorption + noise.sample(&mut *rng)
        })
        .collect()
}

fn list_column(rows: &[Vec<f64>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.005)?;

    // 6400 → 6700 Angstrom, 0.5 Angstrom steps
    let wavelengths: Vec<f64> = (0..601).map(|i| 6400.0 + i as f64 * 0.5).collect();

    // H-alpha at three depths, plus a weak neighbour
    let depths = [0.2, 0.4, 0.6];
    let spectra: Vec<Vec<f64>> = depths
        .iter()
        .map(|&depth| {
            let lines = [(6562.8, 2.5, depth), (6610.0, 1.5, 0.1)];
            generate_spectrum(&wavelengths, &lines, &noise, &mut rng)
        })
        .collect();

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item.clone()), false),
        Field::new("y", DataType::List(item), false),
    ]));
    let xs = vec![wavelengths.clone(); spectra.len()];
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(list_column(&xs)), Arc::new(list_column(&spectra))],
    )
    .context("building record batch")?;

    let parquet_path = "sample_spectra.parquet";
    let file = std::fs::File::create(parquet_path)
        .with_context(|| format!("creating {parquet_path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let csv_path = "sample_spectrum.csv";
    let mut csv = csv::Writer::from_path(csv_path).with_context(|| format!("creating {csv_path}"))?;
    csv.write_record(["WAVELENGTH", "FLUX"])?;
    for (wl, flux) in wavelengths.iter().zip(&spectra[0]) {
        csv.write_record([wl.to_string(), flux.to_string()])?;
    }
    csv.flush()?;

    log::info!("Parquet and CSV samples written");
    println!(
        "Wrote {} spectra ({} wavelengths each) to {parquet_path} and the first to {csv_path}",
        spectra.len(),
        wavelengths.len()
    );
    Ok(())
}
