use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use rusty_specview::analysis::fitting::gaussian_parameter_estimates;
use rusty_specview::analysis::models::{ModelKind, ParametricModel};
use rusty_specview::analysis::statistics::{dispersion_integral, stats};
use rusty_specview::config::AnalysisConfig;
use rusty_specview::data::filter::Roi;
use rusty_specview::data::model::Unit;
use rusty_specview::state::{EquivalentWidthReport, FitReport, MeasurementReport, Session};
use rusty_specview::tree::ItemId;

// ============================================================================
// CLI definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rusty-specview")]
#[command(about = "Inspect 1-D spectra, measure lines and fit models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (read options, fit options, fitter)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Row / extension to read from a multi-spectrum file
    #[arg(long, global = true)]
    ext: Option<usize>,

    /// Dispersion column name
    #[arg(long, global = true)]
    dispersion: Option<String>,

    /// Flux column name
    #[arg(long, global = true)]
    flux: Option<String>,

    #[arg(long, global = true)]
    dispersion_unit: Option<String>,

    #[arg(long, global = true)]
    flux_unit: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a spectrum
    Info {
        /// Path, or `path[ext,DISPERSION,FLUX]`
        file: String,
    },

    /// Statistics inside dispersion ranges
    Measure {
        file: String,

        /// Range as LO:HI, repeatable
        #[arg(long = "range", value_parser = parse_range, required = true)]
        ranges: Vec<(f64, f64)>,
    },

    /// Line flux and equivalent width between two continuum ranges
    Eqwidth {
        file: String,

        #[arg(long, value_parser = parse_range)]
        cont1: (f64, f64),

        #[arg(long, value_parser = parse_range)]
        cont2: (f64, f64),
    },

    /// Fit a sum of models to a spectrum
    Fit {
        file: String,

        /// Model name, repeatable; components are summed in order
        #[arg(long = "model", required = true)]
        models: Vec<String>,

        /// Only fit points inside these LO:HI ranges
        #[arg(long = "range", value_parser = parse_range)]
        ranges: Vec<(f64, f64)>,

        /// Fitter name (overrides the config)
        #[arg(long)]
        fitter: Option<String>,

        /// Starting value as [INDEX.]NAME=VALUE, INDEX being the model position
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<ParamOverride>,

        /// Seed Gaussian1D components from the data's moments
        #[arg(long)]
        estimate: bool,

        /// Write dispersion, flux and fitted model to this CSV file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
struct ParamOverride {
    model: usize,
    name: String,
    value: f64,
}

fn parse_range(s: &str) -> std::result::Result<(f64, f64), String> {
    let (lo, hi) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LO:HI, got '{s}'"))?;
    let lo: f64 = lo.trim().parse().map_err(|e| format!("bad lower bound: {e}"))?;
    let hi: f64 = hi.trim().parse().map_err(|e| format!("bad upper bound: {e}"))?;
    Ok((lo.min(hi), lo.max(hi)))
}

fn parse_param(s: &str) -> std::result::Result<ParamOverride, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected [INDEX.]NAME=VALUE, got '{s}'"))?;
    let value: f64 = value.trim().parse().map_err(|e| format!("bad value: {e}"))?;
    let (model, name) = match key.split_once('.') {
        Some((idx, name)) => (
            idx.trim().parse().map_err(|e| format!("bad model index: {e}"))?,
            name,
        ),
        None => (0, key),
    };
    Ok(ParamOverride {
        model,
        name: name.trim().to_string(),
        value,
    })
}

// ============================================================================
// Entry point
// ============================================================================

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli).inspect_err(|e| log::error!("{e:#}"))
}

fn run(cli: Cli) -> Result<()> {
    let mut session = Session::new(load_config(&cli)?);

    match &cli.command {
        Commands::Info { file } => {
            let data = session.open_file(file)?;
            let name = session.tree.name(data)?.to_string();
            let sp = session.tree.spectrum(data)?;
            let summary = InfoReport {
                name,
                npoints: sp.len(),
                dispersion_unit: sp.x_unit().to_string(),
                flux_unit: sp.y_unit().to_string(),
                range: sp.x_range(),
                integral: dispersion_integral(sp),
                stats: stats(sp).ok(),
            };
            print_report(cli.json, &summary, print_info)
        }

        Commands::Measure { file, ranges } => {
            let data = session.open_file(file)?;
            activate_full_layer(&mut session, data)?;
            let reports = ranges
                .iter()
                .map(|&(lo, hi)| session.measure(&Roi::x_band(lo, hi)))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            print_report(cli.json, reports.as_slice(), print_measurements)
        }

        Commands::Eqwidth { file, cont1, cont2 } => {
            let data = session.open_file(file)?;
            activate_full_layer(&mut session, data)?;
            session.add_roi(Roi::x_band(cont1.0, cont1.1));
            session.add_roi(Roi::x_band(cont2.0, cont2.1));
            let report = session.equivalent_width()?;
            print_report(cli.json, &report, print_eq_width)
        }

        Commands::Fit {
            file,
            models,
            ranges,
            fitter,
            params,
            estimate,
            output,
        } => {
            if let Some(fitter) = fitter {
                session.config.fitter = fitter.clone();
            }
            let data = session.open_file(file)?;
            for &(lo, hi) in ranges {
                session.add_roi(Roi::x_band(lo, hi));
            }
            let layer = session.create_layer_from_rois(data)?;

            let mut model_items = Vec::with_capacity(models.len());
            for name in models {
                let kind: ModelKind = name.parse()?;
                let id = if *estimate && kind == ModelKind::Gaussian1D {
                    let sp = session.tree.spectrum(layer)?;
                    let (amp, mean, stddev) = gaussian_parameter_estimates(sp.x(), sp.y());
                    log::info!("Gaussian estimates: amplitude {amp}, mean {mean}, stddev {stddev}");
                    session.add_seeded_model(ParametricModel::with_values(
                        kind,
                        &[amp, mean, stddev],
                    )?)?
                } else {
                    session.add_model(name)?
                };
                model_items.push(id);
            }

            for p in params {
                let Some(&model) = model_items.get(p.model) else {
                    bail!("--param refers to model {} but only {} given", p.model, models.len());
                };
                session.edit_parameter(model, &p.name, p.value)?;
            }

            let report = session.perform_fit()?;
            if let Some(path) = output {
                write_fit_csv(&session, layer, report.fit_item, path)?;
                log::info!("Wrote fit to {}", path.display());
            }
            print_report(cli.json, &report, print_fit)
        }
    }
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    let read = &mut config.read;
    if let Some(ext) = cli.ext {
        read.ext = ext;
    }
    if let Some(col) = &cli.dispersion {
        read.dispersion = col.clone();
    }
    if let Some(col) = &cli.flux {
        read.flux = col.clone();
    }
    if let Some(unit) = &cli.dispersion_unit {
        read.dispersion_unit = Unit::new(unit.as_str());
    }
    if let Some(unit) = &cli.flux_unit {
        read.flux_unit = Unit::new(unit.as_str());
    }
    Ok(config)
}

/// Unmasked layer over the whole data item, made active.
fn activate_full_layer(session: &mut Session, data: ItemId) -> Result<ItemId> {
    let layer = session.tree.create_layer_item(data, None)?;
    session.set_active_layer(layer)?;
    Ok(layer)
}

fn write_fit_csv(session: &Session, layer: ItemId, fit: ItemId, path: &Path) -> Result<()> {
    let data = session.tree.spectrum(layer)?;
    let model = session.tree.spectrum(fit)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["dispersion", "flux", "model"])?;
    for ((x, y), m) in data.x().iter().zip(data.y()).zip(model.y()) {
        writer.write_record([x.to_string(), y.to_string(), m.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct InfoReport {
    name: String,
    npoints: usize,
    dispersion_unit: String,
    flux_unit: String,
    range: Option<(f64, f64)>,
    integral: f64,
    stats: Option<rusty_specview::analysis::statistics::Stats>,
}

fn print_report<T: Serialize + ?Sized>(json: bool, report: &T, text: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        text(report);
    }
    Ok(())
}

fn unit_suffix(unit: &str) -> String {
    if unit.is_empty() {
        String::new()
    } else {
        format!(" [{unit}]")
    }
}

fn print_info(r: &InfoReport) {
    println!("{}: {} points", r.name, r.npoints);
    if let Some((lo, hi)) = r.range {
        println!("  dispersion {lo} .. {hi}{}", unit_suffix(&r.dispersion_unit));
    }
    println!("  flux unit  {}", if r.flux_unit.is_empty() { "-" } else { &r.flux_unit });
    if let Some(s) = &r.stats {
        println!(
            "  mean {:.6}  median {:.6}  stddev {:.6}",
            s.mean, s.median, s.stddev
        );
    }
    println!("  integral over dispersion {:.6}", r.integral);
}

fn print_measurements(reports: &[MeasurementReport]) {
    for r in reports {
        println!(
            "{} / {}  [{}, {}): n={}  mean {:.6}  median {:.6}  stddev {:.6}  total {:.6}",
            r.data_name,
            r.layer_name,
            r.region.lo,
            r.region.hi,
            r.stats.npoints,
            r.stats.mean,
            r.stats.median,
            r.stats.stddev,
            r.stats.total
        );
    }
}

fn print_eq_width(r: &EquivalentWidthReport) {
    println!("{} / {}", r.data_name, r.layer_name);
    println!(
        "  continuum means {:.6}, {:.6}",
        r.continuum1.mean, r.continuum2.mean
    );
    println!("  line region [{}, {})", r.line_region.lo, r.line_region.hi);
    println!("  flux {:.6}", r.measurement.flux);
    println!("  equivalent width {:.6}", r.measurement.equivalent_width);
}

fn print_fit(r: &FitReport) {
    println!(
        "{}: {} iterations, sum of squares {:.6e}",
        r.fitter, r.iterations, r.sum_of_squares
    );
    for (i, c) in r.components.iter().enumerate() {
        println!("  [{i}] {}", c.model);
        for (name, value) in &c.parameters {
            println!("      {name:<10} {value:.6}");
        }
    }
}
