use std::io::Write;
use std::path::Path;

use approx::assert_relative_eq;

use rusty_specview::config::AnalysisConfig;
use rusty_specview::data::filter::Roi;
use rusty_specview::state::Session;

const DEPTH: f64 = 0.5;
const CENTRE: f64 = 6560.0;
const SIGMA: f64 = 3.0;

/// Unit continuum with one Gaussian absorption line, 1 Angstrom sampling.
fn write_line_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("halpha.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "WAVE,FLUX").unwrap();
    for i in 0..=120 {
        let x = 6500.0 + i as f64;
        let y = 1.0 - DEPTH * (-(x - CENTRE).powi(2) / (2.0 * SIGMA * SIGMA)).exp();
        writeln!(file, "{x},{y}").unwrap();
    }
    path
}

#[test]
fn measure_then_fit_an_absorption_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_line_csv(dir.path());

    let mut session = Session::default();
    let data = session
        .open_file(&format!("{}[0,WAVE,FLUX]", path.display()))
        .unwrap();
    assert_eq!(session.tree.name(data).unwrap(), "halpha");
    assert_eq!(session.tree.spectrum(data).unwrap().len(), 121);

    // equivalent width on the full spectrum
    let full = session.tree.create_layer_item(data, None).unwrap();
    session.set_active_layer(full).unwrap();
    session.add_roi(Roi::x_band(6500.0, 6530.0));
    session.add_roi(Roi::x_band(6590.0, 6620.0));
    let ew = session.equivalent_width().unwrap();

    let expected = DEPTH * SIGMA * (2.0 * std::f64::consts::PI).sqrt();
    assert_relative_eq!(ew.continuum1.mean, 1.0, max_relative = 1e-9);
    assert_relative_eq!(ew.measurement.equivalent_width, expected, max_relative = 1e-3);
    assert_relative_eq!(ew.measurement.flux, -expected, max_relative = 1e-3);
    assert_eq!(ew.line_region.lo, 6530.0);
    assert_eq!(ew.line_region.hi, 6590.0);

    // joint Gaussian + constant fit on a fresh unmasked layer
    session.clear_rois();
    let layer = session.create_layer_from_rois(data).unwrap();
    let gauss = session.add_model("Gaussian1D").unwrap();
    session.edit_parameter(gauss, "amplitude", -0.4).unwrap();
    session.edit_parameter(gauss, "mean", 6558.0).unwrap();
    session.edit_parameter(gauss, "stddev", 2.0).unwrap();
    let cont = session.add_model("Const1D").unwrap();
    session.edit_parameter(cont, "amplitude", 0.9).unwrap();

    let report = session.perform_fit().unwrap();
    assert_eq!(report.fitter, "Levenberg-Marquardt");

    let fitted = session.tree.model(gauss).unwrap().model().values().to_vec();
    assert_relative_eq!(fitted[0], -DEPTH, max_relative = 1e-4);
    assert_relative_eq!(fitted[1], CENTRE, max_relative = 1e-6);
    assert_relative_eq!(fitted[2].abs(), SIGMA, max_relative = 1e-4);
    let level = session.tree.model(cont).unwrap().model().values()[0];
    assert_relative_eq!(level, 1.0, max_relative = 1e-4);

    assert_eq!(
        session.tree.name(report.fit_item).unwrap(),
        "Model Fit (halpha: Layer 2)"
    );
    let layer_flux = session.tree.spectrum(layer).unwrap().y().to_vec();
    let fit_flux = session.tree.spectrum(report.fit_item).unwrap().y().to_vec();
    for (d, m) in layer_flux.iter().zip(&fit_flux) {
        assert!((d - m).abs() < 1e-4);
    }
}

#[test]
fn config_read_options_apply_to_plain_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_line_csv(dir.path());
    let config_path = dir.path().join("specview.json");
    std::fs::write(
        &config_path,
        r#"{ "read": { "dispersion": "WAVE", "flux": "FLUX", "dispersion_unit": "Angstrom" } }"#,
    )
    .unwrap();

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    let mut session = Session::new(config);
    let data = session.open_file(path.to_str().unwrap()).unwrap();
    let sp = session.tree.spectrum(data).unwrap();
    assert_eq!(sp.x_unit().as_str(), "Angstrom");
    assert_eq!(sp.x_range(), Some((6500.0, 6620.0)));
}

#[test]
fn missing_file_reports_status() {
    let mut session = Session::default();
    assert!(session.open_file("/nonexistent/spectrum.csv").is_err());
    assert!(session.status_message.as_deref().unwrap().starts_with("Error"));
}
