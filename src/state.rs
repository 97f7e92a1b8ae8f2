use ndarray::ArrayView1;
use serde::Serialize;

use crate::analysis::fitting::Fitter;
use crate::analysis::models::{Model, ParametricModel};
use crate::analysis::statistics::{
    LineMeasurement, Region, Stats, eq_width, extract, feature_bounds, stats,
};
use crate::config::AnalysisConfig;
use crate::data::filter::{Roi, roi_mask};
use crate::data::loader::open_path;
use crate::data::model::SpectrumData;
use crate::error::{Result, SpecviewError};
use crate::tree::{DocumentTree, ItemId};

// ---------------------------------------------------------------------------
// Reports handed back to the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementReport {
    pub data_name: String,
    pub layer_name: String,
    pub region: Region,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquivalentWidthReport {
    pub data_name: String,
    pub layer_name: String,
    pub continuum1: Stats,
    pub continuum2: Stats,
    pub line_region: Region,
    #[serde(flatten)]
    pub measurement: LineMeasurement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedComponent {
    pub model: String,
    pub parameters: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub fitter: String,
    pub components: Vec<FittedComponent>,
    pub iterations: usize,
    pub sum_of_squares: f64,
    /// The data item holding the evaluated fit.
    pub fit_item: ItemId,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything an interactive front end drives, independent of rendering.
/// Passed explicitly to whoever needs it; there is no global instance.
pub struct Session {
    pub tree: DocumentTree,
    pub config: AnalysisConfig,

    /// Layer that measurements and fits operate on.
    active_layer: Option<ItemId>,

    /// Regions of interest drawn so far, oldest first.
    pub rois: Vec<Roi>,

    /// Status / error message for the user.
    pub status_message: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl Session {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            tree: DocumentTree::new(),
            config,
            active_layer: None,
            rois: Vec::new(),
            status_message: None,
        }
    }

    // -- loading --

    /// Load a file, either `path[ext,DISPERSION,FLUX]` or a plain path read
    /// with the configured [`ReadOptions`], and add it as a data item.
    pub fn open_file(&mut self, path_spec: &str) -> anyhow::Result<ItemId> {
        let result = self.load(path_spec);
        match &result {
            Ok(id) => {
                let sp = self.tree.spectrum(*id)?;
                log::info!("Loaded {} samples from {path_spec}", sp.len());
                self.status_message = None;
            }
            Err(e) => {
                log::error!("Failed to load file: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
        result
    }

    fn load(&mut self, path_spec: &str) -> anyhow::Result<ItemId> {
        let (name, spectrum) = open_path(path_spec, &self.config.read)?;
        Ok(self.add_data_set(spectrum, name))
    }

    pub fn add_data_set(&mut self, spectrum: SpectrumData, name: impl Into<String>) -> ItemId {
        self.tree.create_data_item(spectrum, name)
    }

    // -- regions and layers --

    pub fn add_roi(&mut self, roi: Roi) {
        self.rois.push(roi);
    }

    pub fn clear_rois(&mut self) {
        self.rois.clear();
    }

    /// New layer over `data` keeping only the points inside the current
    /// ROIs. The layer becomes active.
    pub fn create_layer_from_rois(&mut self, data: ItemId) -> Result<ItemId> {
        let mask = roi_mask(self.tree.data(data)?.spectrum(), &self.rois);
        let layer = self.tree.create_layer_item(data, Some(mask))?;
        self.active_layer = Some(layer);
        Ok(layer)
    }

    /// Make `layer` the target of measurements and fits. Anything that is
    /// not a layer is rejected and the previous selection kept.
    pub fn set_active_layer(&mut self, layer: ItemId) -> Result<()> {
        if let Err(e) = self.tree.layer(layer) {
            log::warn!("Ignoring selection of {layer}: {e}");
            return Err(e.into());
        }
        self.active_layer = Some(layer);
        Ok(())
    }

    pub fn active_layer(&self) -> Result<ItemId> {
        self.active_layer.ok_or(SpecviewError::NoActiveLayer)
    }

    fn active_names(&self, layer: ItemId) -> Result<(String, String)> {
        let item = self.tree.layer(layer)?;
        let data_name = self.tree.name(item.parent())?.to_string();
        Ok((data_name, item.name.clone()))
    }

    // -- measurements --

    /// Statistics of the active layer inside one ROI's dispersion range.
    pub fn measure(&self, roi: &Roi) -> Result<MeasurementReport> {
        let layer = self.active_layer()?;
        let (x1, x2) = roi.x_range();
        let region = Region::new(x1, x2);
        let stats = stats(&extract(self.tree.spectrum(layer)?, region))?;
        let (data_name, layer_name) = self.active_names(layer)?;
        Ok(MeasurementReport {
            data_name,
            layer_name,
            region,
            stats,
        })
    }

    /// Equivalent width of the line between the last two ROIs, which are
    /// taken as continuum regions.
    pub fn equivalent_width(&self) -> Result<EquivalentWidthReport> {
        let layer = self.active_layer()?;
        let [.., a, b] = self.rois.as_slice() else {
            return Err(SpecviewError::MissingRois {
                needed: 2,
                got: self.rois.len(),
            });
        };
        let spectrum = self.tree.spectrum(layer)?;
        let cont_a = Region::from(a.x_range());
        let cont_b = Region::from(b.x_range());
        let continuum1 = stats(&extract(spectrum, cont_a))?;
        let continuum2 = stats(&extract(spectrum, cont_b))?;

        let line_region = feature_bounds(cont_a, cont_b);
        let measurement = eq_width(&continuum1, &continuum2, &extract(spectrum, line_region))?;
        let (data_name, layer_name) = self.active_names(layer)?;

        Ok(EquivalentWidthReport {
            data_name,
            layer_name,
            continuum1,
            continuum2,
            line_region,
            measurement,
        })
    }

    // -- models --

    /// Attach a catalogue model to the active layer.
    pub fn add_model(&mut self, model_name: &str) -> Result<ItemId> {
        let layer = self.active_layer()?;
        Ok(self.tree.create_fit_model(layer, model_name)?)
    }

    /// Attach a pre-seeded model to the active layer.
    pub fn add_seeded_model(&mut self, model: ParametricModel) -> Result<ItemId> {
        let layer = self.active_layer()?;
        Ok(self.tree.attach_model(layer, model)?)
    }

    pub fn edit_parameter(&mut self, model: ItemId, name: &str, value: f64) -> Result<()> {
        self.tree.update_parameter(model, name, value)?;
        log::debug!("Set {name} = {value} on model {model}");
        Ok(())
    }

    /// The active layer's summed model evaluated on the layer's dispersion axis.
    pub fn replot_model(&self) -> Result<SpectrumData> {
        let layer = self.active_layer()?;
        let model = self
            .tree
            .layer_model(layer)?
            .ok_or(SpecviewError::NoModels(layer))?;
        let spectrum = self.tree.spectrum(layer)?;
        let curve = model.eval(ArrayView1::from(spectrum.x())).to_vec();
        Ok(spectrum.with_flux(curve, spectrum.y_unit().clone())?)
    }

    /// Fit the active layer's models jointly with the configured fitter.
    ///
    /// On success the fitted values are written into the model items and
    /// the evaluated fit is added as a new data item. On failure nothing in
    /// the tree changes.
    pub fn perform_fit(&mut self) -> Result<FitReport> {
        let layer = self.active_layer()?;
        let init = self
            .tree
            .layer_model(layer)?
            .ok_or(SpecviewError::NoModels(layer))?;
        let fitter: Fitter = self.config.fitter.parse()?;
        let spectrum = self.tree.spectrum(layer)?.clone();

        let fit = match fitter.fit(&init, spectrum.x(), spectrum.y(), &self.config.fit) {
            Ok(fit) => fit,
            Err(e) => {
                self.status_message = Some(format!("Fit failed: {e}"));
                return Err(e.into());
            }
        };

        self.tree.apply_fit(layer, &fit.model)?;

        let curve = fit.model.eval(ArrayView1::from(spectrum.x())).to_vec();
        let fit_data = spectrum.with_flux(curve, spectrum.y_unit().clone())?;
        let (data_name, layer_name) = self.active_names(layer)?;
        let fit_item = self
            .tree
            .create_data_item(fit_data, format!("Model Fit ({data_name}: {layer_name})"));

        let components = fit
            .model
            .components()
            .iter()
            .map(|c| FittedComponent {
                model: c.name().to_string(),
                parameters: c
                    .param_names()
                    .iter()
                    .zip(c.values())
                    .map(|(n, &v)| (n.to_string(), v))
                    .collect(),
            })
            .collect();

        self.status_message = None;
        Ok(FitReport {
            fitter: fitter.name().to_string(),
            components,
            iterations: fit.iterations,
            sum_of_squares: fit.sum_of_squares,
            fit_item,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::analysis::models::ModelKind;
    use crate::error::{FitError, TreeError};

    fn session_with_line() -> (Session, ItemId) {
        let mut session = Session::default();
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let y = x
            .iter()
            .map(|&v| if (12.0..18.0).contains(&v) { 8.0 } else { 10.0 })
            .collect();
        let sp = SpectrumData::from_vecs(x, "Angstrom", y, "Jy").unwrap();
        let data = session.add_data_set(sp, "star");
        (session, data)
    }

    #[test]
    fn operations_need_an_active_layer() {
        let (session, _) = session_with_line();
        assert!(matches!(
            session.measure(&Roi::x_band(0.0, 5.0)),
            Err(SpecviewError::NoActiveLayer)
        ));
    }

    #[test]
    fn selecting_a_data_item_as_layer_is_ignored() {
        let (mut session, data) = session_with_line();
        let layer = session.create_layer_from_rois(data).unwrap();
        let err = session.set_active_layer(data).unwrap_err();
        assert!(matches!(err, SpecviewError::Tree(TreeError::WrongKind { .. })));
        assert_eq!(session.active_layer().unwrap(), layer);
    }

    #[test]
    fn measure_uses_roi_dispersion_range() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        let report = session.measure(&Roi::new(12.0, 0.0, 15.0, 100.0)).unwrap();
        assert_eq!(report.stats.npoints, 3);
        assert_eq!(report.stats.mean, 8.0);
        assert_eq!(report.data_name, "star");
    }

    #[test]
    fn equivalent_width_between_last_two_rois() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        session.add_roi(Roi::x_band(100.0, 200.0));
        session.add_roi(Roi::x_band(20.0, 30.0));
        session.add_roi(Roi::x_band(0.0, 10.0));

        let report = session.equivalent_width().unwrap();
        assert_eq!(report.line_region, Region::new(10.0, 20.0));
        assert_eq!(report.continuum1.mean, 10.0);
        // six points 2 below a continuum of 10, unit spacing
        assert_abs_diff_eq!(report.measurement.flux, -12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(report.measurement.equivalent_width, 1.2, epsilon = 1e-12);
    }

    #[test]
    fn equivalent_width_needs_two_rois() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        session.add_roi(Roi::x_band(0.0, 10.0));
        assert!(matches!(
            session.equivalent_width(),
            Err(SpecviewError::MissingRois { needed: 2, got: 1 })
        ));
    }

    #[test]
    fn fit_writes_back_and_adds_fit_data() {
        let (mut session, data) = session_with_line();
        let layer = session.create_layer_from_rois(data).unwrap();
        let model = session
            .add_seeded_model(ParametricModel::with_values(ModelKind::Const1D, &[3.0]).unwrap())
            .unwrap();

        let report = session.perform_fit().unwrap();
        let fitted = session.tree.model(model).unwrap().model().values()[0];
        // mean flux: 24 points at 10, 6 at 8
        assert_abs_diff_eq!(fitted, 9.6, epsilon = 1e-6);
        assert_eq!(session.tree.parameter_rows(model).unwrap()[0].1, fitted);
        assert_eq!(report.components[0].model, "Const1D");
        assert_eq!(
            session.tree.name(report.fit_item).unwrap(),
            "Model Fit (star: Layer 1)"
        );
        assert_eq!(session.tree.spectrum(report.fit_item).unwrap().len(), 30);
        assert_eq!(session.active_layer().unwrap(), layer);
    }

    #[test]
    fn failed_fit_leaves_parameters_alone() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        let model = session.add_model("PowerLaw1D").unwrap();
        // x = 0 is sampled, so (x / x_0) is 0/0
        session.edit_parameter(model, "x_0", 0.0).unwrap();

        let before = session.tree.model(model).unwrap().model().values().to_vec();
        let n_items = session.tree.data_items().len();
        let err = session.perform_fit().unwrap_err();

        assert!(matches!(err, SpecviewError::Fit(FitError::NonFinite)));
        assert_eq!(session.tree.model(model).unwrap().model().values(), &before[..]);
        assert_eq!(session.tree.data_items().len(), n_items);
        assert!(session.status_message.as_deref().unwrap().starts_with("Fit failed"));
    }

    #[test]
    fn unknown_fitter_is_reported() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        session.add_model("Const1D").unwrap();
        session.config.fitter = "Powell".to_string();
        assert!(matches!(
            session.perform_fit(),
            Err(SpecviewError::Fit(FitError::UnknownFitter(_)))
        ));
    }

    #[test]
    fn replot_model_evaluates_without_fitting() {
        let (mut session, data) = session_with_line();
        session.create_layer_from_rois(data).unwrap();
        let model = session.add_model("Const1D").unwrap();
        session.edit_parameter(model, "amplitude", 4.0).unwrap();
        let curve = session.replot_model().unwrap();
        assert!(curve.y().iter().all(|&v| v == 4.0));
        assert_eq!(curve.y_unit().as_str(), "Jy");
    }

    #[test]
    fn malformed_bracket_path_sets_status() {
        let mut session = Session::default();
        assert!(session.open_file("spectrum.csv[one,WAVE,FLUX]").is_err());
        assert!(session.status_message.is_some());
        assert!(session.tree.data_items().is_empty());
    }
}
