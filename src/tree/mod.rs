//! Document tree: Data → Layer → Model → Parameter.
//!
//! Items live in a single arena owned by [`DocumentTree`]. Parents own
//! their children through lists of [`ItemId`]s; the parent handle stored in
//! each child is only a lookup key. Every mutating operation checks the kind
//! of the items it is handed first and returns [`TreeError`] without
//! touching anything when they are wrong.

mod items;

pub use items::{DataItem, ItemId, ItemKind, LayerItem, ModelItem, ParameterItem, TreeItem};

use crate::analysis::models::{CompoundModel, Model, ParametricModel};
use crate::data::filter::{Mask, empty_mask, unmasked_indices};
use crate::data::model::SpectrumData;
use crate::error::{ModelError, TreeError};

type Result<T> = std::result::Result<T, TreeError>;

/// Arena of tree items.
///
/// Slots are append-only: removing an item empties its slot and the slot is
/// never handed out again, so a stale [`ItemId`] keeps failing with
/// [`TreeError::NotFound`] instead of aliasing a newer item. Memory for
/// removed items is released, only the empty slot remains.
#[derive(Debug, Clone, Default)]
pub struct DocumentTree {
    slots: Vec<Option<TreeItem>>,
    roots: Vec<ItemId>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Self::default()
    }

    // -- arena plumbing --

    fn insert(&mut self, item: TreeItem) -> ItemId {
        let id = ItemId(self.slots.len());
        self.slots.push(Some(item));
        id
    }

    pub fn get(&self, id: ItemId) -> Result<&TreeItem> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::NotFound(id))
    }

    fn get_mut(&mut self, id: ItemId) -> Result<&mut TreeItem> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::NotFound(id))
    }

    fn wrong_kind(id: ItemId, expected: ItemKind, found: &TreeItem) -> TreeError {
        TreeError::WrongKind {
            id,
            expected: expected.as_str(),
            found: found.kind().as_str(),
        }
    }

    pub fn data(&self, id: ItemId) -> Result<&DataItem> {
        match self.get(id)? {
            TreeItem::Data(d) => Ok(d),
            other => Err(Self::wrong_kind(id, ItemKind::Data, other)),
        }
    }

    pub fn layer(&self, id: ItemId) -> Result<&LayerItem> {
        match self.get(id)? {
            TreeItem::Layer(l) => Ok(l),
            other => Err(Self::wrong_kind(id, ItemKind::Layer, other)),
        }
    }

    pub fn model(&self, id: ItemId) -> Result<&ModelItem> {
        match self.get(id)? {
            TreeItem::Model(m) => Ok(m),
            other => Err(Self::wrong_kind(id, ItemKind::Model, other)),
        }
    }

    pub fn parameter(&self, id: ItemId) -> Result<&ParameterItem> {
        match self.get(id)? {
            TreeItem::Parameter(p) => Ok(p),
            other => Err(Self::wrong_kind(id, ItemKind::Parameter, other)),
        }
    }

    fn data_mut(&mut self, id: ItemId) -> Result<&mut DataItem> {
        match self.get_mut(id)? {
            TreeItem::Data(d) => Ok(d),
            other => Err(Self::wrong_kind(id, ItemKind::Data, other)),
        }
    }

    fn layer_mut(&mut self, id: ItemId) -> Result<&mut LayerItem> {
        match self.get_mut(id)? {
            TreeItem::Layer(l) => Ok(l),
            other => Err(Self::wrong_kind(id, ItemKind::Layer, other)),
        }
    }

    fn model_mut(&mut self, id: ItemId) -> Result<&mut ModelItem> {
        match self.get_mut(id)? {
            TreeItem::Model(m) => Ok(m),
            other => Err(Self::wrong_kind(id, ItemKind::Model, other)),
        }
    }

    fn parameter_mut(&mut self, id: ItemId) -> Result<&mut ParameterItem> {
        match self.get_mut(id)? {
            TreeItem::Parameter(p) => Ok(p),
            other => Err(Self::wrong_kind(id, ItemKind::Parameter, other)),
        }
    }

    // -- lookups --

    /// Top-level data items, in load order.
    pub fn data_items(&self) -> &[ItemId] {
        &self.roots
    }

    pub fn name(&self, id: ItemId) -> Result<&str> {
        Ok(self.get(id)?.name())
    }

    pub fn rename(&mut self, id: ItemId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        match self.get_mut(id)? {
            TreeItem::Data(d) => d.name = name,
            TreeItem::Layer(l) => l.name = name,
            TreeItem::Model(m) => m.name = name,
            TreeItem::Parameter(_) => {
                return Err(TreeError::WrongKind {
                    id,
                    expected: "Data, Layer or Model",
                    found: ItemKind::Parameter.as_str(),
                });
            }
        }
        Ok(())
    }

    pub fn parent(&self, id: ItemId) -> Result<Option<ItemId>> {
        Ok(self.get(id)?.parent())
    }

    pub fn children(&self, id: ItemId) -> Result<&[ItemId]> {
        Ok(self.get(id)?.children())
    }

    /// The spectrum shown for a data or layer item.
    pub fn spectrum(&self, id: ItemId) -> Result<&SpectrumData> {
        match self.get(id)? {
            TreeItem::Data(d) => Ok(&d.spectrum),
            TreeItem::Layer(l) => Ok(&l.spectrum),
            other => Err(Self::wrong_kind(id, ItemKind::Layer, other)),
        }
    }

    /// `(name, value)` rows of a model item, in parameter order.
    pub fn parameter_rows(&self, model: ItemId) -> Result<Vec<(&str, f64)>> {
        self.model(model)?
            .parameters
            .iter()
            .map(|&p| self.parameter(p).map(|row| (row.name.as_str(), row.value)))
            .collect()
    }

    // -- data items --

    /// Wrap a spectrum as a new top-level data item.
    pub fn create_data_item(&mut self, spectrum: SpectrumData, name: impl Into<String>) -> ItemId {
        let name = name.into();
        log::debug!("Creating data item '{name}' with {} samples", spectrum.len());
        let id = self.insert(TreeItem::Data(DataItem {
            name,
            spectrum,
            layers: Vec::new(),
            layers_created: 0,
        }));
        self.roots.push(id);
        id
    }

    /// Remove a data item together with all its layers, models and parameters.
    pub fn remove_data_item(&mut self, data: ItemId) -> Result<()> {
        self.data(data)?;
        self.roots.retain(|&r| r != data);
        self.drop_subtree(data);
        Ok(())
    }

    // -- layers --

    /// Derive a layer from a data item. `None` masks nothing.
    pub fn create_layer_item(&mut self, data: ItemId, mask: Option<Mask>) -> Result<ItemId> {
        self.insert_layer(data, mask, None)
    }

    /// Derive a layer whose flux is replaced by `raw` (one value per
    /// unmasked sample).
    pub fn create_layer_with_raw(
        &mut self,
        data: ItemId,
        mask: Option<Mask>,
        raw: Vec<f64>,
    ) -> Result<ItemId> {
        self.insert_layer(data, mask, Some(raw))
    }

    fn insert_layer(
        &mut self,
        data: ItemId,
        mask: Option<Mask>,
        raw_data: Option<Vec<f64>>,
    ) -> Result<ItemId> {
        let parent = self.data(data)?;
        let mask = mask.unwrap_or_else(|| empty_mask(parent.spectrum.len()));
        let spectrum = layer_spectrum(&parent.spectrum, &mask, raw_data.as_deref())?;
        let name = format!("Layer {}", parent.layers_created + 1);

        let id = self.insert(TreeItem::Layer(LayerItem {
            name,
            parent: data,
            mask,
            raw_data,
            spectrum,
            models: Vec::new(),
        }));
        let parent = self.data_mut(data)?;
        parent.layers.push(id);
        parent.layers_created += 1;
        log::debug!("Created layer {id} under data item {data}");
        Ok(id)
    }

    /// Replace the raw-data override (and optionally the mask) of a layer and
    /// rebuild its spectrum from scratch.
    pub fn update_layer_data(
        &mut self,
        layer: ItemId,
        raw_data: Option<Vec<f64>>,
        mask: Option<Mask>,
    ) -> Result<()> {
        let current = self.layer(layer)?;
        let parent = self.data(current.parent)?;
        let mask = mask.unwrap_or_else(|| current.mask.clone());
        let spectrum = layer_spectrum(&parent.spectrum, &mask, raw_data.as_deref())?;

        let item = self.layer_mut(layer)?;
        item.mask = mask;
        item.raw_data = raw_data;
        item.spectrum = spectrum;
        Ok(())
    }

    pub fn remove_layer(&mut self, layer: ItemId) -> Result<()> {
        let parent = self.layer(layer)?.parent;
        self.data_mut(parent)?.layers.retain(|&l| l != layer);
        self.drop_subtree(layer);
        Ok(())
    }

    /// The additive composition of a layer's models, `None` when it has none.
    pub fn layer_model(&self, layer: ItemId) -> Result<Option<CompoundModel>> {
        let components = self
            .layer(layer)?
            .models
            .iter()
            .map(|&m| self.model(m).map(|item| item.model.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok((!components.is_empty()).then(|| CompoundModel::new(components)))
    }

    // -- models --

    /// Instantiate a catalogue model with default parameters and attach it
    /// to a layer.
    pub fn create_fit_model(&mut self, layer: ItemId, model_name: &str) -> Result<ItemId> {
        self.layer(layer)?;
        let model = ParametricModel::from_name(model_name)?;
        self.attach_model(layer, model)
    }

    /// Attach an already-configured model to a layer.
    pub fn attach_model(&mut self, layer: ItemId, model: ParametricModel) -> Result<ItemId> {
        self.layer(layer)?;
        let id = self.insert(TreeItem::Model(ModelItem {
            name: model.name().to_string(),
            parent: layer,
            model,
            parameters: Vec::new(),
        }));
        self.layer_mut(layer)?.models.push(id);
        self.refresh_parameters(id)?;
        Ok(id)
    }

    pub fn remove_model(&mut self, model: ItemId) -> Result<()> {
        let parent = self.model(model)?.parent;
        self.layer_mut(parent)?.models.retain(|&m| m != model);
        self.drop_subtree(model);
        Ok(())
    }

    /// Write one named parameter into the live model and its row.
    pub fn update_parameter(&mut self, model: ItemId, name: &str, value: f64) -> Result<()> {
        let item = self.model(model)?;
        let index = item
            .model
            .param_names()
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| ModelError::UnknownParameter {
                model: item.model.name().to_string(),
                name: name.to_string(),
            })?;
        let row = item.parameters[index];

        self.model_mut(model)?.model.set(name, value)?;
        self.parameter_mut(row)?.value = value;
        Ok(())
    }

    /// Write all parameter values of a model at once, in declared order.
    pub fn set_model_parameters(&mut self, model: ItemId, values: &[f64]) -> Result<()> {
        let item = self.model_mut(model)?;
        item.model.set_parameters(values)?;
        let rows = item.parameters.clone();
        for (row, &value) in rows.into_iter().zip(values) {
            self.parameter_mut(row)?.value = value;
        }
        Ok(())
    }

    /// Swap the functional form of a model item; parameter rows are rebuilt.
    pub fn replace_model(&mut self, model: ItemId, replacement: ParametricModel) -> Result<()> {
        let item = self.model_mut(model)?;
        item.name = replacement.name().to_string();
        item.model = replacement;
        self.refresh_parameters(model)
    }

    /// Drop every parameter row of a model and rebuild them from the model's
    /// signature.
    pub fn refresh_parameters(&mut self, model: ItemId) -> Result<()> {
        let item = self.model(model)?;
        let stale = item.parameters.clone();
        let rows: Vec<ParameterItem> = item
            .model
            .param_names()
            .iter()
            .zip(item.model.values())
            .map(|(name, &value)| ParameterItem {
                parent: model,
                name: name.to_string(),
                value,
                editable: true,
            })
            .collect();

        for id in stale {
            self.drop_subtree(id);
        }
        let ids: Vec<ItemId> = rows
            .into_iter()
            .map(|row| self.insert(TreeItem::Parameter(row)))
            .collect();
        self.model_mut(model)?.parameters = ids;
        Ok(())
    }

    /// Write a fitted compound model back into the layer's model items,
    /// component `i` going to the layer's `i`-th model.
    pub fn apply_fit(&mut self, layer: ItemId, fitted: &CompoundModel) -> Result<()> {
        let models = self.layer(layer)?.models.clone();
        if models.len() != fitted.components().len() {
            return Err(ModelError::ShapeMismatch {
                expected: models.len(),
                got: fitted.components().len(),
            }
            .into());
        }
        for (model, component) in models.iter().zip(fitted.components()) {
            let expected = self.model(*model)?.model.n_parameters();
            if component.n_parameters() != expected {
                return Err(ModelError::ShapeMismatch {
                    expected,
                    got: component.n_parameters(),
                }
                .into());
            }
        }
        for (&model, component) in models.iter().zip(fitted.components()) {
            self.set_model_parameters(model, component.values())?;
        }
        Ok(())
    }

    fn drop_subtree(&mut self, id: ItemId) {
        let children = match self.get(id) {
            Ok(item) => item.children().to_vec(),
            Err(_) => return,
        };
        for child in children {
            self.drop_subtree(child);
        }
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = None;
        }
    }
}

/// Parent data filtered by the mask, with the flux optionally overridden.
fn layer_spectrum(
    parent: &SpectrumData,
    mask: &[bool],
    raw_data: Option<&[f64]>,
) -> Result<SpectrumData> {
    if mask.len() != parent.len() {
        return Err(TreeError::MaskLength {
            mask: mask.len(),
            data: parent.len(),
        });
    }
    let selected = parent.select(&unmasked_indices(mask));
    match raw_data {
        None => Ok(selected),
        Some(raw) => Ok(selected.with_flux(raw.to_vec(), parent.y_unit().clone())?),
    }
}
