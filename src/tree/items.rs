use std::fmt;

use serde::Serialize;

use crate::analysis::models::ParametricModel;
use crate::data::filter::Mask;
use crate::data::model::SpectrumData;

// ---------------------------------------------------------------------------
// ItemId – handle into the tree arena
// ---------------------------------------------------------------------------

/// Handle to an item stored in a [`super::DocumentTree`]. Handles are never
/// reused, so a stale one simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub(crate) usize);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemKind {
    Data,
    Layer,
    Model,
    Parameter,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Data => "Data",
            ItemKind::Layer => "Layer",
            ItemKind::Model => "Model",
            ItemKind::Parameter => "Parameter",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Item payloads
// ---------------------------------------------------------------------------

/// A loaded spectrum and the layers derived from it.
#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    pub(crate) spectrum: SpectrumData,
    pub(crate) layers: Vec<ItemId>,
    /// Layers ever created here; numbers new layer names.
    pub(crate) layers_created: usize,
}

impl DataItem {
    pub fn spectrum(&self) -> &SpectrumData {
        &self.spectrum
    }

    pub fn layers(&self) -> &[ItemId] {
        &self.layers
    }
}

/// A masked view of its parent's data, plus the models fitted to it.
#[derive(Debug, Clone)]
pub struct LayerItem {
    pub name: String,
    pub(crate) parent: ItemId,
    pub(crate) mask: Mask,
    /// Flux values replacing the parent's unmasked flux.
    pub(crate) raw_data: Option<Vec<f64>>,
    /// Derived from `parent`, `mask` and `raw_data`; rebuilt whenever either changes.
    pub(crate) spectrum: SpectrumData,
    pub(crate) models: Vec<ItemId>,
}

impl LayerItem {
    pub fn parent(&self) -> ItemId {
        self.parent
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn raw_data(&self) -> Option<&[f64]> {
        self.raw_data.as_deref()
    }

    pub fn spectrum(&self) -> &SpectrumData {
        &self.spectrum
    }

    pub fn models(&self) -> &[ItemId] {
        &self.models
    }
}

/// One parametric model attached to a layer.
#[derive(Debug, Clone)]
pub struct ModelItem {
    pub name: String,
    pub(crate) parent: ItemId,
    pub(crate) model: ParametricModel,
    /// One row per model parameter, in declared order.
    pub(crate) parameters: Vec<ItemId>,
}

impl ModelItem {
    pub fn parent(&self) -> ItemId {
        self.parent
    }

    pub fn model(&self) -> &ParametricModel {
        &self.model
    }

    pub fn parameters(&self) -> &[ItemId] {
        &self.parameters
    }
}

/// A `(name, value)` row mirroring one model parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterItem {
    #[serde(skip)]
    pub(crate) parent: ItemId,
    pub name: String,
    pub value: f64,
    pub editable: bool,
}

impl ParameterItem {
    pub fn parent(&self) -> ItemId {
        self.parent
    }
}

// ---------------------------------------------------------------------------
// TreeItem – the tagged variant stored in the arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum TreeItem {
    Data(DataItem),
    Layer(LayerItem),
    Model(ModelItem),
    Parameter(ParameterItem),
}

impl TreeItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            TreeItem::Data(_) => ItemKind::Data,
            TreeItem::Layer(_) => ItemKind::Layer,
            TreeItem::Model(_) => ItemKind::Model,
            TreeItem::Parameter(_) => ItemKind::Parameter,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TreeItem::Data(d) => &d.name,
            TreeItem::Layer(l) => &l.name,
            TreeItem::Model(m) => &m.name,
            TreeItem::Parameter(p) => &p.name,
        }
    }

    /// Non-owning back-reference; `None` for top-level data items.
    pub fn parent(&self) -> Option<ItemId> {
        match self {
            TreeItem::Data(_) => None,
            TreeItem::Layer(l) => Some(l.parent),
            TreeItem::Model(m) => Some(m.parent),
            TreeItem::Parameter(p) => Some(p.parent),
        }
    }

    /// Owned children, in insertion order.
    pub fn children(&self) -> &[ItemId] {
        match self {
            TreeItem::Data(d) => &d.layers,
            TreeItem::Layer(l) => &l.models,
            TreeItem::Model(m) => &m.parameters,
            TreeItem::Parameter(_) => &[],
        }
    }
}
