//! Spectrum inspection and line analysis.
//!
//! Load a 1-D spectrum, carve it into masked layers with regions of
//! interest, measure line statistics and equivalent widths, and fit
//! parametric models to a layer.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod state;
pub mod tree;
