//! Detection of global X/Y translational misalignment between two
//! georeferenced rasters via phase correlation of a matching window, plus
//! the data needed to correct it.
//!
//! The heavy lifting is split over a geometry kernel (overlap and window
//! arithmetic), a window planner, a window materializer and a phase
//! correlation engine; [`Coreg`] drives the sequence and produces a
//! [`ShiftReport`] for the warping collaborator.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub type Result<T = ()> = std::result::Result<T, Error>;

mod array;
mod bandindex;
mod cell;
mod config;
mod coreg;
mod densearray;
mod error;
pub mod fft;
pub mod footprint;
pub mod geometry;
mod georeference;
mod geotransform;
pub mod gridbox;
pub mod materializer;
pub mod phasecorr;
pub mod planner;
mod point;
mod raster;
mod rastersize;
mod rect;
mod report;
pub mod resample;
pub mod ssim;
mod warper;

#[cfg(test)]
pub mod testutils;

#[doc(inline)]
pub use {
    array::Columns, array::Rows, bandindex::BandIndex, bandindex::FIRST_BAND, cell::Cell, config::CoregConfig, coreg::Coreg,
    coreg::RunState, densearray::DenseArray, error::Error, fft::FftPrecision, georeference::CellSize, georeference::GeoReference,
    geotransform::GeoTransform, gridbox::GridBox, planner::GridRole, raster::BadDataMask, raster::DenseRaster, raster::RasterView,
    raster::RasterWindow, rastersize::RasterSize, rect::Rect, report::MapInfo, report::ShiftReport, report::ShiftResult,
    resample::NumThreads, resample::ResampleAlg, warper::ShiftWarper, warper::Warper,
};

#[doc(inline)]
pub use point::Point;
