pub mod cli;
pub mod config;
pub mod error;
pub mod form;
pub mod pipeline;
pub mod raster;
pub mod registry;
pub mod report;
pub mod roster;
pub mod util;
