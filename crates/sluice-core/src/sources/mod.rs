//! In-tree source catalog.
//!
//! Each module declares one upstream API as code; [`registry`] wires them
//! into a [`SourceRegistry`] with credentials injected from settings.

mod dummyjson;
mod jsonplaceholder;
mod openweather;
mod polygon;
mod rickandmorty;
mod stripe;

use sluice_error::ConfigError;

use crate::settings::Settings;
use crate::source::SourceRegistry;

/// Build the full catalog.
pub fn registry(settings: &Settings) -> Result<SourceRegistry, ConfigError> {
    let mut registry = SourceRegistry::new();
    registry.add_sources(vec![
        dummyjson::config()?,
        jsonplaceholder::config()?,
        openweather::config(settings)?,
        polygon::config(settings)?,
        rickandmorty::config()?,
        stripe::config(settings)?,
    ]);
    Ok(registry)
}
