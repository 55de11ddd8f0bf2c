//! # a3d-meteo
//!
//! Selection of the meteorological stations that drive a simulation.
//!
//! Stations come from a [`StationCatalogue`]; [`select`] keeps those near the
//! region whose elevation fits the DEM and whose data covers the simulation
//! period, ranked by distance plus an elevation penalty. The SMET series of
//! the chosen stations are then fetched and validated with [`fetch_series`].

mod catalogue;
mod dates;
mod error;
mod select;
mod smet;
mod station;

pub use catalogue::{InMemoryCatalogue, JsonCatalogue, StationCatalogue};
pub use dates::DateRange;
pub use error::MeteoError;
pub use select::{fetch_series, select, MeteoSeries, SelectedStation, SelectionRules};
pub use smet::{validate_smet, SmetHeader};
pub use station::Station;

/// Result type for meteo operations.
pub type Result<T> = std::result::Result<T, MeteoError>;
