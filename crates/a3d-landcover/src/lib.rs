//! # a3d-landcover
//!
//! Land-cover grids for Alpine3D, expressed as PREVAH land-use (LUS) codes.
//!
//! Sources:
//! - SwissTLMRegio land-cover polygons ([`TlmSource`])
//! - BFS Arealstatistik hectare points, LC_27 nomenclature ([`BfsSource`])
//! - a single code for the whole domain ([`ConstantSource`])
//! - a user-supplied ASCII grid ([`OverrideSource`])
//!
//! Source categories are mapped to PREVAH classes with fixed tables; an
//! unknown category is an error, never silently replaced. Grids are cached in
//! the shared [`GridCache`](a3d_cache::GridCache).

mod derive;
mod error;
mod location;
mod mapping;
mod prevah;
mod sources;

pub use derive::{derive, LandCover};
pub use error::LandCoverError;
pub use mapping::{lc27_code, tlm_code, LC27_TO_PREVAH, TLM_TO_PREVAH};
pub use prevah::{class_name, LusCode, SurfaceParameters, DEFAULT_CONSTANT_CODE, MAX_PREVAH_CLASS};
pub use sources::{
    BfsSource, ConstantSource, LandCoverSource, OverrideSource, TlmSource, DEFAULT_BACKGROUND,
    TLM_CATEGORY_ATTRIBUTE,
};

/// Result type for land-cover operations.
pub type Result<T> = std::result::Result<T, LandCoverError>;
