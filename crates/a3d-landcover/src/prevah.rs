//! PREVAH land-use classes and Alpine3D LUS codes.
//!
//! Alpine3D reads land use as five digit codes `1LLCD` where `LL` is the
//! PREVAH class. Codes produced here always use `C = D = 0`, so a class maps
//! to `10000 + 100 * class`.

use crate::{LandCoverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest PREVAH class number.
pub const MAX_PREVAH_CLASS: u8 = 29;

/// Default code for constant land cover (class 15, rock).
pub const DEFAULT_CONSTANT_CODE: LusCode = LusCode(11500);

/// An Alpine3D land-use code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct LusCode(u32);

impl LusCode {
    /// Class 7.
    pub const PASTURE: LusCode = LusCode(10700);

    /// Code of a PREVAH class.
    pub fn from_class(class: u8) -> Result<Self> {
        if class == 0 || class > MAX_PREVAH_CLASS || class_name(class).is_none() {
            return Err(LandCoverError::InvalidCode(class as i64));
        }
        Ok(Self(10_000 + 100 * class as u32))
    }

    /// Validate a raw `1LLCD` code.
    pub fn new(code: i64) -> Result<Self> {
        if !(10_000..20_000).contains(&code) {
            return Err(LandCoverError::InvalidCode(code));
        }
        let class = ((code - 10_000) / 100) as u8;
        if class == 0 || class_name(class).is_none() {
            return Err(LandCoverError::InvalidCode(code));
        }
        Ok(Self(code as u32))
    }

    /// Grid cell value, as stored in a categorical dataset.
    pub fn from_cell(value: f64) -> Result<Self> {
        if value.fract() != 0.0 {
            return Err(LandCoverError::InvalidCode(value as i64));
        }
        Self::new(value as i64)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The PREVAH class (`LL`).
    pub fn class(&self) -> u8 {
        ((self.0 - 10_000) / 100) as u8
    }

    /// Surface parameters of the class.
    pub fn parameters(&self) -> SurfaceParameters {
        surface_parameters(self.class())
    }

    pub fn name(&self) -> &'static str {
        class_name(self.class()).unwrap_or("undefined")
    }
}

impl TryFrom<i64> for LusCode {
    type Error = LandCoverError;

    fn try_from(code: i64) -> Result<Self> {
        Self::new(code)
    }
}

impl From<LusCode> for u32 {
    fn from(code: LusCode) -> u32 {
        code.0
    }
}

impl fmt::Display for LusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-class surface properties used in the run report and `alpine3d.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceParameters {
    /// Snow-free broadband albedo.
    pub albedo: f64,
    /// Aerodynamic roughness length in metres.
    pub roughness_length: f64,
    /// Whether the class has a canopy (forest).
    pub canopy: bool,
}

const fn params(albedo: f64, roughness_length: f64, canopy: bool) -> SurfaceParameters {
    SurfaceParameters {
        albedo,
        roughness_length,
        canopy,
    }
}

/// PREVAH class table: number, name, parameters.
const CLASSES: &[(u8, &str, SurfaceParameters)] = &[
    (1, "water", params(0.08, 0.0002, false)),
    (2, "settlement", params(0.15, 1.0, false)),
    (3, "coniferous forest", params(0.10, 1.5, true)),
    (4, "deciduous forest", params(0.16, 1.2, true)),
    (5, "mixed forest", params(0.13, 1.3, true)),
    (6, "cereals", params(0.22, 0.1, false)),
    (7, "pasture", params(0.20, 0.03, false)),
    (8, "bush", params(0.17, 0.3, false)),
    (11, "road", params(0.12, 0.05, false)),
    (13, "firn", params(0.55, 0.002, false)),
    (14, "bare ice", params(0.35, 0.002, false)),
    (15, "rock", params(0.20, 0.02, false)),
    (18, "fruit", params(0.18, 0.5, false)),
    (19, "vegetables", params(0.20, 0.1, false)),
    (20, "wheat", params(0.22, 0.1, false)),
    (21, "alpine vegetation", params(0.20, 0.02, false)),
    (22, "wetlands", params(0.14, 0.05, false)),
    (23, "rough pasture", params(0.20, 0.04, false)),
    (24, "subalpine meadow", params(0.20, 0.03, false)),
    (25, "alpine meadow", params(0.20, 0.02, false)),
    (26, "bare soil vegetation", params(0.18, 0.01, false)),
    (27, "free", params(0.20, 0.01, false)),
    (28, "corn", params(0.20, 0.15, false)),
    (29, "grapes", params(0.18, 0.3, false)),
];

/// Name of a PREVAH class, `None` for unused class numbers.
pub fn class_name(class: u8) -> Option<&'static str> {
    CLASSES.iter().find(|(c, _, _)| *c == class).map(|(_, name, _)| *name)
}

fn surface_parameters(class: u8) -> SurfaceParameters {
    CLASSES
        .iter()
        .find(|(c, _, _)| *c == class)
        .map(|(_, _, p)| *p)
        .unwrap_or(params(0.2, 0.01, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_layout() {
        let code = LusCode::from_class(3).unwrap();
        assert_eq!(code.value(), 10300);
        assert_eq!(code.class(), 3);
        assert!(code.parameters().canopy);
        assert_eq!(DEFAULT_CONSTANT_CODE.name(), "rock");
    }

    #[test]
    fn test_invalid_codes() {
        assert!(LusCode::new(9999).is_err());
        assert!(LusCode::new(20000).is_err());
        // Class 9 is not used by PREVAH
        assert!(LusCode::new(10900).is_err());
        assert!(LusCode::from_class(0).is_err());
        assert!(LusCode::from_cell(10700.5).is_err());
        assert_eq!(LusCode::from_cell(10700.0).unwrap().class(), 7);
    }

    #[test]
    fn test_code_digits_beyond_class_are_kept() {
        let code = LusCode::new(12912).unwrap();
        assert_eq!(code.class(), 29);
        assert_eq!(code.value(), 12912);
    }
}
