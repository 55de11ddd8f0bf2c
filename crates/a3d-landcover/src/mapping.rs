//! Source category to PREVAH class tables.

use crate::prevah::LusCode;
use crate::{LandCoverError, Result};

/// SwissTLMRegio land-cover `OBJVAL` values and their PREVAH classes.
pub const TLM_TO_PREVAH: &[(&str, u8)] = &[
    ("Wald", 3),
    ("Fels", 15),
    ("Geroell", 21),
    ("Gletscher", 14),
    ("See", 1),
    ("Stausee", 1),
    ("Siedl", 2),
    ("Stadtzentr", 2),
    ("Sumpf", 22),
    ("Obstanlage", 18),
    ("Reben", 29),
];

/// PREVAH class of BFS Arealstatistik LC_27 categories 1 to 27.
pub const LC27_TO_PREVAH: [u8; 27] = [
    2, 2, 2, 2, 2, 11, 2, 7, 18, 29, 19, 6, 7, 23, 5, 5, 8, 8, 1, 1, 21, 26, 15, 26, 14, 22, 27,
];

/// Map a TLM category. Names match case-insensitively; `Geröll` is accepted
/// for `Geroell`.
pub fn tlm_code(category: &str) -> Result<LusCode> {
    let normalized = category.trim().replace('ö', "oe").replace('Ö', "Oe");
    TLM_TO_PREVAH
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&normalized))
        .ok_or_else(|| LandCoverError::unmapped("tlm", category))
        .and_then(|(_, class)| LusCode::from_class(*class))
}

/// Map an LC_27 category.
pub fn lc27_code(category: i64) -> Result<LusCode> {
    if !(1..=27).contains(&category) {
        return Err(LandCoverError::unmapped("bfs", category));
    }
    LusCode::from_class(LC27_TO_PREVAH[(category - 1) as usize])
}
