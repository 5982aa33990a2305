//! Error kinds for the global-illumination core (spec.md §7).
//!
//! Three closed categories. `ResourceExhaustion` is carried as data rather
//! than returned as an `Err` — emission truncation is a warning, not a
//! failure, and the build proceeds with whatever photons were collected.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GiError {
    #[error("unknown map kind {0:?}, expected one of \"global\", \"caustics\", \"volumetric\"")]
    UnknownMapKind(String),

    #[error("{field} must be {constraint}, got {value}")]
    InvalidConfig {
        field: &'static str,
        constraint: &'static str,
        value: String,
    },

    #[error("state blob has {actual} fields, expected {expected}")]
    ConsistencyError { expected: usize, actual: usize },
}

/// Non-fatal: emission hit `max_number_of_photons` before `global_map_size`
/// was reached. The caller logs this once and proceeds with the smaller map.
#[derive(Debug, Clone, Copy)]
pub struct ResourceExhaustion {
    pub photons_emitted: u64,
    pub global_map_achieved: usize,
    pub global_map_target: usize,
}

impl std::fmt::Display for ResourceExhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "emission truncated at {} photons: global map has {} of {} requested",
            self.photons_emitted, self.global_map_achieved, self.global_map_target
        )
    }
}
