//! Tuning surface for the photon-mapping integrator (spec.md §6), loaded
//! from a TOML file the way `StarryReverie-fractured-ray` and
//! `freddiehaddad-oxidized` load their scene/run configuration: a
//! `serde::Deserialize` struct with `#[serde(default)]` fields.

use serde::Deserialize;

use crate::error::GiError;

/// The three photon-map kinds threaded through storage probabilities,
/// estimation radii, and the spatial indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Global,
    Caustics,
    Volumetric,
}

impl MapKind {
    pub const ALL: [MapKind; 3] = [MapKind::Global, MapKind::Caustics, MapKind::Volumetric];

    /// Closed enum replacement for the dynamic string->enum dictionary the
    /// original used (§9 design notes).
    pub fn parse(s: &str) -> Result<Self, GiError> {
        match s {
            "global" => Ok(MapKind::Global),
            "caustics" => Ok(MapKind::Caustics),
            "volumetric" => Ok(MapKind::Volumetric),
            other => Err(GiError::UnknownMapKind(other.to_string())),
        }
    }
}

/// Per-map-kind estimation parameters (spec.md §3, "Estimation configuration").
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// 0.0 means "auto-derive from median photon power" (spec.md §4.E).
    pub estimation_radius: f32,
    pub estimation_tolerance: f32,
    pub estimation_size: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            estimation_radius: 0.0,
            estimation_tolerance: 0.05,
            estimation_size: 50,
        }
    }
}

impl EstimationConfig {
    fn validate(&self, kind: MapKind) -> Result<(), GiError> {
        if self.estimation_radius < 0.0 {
            return Err(GiError::InvalidConfig {
                field: "estimation_radius",
                constraint: ">= 0",
                value: self.estimation_radius.to_string(),
            });
        }
        if self.estimation_tolerance <= 0.0 {
            return Err(GiError::InvalidConfig {
                field: "estimation_tolerance",
                constraint: "> 0",
                value: self.estimation_tolerance.to_string(),
            });
        }
        if self.estimation_size == 0 {
            return Err(GiError::InvalidConfig {
                field: "estimation_size",
                constraint: "> 0",
                value: format!("{:?}: 0", kind),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhotonMapperConfig {
    pub max_number_of_photons: u64,
    pub global_map_size: usize,
    pub caustics_quality: f32,
    pub volumetric_quality: f32,

    pub num_final_gather_rays: usize,
    pub num_secondary_gather_rays: usize,
    pub ratio_precomputed_irradiance: f32,
    pub volumetric_gather_quality: f32,

    pub is_visualizing_photon_map: bool,
    pub is_ray_tracing_direct: bool,
    pub is_scattering_direct: bool,

    pub global: EstimationConfig,
    pub caustics: EstimationConfig,
    pub volumetric: EstimationConfig,

    /// Worker count for the emission/build worker pools; 0 means "logical
    /// processor count" (spec.md §4.G).
    pub num_threads: usize,

    pub max_ray_generation: u16,

    pub seed: u64,
}

impl Default for PhotonMapperConfig {
    fn default() -> Self {
        Self {
            max_number_of_photons: 100_000_000,
            global_map_size: 10_000,
            caustics_quality: 1.0,
            volumetric_quality: 1.0,

            num_final_gather_rays: 0,
            num_secondary_gather_rays: 0,
            ratio_precomputed_irradiance: 0.25,
            volumetric_gather_quality: 0.25,

            is_visualizing_photon_map: false,
            is_ray_tracing_direct: true,
            is_scattering_direct: true,

            global: EstimationConfig::default(),
            caustics: EstimationConfig::default(),
            volumetric: EstimationConfig::default(),

            num_threads: 0,
            max_ray_generation: 10,
            seed: 0,
        }
    }
}

impl PhotonMapperConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn estimation_for(&self, kind: MapKind) -> &EstimationConfig {
        match kind {
            MapKind::Global => &self.global,
            MapKind::Caustics => &self.caustics,
            MapKind::Volumetric => &self.volumetric,
        }
    }

    pub fn validate(&self) -> Result<(), GiError> {
        if self.global_map_size == 0 {
            return Err(GiError::InvalidConfig {
                field: "global_map_size",
                constraint: "> 0",
                value: "0".to_string(),
            });
        }
        if self.caustics_quality < 0.0 {
            return Err(GiError::InvalidConfig {
                field: "caustics_quality",
                constraint: ">= 0",
                value: self.caustics_quality.to_string(),
            });
        }
        if self.volumetric_quality < 0.0 {
            return Err(GiError::InvalidConfig {
                field: "volumetric_quality",
                constraint: ">= 0",
                value: self.volumetric_quality.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.ratio_precomputed_irradiance) {
            return Err(GiError::InvalidConfig {
                field: "ratio_precomputed_irradiance",
                constraint: "in [0, 1]",
                value: self.ratio_precomputed_irradiance.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.volumetric_gather_quality) {
            return Err(GiError::InvalidConfig {
                field: "volumetric_gather_quality",
                constraint: "in [0, 1]",
                value: self.volumetric_gather_quality.to_string(),
            });
        }
        for kind in MapKind::ALL {
            self.estimation_for(kind).validate(kind)?;
        }
        Ok(())
    }

    /// Storage probabilities derived from quality ratios (spec.md §4.D).
    /// `P[Global] = 1/maxQ`, `P[Caustics] = causticsQuality/maxQ`, `P[Volume] = volumetricQuality/maxQ`.
    pub fn storage_probabilities(&self) -> StorageProbabilities {
        let max_q = self.caustics_quality.max(self.volumetric_quality).max(1.0);
        StorageProbabilities {
            global: 1.0 / max_q,
            caustics: self.caustics_quality / max_q,
            volumetric: self.volumetric_quality / max_q,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StorageProbabilities {
    pub global: f32,
    pub caustics: f32,
    pub volumetric: f32,
}

impl StorageProbabilities {
    pub fn for_kind(&self, kind: MapKind) -> f32 {
        match kind {
            MapKind::Global => self.global,
            MapKind::Caustics => self.caustics,
            MapKind::Volumetric => self.volumetric,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PhotonMapperConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_global_map_size() {
        let mut config = PhotonMapperConfig::default();
        config.global_map_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_quality() {
        let mut config = PhotonMapperConfig::default();
        config.caustics_quality = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_probabilities_equalize_density() {
        let mut config = PhotonMapperConfig::default();
        config.caustics_quality = 4.0;
        config.volumetric_quality = 2.0;
        let p = config.storage_probabilities();
        assert!((p.global - 0.25).abs() < 1e-6);
        assert!((p.caustics - 1.0).abs() < 1e-6);
        assert!((p.volumetric - 0.5).abs() < 1e-6);
    }

    #[test]
    fn map_kind_parse_roundtrip() {
        assert_eq!(MapKind::parse("global").unwrap(), MapKind::Global);
        assert!(MapKind::parse("bogus").is_err());
    }

    #[test]
    fn toml_roundtrip_with_partial_override() {
        let config = PhotonMapperConfig::from_toml_str(
            r#"
            global_map_size = 50000
            caustics_quality = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(config.global_map_size, 50_000);
        assert_eq!(config.caustics_quality, 4.0);
        // untouched fields keep their defaults
        assert_eq!(config.volumetric_quality, 1.0);
    }
}
