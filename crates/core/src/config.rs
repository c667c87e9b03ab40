use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings threaded through one pipeline instance.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbaranConfig {
    /// Tesseract language hint.
    pub lang: String,
    /// Rasterization resolution of the incoming pages, forwarded to the OCR engine.
    pub dpi: u32,
    /// Tokens below this confidence (0–100) never reach line assembly.
    pub min_confidence: f32,
    pub binarize: BinarizeConfig,
    pub orientation: OrientationConfig,
    pub reconcile: ReconcileConfig,
    pub species: SpeciesConfig,
}

impl Default for AlbaranConfig {
    fn default() -> Self {
        Self {
            lang: "spa+por".to_string(),
            dpi: 300,
            min_confidence: 30.0,
            binarize: BinarizeConfig::default(),
            orientation: OrientationConfig::default(),
            reconcile: ReconcileConfig::default(),
            species: SpeciesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizeConfig {
    /// Pages narrower than this are upscaled to it.
    pub target_width: u32,
    pub contrast: f32,
    pub sharpness: f32,
    /// Median filter radius; 1 means a 3×3 window.
    pub median_radius: u32,
    pub fallback_threshold: u8,
    pub min_white_fraction: f64,
    pub max_white_fraction: f64,
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            target_width: 2000,
            contrast: 2.5,
            sharpness: 2.0,
            median_radius: 1,
            fallback_threshold: 128,
            min_white_fraction: 0.02,
            max_white_fraction: 0.98,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub prefer_portrait: bool,
    /// Flat score bonus for portrait-or-square candidates in the brute-force search.
    pub portrait_bonus: f64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self { prefer_portrait: true, portrait_bonus: 50.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Absolute floor (currency units) on the price × weight ≈ value check.
    pub min_tolerance: f64,
    /// Fraction of the line value accepted as rounding noise.
    pub relative_tolerance: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { min_tolerance: 0.8, relative_tolerance: 0.05 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// Words marking the end of a species name (scientific names, headers, FAO codes).
    pub stop_tokens: Vec<String>,
}

pub const DEFAULT_STOP_TOKENS: &[&str] = &[
    "Esp", "Cientifica", "Fao", "Apres", "Peso", "Preco", "Val", "IVA", "Parapenaeus",
    "Merluccius", "Trachurus", "Lepidorhombus", "Micromesistius", "DPS", "HKE", "HOW", "LDB",
    "WHB", "Inte", "HRE",
];

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self { stop_tokens: DEFAULT_STOP_TOKENS.iter().map(|s| s.to_string()).collect() }
    }
}

impl AlbaranConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: AlbaranConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.into() }
        }

        if self.lang.trim().is_empty() {
            return Err(invalid("lang", "must not be empty"));
        }
        if self.dpi == 0 {
            return Err(invalid("dpi", "must be positive"));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence", "must be within 0–100"));
        }

        let b = &self.binarize;
        if b.target_width == 0 {
            return Err(invalid("binarize.target_width", "must be positive"));
        }
        if !(b.contrast.is_finite() && b.contrast >= 0.0) {
            return Err(invalid("binarize.contrast", "must be a non-negative number"));
        }
        if !(b.sharpness.is_finite() && b.sharpness >= 0.0) {
            return Err(invalid("binarize.sharpness", "must be a non-negative number"));
        }
        for (field, v) in [
            ("binarize.min_white_fraction", b.min_white_fraction),
            ("binarize.max_white_fraction", b.max_white_fraction),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(field, format!("{v} is outside [0, 1]")));
            }
        }
        if b.min_white_fraction > b.max_white_fraction {
            return Err(invalid("binarize.min_white_fraction", "exceeds max_white_fraction"));
        }

        if !self.orientation.portrait_bonus.is_finite() {
            return Err(invalid("orientation.portrait_bonus", "must be finite"));
        }

        let r = &self.reconcile;
        if !(r.min_tolerance.is_finite() && r.min_tolerance >= 0.0) {
            return Err(invalid("reconcile.min_tolerance", "must be a non-negative number"));
        }
        if !(r.relative_tolerance.is_finite() && r.relative_tolerance >= 0.0) {
            return Err(invalid("reconcile.relative_tolerance", "must be a non-negative number"));
        }

        if self.species.stop_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid("species.stop_tokens", "contains an empty token"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = AlbaranConfig::from_toml("").unwrap();
        assert_eq!(config, AlbaranConfig::default());
        assert_eq!(config.lang, "spa+por");
        assert_eq!(config.dpi, 300);
        assert_eq!(config.binarize.fallback_threshold, 128);
        assert!(config.species.stop_tokens.iter().any(|t| t == "Parapenaeus"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AlbaranConfig::from_toml(
            r#"
            lang = "por"

            [binarize]
            contrast = 1.5

            [species]
            stop_tokens = ["Sardina", "PIL"]
            "#,
        )
        .unwrap();
        assert_eq!(config.lang, "por");
        assert_eq!(config.binarize.contrast, 1.5);
        assert_eq!(config.binarize.target_width, 2000);
        assert_eq!(config.species.stop_tokens, vec!["Sardina", "PIL"]);
        assert_eq!(config.reconcile, ReconcileConfig::default());
    }

    #[test]
    fn rejects_inverted_white_fractions() {
        let err = AlbaranConfig::from_toml(
            "[binarize]\nmin_white_fraction = 0.9\nmax_white_fraction = 0.1\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "binarize.min_white_fraction", .. }));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = AlbaranConfig::from_toml("min_confidence = 150.0").unwrap_err();
        assert!(err.to_string().contains("min_confidence"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AlbaranConfig::from_toml("lang = ").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
