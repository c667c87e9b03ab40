pub mod config;
pub mod product;

pub use config::{
    AlbaranConfig, BinarizeConfig, ConfigError, OrientationConfig, ReconcileConfig, SpeciesConfig,
    DEFAULT_STOP_TOKENS,
};
pub use product::{DocumentTotals, ExtractionResult, ProductRecord, MAX_LOT, MIN_LOT};
