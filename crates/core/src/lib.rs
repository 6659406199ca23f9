pub mod config;
pub mod config_loader;
pub mod model;
pub mod policy;
pub mod ticker;
pub mod types;

pub use config::{AppConfig, PathsConfig, ProviderConfig, RunnerConfig, VenueConfig};
pub use config_loader::ConfigLoader;
pub use model::{norm_cdf, BinaryPricer};
pub use policy::PolicyParams;
pub use ticker::ParsedTicker;
pub use types::{
    Asset, AssetFamily, Candle, ExecutionMode, Market, MarketStatus, MomentumDirection, Regime,
    Side, StreakContext, WeatherKind,
};
