use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use crate::config::TrustConfig;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "agent_trust.toml";
/// Environment prefix; `__` separates nested keys (`TRUST_SERVER__PORT`)
pub const ENV_PREFIX: &str = "TRUST_";

/// Layers defaults, then the TOML file, then `TRUST_` environment variables.
pub fn figment(path: Option<&Path>) -> Figment {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(TrustConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

pub fn load_config(path: Option<&Path>) -> Result<TrustConfig, figment::Error> {
    let config: TrustConfig = figment(path).extract()?;
    config
        .validate()
        .map_err(|e| figment::Error::from(e.to_string()))?;
    Ok(config)
}
