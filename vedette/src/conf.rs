//! Decoder policy configuration.
//!
//! Defaults are layered under an optional YAML file and `VEDETTE_`-prefixed
//! environment variables; the environment wins.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecoderConf {
    /// The sensor sits on the data path and may drop packets.
    pub inline_mode: bool,
    /// Verify TCP checksums while decoding.
    pub tcp_checksums: bool,
    /// Request an active drop when an inline sensor sees a TCP checksum
    /// failure.
    pub tcp_checksum_drops: bool,
}

impl Default for DecoderConf {
    fn default() -> DecoderConf {
        DecoderConf {
            inline_mode: false,
            tcp_checksums: true,
            tcp_checksum_drops: false,
        }
    }
}

impl DecoderConf {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfError> {
        let mut figment = Figment::from(Serialized::defaults(DecoderConf::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        let conf = figment.merge(Env::prefixed("VEDETTE_")).extract()?;
        Ok(conf)
    }
}

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("configuration error: {0}")]
    Extraction(#[from] figment::Error),
}
