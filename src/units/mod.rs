//! Service configuration and unit files
//!
//! Normalizes and validates logical configurations, renders them as systemd
//! unit files, and reads unit files or live unit properties back for
//! comparison.

mod conf;
mod parser;
mod properties;
mod serialize;

pub use conf::{
    equivalent, is_valid_name, normalize, validate, ConfError, Configuration, Normalized,
    OUTPUT_SYSLOG,
};
pub use parser::{parse_environment, parse_file, parse_unit_file, ParseError, UnitOption};
pub use properties::unit_options as options_from_properties;
pub use serialize::{deserialize, quote_env, serialize, unit_name, unit_options, SERVICE_SUFFIX};

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conf(#[from] ConfError),
}

/// Load a unit file from disk into a configuration
pub async fn load_unit_file(path: &Path) -> Result<Configuration, LoadError> {
    let options = parse_unit_file(path).await?;
    Ok(deserialize(&options)?)
}
