//! Settings for a mock database, loaded from defaults, an optional file, and
//! SQLMOCK_* environment variables, in increasing order of precedence.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::sql::dialect::{Dialect, DialectVersion};

/// The environment variable prefix, e.g. SQLMOCK_DIALECT=mysql.
const ENV_PREFIX: &str = "SQLMOCK";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Settings {
    /// The dialect name.
    pub dialect: String,
    /// The dialect version. Defaults to the latest catalog version.
    pub version: Option<u32>,
    /// The log level, for binaries that log.
    pub log_level: String,
}

impl Settings {
    /// Loads settings from defaults, an optional config file (any format the
    /// config crate recognizes by extension), and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("dialect", "sqlite")?
            .set_default("log_level", "info")?;
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// The configured dialect version. Errors if the dialect or version isn't
    /// in the catalog.
    pub fn dialect_version(&self) -> Result<DialectVersion> {
        let dialect = Dialect::lookup(&self.dialect)?;
        dialect.at(self.version.unwrap_or_else(|| dialect.latest_version()))
    }
}
