use crate::model::DEFAULT_SAMPLE_LEN;
use argh::FromArgs;
use std::num::ParseIntError;

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;
pub const DEFAULT_SEED: u64 = 299792458;

/// Environment variable that overrides the listening port.
pub const PORT_ENV: &str = "PORT";

#[derive(FromArgs, Debug)]
/// Serve visual question answering over http.
pub struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    pub host: String,

    /// the port to run the server on, falls back to $PORT and then 10000
    #[argh(option, short = 'p')]
    pub port: Option<u16>,

    /// maximum number of tokens generated per answer
    #[argh(option, default = "DEFAULT_SAMPLE_LEN")]
    pub sample_len: usize,

    /// maximum accepted request body in megabytes
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// seed used by the token sampler
    #[argh(option, default = "DEFAULT_SEED")]
    pub seed: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for $PORT: {value:?}")]
    InvalidPort {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("sample length must be greater than zero")]
    ZeroSampleLen,
}

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub sample_len: usize,
    pub max_upload_bytes: usize,
    pub seed: u64,
}

impl ServerConfig {
    /// Build the configuration from the command line and the value of `$PORT`, if any.
    pub fn from_args(args: ServerArgs, env_port: Option<&str>) -> Result<Self, ConfigError> {
        if args.sample_len == 0 {
            return Err(ConfigError::ZeroSampleLen);
        }

        Ok(Self {
            host: args.host,
            port: resolve_port(args.port, env_port)?,
            sample_len: args.sample_len,
            max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
            seed: args.seed,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The flag wins over the environment, the environment over the default.
pub fn resolve_port(flag: Option<u16>, env_port: Option<&str>) -> Result<u16, ConfigError> {
    if let Some(port) = flag {
        return Ok(port);
    }

    match env_port.map(str::trim) {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(value) => value.parse().map_err(|source| ConfigError::InvalidPort {
            value: value.to_string(),
            source,
        }),
    }
}
