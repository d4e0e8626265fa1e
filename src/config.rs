use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_INTERFACE: &str = "0.0.0.0";
pub const DEFAULT_CLIENT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_RECV_BUFFER: usize = 4096;

/// Bounds applied while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_stages: usize,
    /// Length of the whole argument vector, executable name included.
    pub max_args: usize,
    pub max_exe_len: usize,
    pub max_arg_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_stages: 8,
            max_args: 8,
            max_exe_len: 64,
            max_arg_bytes: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub interface: String,
    pub port: u16,
    pub threaded: bool,
    /// Receive buffer capacity; also the longest accepted command line.
    pub recv_buffer: usize,
    pub read_timeout: Option<Duration>,
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            interface: DEFAULT_INTERFACE.to_string(),
            port: DEFAULT_PORT,
            threaded: false,
            recv_buffer: DEFAULT_RECV_BUFFER,
            read_timeout: None,
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
        let src = fs::read_to_string(path)?;
        Self::load_from_str(&src)
    }

    /// Reads `key=value` lines over the defaults. `#` starts a comment line.
    pub fn load_from_str(src: &str) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::default();

        for (lineno, line) in src.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |message: String| ConfigError::Parse { line: lineno + 1, message };
            let Some((key, value)) = line.split_once('=') else {
                return Err(err(format!("no '=' found: {}", line)));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "interface" => config.interface = value.to_string(),
                "port" => config.port = parse_number(value).map_err(err)?,
                "threaded" => config.threaded = parse_bool(value).map_err(err)?,
                "recv_buffer" => config.recv_buffer = parse_number(value).map_err(err)?,
                "read_timeout_ms" => {
                    let ms: u64 = parse_number(value).map_err(err)?;
                    config.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                "max_stages" => config.limits.max_stages = parse_number(value).map_err(err)?,
                "max_args" => config.limits.max_args = parse_number(value).map_err(err)?,
                "max_exe_len" => config.limits.max_exe_len = parse_number(value).map_err(err)?,
                "max_arg_bytes" => config.limits.max_arg_bytes = parse_number(value).map_err(err)?,
                _ => return Err(err(format!("unknown key: {}", key))),
            }
        }

        if config.recv_buffer == 0 || config.limits.max_stages == 0 {
            return Err(ConfigError::Parse {
                line: 0,
                message: "recv_buffer and max_stages must be positive".to_string(),
            });
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value.parse().map_err(|_| format!("invalid number: {}", value))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(format!("invalid boolean: {}", value)),
    }
}
