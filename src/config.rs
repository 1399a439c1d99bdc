use mime::Mime;
use std::{env, net::SocketAddr, path::PathBuf};
use thiserror::Error;

/// 5 MiB, the ceiling applied when `MAX_FILE_SIZE` is unset.
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

pub const DEFAULT_ALLOWED_MIME_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("ALLOWED_MIME_TYPES must list at least one type")]
    EmptyAllowList,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<Mime>,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                expected: "a port number",
                value,
            })?,
            None => 3000,
        };

        let max_file_size = match lookup("MAX_FILE_SIZE") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "MAX_FILE_SIZE",
                        expected: "a positive number of bytes",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_FILE_SIZE,
        };

        let allowed_mime_types = match lookup("ALLOWED_MIME_TYPES") {
            Some(value) => parse_mime_list(&value)?,
            None => default_mime_types(),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_file_size,
            allowed_mime_types,
        })
    }

    /// Defaults around an explicit upload directory. Used by tests and embedders.
    pub fn with_upload_dir(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: upload_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: default_mime_types(),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Invalid {
            var: "HOST",
            expected: "an IP address",
            value: self.host.clone(),
        })
    }

    /// Matches on the essence only, so `image/png; charset=x` still counts as `image/png`.
    pub fn is_allowed(&self, mime: &Mime) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.essence_str() == mime.essence_str())
    }
}

fn default_mime_types() -> Vec<Mime> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect()
}

fn parse_mime_list(value: &str) -> Result<Vec<Mime>, ConfigError> {
    let mut types = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mime = item.parse::<Mime>().map_err(|_| ConfigError::Invalid {
            var: "ALLOWED_MIME_TYPES",
            expected: "a comma separated list of MIME types",
            value: value.to_string(),
        })?;
        types.push(mime);
    }

    if types.is_empty() {
        return Err(ConfigError::EmptyAllowList);
    }
    Ok(types)
}
