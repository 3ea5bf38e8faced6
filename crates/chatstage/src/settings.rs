//! Launcher settings.
//!
//! Built-in defaults, then an optional TOML file, then `CHATSTAGE__*`
//! environment variables (`CHATSTAGE__SERVER__PORT=9000`).

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::api::ServerOptions;
use crate::layout::LayoutDefaults;

pub const ENV_PREFIX: &str = "CHATSTAGE";

const APP_DIR: &str = "chatstage";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub server: ServerSettings,
    /// Header text of a fresh layout.
    pub layout: LayoutDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when no verbosity flag is given.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_body_size_mb: usize,
    /// CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let options = ServerOptions::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_body_size_mb: options.max_body_size_mb,
            allowed_origins: options.allowed_origins,
        }
    }
}

impl Settings {
    /// Load settings, layering `file` (if it exists) and the environment
    /// over the defaults.
    pub fn load(file: &Path) -> Result<Self> {
        let built = Config::builder()
            .add_source(
                File::from(file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading settings from {}", file.display()))?;

        built
            .try_deserialize()
            .with_context(|| format!("invalid settings in {}", file.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing settings to TOML")
    }
}

impl ServerSettings {
    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            max_body_size_mb: self.max_body_size_mb,
            allowed_origins: self.allowed_origins.clone(),
        }
    }

    /// Address to bind, with command-line overrides taking precedence.
    pub fn socket_addr(&self, host: Option<&str>, port: Option<u16>) -> Result<SocketAddr> {
        let host = host.unwrap_or(&self.host);
        let port = port.unwrap_or(self.port);
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid address {host}:{port}"))
    }
}

/// `$XDG_CONFIG_HOME/chatstage/config.toml`, falling back to the platform
/// config directory.
pub fn default_config_file() -> Result<PathBuf> {
    let dir = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| anyhow!("unable to determine configuration directory"))?,
    };
    Ok(dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let Some(text) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    let expanded = shellexpand::full(text)
        .with_context(|| format!("expanding path {text}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml")).unwrap();

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.layout, LayoutDefaults::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9123\nallowed_origins = [\"http://localhost:3000\"]\n\n[layout]\nheader_title = \"Support Desk\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.server.port, 9123);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(
            settings.server.options().allowed_origins,
            vec!["http://localhost:3000".to_string()]
        );
        assert_eq!(settings.layout.header_title, "Support Desk");
        assert_eq!(settings.layout.header_subtitle, "");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_socket_addr_overrides() {
        let server = ServerSettings::default();
        assert_eq!(
            server.socket_addr(None, None).unwrap(),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            server.socket_addr(Some("127.0.0.1"), Some(9000)).unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(server.socket_addr(Some("not a host"), None).is_err());
    }

    #[test]
    fn test_settings_render_as_toml() {
        let rendered = Settings::default().to_toml().unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("port = 8000"));
        assert!(rendered.contains("header_title = \"Chatstage\""));
    }

    #[test]
    fn test_expand_plain_path_is_unchanged() {
        let path = Path::new("demos/app.toml");
        assert_eq!(expand_path(path).unwrap(), path);
    }
}
