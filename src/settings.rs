use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Store {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Ai {
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub database: Store,
    pub ai: Ai,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("database.path", "crm-data")?
            .set_default("ai.model", "llama3.2")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder.build()?.try_deserialize()
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Settings;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.web.address.port(), 8000);
        assert_eq!(settings.ai.model, "llama3.2");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[web]\naddress = \"0.0.0.0:9000\"\n\n[ai]\nmodel = \"qwen3:8b\""
        )
        .unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.web.address.port(), 9000);
        assert_eq!(settings.ai.model, "qwen3:8b");
        assert_eq!(settings.database.path.to_str().unwrap(), "crm-data");
    }
}
