use crate::commandline::CliArgs;
use anyhow::{Context, Result};
use easygen_lib::{session::RegisterKind, tokio_sync};
use serde::Deserialize;
use std::{fs::File, path::Path, time::Duration};

/// Connection settings read from the YAML configuration file.
///
/// ```yaml
/// host: 192.168.1.50
/// port: 502
/// timeout: 1s
/// register_kind: holding
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub unit_id: Option<u8>,
    #[serde(default)]
    pub register_kind: Option<RegisterKind>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading config file from {path:?}");
        let file =
            File::open(path).with_context(|| format!("Cannot open config file {path:?}"))?;
        serde_yaml::from_reader(file).with_context(|| format!("Cannot parse config file {path:?}"))
    }
}

/// Effective connection settings after merging the command line over the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub unit_id: u8,
    pub register_kind: RegisterKind,
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

impl Settings {
    pub fn resolve(args: &CliArgs, config: Config) -> Result<Self> {
        let host = args
            .host
            .clone()
            .or(config.host)
            .context("No controller host given, use --host or the config file")?;
        let register_kind = if args.input_registers {
            RegisterKind::Input
        } else {
            config.register_kind.unwrap_or_default()
        };
        Ok(Self {
            host,
            port: args.port.or(config.port).unwrap_or(tokio_sync::DEFAULT_PORT),
            timeout: args.timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT),
            unit_id: args
                .unit_id
                .or(config.unit_id)
                .unwrap_or(tokio_sync::DEFAULT_UNIT_ID),
            register_kind,
        })
    }

    pub fn connector(&self) -> tokio_sync::TcpConnector {
        tokio_sync::TcpConnector::new(self.host.clone(), self.port)
            .with_timeout(self.timeout)
            .with_unit_id(self.unit_id)
    }
}
