use crate::prelude::*;
use crate::inverter::poller::PollSettings;
use crate::inverter::transport::DEFAULT_BAUD_RATE;

use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inverter: Inverter,

    #[serde(default = "Config::default_demo_mode")]
    pub demo_mode: bool,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    pub snapshot_interval_ms: Option<u64>,
    pub diagnostics_interval_ms: Option<u64>,

    /// Optional path to append valid status records to, one JSON object per line
    pub datalog_file: Option<String>,
}

// Inverter {{{
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Inverter {
    /// serial device, e.g. /dev/ttyUSB0; may be left out in demo mode
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}
impl Inverter {
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref().filter(|p| !p.is_empty())
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(1000))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(3000))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: self.poll_interval(),
            read_timeout: self.read_timeout(),
        }
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        self.config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn inverter(&self) -> Inverter {
        self.lock().inverter.clone()
    }

    pub fn demo_mode(&self) -> bool {
        self.lock().demo_mode
    }

    pub fn set_demo_mode(&self, enabled: bool) {
        self.lock().demo_mode = enabled;
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.lock().snapshot_interval_ms.unwrap_or(1000))
    }

    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_millis(self.lock().diagnostics_interval_ms.unwrap_or(3000))
    }

    pub fn datalog_file(&self) -> Option<String> {
        self.lock().datalog_file.clone()
    }

    pub fn validate(&self) -> Result<()> {
        self.lock().validate()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!("  Inverter:");
        info!("    Port: {}", config.inverter.port().unwrap_or("(none)"));
        info!("    Baud Rate: {}", config.inverter.baud_rate());
        info!("    Read Timeout: {}ms", config.inverter.read_timeout().as_millis());
        info!("    Poll Interval: {}ms", config.inverter.poll_interval().as_millis());
        info!("  Demo Mode: {}", if config.demo_mode { "enabled" } else { "disabled" });
        info!("  Datalog File: {}", config.datalog_file.as_deref().unwrap_or("(none)"));
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    /// Parses without validating, so command line overrides can be applied
    /// first. Call `validate()` afterwards.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.demo_mode && self.inverter.port().is_none() {
            bail!("inverter.port is required unless demo_mode is enabled");
        }
        if self.inverter.baud_rate() == 0 {
            bail!("inverter.baud_rate must be greater than 0");
        }
        if self.inverter.read_timeout_ms == Some(0) {
            return Err(anyhow!("config.rs:Invalid read timeout: 0"));
        }
        if self.inverter.poll_interval_ms == Some(0) {
            return Err(anyhow!("config.rs:Invalid poll interval: 0"));
        }
        if self.snapshot_interval_ms == Some(0) || self.diagnostics_interval_ms == Some(0) {
            return Err(anyhow!("config.rs:consumer intervals must be greater than 0"));
        }
        if self.loglevel.parse::<log::LevelFilter>().is_err() {
            bail!("unknown loglevel {}", self.loglevel);
        }

        Ok(())
    }

    fn default_demo_mode() -> bool {
        false
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
