//! Configuration: typed validation of the recognized key/value surface.
//!
//! Parsing the backing file format (TOML/INI/etc.) is the embedding
//! application's job; this module only types and validates the
//! recognized keys once they're in a `HashMap<String, ConfigValue>`.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// One configuration value as loaded from an upstream parser.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl ConfigValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Validated configuration for one [`crate::object::ObjectHandler`].
///
/// Construction from raw key/value pairs is fatal-on-invalid in the
/// sense that it returns `Err(Error::Config)` rather than succeeding
/// with a half-initialized handler; it does not panic, leaving that
/// decision to the embedding application.
#[derive(Debug, Clone)]
pub struct Config {
    pub dht_service: String,
    pub dht_gateways: Vec<String>,
    pub dht_replication: u32,
    pub dht_timeout: Duration,
    pub dht_cachesize: usize,
    pub provider_retry: u32,
    pub provider_deduplication: bool,
    pub pmanager_host: String,
    pub pmanager_service: String,
    pub vmanager_host: String,
    pub vmanager_service: String,
}

impl Config {
    pub fn from_values(values: &HashMap<String, ConfigValue>) -> Result<Self> {
        let dht_service = required_str(values, "dht.service")?;
        let dht_gateways = required_list(values, "dht.gateways")?;
        let dht_replication = required_int(values, "dht.replication")? as u32;
        let dht_timeout = Duration::from_secs(required_int(values, "dht.timeout")? as u64);
        let dht_cachesize = required_int(values, "dht.cachesize")? as usize;
        let provider_retry = required_int(values, "provider.retry")? as u32;
        let provider_deduplication = required_bool(values, "provider.deduplication")?;
        let pmanager_host = required_str(values, "pmanager.host")?;
        let pmanager_service = required_str(values, "pmanager.service")?;
        let vmanager_host = required_str(values, "vmanager.host")?;
        let vmanager_service = required_str(values, "vmanager.service")?;

        let config = Self {
            dht_service,
            dht_gateways,
            dht_replication,
            dht_timeout,
            dht_cachesize,
            provider_retry,
            provider_deduplication,
            pmanager_host,
            pmanager_service,
            vmanager_host,
            vmanager_service,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dht_gateways.is_empty() {
            return Err(Error::Config("dht.gateways must list at least one endpoint".into()));
        }
        if self.dht_replication == 0 {
            return Err(Error::Config("dht.replication must be at least 1".into()));
        }
        if self.provider_retry == 0 {
            return Err(Error::Config("provider.retry must be at least 1".into()));
        }
        if self.pmanager_host.is_empty() || self.pmanager_service.is_empty() {
            return Err(Error::Config("pmanager.host/pmanager.service must be set".into()));
        }
        if self.vmanager_host.is_empty() || self.vmanager_service.is_empty() {
            return Err(Error::Config("vmanager.host/vmanager.service must be set".into()));
        }
        Ok(())
    }
}

fn required_str(values: &HashMap<String, ConfigValue>, key: &str) -> Result<String> {
    values
        .get(key)
        .and_then(ConfigValue::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Config(format!("missing or invalid string config key: {key}")))
}

fn required_int(values: &HashMap<String, ConfigValue>, key: &str) -> Result<i64> {
    values
        .get(key)
        .and_then(ConfigValue::as_int)
        .ok_or_else(|| Error::Config(format!("missing or invalid integer config key: {key}")))
}

fn required_bool(values: &HashMap<String, ConfigValue>, key: &str) -> Result<bool> {
    values
        .get(key)
        .and_then(ConfigValue::as_bool)
        .ok_or_else(|| Error::Config(format!("missing or invalid boolean config key: {key}")))
}

fn required_list(values: &HashMap<String, ConfigValue>, key: &str) -> Result<Vec<String>> {
    values
        .get(key)
        .and_then(ConfigValue::as_list)
        .map(|l| l.to_vec())
        .ok_or_else(|| Error::Config(format!("missing or invalid list config key: {key}")))
}
