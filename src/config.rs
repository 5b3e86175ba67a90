use crate::meter::DialProfile;
use anyhow::{bail, Context};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const APP_NAME: &str = "dialeye2mqtt";

/// Runtime settings, read from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub image_url: String,
    pub timeout: Duration,
    pub conf_file: PathBuf,
    pub data_file: PathBuf,
    pub m3_init_value: u64,
    pub dialeye: PathBuf,
    pub dialeye_python: String,
    pub meter_id: String,
    pub web_static_dir: PathBuf,
    pub update_interval: Duration,
    pub http_port: u16,
    pub ha_url: String,
    pub ha_token: String,
    pub topic_prefix: String,
    /// The reader prints readings multiplied by this factor.
    pub device_scale: f64,
    pub dial: DialProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_url: String::new(),
            timeout: Duration::from_secs(5),
            conf_file: PathBuf::from("/conf/dialEye.conf"),
            data_file: PathBuf::from("/data/data.txt"),
            m3_init_value: 0,
            dialeye: PathBuf::from("/opt/dialEye/dialEye.py"),
            dialeye_python: "python2".to_string(),
            meter_id: "meter".to_string(),
            web_static_dir: PathBuf::from("/app/web/static"),
            update_interval: Duration::from_secs(60),
            http_port: 8080,
            ha_url: String::new(),
            ha_token: String::new(),
            topic_prefix: APP_NAME.to_string(),
            device_scale: 10.0,
            dial: DialProfile::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for absent keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let image_url = lookup("IMAGE_URL")
            .filter(|url| !url.is_empty())
            .context("IMAGE_URL is required")?;

        let config = Self {
            image_url,
            timeout: Duration::from_secs(parse_or(&lookup, "TIMEOUT", 5)?),
            conf_file: lookup("CONF_FILE").map_or(defaults.conf_file, PathBuf::from),
            data_file: lookup("DATA_FILE").map_or(defaults.data_file, PathBuf::from),
            m3_init_value: parse_or(&lookup, "M3_INIT_VALUE", defaults.m3_init_value)?,
            dialeye: lookup("DIALEYE").map_or(defaults.dialeye, PathBuf::from),
            dialeye_python: lookup("DIALEYE_PYTHON").unwrap_or(defaults.dialeye_python),
            meter_id: lookup("DIALEYE_METER_ID").unwrap_or(defaults.meter_id),
            web_static_dir: lookup("WEB_STATIC_DIR").map_or(defaults.web_static_dir, PathBuf::from),
            update_interval: Duration::from_secs(parse_or(&lookup, "UPDATE_INTERVAL", 60)?),
            http_port: parse_or(&lookup, "HTTP_PORT", defaults.http_port)?,
            ha_url: lookup("HA_URL").unwrap_or_default(),
            ha_token: lookup("HA_TOKEN").unwrap_or_default(),
            topic_prefix: lookup("MQTT_TOPIC_PREFIX").unwrap_or(defaults.topic_prefix),
            device_scale: parse_or(&lookup, "DEVICE_SCALE", defaults.device_scale)?,
            dial: DialProfile {
                sub_units_per_major_unit: parse_or(
                    &lookup,
                    "SUB_UNITS_PER_MAJOR_UNIT",
                    defaults.dial.sub_units_per_major_unit,
                )?,
                rollover_low: parse_or(&lookup, "ROLLOVER_LOW", defaults.dial.rollover_low)?,
                clear_low: parse_or(&lookup, "ROLLOVER_CLEAR_LOW", defaults.dial.clear_low)?,
                clear_high: parse_or(&lookup, "ROLLOVER_CLEAR_HIGH", defaults.dial.clear_high)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let dial = &self.dial;
        if self.device_scale.is_nan() || self.device_scale <= 0.0 {
            bail!("DEVICE_SCALE must be positive, got {}", self.device_scale);
        }
        if self.update_interval.is_zero() {
            bail!("UPDATE_INTERVAL must be at least one second");
        }
        if !(0.0 < dial.rollover_low
            && dial.rollover_low < dial.clear_low
            && dial.clear_low < dial.clear_high
            && dial.clear_high <= dial.sub_units_per_major_unit)
        {
            bail!(
                "Rollover thresholds must satisfy 0 < low < clear_low < clear_high <= sub-units per unit, got {:?}",
                dial
            );
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value {raw:?} for {name}: {e}")),
        _ => Ok(default),
    }
}
