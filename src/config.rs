use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::cli::{Cli, MqttLayout, SensorKind, SinkKind};
use crate::error::ConfigError;

/// CA bundle used when `MQTT_TLS=True`.
pub const CA_FILE: &str = "/ssl/ca_certs.pem";
pub const DEFAULT_BUS_ADDRESS: u8 = 0x77;
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_MQTT_TLS_PORT: u16 = 8883;
pub const DEFAULT_INFLUX_PORT: u16 = 8086;

const BUS_ADDRESS_ENV: &str = "BUS_ADDRESS";
const I2C_BUS_ENV: &str = "I2C_BUS";
const PIN_ENV: &str = "DHT22_PIN";
const W1_DEVICE_ENV: &str = "W1_DEVICE";
const TOPIC_ENV: &str = "TOPIC";
const MQTT_HOST_ENV: &str = "MQTT_HOST";
const MQTT_PORT_ENV: &str = "MQTT_PORT";
const MQTT_USER_ENV: &str = "MQTT_USER";
const MQTT_PASS_ENV: &str = "MQTT_PASS";
const MQTT_TLS_ENV: &str = "MQTT_TLS";
const MQTT_CLIENT_ID_ENV: &str = "MQTT_CLIENT_ID";
const INFLUX_HOST_ENV: &str = "INFLUX_HOST";
const INFLUX_PORT_ENV: &str = "INFLUX_PORT";
const INFLUX_USER_ENV: &str = "INFLUX_USER";
const INFLUX_PASS_ENV: &str = "INFLUX_PASS";
const INFLUX_DB_ENV: &str = "INFLUX_DB";
const ROOM_ENV: &str = "ROOM";
const SENSOR_ENV: &str = "SENSOR";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sensor: SensorConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorConfig {
    /// Canned readings shaped like the given sensor's.
    Fake(SensorKind),
    Dht22 { pin: u64 },
    Bmp180 { bus: PathBuf, address: u8 },
    Ds18b20 { device: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkConfig {
    Disabled,
    Mqtt(MqttConfig),
    Influx(InfluxConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// CA file to verify the broker against; `None` means plain TCP.
    pub ca_file: Option<PathBuf>,
    pub client_id: String,
    pub topic: String,
    pub layout: MqttLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub room: String,
    pub sensor: Option<String>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(cli, |key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let sink = match cli.sink {
            SinkKind::Mqtt => mqtt_config(&env, cli)?,
            SinkKind::Influx => influx_config(&env, cli)?,
        };
        let sensor = sensor_config(&env, cli)?;
        debug!("Configuration finished");
        Ok(Self { sensor, sink })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| {
            warn!("Use default {key}: {default}");
            default.to_string()
        })
    }

    fn port(&self, key: &'static str) -> Result<Option<u16>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| ConfigError::Invalid {
                    key,
                    value: value.clone(),
                })
            })
            .transpose()
    }
}

fn sensor_config<F>(env: &Env<F>, cli: &Cli) -> Result<SensorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if cli.test_mode {
        debug!("Run in test mode");
        return Ok(SensorConfig::Fake(cli.sensor));
    }

    match cli.sensor {
        SensorKind::Dht22 => {
            let value = env.require(PIN_ENV)?;
            let pin = value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: PIN_ENV,
                value: value.clone(),
            })?;
            Ok(SensorConfig::Dht22 { pin })
        }
        SensorKind::Bmp180 => {
            let address = match env.get(BUS_ADDRESS_ENV) {
                Some(value) => parse_bus_address(&value).ok_or(ConfigError::Invalid {
                    key: BUS_ADDRESS_ENV,
                    value,
                })?,
                None => {
                    info!("No I²C address specified. Using I²C address {DEFAULT_BUS_ADDRESS:#04x}");
                    DEFAULT_BUS_ADDRESS
                }
            };
            let bus = env
                .get(I2C_BUS_ENV)
                .unwrap_or_else(|| DEFAULT_I2C_BUS.to_string());
            Ok(SensorConfig::Bmp180 {
                bus: PathBuf::from(bus),
                address,
            })
        }
        SensorKind::Ds18b20 => Ok(SensorConfig::Ds18b20 {
            device: env.get(W1_DEVICE_ENV),
        }),
    }
}

fn mqtt_config<F>(env: &Env<F>, cli: &Cli) -> Result<SinkConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let topic = env.require(TOPIC_ENV)?;

    if cli.sink_disabled() {
        debug!("MQTT client disabled");
        return Ok(SinkConfig::Disabled);
    }

    let host = env.or_default(MQTT_HOST_ENV, "localhost");
    let port = env.port(MQTT_PORT_ENV)?;
    let user = env.or_default(MQTT_USER_ENV, "root");
    let password = env.or_default(MQTT_PASS_ENV, "root");

    let tls = env.get(MQTT_TLS_ENV).as_deref() == Some("True");
    let port = match (port, tls) {
        (Some(port), _) => port,
        (None, true) => {
            warn!("Use default MQTT port: {DEFAULT_MQTT_TLS_PORT} (TLS)");
            DEFAULT_MQTT_TLS_PORT
        }
        (None, false) => {
            warn!("Use default MQTT port: {DEFAULT_MQTT_PORT}");
            DEFAULT_MQTT_PORT
        }
    };
    let ca_file = if tls {
        debug!("TLS enabled for MQTT");
        Some(PathBuf::from(CA_FILE))
    } else {
        debug!("TLS disabled for MQTT");
        None
    };

    let client_id = env
        .get(MQTT_CLIENT_ID_ENV)
        .unwrap_or_else(|| format!("env-sensor-{}", std::process::id()));

    Ok(SinkConfig::Mqtt(MqttConfig {
        host,
        port,
        user,
        password,
        ca_file,
        client_id,
        topic,
        layout: cli.mqtt_layout,
    }))
}

fn influx_config<F>(env: &Env<F>, cli: &Cli) -> Result<SinkConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if cli.sink_disabled() {
        debug!("InfluxDB client disabled");
        return Ok(SinkConfig::Disabled);
    }

    let database = env.require(INFLUX_DB_ENV)?;
    let room = env.require(ROOM_ENV)?;
    let sensor = env.get(SENSOR_ENV);

    let host = env.or_default(INFLUX_HOST_ENV, "localhost");
    let port = match env.port(INFLUX_PORT_ENV)? {
        Some(port) => port,
        None => {
            warn!("Use default InfluxDB port: {DEFAULT_INFLUX_PORT}");
            DEFAULT_INFLUX_PORT
        }
    };
    let user = env.or_default(INFLUX_USER_ENV, "root");
    let password = env.or_default(INFLUX_PASS_ENV, "root");

    Ok(SinkConfig::Influx(InfluxConfig {
        host,
        port,
        user,
        password,
        database,
        room,
        sensor,
    }))
}

fn parse_bus_address(value: &str) -> Option<u8> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
