use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SensorKind {
    /// Temperature and humidity on a single GPIO line
    #[value(name = "dht22")]
    Dht22,
    /// Temperature, pressure and altitude over I²C
    #[value(name = "bmp180")]
    Bmp180,
    /// Temperature only, over 1-Wire
    #[value(name = "ds18b20")]
    Ds18b20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Mqtt,
    Influx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MqttLayout {
    /// One JSON object per reading on TOPIC
    Json,
    /// One raw value per quantity on TOPIC/<quantity>
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Bunyan,
}

#[derive(Debug, Parser)]
#[command(name = "env-sensor")]
#[command(about = "Read an environmental sensor and forward readings to MQTT or InfluxDB")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv everything)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = SensorKind::Dht22)]
    pub sensor: SensorKind,

    #[arg(long, value_enum, default_value_t = SinkKind::Mqtt)]
    pub sink: SinkKind,

    #[arg(long, value_enum, default_value_t = MqttLayout::Json)]
    pub mqtt_layout: MqttLayout,

    /// Run without publishing to MQTT
    #[arg(long)]
    pub disable_mqtt: bool,

    /// Run without writing to InfluxDB
    #[arg(long)]
    pub disable_influx: bool,

    /// Use canned readings instead of the hardware sensor
    #[arg(long)]
    pub test_mode: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Whether the selected sink was switched off on the command line.
    pub fn sink_disabled(&self) -> bool {
        match self.sink {
            SinkKind::Mqtt => self.disable_mqtt,
            SinkKind::Influx => self.disable_influx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_is_counted() {
        let cli = Cli::parse_from(["env-sensor", "-vv", "--verbose"]);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn defaults_to_dht22_over_mqtt() {
        let cli = Cli::parse_from(["env-sensor"]);
        assert_eq!(cli.sensor, SensorKind::Dht22);
        assert_eq!(cli.sink, SinkKind::Mqtt);
        assert_eq!(cli.mqtt_layout, MqttLayout::Json);
        assert!(!cli.sink_disabled());
    }

    #[test]
    fn disable_flag_only_applies_to_the_selected_sink() {
        let cli = Cli::parse_from(["env-sensor", "--sink", "influx", "--disable-mqtt"]);
        assert!(!cli.sink_disabled());

        let cli = Cli::parse_from(["env-sensor", "--sink", "influx", "--disable-influx"]);
        assert!(cli.sink_disabled());
    }

    #[test]
    fn parses_test_mode_and_sensor() {
        let cli = Cli::parse_from(["env-sensor", "--test-mode", "--sensor", "bmp180"]);
        assert!(cli.test_mode);
        assert_eq!(cli.sensor, SensorKind::Bmp180);
    }
}
