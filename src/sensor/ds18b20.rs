use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::Reading;
use crate::error::SensorReadError;
use crate::sensor::Measure;

pub const W1_DEVICES: &str = "/sys/bus/w1/devices";
const FAMILY_PREFIX: &str = "28-";

/// DS18B20 exposed by the kernel `w1_therm` driver.
#[derive(Debug, Clone)]
pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// Opens the named device, or the first DS18B20 on the bus.
    pub fn open(device: Option<&str>) -> Result<Self, SensorReadError> {
        Self::open_in(Path::new(W1_DEVICES), device)
    }

    pub fn open_in(devices: &Path, device: Option<&str>) -> Result<Self, SensorReadError> {
        let device = match device {
            Some(device) => devices.join(device),
            None => {
                let mut candidates: Vec<PathBuf> = fs::read_dir(devices)?
                    .filter_map(Result::ok)
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_str()
                            .is_some_and(|name| name.starts_with(FAMILY_PREFIX))
                    })
                    .map(|entry| entry.path())
                    .collect();
                candidates.sort();
                let first = candidates.into_iter().next().ok_or_else(|| {
                    SensorReadError::Malformed(format!(
                        "no DS18B20 found in {}",
                        devices.display()
                    ))
                })?;
                info!("No 1-Wire device specified. Using {}", first.display());
                first
            }
        };
        Ok(Self::from_path(device.join("w1_slave")))
    }

    pub fn from_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Measure for Ds18b20 {
    fn measure(&mut self) -> Result<Reading, SensorReadError> {
        let contents = fs::read_to_string(&self.path)?;
        let temperature = parse_w1_slave(&contents)?;
        debug!("Temperature: {temperature}");
        Ok(Reading::new().with_temperature(temperature))
    }
}

/// Parses the two-line `w1_slave` report into °C.
pub fn parse_w1_slave(contents: &str) -> Result<f64, SensorReadError> {
    let mut lines = contents.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| SensorReadError::Malformed("empty report".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorReadError::Checksum);
    }
    let data_line = lines
        .next()
        .ok_or_else(|| SensorReadError::Malformed("missing data line".to_string()))?;
    let (_, millis) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| SensorReadError::Malformed(data_line.to_string()))?;
    let millis: i32 = millis
        .trim()
        .parse()
        .map_err(|_| SensorReadError::Malformed(data_line.to_string()))?;
    Ok(f64::from(millis) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn parses_temperature() {
        assert_eq!(parse_w1_slave(GOOD).unwrap(), 23.125);
    }

    #[test]
    fn parses_negative_temperature() {
        let report = "ff ff : crc=2a YES\nff ff t=-1250\n";
        assert_eq!(parse_w1_slave(report).unwrap(), -1.25);
    }

    #[test]
    fn rejects_failed_crc() {
        let report = "72 01 : crc=57 NO\n72 01 t=23125\n";
        assert!(matches!(
            parse_w1_slave(report),
            Err(SensorReadError::Checksum)
        ));
    }

    #[test]
    fn rejects_truncated_report() {
        assert!(matches!(
            parse_w1_slave("72 01 : crc=57 YES\n"),
            Err(SensorReadError::Malformed(_))
        ));
    }

    #[test]
    fn discovers_first_device() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["28-0000000000bb", "28-0000000000aa", "w1_bus_master1"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("28-0000000000aa").join("w1_slave"), GOOD).unwrap();

        let mut sensor = Ds18b20::open_in(dir.path(), None).unwrap();
        assert_eq!(
            sensor.path,
            dir.path().join("28-0000000000aa").join("w1_slave")
        );
        assert_eq!(sensor.measure().unwrap().temperature(), Some(23.125));
    }

    #[test]
    fn empty_bus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Ds18b20::open_in(dir.path(), None).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensor = Ds18b20::open_in(dir.path(), Some("28-missing")).unwrap();
        assert!(matches!(sensor.measure(), Err(SensorReadError::Io(_))));
    }
}
