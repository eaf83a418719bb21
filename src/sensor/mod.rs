use chrono::Utc;
use tracing::debug;

use crate::Reading;
use crate::cli::SensorKind;
use crate::config::SensorConfig;
use crate::error::SensorReadError;

pub mod bmp180;
pub mod dht22;
pub mod ds18b20;
#[cfg(feature = "linux")]
pub mod linux;

/// Something the sample loop can take a reading from.
///
/// Reads are issued one at a time from the loop; implementations never see
/// concurrent calls.
#[allow(async_fn_in_trait)]
pub trait SensorSource {
    async fn read(&mut self) -> Result<Reading, SensorReadError>;
}

/// A driver doing blocking bus I/O.
pub trait Measure: Send + 'static {
    fn measure(&mut self) -> Result<Reading, SensorReadError>;
}

/// Runs a blocking driver on the runtime's blocking pool.
///
/// The driver is moved into the blocking task for the duration of a read
/// and handed back afterwards. A read that panics loses the driver and
/// every following read fails with [`SensorReadError::Unavailable`].
pub struct Blocking<D> {
    driver: Option<D>,
}

impl<D: Measure> Blocking<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Some(driver),
        }
    }
}

impl<D: Measure> SensorSource for Blocking<D> {
    async fn read(&mut self) -> Result<Reading, SensorReadError> {
        let mut driver = self.driver.take().ok_or(SensorReadError::Unavailable)?;
        let (driver, result) = tokio::task::spawn_blocking(move || {
            let result = driver.measure();
            (driver, result)
        })
        .await?;
        self.driver = Some(driver);
        result
    }
}

/// Returns the same canned values on every read and never fails.
#[derive(Debug, Clone)]
pub struct FakeSensor {
    template: Reading,
}

impl FakeSensor {
    pub fn new(template: Reading) -> Self {
        Self { template }
    }

    /// Values shaped like the given sensor's output.
    pub fn for_kind(kind: SensorKind) -> Self {
        let template = match kind {
            SensorKind::Dht22 => Reading::new().with_temperature(24.0).with_humidity(48.5),
            SensorKind::Bmp180 => Reading::new()
                .with_temperature(24.0)
                .with_pressure(100700.0)
                .with_altitude(50.83),
            SensorKind::Ds18b20 => Reading::new().with_temperature(24.0),
        };
        Self::new(template)
    }
}

impl SensorSource for FakeSensor {
    async fn read(&mut self) -> Result<Reading, SensorReadError> {
        Ok(self.template.clone().with_timestamp(Utc::now()))
    }
}

/// Every sensor the daemon can be configured with.
pub enum Sensor {
    Fake(FakeSensor),
    Ds18b20(Blocking<ds18b20::Ds18b20>),
    #[cfg(feature = "linux")]
    Dht22(Blocking<linux::LinuxDht22>),
    #[cfg(feature = "linux")]
    Bmp180(Blocking<linux::LinuxBmp180>),
}

impl Sensor {
    pub fn from_config(config: &SensorConfig) -> Result<Self, SensorReadError> {
        match config {
            SensorConfig::Fake(kind) => {
                debug!("Using canned {kind:?} readings");
                Ok(Sensor::Fake(FakeSensor::for_kind(*kind)))
            }
            SensorConfig::Ds18b20 { device } => {
                let sensor = ds18b20::Ds18b20::open(device.as_deref())?;
                Ok(Sensor::Ds18b20(Blocking::new(sensor)))
            }
            #[cfg(feature = "linux")]
            SensorConfig::Dht22 { pin } => {
                let sensor = linux::open_dht22(*pin)?;
                Ok(Sensor::Dht22(Blocking::new(sensor)))
            }
            #[cfg(feature = "linux")]
            SensorConfig::Bmp180 { bus, address } => {
                let sensor = linux::open_bmp180(bus, *address)?;
                Ok(Sensor::Bmp180(Blocking::new(sensor)))
            }
            #[cfg(not(feature = "linux"))]
            SensorConfig::Dht22 { .. } | SensorConfig::Bmp180 { .. } => {
                Err(SensorReadError::Unavailable)
            }
        }
    }
}

impl SensorSource for Sensor {
    async fn read(&mut self) -> Result<Reading, SensorReadError> {
        match self {
            Sensor::Fake(sensor) => sensor.read().await,
            Sensor::Ds18b20(sensor) => sensor.read().await,
            #[cfg(feature = "linux")]
            Sensor::Dht22(sensor) => sensor.read().await,
            #[cfg(feature = "linux")]
            Sensor::Bmp180(sensor) => sensor.read().await,
        }
    }
}
