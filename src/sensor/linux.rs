//! Bindings of the generic drivers to Linux character and sysfs devices.

use std::path::Path;

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use linux_embedded_hal::{Delay, I2cdev};
use sysfs_gpio::{Direction, Pin};
use tracing::debug;

use crate::error::SensorReadError;
use crate::sensor::bmp180::{Bmp180, Oversampling};
use crate::sensor::dht22::Dht22;

pub type LinuxBmp180 = Bmp180<I2cdev, Delay>;
pub type LinuxDht22 = Dht22<SysfsLine, Delay>;

pub fn open_bmp180(bus: &Path, address: u8) -> Result<LinuxBmp180, SensorReadError> {
    debug!("Opening BMP180 on {} at {address:#04x}", bus.display());
    let i2c = I2cdev::new(bus).map_err(|e| SensorReadError::Bus(e.to_string()))?;
    Bmp180::new(i2c, Delay, address, Oversampling::Standard)
}

pub fn open_dht22(pin: u64) -> Result<LinuxDht22, SensorReadError> {
    debug!("Opening DHT22 on GPIO {pin}");
    let line = SysfsLine::export(pin)?;
    Ok(Dht22::new(line, Delay))
}

#[derive(Debug)]
pub struct GpioError(sysfs_gpio::Error);

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A sysfs GPIO driven like an open-drain line: "high" releases the line to
/// the pull-up by switching to input, "low" drives it.
pub struct SysfsLine {
    pin: Pin,
}

impl SysfsLine {
    pub fn export(number: u64) -> Result<Self, SensorReadError> {
        let pin = Pin::new(number);
        pin.export()
            .map_err(|e| SensorReadError::Bus(e.to_string()))?;
        pin.set_direction(Direction::In)
            .map_err(|e| SensorReadError::Bus(e.to_string()))?;
        Ok(Self { pin })
    }
}

impl ErrorType for SysfsLine {
    type Error = GpioError;
}

impl OutputPin for SysfsLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_direction(Direction::Low).map_err(GpioError)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin.set_direction(Direction::In).map_err(GpioError)
    }
}

impl InputPin for SysfsLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.pin.get_value().map_err(GpioError)? != 0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_high()?)
    }
}
