use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::{debug, trace};

use crate::Reading;
use crate::error::SensorReadError;
use crate::sensor::Measure;

const CHIP_ID: u8 = 0x55;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIBRATION: u8 = 0xAA;
const REG_CONTROL: u8 = 0xF4;
const REG_RESULT: u8 = 0xF6;
const CMD_TEMPERATURE: u8 = 0x2E;
const CMD_PRESSURE: u8 = 0x34;

/// Standard atmosphere at sea level, in Pa.
pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

/// Pressure oversampling setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    fn conversion_time_us(self) -> u32 {
        match self {
            Oversampling::UltraLowPower => 4_500,
            Oversampling::Standard => 7_500,
            Oversampling::HighResolution => 13_500,
            Oversampling::UltraHighResolution => 25_500,
        }
    }

    fn bits(self) -> u32 {
        self as u32
    }
}

/// Factory calibration coefficients stored in the sensor's EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Decodes the 11 big-endian EEPROM words. A word reading 0x0000 or
    /// 0xFFFF means the EEPROM did not answer.
    pub fn from_bytes(raw: &[u8; 22]) -> Result<Self, SensorReadError> {
        let word = |i: usize| u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);
        if let Some(i) = (0..11).find(|&i| matches!(word(i), 0x0000 | 0xFFFF)) {
            return Err(SensorReadError::Malformed(format!(
                "calibration word {i} reads {:#06x}",
                word(i)
            )));
        }
        Ok(Self {
            ac1: word(0) as i16,
            ac2: word(1) as i16,
            ac3: word(2) as i16,
            ac4: word(3),
            ac5: word(4),
            ac6: word(5),
            b1: word(6) as i16,
            b2: word(7) as i16,
            mb: word(8) as i16,
            mc: word(9) as i16,
            md: word(10) as i16,
        })
    }

    fn b5(&self, raw_temperature: i64) -> Option<i64> {
        let x1 = ((raw_temperature - i64::from(self.ac6)) * i64::from(self.ac5)) >> 15;
        let x2 = (i64::from(self.mc) << 11).checked_div(x1 + i64::from(self.md))?;
        Some(x1 + x2)
    }

    /// Temperature in 0.1 °C, `None` for coefficients that cannot be
    /// compensated.
    pub fn temperature(&self, raw_temperature: i64) -> Option<i64> {
        Some((self.b5(raw_temperature)? + 8) >> 4)
    }

    /// Pressure in Pa, `None` for coefficients that cannot be compensated.
    pub fn pressure(
        &self,
        raw_temperature: i64,
        raw_pressure: i64,
        oss: Oversampling,
    ) -> Option<i64> {
        let oss = oss.bits();
        let b6 = self.b5(raw_temperature)? - 4000;
        let b6_squared = b6.checked_mul(b6)? >> 12;
        let x1 = i64::from(self.b2).checked_mul(b6_squared)? >> 11;
        let x2 = i64::from(self.ac2).checked_mul(b6)? >> 11;
        let x3 = x1.checked_add(x2)?;
        let b3 = ((i64::from(self.ac1) * 4).checked_add(x3)?.checked_shl(oss)? + 2) / 4;

        let x1 = i64::from(self.ac3).checked_mul(b6)? >> 13;
        let x2 = i64::from(self.b1).checked_mul(b6_squared)? >> 16;
        let x3 = (x1.checked_add(x2)? + 2) >> 2;
        let b4 = i64::from(self.ac4).checked_mul(x3.checked_add(32768)?)? >> 15;
        let b7 = raw_pressure.checked_sub(b3)?.checked_mul(50_000 >> oss)?;

        let p = if b7 < 0x8000_0000 {
            b7.checked_mul(2)?.checked_div(b4)?
        } else {
            b7.checked_div(b4)?.checked_mul(2)?
        };
        let x1 = (p >> 8).checked_mul(p >> 8)?.checked_mul(3038)? >> 16;
        let x2 = p.checked_mul(-7357)? >> 16;
        Some(p + ((x1 + x2 + 3791) >> 4))
    }
}

/// Altitude in metres for a pressure in Pa, using the international
/// barometric formula.
pub fn altitude(pressure: f64, sea_level_pressure: f64) -> f64 {
    44_330.0 * (1.0 - (pressure / sea_level_pressure).powf(1.0 / 5.255))
}

/// Bosch BMP180 (and the pin-compatible BMP085) barometric sensor.
pub struct Bmp180<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    oversampling: Oversampling,
    calibration: Calibration,
}

impl<I, D> Bmp180<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Checks the chip id and loads the calibration table.
    pub fn new(
        mut i2c: I,
        delay: D,
        address: u8,
        oversampling: Oversampling,
    ) -> Result<Self, SensorReadError> {
        let mut id = [0u8; 1];
        i2c.write_read(address, &[REG_CHIP_ID], &mut id)
            .map_err(bus_error)?;
        if id[0] != CHIP_ID {
            return Err(SensorReadError::Malformed(format!(
                "unexpected chip id {:#04x} at address {address:#04x}",
                id[0]
            )));
        }

        let mut raw = [0u8; 22];
        i2c.write_read(address, &[REG_CALIBRATION], &mut raw)
            .map_err(bus_error)?;
        let calibration = Calibration::from_bytes(&raw)?;
        debug!("BMP180 calibration: {calibration:?}");

        Ok(Self {
            i2c,
            delay,
            address,
            oversampling,
            calibration,
        })
    }

    fn raw_temperature(&mut self) -> Result<i64, SensorReadError> {
        self.i2c
            .write(self.address, &[REG_CONTROL, CMD_TEMPERATURE])
            .map_err(bus_error)?;
        self.delay.delay_us(4_500);
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[REG_RESULT], &mut buf)
            .map_err(bus_error)?;
        Ok(i64::from(u16::from_be_bytes(buf)))
    }

    fn raw_pressure(&mut self) -> Result<i64, SensorReadError> {
        let oss = self.oversampling;
        let command = CMD_PRESSURE + ((oss.bits() as u8) << 6);
        self.i2c
            .write(self.address, &[REG_CONTROL, command])
            .map_err(bus_error)?;
        self.delay.delay_us(oss.conversion_time_us());
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(self.address, &[REG_RESULT], &mut buf)
            .map_err(bus_error)?;
        let raw = (i64::from(buf[0]) << 16) | (i64::from(buf[1]) << 8) | i64::from(buf[2]);
        Ok(raw >> (8 - oss.bits()))
    }
}

impl<I, D> Measure for Bmp180<I, D>
where
    I: I2c + Send + 'static,
    D: DelayNs + Send + 'static,
{
    fn measure(&mut self) -> Result<Reading, SensorReadError> {
        let ut = self.raw_temperature()?;
        let up = self.raw_pressure()?;
        trace!("BMP180 raw values: UT={ut} UP={up}");

        let uncompensable =
            || SensorReadError::Malformed(format!("cannot compensate UT={ut} UP={up}"));
        let temperature =
            self.calibration.temperature(ut).ok_or_else(uncompensable)? as f64 / 10.0;
        let pressure = self
            .calibration
            .pressure(ut, up, self.oversampling)
            .ok_or_else(uncompensable)? as f64;
        let altitude = altitude(pressure, SEA_LEVEL_PRESSURE);

        debug!("Temperature: {temperature:.2} °C");
        debug!("Pressure: {pressure:.2} Pa");
        debug!("Altitude: {altitude:.2}");

        Ok(Reading::new()
            .with_temperature(temperature)
            .with_pressure(pressure)
            .with_altitude(altitude))
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(e: E) -> SensorReadError {
    SensorReadError::Bus(format!("{:?}", e.kind()))
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    use super::*;

    // Example values from the BMP180 datasheet.
    const DATASHEET: Calibration = Calibration {
        ac1: 408,
        ac2: -72,
        ac3: -14383,
        ac4: 32741,
        ac5: 32757,
        ac6: 23153,
        b1: 6190,
        b2: 4,
        mb: -32768,
        mc: -8711,
        md: 2868,
    };

    fn calibration_bytes() -> [u8; 22] {
        let words: [u16; 11] = [
            408,
            -72i16 as u16,
            -14383i16 as u16,
            32741,
            32757,
            23153,
            6190,
            4,
            -32768i16 as u16,
            -8711i16 as u16,
            2868,
        ];
        let mut raw = [0u8; 22];
        for (i, word) in words.iter().enumerate() {
            raw[2 * i..2 * i + 2].copy_from_slice(&word.to_be_bytes());
        }
        raw
    }

    /// Register-level stand-in for the chip.
    struct FakeBus {
        pointer: u8,
        control: u8,
        chip_id: u8,
        calibration: [u8; 22],
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != 0x77 {
                return Err(ErrorKind::NoAcknowledge(
                    embedded_hal::i2c::NoAcknowledgeSource::Address,
                ));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => match bytes {
                        [register] => self.pointer = *register,
                        [REG_CONTROL, command] => self.control = *command,
                        _ => return Err(ErrorKind::Other),
                    },
                    Operation::Read(buf) => {
                        let data: Vec<u8> = match (self.pointer, self.control) {
                            (REG_CHIP_ID, _) => vec![self.chip_id],
                            (REG_CALIBRATION, _) => self.calibration.to_vec(),
                            (REG_RESULT, CMD_TEMPERATURE) => 27898u16.to_be_bytes().to_vec(),
                            (REG_RESULT, CMD_PRESSURE) => vec![0x5D, 0x23, 0x00],
                            _ => return Err(ErrorKind::Other),
                        };
                        buf.copy_from_slice(&data[..buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn bus() -> FakeBus {
        FakeBus {
            pointer: 0,
            control: 0,
            chip_id: CHIP_ID,
            calibration: calibration_bytes(),
        }
    }

    #[test]
    fn datasheet_temperature() {
        assert_eq!(DATASHEET.temperature(27898), Some(150));
    }

    #[test]
    fn datasheet_pressure() {
        assert_eq!(
            DATASHEET.pressure(27898, 23843, Oversampling::UltraLowPower),
            Some(69964)
        );
    }

    #[test]
    fn calibration_is_decoded_big_endian() {
        assert_eq!(Calibration::from_bytes(&calibration_bytes()).unwrap(), DATASHEET);
    }

    #[test]
    fn altitude_is_zero_at_sea_level() {
        assert!(altitude(SEA_LEVEL_PRESSURE, SEA_LEVEL_PRESSURE).abs() < 1e-9);
        let high = altitude(89_875.0, SEA_LEVEL_PRESSURE);
        assert!((high - 1000.0).abs() < 5.0, "got {high}");
    }

    #[test]
    fn measure_reads_through_the_bus() {
        let mut sensor = Bmp180::new(bus(), NoDelay, 0x77, Oversampling::UltraLowPower).unwrap();
        let reading = sensor.measure().unwrap();
        assert_eq!(reading.temperature(), Some(15.0));
        assert_eq!(reading.pressure(), Some(69964.0));
        assert!(reading.altitude().is_some());
        assert_eq!(reading.humidity(), None);
    }

    #[test]
    fn wrong_chip_id_is_rejected() {
        let mut bus = bus();
        bus.chip_id = 0x60;
        let err = Bmp180::new(bus, NoDelay, 0x77, Oversampling::Standard)
            .err()
            .unwrap();
        assert!(matches!(err, SensorReadError::Malformed(_)));
    }

    #[test]
    fn missing_device_is_a_bus_error() {
        let err = Bmp180::new(bus(), NoDelay, 0x76, Oversampling::Standard)
            .err()
            .unwrap();
        assert!(matches!(err, SensorReadError::Bus(_)));
    }

    #[test]
    fn blank_calibration_is_rejected() {
        let mut bus = bus();
        bus.calibration = [0; 22];
        let err = Bmp180::new(bus, NoDelay, 0x77, Oversampling::Standard)
            .err()
            .unwrap();
        assert!(matches!(err, SensorReadError::Malformed(_)), "{err}");

        let mut bus = self::bus();
        bus.calibration = [0xFF; 22];
        assert!(Bmp180::new(bus, NoDelay, 0x77, Oversampling::Standard).is_err());
    }

    #[test]
    fn degenerate_coefficients_do_not_panic() {
        // x1 + md == 0 for this raw temperature
        let calibration = Calibration {
            ac6: 27898,
            md: 0,
            ..DATASHEET
        };
        assert_eq!(calibration.temperature(27898), None);
        assert_eq!(
            calibration.pressure(27898, 23843, Oversampling::UltraLowPower),
            None
        );

        // b4 == 0
        let calibration = Calibration { ac4: 0, ..DATASHEET };
        assert_eq!(
            calibration.pressure(27898, 23843, Oversampling::UltraLowPower),
            None
        );
    }

    #[tokio::test]
    async fn uncompensable_read_keeps_the_driver() {
        let mut bus = bus();
        let mut raw = calibration_bytes();
        // md = -x1 for the datasheet raw temperature
        raw[20..22].copy_from_slice(&(-4743i16).to_be_bytes());
        bus.calibration = raw;
        let sensor = Bmp180::new(bus, NoDelay, 0x77, Oversampling::UltraLowPower).unwrap();
        let mut sensor = crate::sensor::Blocking::new(sensor);

        for _ in 0..3 {
            assert!(matches!(
                crate::sensor::SensorSource::read(&mut sensor).await,
                Err(SensorReadError::Malformed(_))
            ));
        }
    }
}
