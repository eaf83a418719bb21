use std::time::Instant;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use tracing::{debug, warn};

use crate::Reading;
use crate::error::SensorReadError;
use crate::sensor::Measure;

pub const DEFAULT_RETRIES: u32 = 15;
pub const DEFAULT_RETRY_DELAY_MS: u32 = 2_000;

const FRAME_BITS: usize = 40;
const START_LOW_MS: u32 = 3;
/// Longest legitimate pulse is 80us; the slack covers scheduler hiccups.
const PULSE_TIMEOUT_US: u64 = 1_000;

/// Microsecond timestamps used to measure pulse widths.
pub trait Clock {
    fn now_us(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Converts a raw 5-byte frame into `(temperature °C, humidity %)`.
pub fn decode(frame: [u8; 5]) -> Result<(f64, f64), SensorReadError> {
    // A line that never left low decodes to zeros with a matching checksum.
    if frame == [0; 5] {
        return Err(SensorReadError::Malformed("all-zero frame".to_string()));
    }

    let checksum = frame[..4]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    if checksum != frame[4] {
        return Err(SensorReadError::Checksum);
    }

    let humidity = f64::from(u16::from_be_bytes([frame[0], frame[1]])) / 10.0;
    let magnitude = f64::from(u16::from_be_bytes([frame[2] & 0x7F, frame[3]])) / 10.0;
    let temperature = if frame[2] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };
    Ok((temperature, humidity))
}

/// AM2302/DHT22 on a single open-drain data line.
///
/// Pulse widths are taken from `clock`, never from counted delays, and a
/// bit is a one when its high pulse outlasts the low pulse before it. This
/// keeps decoding stable when every pin access costs several microseconds.
pub struct Dht22<P, D, C = MonotonicClock> {
    pin: P,
    delay: D,
    clock: C,
    retries: u32,
    retry_delay_ms: u32,
}

impl<P, D> Dht22<P, D, MonotonicClock>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self::with_clock(pin, delay, MonotonicClock::default())
    }
}

impl<P, D, C> Dht22<P, D, C>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    C: Clock,
{
    pub fn with_clock(pin: P, delay: D, clock: C) -> Self {
        Self {
            pin,
            delay,
            clock,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay_ms: u32) -> Self {
        self.retries = retries.max(1);
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Polls while the line is at `high` and returns how long it stayed
    /// there, in microseconds.
    fn wait_while(&mut self, high: bool) -> Result<u64, SensorReadError> {
        let start = self.clock.now_us();
        while self.pin.is_high().map_err(pin_error)? == high {
            if self.clock.now_us().saturating_sub(start) > PULSE_TIMEOUT_US {
                return Err(SensorReadError::Timeout);
            }
        }
        Ok(self.clock.now_us().saturating_sub(start))
    }

    fn read_frame(&mut self) -> Result<[u8; 5], SensorReadError> {
        // Start signal: hold the line low, then release it.
        self.pin.set_low().map_err(pin_error)?;
        self.delay.delay_ms(START_LOW_MS);
        self.pin.set_high().map_err(pin_error)?;

        // Response: sensor pulls low for 80us, then high for 80us.
        self.wait_while(true)?;
        self.wait_while(false)?;
        self.wait_while(true)?;

        let mut frame = [0u8; 5];
        for bit in 0..FRAME_BITS {
            let low_us = self.wait_while(false)?;
            let high_us = self.wait_while(true)?;
            // 26-28us high is a zero, 70us is a one, each after 50us low.
            if high_us > low_us {
                frame[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        Ok(frame)
    }

    fn read_once(&mut self) -> Result<(f64, f64), SensorReadError> {
        let frame = self.read_frame()?;
        decode(frame)
    }
}

impl<P, D, C> Measure for Dht22<P, D, C>
where
    P: InputPin + OutputPin + Send + 'static,
    D: DelayNs + Send + 'static,
    C: Clock + Send + 'static,
{
    fn measure(&mut self) -> Result<Reading, SensorReadError> {
        for attempt in 1..=self.retries {
            match self.read_once() {
                Ok((temperature, humidity)) => {
                    debug!("Temperature: {temperature}");
                    debug!("Humidity: {humidity}");
                    return Ok(Reading::new()
                        .with_temperature(temperature)
                        .with_humidity(humidity));
                }
                Err(e) => {
                    warn!("DHT22 read attempt {attempt}/{} failed: {e}", self.retries);
                    if attempt < self.retries {
                        self.delay.delay_ms(self.retry_delay_ms);
                    }
                }
            }
        }
        Err(SensorReadError::Exhausted(self.retries))
    }
}

fn pin_error<E: embedded_hal::digital::Error>(e: E) -> SensorReadError {
    SensorReadError::Bus(format!("{:?}", e.kind()))
}
