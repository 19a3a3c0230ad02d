//! The actuation seam between the solver and the PWM hardware.
//!
//! The actual PWM chip driver (register maps, bus transport) lives outside
//! this crate; the control server only needs to configure a refresh
//! frequency and push per-channel pulse widths, so that is all the trait
//! exposes. Solved angles in degrees are mapped to pulse ticks with a fixed
//! linear mapping over the servo's electrical range.

use std::io;

/// PWM refresh rate in Hz. The control loop issues at most one hardware
/// update per refresh period.
pub const PULSE_FREQUENCY_HZ: u32 = 100;

/// Pulse width in microseconds at the electrical minimum position.
pub const PULSE_WIDTH_MIN: f64 = 500.0;

/// Pulse width in microseconds at the electrical maximum position.
pub const PULSE_WIDTH_MAX: f64 = 2500.0;

/// Pulse width in microseconds at 0°.
pub const PULSE_WIDTH_ZERO: f64 = 1500.0;

/// Electrical angle range of the servo in degrees (end to end).
pub const SERVO_ELECTRICAL_RANGE: f64 = 180.0;

/// Maps a servo angle in degrees to a pulse width in microseconds:
/// linear between the electrical endpoints, zero degrees at
/// [`PULSE_WIDTH_ZERO`].
pub fn pulse_width(angle_degrees: f64) -> u32 {
    let span = PULSE_WIDTH_MAX - PULSE_WIDTH_MIN;
    (PULSE_WIDTH_ZERO + angle_degrees.to_radians() * span / SERVO_ELECTRICAL_RANGE.to_radians())
        as u32
}

/// Minimal PWM driver interface the control server actuates through.
///
/// Opening and closing the device belong to the implementation's
/// constructor and `Drop`.
pub trait ServoDriver {
    /// Programs the PWM refresh frequency.
    fn set_frequency(&mut self, hz: u32) -> io::Result<()>;

    /// Sets one channel's pulse: signal goes high at tick `on` and low at
    /// tick `off` within the refresh period, both in microseconds.
    fn set_channel_pulse(&mut self, channel: u8, on: u32, off: u32) -> io::Result<()>;
}

/// Driver stand-in for `--simulate` runs and tests: records what would have
/// been sent to hardware.
#[derive(Debug, Default)]
pub struct SimulatedServos {
    pub frequency: Option<u32>,
    pub pulses: [Option<(u32, u32)>; 16],
}

impl SimulatedServos {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServoDriver for SimulatedServos {
    fn set_frequency(&mut self, hz: u32) -> io::Result<()> {
        self.frequency = Some(hz);
        Ok(())
    }

    fn set_channel_pulse(&mut self, channel: u8, on: u32, off: u32) -> io::Result<()> {
        let slot = self
            .pulses
            .get_mut(channel as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no such channel"))?;
        *slot = Some((on, off));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_degrees_is_center_pulse() {
        assert_eq!(pulse_width(0.0), 1500);
    }

    #[test]
    fn mapping_endpoints() {
        assert_eq!(pulse_width(90.0), 2500);
        assert_eq!(pulse_width(-90.0), 500);
    }

    #[test]
    fn mapping_is_linear() {
        assert_eq!(pulse_width(45.0), 2000);
        assert_eq!(pulse_width(-45.0), 1000);
    }

    #[test]
    fn simulated_driver_records_pulses() {
        let mut driver = SimulatedServos::new();
        driver.set_frequency(PULSE_FREQUENCY_HZ).unwrap();
        driver.set_channel_pulse(3, 0, 1500).unwrap();
        assert_eq!(driver.frequency, Some(100));
        assert_eq!(driver.pulses[3], Some((0, 1500)));
        assert!(driver.set_channel_pulse(200, 0, 0).is_err());
    }
}
