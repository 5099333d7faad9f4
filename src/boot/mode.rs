// Copyright 2021 Locha Mesh Developers <contact@locha.io>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

#[cfg(target_os = "linux")]
use gpiocdev::{
    line::{Value, Values},
    request::Config,
    Request,
};

#[cfg(target_os = "linux")]
use super::platform::GpioPins;

/// Control lines wired to the radio.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Line {
    /// Bootloader backdoor select, sampled while leaving reset.
    Bootloader,
    /// !RESET, active low.
    Reset,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Level::Low => f.write_str("LOW"),
            Level::High => f.write_str("HIGH"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[cfg(target_os = "linux")]
    #[error("Failed to request GPIO lines on `{chip}`: {source}")]
    LineRequestFailed {
        chip: &'static str,
        #[source]
        source: gpiocdev::Error,
    },

    #[cfg(target_os = "linux")]
    #[error("Failed to drive {line:?} line {level}: {source}")]
    SetValueFailed {
        line: Line,
        level: Level,
        #[source]
        source: gpiocdev::Error,
    },

    #[cfg(target_os = "linux")]
    #[error("Failed to drive bootloader line {bootloader} and reset line {reset}: {source}")]
    SetValuesFailed {
        bootloader: Level,
        reset: Level,
        #[source]
        source: gpiocdev::Error,
    },

    #[error("GPIO lines used before being set up")]
    NotSetUp,
}

/// Drives the bootloader select and reset lines.
pub trait ModeController {
    /// Claim both lines as outputs, driven high.
    fn setup(&mut self) -> Result<(), ModeError>;

    fn set(&mut self, line: Line, level: Level) -> Result<(), ModeError>;

    /// Drive both lines at once.
    fn set_both(&mut self, bootloader: Level, reset: Level) -> Result<(), ModeError> {
        self.set(Line::Bootloader, bootloader)?;
        self.set(Line::Reset, reset)
    }
}

#[cfg(target_os = "linux")]
fn gpio_value(level: Level) -> Value {
    match level {
        Level::High => Value::Active,
        Level::Low => Value::Inactive,
    }
}

/// Lines driven through the GPIO character device.
#[cfg(target_os = "linux")]
pub struct GpioModeController {
    pins: GpioPins,
    request: Option<Request>,
}

#[cfg(target_os = "linux")]
impl GpioModeController {
    pub fn new(pins: GpioPins) -> GpioModeController {
        GpioModeController {
            pins,
            request: None,
        }
    }

    fn offset(&self, line: Line) -> u32 {
        match line {
            Line::Bootloader => self.pins.bootloader,
            Line::Reset => self.pins.reset,
        }
    }
}

#[cfg(target_os = "linux")]
impl ModeController for GpioModeController {
    fn setup(&mut self) -> Result<(), ModeError> {
        log::debug!(
            "Requesting lines {} (reset) and {} (bootloader) on `{}`",
            self.pins.reset,
            self.pins.bootloader,
            self.pins.chip
        );

        let mut config = Config::default();
        config.with_line(self.pins.reset).as_output(Value::Active);
        config.with_line(self.pins.bootloader).as_output(Value::Active);

        let request = Request::from_config(config)
            .on_chip(self.pins.chip)
            .with_consumer("dongle")
            .request()
            .map_err(|source| ModeError::LineRequestFailed {
                chip: self.pins.chip,
                source,
            })?;

        self.request = Some(request);
        Ok(())
    }

    fn set(&mut self, line: Line, level: Level) -> Result<(), ModeError> {
        let offset = self.offset(line);
        let request = self.request.as_ref().ok_or(ModeError::NotSetUp)?;

        log::trace!("{:?} line ({}) -> {}", line, offset, level);
        request
            .set_value(offset, gpio_value(level))
            .map_err(|source| ModeError::SetValueFailed {
                line,
                level,
                source,
            })?;

        Ok(())
    }

    fn set_both(&mut self, bootloader: Level, reset: Level) -> Result<(), ModeError> {
        let request = self.request.as_ref().ok_or(ModeError::NotSetUp)?;

        let mut values = Values::default();
        values
            .set(self.pins.bootloader, gpio_value(bootloader))
            .set(self.pins.reset, gpio_value(reset));

        log::trace!("Bootloader line -> {}, Reset line -> {}", bootloader, reset);
        request
            .set_values(&values)
            .map_err(|source| ModeError::SetValuesFailed {
                bootloader,
                reset,
                source,
            })?;

        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl fmt::Debug for GpioModeController {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GpioModeController")
            .field("pins", &self.pins)
            .field("requested", &self.request.is_some())
            .finish()
    }
}

/// Stand-in used where no GPIO lines are available. Records every level
/// it is asked to drive.
#[derive(Debug, Default)]
pub struct SimulatedModeController {
    ready: bool,
    history: Vec<(Line, Level)>,
}

impl SimulatedModeController {
    pub fn new() -> SimulatedModeController {
        SimulatedModeController::default()
    }

    pub fn history(&self) -> &[(Line, Level)] {
        &self.history
    }
}

impl ModeController for SimulatedModeController {
    fn setup(&mut self) -> Result<(), ModeError> {
        self.ready = true;
        self.set(Line::Reset, Level::High)?;
        self.set(Line::Bootloader, Level::High)
    }

    fn set(&mut self, line: Line, level: Level) -> Result<(), ModeError> {
        if !self.ready {
            return Err(ModeError::NotSetUp);
        }

        log::info!("(simulated) {:?} line -> {}", line, level);
        self.history.push((line, level));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simulated_requires_setup() {
        let mut mode = SimulatedModeController::new();
        assert!(matches!(
            mode.set(Line::Reset, Level::Low),
            Err(ModeError::NotSetUp)
        ));

        mode.setup().unwrap();
        mode.set(Line::Reset, Level::Low).unwrap();
        assert_eq!(
            mode.history(),
            &[
                (Line::Reset, Level::High),
                (Line::Bootloader, Level::High),
                (Line::Reset, Level::Low),
            ]
        );
    }

    #[test]
    fn test_simulated_set_both() {
        let mut mode = SimulatedModeController::new();
        assert!(matches!(
            mode.set_both(Level::Low, Level::Low),
            Err(ModeError::NotSetUp)
        ));

        mode.setup().unwrap();
        mode.set_both(Level::Low, Level::Low).unwrap();
        assert_eq!(
            &mode.history()[2..],
            &[(Line::Bootloader, Level::Low), (Line::Reset, Level::Low)]
        );
    }
}
