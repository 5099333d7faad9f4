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

use std::{
    fs,
    path::{Path, PathBuf},
};

use super::mode::{ModeController, ModeError, SimulatedModeController};

/// USB serial adapter, needs no GPIO sequencing.
pub const GENERIC_DEVICE: &str = "/dev/ttyUSB0";

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

/// Single board computers with known wiring.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Board {
    RaspberryPi3B,
    /// Any other Raspberry Pi.
    RaspberryPi,
    JetsonNano,
    Unknown,
}

impl Board {
    /// Identify the board from its device tree model string, e.g.
    /// `Raspberry Pi 3 Model B Rev 1.2`.
    pub fn from_model(model: &str) -> Board {
        let model = model.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        if model.starts_with("Raspberry Pi 3 Model B") && !model.contains("Plus") {
            Board::RaspberryPi3B
        } else if model.starts_with("Raspberry Pi") {
            Board::RaspberryPi
        } else if model.contains("Jetson Nano") {
            Board::JetsonNano
        } else {
            Board::Unknown
        }
    }

    pub fn identity(&self) -> &'static str {
        match *self {
            Board::RaspberryPi3B => "Pi 3 Model B",
            Board::RaspberryPi => "Raspberry Pi",
            Board::JetsonNano => "Jetson Nano",
            Board::Unknown => "unknown",
        }
    }

    /// The on-board UART the radio sits on, if this board has one.
    pub fn alternate_device(&self) -> Option<&'static str> {
        match *self {
            Board::RaspberryPi3B => Some("/dev/ttyS0"),
            Board::JetsonNano => Some("/dev/ttyTHS1"),
            Board::RaspberryPi | Board::Unknown => None,
        }
    }

    /// GPIO lines wired to the radio.
    pub fn pins(&self) -> Option<GpioPins> {
        match *self {
            Board::RaspberryPi3B | Board::RaspberryPi => Some(GpioPins {
                chip: "/dev/gpiochip0",
                reset: 4,
                bootloader: 22,
            }),
            // Header pins 7 and 15.
            Board::JetsonNano => Some(GpioPins {
                chip: "/dev/gpiochip0",
                reset: 216,
                bootloader: 194,
            }),
            Board::Unknown => None,
        }
    }
}

/// GPIO character device and line offsets of the !RESET and bootloader
/// select pins.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GpioPins {
    pub chip: &'static str,
    pub reset: u32,
    pub bootloader: u32,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GpioBackend {
    Hardware(GpioPins),
    /// Only log the line changes.
    Simulated,
}

/// What the host we run on looks like, resolved once at startup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlatformProfile {
    pub board: Board,
    pub gpio: GpioBackend,
}

impl PlatformProfile {
    /// Probe the device tree for the board model.
    pub fn detect() -> PlatformProfile {
        let board = match fs::read_to_string(DEVICE_TREE_MODEL) {
            Ok(model) => Board::from_model(&model),
            Err(e) => {
                log::debug!("Couldn't read `{}`: {}", DEVICE_TREE_MODEL, e);
                Board::Unknown
            }
        };

        log::info!("Board: {}", board.identity());
        PlatformProfile::for_board(board)
    }

    /// Profile of `board`, using its GPIO lines when it has known ones.
    pub fn for_board(board: Board) -> PlatformProfile {
        let gpio = match board.pins() {
            Some(pins) => GpioBackend::Hardware(pins),
            None => GpioBackend::Simulated,
        };

        PlatformProfile { board, gpio }
    }

    /// Same profile but never touching real GPIO lines.
    pub fn simulated(mut self) -> PlatformProfile {
        self.gpio = GpioBackend::Simulated;
        self
    }

    /// Serial device the radio is reachable on.
    pub fn resolve_device(&self) -> PathBuf {
        self.resolve_device_with(|path| path.exists())
    }

    /// A USB serial adapter wins when plugged in, otherwise the board's
    /// own UART is used.
    pub fn resolve_device_with<F>(&self, exists: F) -> PathBuf
    where
        F: Fn(&Path) -> bool,
    {
        let generic = Path::new(GENERIC_DEVICE);
        match self.board.alternate_device() {
            Some(alternate) if !exists(generic) => PathBuf::from(alternate),
            _ => generic.to_owned(),
        }
    }

    /// Controller for the bootloader/reset lines of this platform.
    pub fn mode_controller(&self) -> Result<Box<dyn ModeController>, ModeError> {
        match self.gpio {
            #[cfg(target_os = "linux")]
            GpioBackend::Hardware(pins) => {
                Ok(Box::new(super::mode::GpioModeController::new(pins)))
            }
            #[cfg(not(target_os = "linux"))]
            GpioBackend::Hardware(_) => {
                log::warn!("GPIO lines are only supported on Linux, simulating them");
                Ok(Box::new(SimulatedModeController::new()))
            }
            GpioBackend::Simulated => {
                log::warn!("No GPIO lines available, simulating mode switching");
                Ok(Box::new(SimulatedModeController::new()))
            }
        }
    }
}
