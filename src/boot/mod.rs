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

//! # Boot sequencing
//!
//! Boards carrying the radio on an internal UART wire its !RESET and
//! bootloader select pins to GPIO lines. Those lines are driven to enter
//! the bootloader before flashing and to go back to the application
//! afterwards.

mod mode;
mod platform;
mod sequencer;

#[cfg(target_os = "linux")]
pub use self::mode::GpioModeController;
pub use self::mode::{Level, Line, ModeController, ModeError, SimulatedModeController};
pub use self::platform::{Board, GpioBackend, GpioPins, PlatformProfile, GENERIC_DEVICE};
pub use self::sequencer::{BootError, BootSequencer, BootState, SETTLE_TIME};
