// Copyright 2021 Locha Mesh Developers <contact@locha.io>
//
// Based on the previous work of cc2538-bsl and Texas Instruments sblAppEx
// 1.03.00.00 (swra466c.zip).
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

//! # CC2538/CC26xx dongle flashing library
//!
//! Flashes Texas Instruments radios through their ROM serial bootloader
//! and drives the GPIO lines that put a board's radio in and out of that
//! bootloader.
//!
//! The serial side is split in three layers:
//!
//! - [`protocol::Bootloader`] speaks the packet format over any
//!   [`serial::SerialPort`].
//! - [`Transport`] is the seam the flashing sequence talks to,
//!   [`SerialTransport`] being its real implementation.
//! - [`FlashOrchestrator`] runs the connect, identify, erase, write and
//!   verify steps, reporting the first failing [`Stage`].
//!
//! The [`boot`] module holds the board side: platform detection and the
//! [`BootSequencer`] driving the bootloader select and reset lines.
//!
//! # Tested with the following chips
//!
//! - [CC1312R](https://www.ti.com/product/CC1312R)
//! - [CC1352P](https://www.ti.com/product/CC1352P)
//!
//! # See also
//!
//! - [CC2538/CC26x0/CC26x2 Serial Bootloader Interface](https://www.ti.com/lit/an/swra466c/swra466c.pdf).

#[rustfmt::skip]
pub mod constants;
pub mod boot;
pub mod config;
pub mod crc;
pub mod device;
pub mod firmware;
pub mod flasher;
pub mod protocol;
pub mod transport;
pub mod util;

mod error;
mod family;

pub use self::boot::{BootError, BootSequencer, BootState, PlatformProfile};
pub use self::config::{ConfigError, FlashConfig, FlashConfigBuilder};
pub use self::device::{DeviceProfile, PageRange};
pub use self::error::{Failure, RunOutcome, Stage, StageContext};
pub use self::family::Family;
pub use self::firmware::{FirmwareError, FirmwareImage};
pub use self::flasher::{flash_firmware, run, FlashOrchestrator};
pub use self::transport::{SerialTransport, Transport};
