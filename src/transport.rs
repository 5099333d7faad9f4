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

//! # Transport
//!
//! The command vocabulary the flashing sequence talks to, and its
//! implementation on top of a serial port.

use std::{fmt, io, time::Duration};

use serial::{SerialPort, SystemPort};

use crate::{
    device::DeviceProfile,
    protocol::{self, Bootloader},
    util, Family,
};

/// Read timeout applied to the serial port.
const PORT_TIMEOUT: Duration = Duration::from_millis(200);

/// Commands understood by a chip in bootloader mode.
///
/// Every method may fail with a transport level error, callers decide
/// which step of the flashing sequence the error belongs to.
pub trait Transport {
    /// (Re)open the channel on `port` at `baudrate`.
    fn open(&mut self, port: &str, baudrate: u32) -> io::Result<()>;

    /// Close the channel, further commands fail until it's reopened.
    fn close(&mut self);

    /// Toggle the bootloader/reset lines wired to the modem control
    /// signals.
    fn invoke_bootloader(
        &mut self,
        active_high: bool,
        invert_lines: bool,
    ) -> io::Result<()>;

    /// Returns `false` when the bootloader didn't answer.
    fn synchronize(&mut self) -> io::Result<bool>;

    fn get_chip_id(&mut self) -> io::Result<u32>;

    /// Switch the target to its external oscillator.
    fn set_external_oscillator(&mut self) -> io::Result<bool>;

    /// Mass erase.
    fn erase_all(&mut self, device: &DeviceProfile) -> io::Result<bool>;

    fn erase_range(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        byte_count: u32,
    ) -> io::Result<()>;

    fn write_block(&mut self, address: u32, data: &[u8]) -> io::Result<bool>;

    /// CRC32 computed by the target over `[address, address + byte_count)`.
    fn crc32(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        byte_count: u32,
    ) -> io::Result<u32>;

    /// Read one 32-bit word. Takes the family rather than a full profile
    /// since it's used while the profile is being probed.
    fn read_word(&mut self, family: Family, address: u32) -> io::Result<[u8; 4]>;

    /// Program the 8 bytes of an IEEE address at `offset`.
    fn write_unique_address(
        &mut self,
        offset: u32,
        address: [u8; 8],
    ) -> io::Result<bool> {
        self.write_block(offset, &address)
    }

    /// Clear the bootloader enable bits, the chip won't enter bootloader
    /// mode anymore after the next reset.
    fn disable_bootloader(&mut self, device: &DeviceProfile) -> io::Result<bool> {
        self.write_block(
            device.bootloader_config_address,
            &device.bootloader_disable_value.to_le_bytes(),
        )
    }

    fn reset(&mut self) -> io::Result<()>;
}

/// [`Transport`] over a system serial port.
pub struct SerialTransport {
    bootloader: Option<Bootloader<SystemPort>>,
}

impl SerialTransport {
    /// Create a closed transport.
    pub fn new() -> SerialTransport {
        SerialTransport { bootloader: None }
    }

    /// Create a transport already opened on `port`.
    pub fn open_port(port: &str, baudrate: u32) -> io::Result<SerialTransport> {
        let mut transport = SerialTransport::new();
        transport.open(port, baudrate)?;
        Ok(transport)
    }

    pub fn is_open(&self) -> bool {
        self.bootloader.is_some()
    }

    fn bootloader(&mut self) -> io::Result<&mut Bootloader<SystemPort>> {
        self.bootloader.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "serial port is closed")
        })
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        SerialTransport::new()
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("SerialTransport")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, port: &str, baudrate: u32) -> io::Result<()> {
        self.close();

        log::debug!("Opening port `{}`, baud {}", port, baudrate);
        let mut system_port = serial::open(port)?;
        system_port.configure(&protocol::port_settings(baudrate))?;
        system_port.set_timeout(PORT_TIMEOUT)?;

        self.bootloader = Some(Bootloader::new(system_port));

        Ok(())
    }

    fn close(&mut self) {
        if self.bootloader.take().is_some() {
            log::debug!("Serial port closed");
        }
    }

    fn invoke_bootloader(
        &mut self,
        active_high: bool,
        invert_lines: bool,
    ) -> io::Result<()> {
        let port = self.bootloader()?.port_mut();
        protocol::invoke_bootloader(port, active_high, invert_lines)?;
        Ok(())
    }

    fn synchronize(&mut self) -> io::Result<bool> {
        self.bootloader()?.synchronize()
    }

    fn get_chip_id(&mut self) -> io::Result<u32> {
        self.bootloader()?.get_chip_id()
    }

    fn set_external_oscillator(&mut self) -> io::Result<bool> {
        self.bootloader()?.set_xosc()
    }

    fn erase_all(&mut self, device: &DeviceProfile) -> io::Result<bool> {
        util::mass_erase(self.bootloader()?, device.family, device.flash_size)
    }

    fn erase_range(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        byte_count: u32,
    ) -> io::Result<()> {
        util::erase_flash_range(self.bootloader()?, device.family, address, byte_count)
    }

    fn write_block(&mut self, address: u32, data: &[u8]) -> io::Result<bool> {
        util::write_flash_range(self.bootloader()?, address, data)?;
        Ok(true)
    }

    fn crc32(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        byte_count: u32,
    ) -> io::Result<u32> {
        self.bootloader()?.crc32(device.family, address, byte_count)
    }

    fn read_word(&mut self, family: Family, address: u32) -> io::Result<[u8; 4]> {
        self.bootloader()?.memory_read_32(family, address)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.bootloader()?.reset()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_closed_transport() {
        let mut transport = SerialTransport::new();
        assert!(!transport.is_open());

        let err = transport.synchronize().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        // Closing twice is fine.
        transport.close();
        transport.close();
    }

    #[test]
    fn test_open_missing_port() {
        assert!(SerialTransport::open_port("/dev/does-not-exist", 115_200).is_err());
    }
}
