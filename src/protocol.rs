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

//! # Serial Bootloader Interface packets
//!
//! One method per bootloader command. Commands spanning more than one
//! packet (chunked downloads, erasing ranges of sectors) live in
//! [`crate::util`].

use std::{
    cmp::Ordering,
    fmt, io,
    time::{Duration, Instant},
};

use serial::SerialPort;

use crate::{constants, Family};

/// Default time to wait for an ACK/NACK after a command.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Packet level access to a chip in bootloader mode.
pub struct Bootloader<P> {
    port: P,
    ack_timeout: Duration,
}

impl<P> Bootloader<P>
where
    P: SerialPort,
{
    /// Wrap an already opened and configured port.
    ///
    /// No traffic is generated, use [`Bootloader::synchronize`] before
    /// issuing commands.
    pub fn new(port: P) -> Self {
        Bootloader {
            port,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Change how long to wait for the ACK of a command.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Access the underlying port, e.g. to toggle the DTR/RTS lines.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give back the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn write_cmd<D>(&mut self, cmd: u8, data: &D) -> io::Result<()>
    where
        D: AsRef<[u8]>,
    {
        // [len | checksum | cmd]
        const HDR_LEN: usize = 3;

        let data = data.as_ref();

        let pkt_len = HDR_LEN + data.len();
        if pkt_len > usize::from(std::u8::MAX) {
            // Logic error, just panic.
            panic!("packet too big");
        }

        let mut pkt = Vec::with_capacity(pkt_len);

        pkt.push(pkt_len as u8);
        pkt.push(command_checksum(cmd, data));
        pkt.push(cmd);
        pkt.extend_from_slice(data);

        log::trace!("sending cmd {:#X}, pkt = {:?}", cmd, pkt);

        self.port.write_all(pkt.as_slice())?;
        self.port.flush()?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error of kind [`io::ErrorKind::TimedOut`] when no
    /// ACK/NACK arrived in time.
    fn read_ack(&mut self) -> io::Result<bool> {
        log::trace!("waiting for ACK");

        let start_time = Instant::now();
        let mut ack = vec![0xFF, 0xFF];
        loop {
            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected EOF",
                    ));
                }
                Ok(_) => {
                    ack.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    log::trace!("read timed out");
                }
                Err(e) => return Err(e),
            }

            if ack[ack.len() - 2] == 0x00
                && (ack[ack.len() - 1] == constants::ACK
                    || ack[ack.len() - 1] == constants::NACK)
            {
                log::trace!("ACK bytes found {:?}", &ack[2..]);
                break;
            } else if start_time.elapsed() >= self.ack_timeout {
                log::trace!("ACK bytes not found, timed out");
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "ACK bytes not found, timed out",
                ));
            }
        }

        log::trace!("found ACK bytes after {} bytes", ack.len() - 2);

        Ok(ack[ack.len() - 1] == constants::ACK)
    }

    fn write_ack(&mut self, ack: bool) -> io::Result<()> {
        let data: [u8; 2] =
            [0x00, if ack { constants::ACK } else { constants::NACK }];

        self.port.write_all(&data)?;
        self.port.flush()?;

        Ok(())
    }

    fn read_response(&mut self, response: &mut [u8]) -> io::Result<()> {
        const HDR_LEN: usize = 2;

        log::trace!("waiting for response header");
        let mut hdr = [0u8; HDR_LEN];
        self.port.read_exact(&mut hdr)?;
        log::trace!(
            "response header received, len = {}, cksum = {:#X}",
            hdr[0],
            hdr[1]
        );

        let payload_len = (hdr[0] as usize).saturating_sub(HDR_LEN);
        match response.len().cmp(&payload_len) {
            Ordering::Greater => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "received response is too small, expected {}, found {}",
                        response.len(),
                        payload_len,
                    ),
                ))
            }
            Ordering::Less => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "received response is too big, expected {}, found {}",
                        response.len(),
                        payload_len,
                    ),
                ))
            }
            _ => (),
        }

        log::trace!(
            "waiting for rest of response, expecting {} bytes",
            response.len()
        );
        self.port.read_exact(response)?;

        let checksum = response
            .iter()
            .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
        if checksum != hdr[1] {
            self.write_ack(false)?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "response checksum mismatch, expected {:#X}, found {:#X}",
                    hdr[1], checksum
                ),
            ));
        }

        self.write_ack(true)?;

        Ok(())
    }

    fn expect_ack(&mut self, what: &str) -> io::Result<()> {
        if !self.read_ack()? {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} not acknowledged", what),
            ));
        }

        Ok(())
    }

    /// Synchronize with the bootloader.
    ///
    /// A dummy command is sent first, if the bootloader already knows our
    /// baudrate it answers it. Otherwise the auto baud procedure is
    /// performed.
    ///
    /// Returns `false` if the bootloader didn't answer at all.
    pub fn synchronize(&mut self) -> io::Result<bool> {
        log::debug!("Sending dummy test command to check communication");
        self.write_cmd(0, &[])?;
        match self.read_ack() {
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                log::debug!(
                    "No response received, performing auto baud procedure"
                );
            }
            Err(e) => return Err(e),
        }

        // To synchronize with the host (us) send two bytes containing 0x55. If
        // synchronization succeeds, the bootloader will return an acknowledge.
        let data = [constants::SYNC_BYTE, constants::SYNC_BYTE];
        self.port.write_all(&data)?;
        self.port.flush()?;
        match self.read_ack() {
            Ok(ack) => {
                log::debug!("Auto baud finished, ack = {}", ack);
                Ok(ack)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Prepares flash programming.
    ///
    /// # Notes
    ///
    /// This command must be followed by a [`Bootloader::get_status`] command
    /// to verify it worked.
    pub fn download(
        &mut self,
        program_address: u32,
        program_size: u32,
    ) -> io::Result<()> {
        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&program_address.to_be_bytes());
        data[4..].copy_from_slice(&program_size.to_be_bytes());

        self.write_cmd(constants::CMD_DOWNLOAD, &data)?;
        self.expect_ack("COMMAND_DOWNLOAD")
    }

    /// Get the status of the last issued command.
    pub fn get_status(&mut self) -> io::Result<u8> {
        self.write_cmd(constants::CMD_GET_STATUS, &[])?;
        self.expect_ack("COMMAND_GET_STATUS")?;

        let mut response = [0u8; 1];
        self.read_response(&mut response)?;

        Ok(response[0])
    }

    /// Send data to be written into the flash memory.
    ///
    /// The return value represents if the command was acknowledged or not,
    /// if not acknowledged the write address is not incremented by the
    /// device which allows for retransmissions of the previous data.
    ///
    /// # Panics
    ///
    /// This function will panic if the `data` length in bytes is
    /// higher than [`constants::MAX_BYTES_PER_TRANSFER`].
    pub fn send_data<D>(&mut self, data: &D) -> io::Result<bool>
    where
        D: AsRef<[u8]>,
    {
        assert!(data.as_ref().len() <= constants::MAX_BYTES_PER_TRANSFER);

        self.write_cmd(constants::CMD_SEND_DATA, data)?;
        self.read_ack()
    }

    /// Read chip ID.
    pub fn get_chip_id(&mut self) -> io::Result<u32> {
        self.write_cmd(constants::CMD_GET_CHIP_ID, &[])?;
        self.expect_ack("COMMAND_GET_CHIP_ID")?;

        let mut response = [0u8; 4];
        self.read_response(&mut response)?;

        Ok(u32::from_be_bytes(response))
    }

    /// Ranged erase. Only supported on [`Family::CC2538`].
    ///
    /// # Panics
    ///
    /// This function panics if the family doesn't support this command.
    pub fn erase(
        &mut self,
        family: Family,
        address: u32,
        byte_count: u32,
    ) -> io::Result<()> {
        if !family.supports_erase() {
            panic!("`COMMAND_ERASE` is not supported");
        }

        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&address.to_be_bytes());
        data[4..].copy_from_slice(&byte_count.to_be_bytes());

        self.write_cmd(constants::CC2538_CMD_ERASE, &data)?;
        self.expect_ack("COMMAND_ERASE")
    }

    /// Sector erase. Only supported on [`Family::CC26X0`] and [`Family::CC26X2`].
    ///
    /// # Panics
    ///
    /// - This function panics if the family doesn't support this command.
    /// - This function panics if the `address` isn't the start of a sector.
    pub fn sector_erase(
        &mut self,
        family: Family,
        address: u32,
    ) -> io::Result<()> {
        if !family.supports_sector_erase() {
            panic!("`COMMAND_SECTOR_ERASE` is not supported");
        }

        assert!(
            address % family.sector_size() == 0,
            "invalid sector address"
        );

        self.write_cmd(constants::CC26XX_CMD_SECTOR_ERASE, &address.to_be_bytes())?;
        self.expect_ack("COMMAND_SECTOR_ERASE")
    }

    /// Erase every unprotected sector. Only supported on
    /// [`Family::CC26X0`] and [`Family::CC26X2`].
    pub fn bank_erase(&mut self, family: Family) -> io::Result<()> {
        if !family.supports_bank_erase() {
            panic!("`COMMAND_BANK_ERASE` is not supported");
        }

        self.write_cmd(constants::CC26XX_CMD_BANK_ERASE, &[])?;
        self.expect_ack("COMMAND_BANK_ERASE")
    }

    /// Calculate the CRC32 of a memory region on the device.
    pub fn crc32(
        &mut self,
        family: Family,
        address: u32,
        byte_count: u32,
    ) -> io::Result<u32> {
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&address.to_be_bytes());
        data.extend_from_slice(&byte_count.to_be_bytes());
        if family != Family::CC2538 {
            // Read repeat count.
            data.extend_from_slice(&0u32.to_be_bytes());
        }

        self.write_cmd(constants::CMD_CRC32, &data)?;
        self.expect_ack("COMMAND_CRC32")?;

        let mut response = [0u8; 4];
        self.read_response(&mut response)?;

        Ok(u32::from_be_bytes(response))
    }

    /// Switch to XOSC. Only supported on [`Family::CC2538`].
    ///
    /// Returns whether the bootloader accepted the switch, after an
    /// acknowledge the port must be reopened at a higher baudrate.
    pub fn set_xosc(&mut self) -> io::Result<bool> {
        self.write_cmd(constants::CC2538_CMD_SET_XOSC, &[])?;
        self.read_ack()
    }

    /// Read one 32-bit word of memory.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`io::ErrorKind::InvalidInput`] if the
    /// `address` is not aligned to 32-bits, nothing is sent in that case.
    pub fn memory_read_32(
        &mut self,
        family: Family,
        address: u32,
    ) -> io::Result<[u8; 4]> {
        if (address & 0x03) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("memory address {:#X} must be 32-bits aligned", address),
            ));
        }

        log::trace!("memory_read_32 at address `{:#X}`", address);

        let mut cmd = Vec::with_capacity(6);
        cmd.extend_from_slice(&address.to_be_bytes());
        match family {
            // access width in bytes
            Family::CC2538 => cmd.push(4),
            // access type (32-bit) and number of accesses
            Family::CC26X0 | Family::CC26X2 => cmd.extend_from_slice(&[1, 1]),
        }

        self.write_cmd(constants::CMD_MEMORY_READ, &cmd)?;
        self.expect_ack("COMMAND_MEMORY_READ")?;

        let mut data = [0u8; 4];
        self.read_response(&mut data)?;

        Ok(data)
    }

    /// Reset the device, this leaves bootloader mode.
    pub fn reset(&mut self) -> io::Result<()> {
        self.write_cmd(constants::CMD_RESET, &[])?;
        self.expect_ack("COMMAND_RESET")
    }
}

impl<P> fmt::Debug for Bootloader<P>
where
    P: SerialPort,
{
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Bootloader")
            .field("ack_timeout", &self.ack_timeout)
            .field("port", &())
            .finish()
    }
}

fn command_checksum(cmd: u8, data: &[u8]) -> u8 {
    let mut checksum: u8 = cmd;
    for byte in data {
        checksum = checksum.overflowing_add(*byte).0;
    }

    checksum
}

/// Default serial port settings.
///
/// It's recommended to change only the baudrate since all other
/// options are the same for all Texas Instruments devices.
pub fn port_settings(baudrate: u32) -> serial::PortSettings {
    serial::PortSettings {
        baud_rate: serial::BaudRate::from_speed(baudrate as usize),
        char_size: serial::CharSize::Bits8,
        parity: serial::Parity::ParityNone,
        stop_bits: serial::StopBits::Stop1,
        flow_control: serial::FlowControl::FlowNone,
    }
}

/// Use the DTR and RTS lines to control bootloader and the !RESET pin.
/// This can automatically invoke the bootloader without the user
/// having to toggle any pins.
///
/// # Parameters:
///
/// - `bootloader_active_high`: whether the bootloader pin used is active low or
/// active high.
/// - `inverted`: if it's `false` (default) DTR is connected to the bootloader pin,
/// RTS connnected to !RESET. If it's `true` it's the other way around
pub fn invoke_bootloader<P>(
    port: &mut P,
    bootloader_active_high: bool,
    inverted: bool,
) -> serial::Result<()>
where
    P: SerialPort,
{
    fn set_bootloader_pin<P: SerialPort>(
        port: &mut P,
        inverted: bool,
        level: bool,
    ) -> serial::Result<()> {
        if inverted {
            port.set_rts(level)
        } else {
            port.set_dtr(level)
        }
    }

    fn set_reset_pin<P: SerialPort>(
        port: &mut P,
        inverted: bool,
        level: bool,
    ) -> serial::Result<()> {
        if inverted {
            port.set_dtr(level)
        } else {
            port.set_rts(level)
        }
    }

    set_bootloader_pin(port, inverted, !bootloader_active_high)?;
    set_reset_pin(port, inverted, false)?;
    set_reset_pin(port, inverted, true)?;
    set_reset_pin(port, inverted, false)?;
    // Make sure the pin is still asserted when the chip comes out of reset.
    #[cfg(not(test))]
    std::thread::sleep(Duration::from_millis(2));
    set_bootloader_pin(port, inverted, bootloader_active_high)?;

    Ok(())
}
