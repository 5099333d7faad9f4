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

//! # Flashing sequence
//!
//! Drives a chip in bootloader mode through connect, identify, speed
//! upgrade, erase, write, verify, unique address programming, read back,
//! bootloader disabling and reset. The first failing step ends the run.

use std::{
    convert::TryFrom,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{
    config::{format_ieee_address, FlashConfig},
    constants::XOSC_BAUDRATE,
    device::DeviceProfile,
    error::{Failure, RunOutcome, Stage, StageContext},
    firmware::FirmwareImage,
    transport::{SerialTransport, Transport},
};

/// One flashing run over an exclusively borrowed transport.
pub struct FlashOrchestrator<'a, T: ?Sized> {
    transport: &'a mut T,
    config: &'a FlashConfig,
}

impl<'a, T> FlashOrchestrator<'a, T>
where
    T: Transport + ?Sized,
{
    /// `transport` must already be open on `config.port()` at
    /// `config.baudrate()`.
    pub fn new(transport: &'a mut T, config: &'a FlashConfig) -> Self {
        FlashOrchestrator { transport, config }
    }

    /// Run the whole sequence.
    ///
    /// `image` is only looked at when writing or verifying.
    pub fn run(mut self, image: Option<&FirmwareImage>) -> RunOutcome {
        let image = if self.config.needs_image() {
            match image {
                Some(image) => Some(image),
                None => {
                    return Err(Failure::new(
                        Stage::Precondition,
                        "a firmware image is required to write or verify",
                    ))
                }
            }
        } else {
            None
        };

        self.connect()?;
        let device = self.identify()?;
        let address = self.config.address().unwrap_or(device.flash_start_addr);

        if !self.config.force_speed() && device.supports_external_oscillator {
            self.speed_upgrade()?;
        }

        if self.config.erase() {
            self.erase(&device)?;
        }

        if self.config.erase_pages().is_some() {
            self.partial_erase(&device)?;
        }

        if let Some(image) = image {
            if self.config.write() {
                self.write(&device, address, image)?;
            }

            if self.config.verify() {
                self.verify(&device, address, image)?;
            }
        }

        if let Some(unique_address) = self.config.unique_address() {
            self.program_unique_address(&device, unique_address)?;
        }

        if self.config.read() {
            self.read(&device, address)?;
        }

        if self.config.disable_bootloader() {
            self.disable_bootloader(&device)?;
        }

        self.transport.reset().at(Stage::Reset)?;
        log::info!("Target reset, leaving bootloader mode");

        Ok(())
    }

    fn connect(&mut self) -> Result<(), Failure> {
        self.transport
            .invoke_bootloader(
                self.config.bootloader_active_high(),
                self.config.bootloader_invert_lines(),
            )
            .at(Stage::Connect)?;

        log::info!("Connecting to target...");
        if !self.transport.synchronize().at(Stage::Connect)? {
            return Err(Failure::new(
                Stage::Connect,
                "Can't connect to target. Ensure boot loader is started. \
                 (no answer on synch sequence)",
            ));
        }

        Ok(())
    }

    fn identify(&mut self) -> Result<DeviceProfile, Failure> {
        let chip_id = self.transport.get_chip_id().at(Stage::Identify)?;
        DeviceProfile::identify(&mut *self.transport, chip_id).at(Stage::Identify)
    }

    fn speed_upgrade(&mut self) -> Result<(), Failure> {
        log::info!("Switching target to the external oscillator");
        if !self
            .transport
            .set_external_oscillator()
            .at(Stage::SpeedUpgrade)?
        {
            return Err(Failure::new(
                Stage::SpeedUpgrade,
                "Can't switch target to external clock source. (Try forcing speed)",
            ));
        }

        self.transport.close();
        log::info!(
            "Opening port {}, baud {}",
            self.config.port(),
            XOSC_BAUDRATE
        );
        self.transport
            .open(self.config.port(), XOSC_BAUDRATE)
            .at(Stage::SpeedUpgrade)?;

        log::info!("Reconnecting to target at higher speed...");
        if !self.transport.synchronize().at(Stage::SpeedUpgrade)? {
            return Err(Failure::new(
                Stage::SpeedUpgrade,
                "Can't connect to target after clock source switch. \
                 (Check external crystal)",
            ));
        }

        Ok(())
    }

    fn erase(&mut self, device: &DeviceProfile) -> Result<(), Failure> {
        log::info!("Performing mass erase");
        if !self.transport.erase_all(device).at(Stage::Erase)? {
            return Err(Failure::new(Stage::Erase, "Erase failed"));
        }
        log::info!("Erase done");

        Ok(())
    }

    fn partial_erase(&mut self, device: &DeviceProfile) -> Result<(), Failure> {
        let range = match self.config.erase_pages() {
            Some(range) => range,
            None => return Ok(()),
        };

        let (start, byte_count) = device.resolve_pages(range).at(Stage::PartialErase)?;
        log::info!(
            "Erasing {} bytes at address {:#X} (from page {}, {})",
            byte_count,
            start,
            device.family.address_to_page(start),
            range
        );
        self.transport
            .erase_range(device, start, byte_count)
            .at(Stage::PartialErase)?;
        log::info!("Partial erase done");

        Ok(())
    }

    fn write(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        image: &FirmwareImage,
    ) -> Result<(), Failure> {
        if address < device.flash_start_addr {
            return Err(Failure::new(
                Stage::Write,
                format!(
                    "Start address {:#X} out of range (base is: {:#X})",
                    address, device.flash_start_addr
                ),
            ));
        }

        let end_addr = u64::from(address) + image.len() as u64;
        let flash_end = u64::from(device.flash_start_addr) + u64::from(device.flash_size);
        if end_addr > flash_end {
            return Err(Failure::new(
                Stage::Write,
                format!(
                    "Binary is too large for flash (end address: {:#X}, flash end: {:#X})",
                    end_addr, flash_end
                ),
            ));
        }

        log::info!("Writing {} bytes at {:#X}", image.len(), address);
        if !self
            .transport
            .write_block(address, image.bytes())
            .at(Stage::Write)?
        {
            return Err(Failure::new(Stage::Write, "Write failed"));
        }
        log::info!("Write done");

        Ok(())
    }

    fn verify(
        &mut self,
        device: &DeviceProfile,
        address: u32,
        image: &FirmwareImage,
    ) -> Result<(), Failure> {
        log::info!("Verifying by comparing CRC32 calculations");

        let crc_local = image.crc32();
        let len = u32::try_from(image.len()).at(Stage::Verify)?;
        let crc_target = self
            .transport
            .crc32(device, address, len)
            .at(Stage::Verify)?;

        if crc_local != crc_target {
            if let Err(e) = self.transport.reset() {
                log::warn!("Couldn't reset target after CRC mismatch: {}", e);
            }

            return Err(Failure::new(
                Stage::Verify,
                format!("Local={:#010x}, Target={:#010x}", crc_local, crc_target),
            ));
        }

        log::info!("Verified (match: {:#010x})", crc_local);

        Ok(())
    }

    fn program_unique_address(
        &mut self,
        device: &DeviceProfile,
        unique_address: u64,
    ) -> Result<(), Failure> {
        log::info!(
            "Setting IEEE address to {}",
            format_ieee_address(unique_address)
        );

        if !self
            .transport
            .write_unique_address(
                device.unique_address_secondary_offset,
                unique_address.to_le_bytes(),
            )
            .at(Stage::ProgramUniqueAddress)?
        {
            return Err(Failure::new(
                Stage::ProgramUniqueAddress,
                "Set address failed",
            ));
        }
        log::info!("Set address done");

        Ok(())
    }

    fn read(&mut self, device: &DeviceProfile, address: u32) -> Result<(), Failure> {
        let output = match self.config.read_output() {
            Some(output) => output,
            None => return Err(Failure::new(Stage::Read, "no output file given")),
        };

        // Round up to a 4-byte boundary
        let length = self
            .config
            .read_length()
            .checked_add(3)
            .map(|len| len & !0x03)
            .ok_or_else(|| Failure::new(Stage::Read, "read length too large"))?;

        log::info!(
            "Reading {} bytes starting at address {:#X} into `{}`",
            length,
            address,
            output.display()
        );

        let mut file = BufWriter::new(File::create(output).at(Stage::Read)?);
        for word_addr in (0..length / 4).map(|i| address.wrapping_add(i * 4)) {
            let word = self
                .transport
                .read_word(device.family, word_addr)
                .at(Stage::Read)?;
            log::trace!(
                "{:#X}: 0x{:02x}{:02x}{:02x}{:02x}",
                word_addr,
                word[0],
                word[1],
                word[2],
                word[3]
            );
            file.write_all(&word).at(Stage::Read)?;
        }
        file.flush().at(Stage::Read)?;
        log::info!("Read done");

        Ok(())
    }

    fn disable_bootloader(&mut self, device: &DeviceProfile) -> Result<(), Failure> {
        log::warn!(
            "Disabling the bootloader at {:#X}, it won't be reachable again",
            device.bootloader_config_address
        );

        if !self
            .transport
            .disable_bootloader(device)
            .at(Stage::DisableBootloader)?
        {
            return Err(Failure::new(
                Stage::DisableBootloader,
                "Disabling the bootloader failed",
            ));
        }

        Ok(())
    }
}

/// Run the flashing sequence on `transport`.
pub fn run<T>(
    transport: &mut T,
    config: &FlashConfig,
    image: Option<&FirmwareImage>,
) -> RunOutcome
where
    T: Transport + ?Sized,
{
    FlashOrchestrator::new(transport, config).run(image)
}

/// Flash `firmware` through the serial port named in `config`.
///
/// The firmware is loaded before the port is opened, a missing or corrupt
/// file never reaches the target.
pub fn flash_firmware(config: &FlashConfig, firmware: Option<&Path>) -> RunOutcome {
    let image = match firmware {
        Some(path) if config.needs_image() => {
            log::info!("Reading data from `{}`", path.display());
            Some(FirmwareImage::load(path).at(Stage::Precondition)?)
        }
        _ => None,
    };

    log::info!("Opening port {}, baud {}", config.port(), config.baudrate());
    let mut transport =
        SerialTransport::open_port(config.port(), config.baudrate()).at(Stage::Connect)?;

    run(&mut transport, config, image.as_ref())
}

#[cfg(test)]
mod test {
    use super::*;

    use std::{fs, io};

    use crate::{constants, device::PageRange, Family};

    /// Chip ID the bootloader of a CC26x2 reports.
    const CC26X2_CHIP_ID: u32 = 0x3102;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Open(String, u32),
        Close,
        InvokeBootloader,
        Synchronize,
        GetChipId,
        SetXosc,
        EraseAll,
        EraseRange(u32, u32),
        WriteBlock(u32, Vec<u8>),
        Crc32(u32, u32),
        ReadWord(u32),
        Reset,
    }

    struct MockTransport {
        calls: Vec<Call>,
        chip_id: u32,
        /// Answers of successive `synchronize` calls, `true` once empty.
        sync: Vec<bool>,
        xosc: bool,
        erase_ok: bool,
        /// Answer of `write_block`, `None` for a transport error.
        write_ok: Option<bool>,
        chip_id_fails: bool,
        crc: u32,
        fail_read_at: Option<u32>,
    }

    impl MockTransport {
        fn new(chip_id: u32, crc: u32) -> Self {
            MockTransport {
                calls: Vec::new(),
                chip_id,
                sync: Vec::new(),
                xosc: true,
                erase_ok: true,
                write_ok: Some(true),
                chip_id_fails: false,
                crc,
                fail_read_at: None,
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }

        /// Calls with the identification reads filtered out.
        fn stages(&self) -> Vec<Call> {
            self.calls
                .iter()
                .filter(|c| !matches!(c, Call::ReadWord(_)))
                .cloned()
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn open(&mut self, port: &str, baudrate: u32) -> io::Result<()> {
            self.calls.push(Call::Open(port.to_owned(), baudrate));
            Ok(())
        }

        fn close(&mut self) {
            self.calls.push(Call::Close);
        }

        fn invoke_bootloader(&mut self, _: bool, _: bool) -> io::Result<()> {
            self.calls.push(Call::InvokeBootloader);
            Ok(())
        }

        fn synchronize(&mut self) -> io::Result<bool> {
            self.calls.push(Call::Synchronize);
            if self.sync.is_empty() {
                Ok(true)
            } else {
                Ok(self.sync.remove(0))
            }
        }

        fn get_chip_id(&mut self) -> io::Result<u32> {
            self.calls.push(Call::GetChipId);
            if self.chip_id_fails {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "ACK bytes not found, timed out",
                ));
            }
            Ok(self.chip_id)
        }

        fn set_external_oscillator(&mut self) -> io::Result<bool> {
            self.calls.push(Call::SetXosc);
            Ok(self.xosc)
        }

        fn erase_all(&mut self, _: &DeviceProfile) -> io::Result<bool> {
            self.calls.push(Call::EraseAll);
            Ok(self.erase_ok)
        }

        fn erase_range(&mut self, _: &DeviceProfile, address: u32, len: u32) -> io::Result<()> {
            self.calls.push(Call::EraseRange(address, len));
            Ok(())
        }

        fn write_block(&mut self, address: u32, data: &[u8]) -> io::Result<bool> {
            self.calls.push(Call::WriteBlock(address, data.to_vec()));
            self.write_ok.ok_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "CMD_SEND_DATA failed")
            })
        }

        fn crc32(&mut self, _: &DeviceProfile, address: u32, len: u32) -> io::Result<u32> {
            self.calls.push(Call::Crc32(address, len));
            Ok(self.crc)
        }

        fn read_word(&mut self, _: Family, address: u32) -> io::Result<[u8; 4]> {
            self.calls.push(Call::ReadWord(address));
            if self.fail_read_at == Some(address) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "COMMAND_MEMORY_READ not acknowledged",
                ));
            }

            Ok(match address {
                // 512 KB
                constants::CC2538_FLASH_CTRL_O_DIECFG0 => [0x40, 0, 0, 0],
                // CC26x2 wafer
                constants::CC26XX_ICEPICK_DEVICE_ID => 0x2BB4_1000u32.to_le_bytes(),
                // 44 sectors of 8 KiB
                constants::CC26XX_FLASH_O_FLASH_SIZE => [0x2C, 0, 0, 0],
                _ => address.to_le_bytes(),
            })
        }

        fn reset(&mut self) -> io::Result<()> {
            self.calls.push(Call::Reset);
            Ok(())
        }
    }

    fn image() -> FirmwareImage {
        FirmwareImage::from_bytes(vec![0x00, 0x01, 0x02, 0x03]).unwrap()
    }

    fn config() -> FlashConfig {
        FlashConfig::dongle("/dev/ttyS0").unwrap()
    }

    #[test]
    fn test_flash_success() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0x8BB9_8613);
        run(&mut transport, &config(), Some(&image())).unwrap();

        assert_eq!(
            transport.stages(),
            vec![
                Call::InvokeBootloader,
                Call::Synchronize,
                Call::GetChipId,
                Call::EraseAll,
                Call::WriteBlock(0, vec![0x00, 0x01, 0x02, 0x03]),
                Call::Crc32(0, 4),
                Call::Reset,
            ]
        );
    }

    #[test]
    fn test_crc_mismatch_resets_once() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0xDEAD_BEEF);
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(
            failure,
            Failure::new(Stage::Verify, "Local=0x8bb98613, Target=0xdeadbeef")
        );
        assert_eq!(transport.count(&Call::Reset), 1);
        assert_eq!(transport.calls.last(), Some(&Call::Reset));
    }

    #[test]
    fn test_no_answer_on_sync() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.sync = vec![false];
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::Connect);
        assert!(failure.message.contains("Ensure boot loader is started"));
        assert_eq!(
            transport.calls,
            vec![Call::InvokeBootloader, Call::Synchronize]
        );
    }

    #[test]
    fn test_speed_upgrade() {
        let mut transport = MockTransport::new(0xB964, 0x8BB9_8613);
        run(&mut transport, &config(), Some(&image())).unwrap();

        assert_eq!(
            transport.stages()[..8],
            [
                Call::InvokeBootloader,
                Call::Synchronize,
                Call::GetChipId,
                Call::SetXosc,
                Call::Close,
                Call::Open("/dev/ttyS0".to_owned(), 1_000_000),
                Call::Synchronize,
                Call::EraseAll,
            ]
        );
        // CC2538 flash starts at 0x00200000.
        assert!(transport.calls.contains(&Call::Crc32(0x0020_0000, 4)));
    }

    #[test]
    fn test_speed_upgrade_resync_fails() {
        let mut transport = MockTransport::new(0xB964, 0x8BB9_8613);
        transport.sync = vec![true, false];
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::SpeedUpgrade);
        assert_eq!(transport.count(&Call::EraseAll), 0);
        assert!(!transport
            .calls
            .iter()
            .any(|c| matches!(c, Call::WriteBlock(..) | Call::Crc32(..))));
    }

    #[test]
    fn test_speed_upgrade_rejected() {
        let mut transport = MockTransport::new(0xB964, 0x8BB9_8613);
        transport.xosc = false;
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::SpeedUpgrade);
        assert!(!transport.calls.contains(&Call::Close));
    }

    #[test]
    fn test_forced_speed_skips_upgrade() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .write(true)
            .force_speed(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(0xB964, 0);
        run(&mut transport, &config, Some(&image())).unwrap();

        assert_eq!(transport.count(&Call::SetXosc), 0);
    }

    #[test]
    fn test_erase_failure() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.erase_ok = false;
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure, Failure::new(Stage::Erase, "Erase failed"));
        assert_eq!(transport.count(&Call::Reset), 0);
    }

    #[test]
    fn test_identify_chip_id_failure() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.chip_id_fails = true;
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::Identify);
        assert_eq!(transport.calls.last(), Some(&Call::GetChipId));
    }

    #[test]
    fn test_identify_flash_size_failure() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.fail_read_at = Some(constants::CC26XX_FLASH_O_FLASH_SIZE);
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::Identify);
        assert_eq!(transport.count(&Call::EraseAll), 0);
        assert_eq!(transport.count(&Call::Reset), 0);
    }

    #[test]
    fn test_write_not_acknowledged() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0x8BB9_8613);
        transport.write_ok = Some(false);
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure, Failure::new(Stage::Write, "Write failed"));
        assert_eq!(transport.count(&Call::Crc32(0, 4)), 0);
        assert_eq!(transport.count(&Call::Reset), 0);
    }

    #[test]
    fn test_write_transport_error() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0x8BB9_8613);
        transport.write_ok = None;
        let failure = run(&mut transport, &config(), Some(&image())).unwrap_err();

        assert_eq!(failure, Failure::new(Stage::Write, "CMD_SEND_DATA failed"));
        assert_eq!(
            transport.calls.last(),
            Some(&Call::WriteBlock(0, vec![0, 1, 2, 3]))
        );
    }

    #[test]
    fn test_unique_address_failure() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .unique_address(0x0012_4B00_0102_0304)
            .disable_bootloader(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.write_ok = Some(false);
        let failure = run(&mut transport, &config, None).unwrap_err();

        assert_eq!(
            failure,
            Failure::new(Stage::ProgramUniqueAddress, "Set address failed")
        );
        // The bootloader is left enabled.
        let disable = Call::WriteBlock(0x57FD8, vec![0, 0, 0, 0]);
        assert!(!transport.calls.contains(&disable));
        assert_eq!(transport.count(&Call::Reset), 0);
    }

    #[test]
    fn test_disable_bootloader_failure() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .disable_bootloader(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.write_ok = None;
        let failure = run(&mut transport, &config, None).unwrap_err();

        assert_eq!(failure.stage, Stage::DisableBootloader);
        assert_eq!(transport.count(&Call::Reset), 0);
    }

    #[test]
    fn test_missing_image() {
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        let failure = run(&mut transport, &config(), None).unwrap_err();

        assert_eq!(failure.stage, Stage::Precondition);
        assert!(transport.calls.is_empty());
    }

    #[test]
    fn test_image_not_needed() {
        let config = FlashConfig::builder("/dev/ttyS0").erase(true).build().unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        run(&mut transport, &config, None).unwrap();

        assert_eq!(
            transport.stages(),
            vec![
                Call::InvokeBootloader,
                Call::Synchronize,
                Call::GetChipId,
                Call::EraseAll,
                Call::Reset,
            ]
        );
    }

    #[test]
    fn test_partial_erase_and_explicit_address() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .erase_pages(PageRange::Pages { first: 2, last: 4 })
            .address(0x4000)
            .write(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        run(&mut transport, &config, Some(&image())).unwrap();

        assert!(transport.calls.contains(&Call::EraseRange(0x4000, 0x4000)));
        assert!(transport
            .calls
            .contains(&Call::WriteBlock(0x4000, vec![0x00, 0x01, 0x02, 0x03])));
    }

    #[test]
    fn test_partial_erase_out_of_flash() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .erase_pages(PageRange::Pages { first: 0, last: 1000 })
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        let failure = run(&mut transport, &config, None).unwrap_err();

        assert_eq!(failure.stage, Stage::PartialErase);
    }

    #[test]
    fn test_image_too_large() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .address(0x57FFE)
            .write(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        let failure = run(&mut transport, &config, Some(&image())).unwrap_err();

        assert_eq!(failure.stage, Stage::Write);
        assert!(!transport.calls.iter().any(|c| matches!(c, Call::WriteBlock(..))));
    }

    #[test]
    fn test_program_unique_address() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .unique_address(0x0012_4B00_0102_0304)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        run(&mut transport, &config, None).unwrap();

        assert!(transport.calls.contains(&Call::WriteBlock(
            0x57FC8,
            vec![0x04, 0x03, 0x02, 0x01, 0x00, 0x4B, 0x12, 0x00]
        )));
    }

    #[test]
    fn test_disable_bootloader_before_reset() {
        let config = FlashConfig::builder("/dev/ttyS0")
            .disable_bootloader(true)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        run(&mut transport, &config, None).unwrap();

        let n = transport.calls.len();
        assert_eq!(
            transport.calls[n - 2..],
            [Call::WriteBlock(0x57FD8, vec![0, 0, 0, 0]), Call::Reset]
        );
    }

    #[test]
    fn test_read_back() {
        let output = std::env::temp_dir()
            .join(format!("cc-dongle-{}-readback.bin", std::process::id()));
        let config = FlashConfig::builder("/dev/ttyS0")
            .address(0x100)
            .read(6, &output)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        run(&mut transport, &config, None).unwrap();

        // 6 bytes are rounded up to two words, the mock answers with the
        // address itself.
        let data = fs::read(&output).unwrap();
        assert_eq!(data, vec![0x00, 0x01, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00]);
        fs::remove_file(output).unwrap();
    }

    #[test]
    fn test_read_error_aborts() {
        let output = std::env::temp_dir()
            .join(format!("cc-dongle-{}-readback-err.bin", std::process::id()));
        let config = FlashConfig::builder("/dev/ttyS0")
            .address(0x100)
            .read(16, &output)
            .build()
            .unwrap();
        let mut transport = MockTransport::new(CC26X2_CHIP_ID, 0);
        transport.fail_read_at = Some(0x104);
        let failure = run(&mut transport, &config, None).unwrap_err();

        assert_eq!(failure.stage, Stage::Read);
        assert_eq!(transport.count(&Call::Reset), 0);
        let _ = fs::remove_file(output);
    }

    #[test]
    fn test_flash_firmware_missing_file() {
        let config = FlashConfig::dongle("/dev/does-not-exist").unwrap();
        let firmware = Path::new("/nonexistent/firmware.bin");
        let failure = flash_firmware(&config, Some(firmware)).unwrap_err();

        assert_eq!(failure.stage, Stage::Precondition);
    }
}
