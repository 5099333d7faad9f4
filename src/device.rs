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

//! # Device profiles
//!
//! Flash geometry and the variant dependent addresses of the connected
//! chip, resolved once after the chip ID has been read.

use std::{fmt, io, str::FromStr};

use crate::{constants, transport::Transport, Family};

/// Everything about the target the flashing sequence needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub family: Family,
    pub chip_id: u32,
    /// First flash address, the default write address.
    pub flash_start_addr: u32,
    /// Flash size in bytes.
    pub flash_size: u32,
    /// Erase page (sector) size in bytes.
    pub page_size: u32,
    /// Whether `COMMAND_SET_XOSC` can be used to raise the baudrate.
    pub supports_external_oscillator: bool,
    /// Where the secondary IEEE address is stored.
    pub unique_address_secondary_offset: u32,
    /// Address of the word holding the bootloader enable bits.
    pub bootloader_config_address: u32,
    /// Value that disables the bootloader once written.
    pub bootloader_disable_value: u32,
}

impl DeviceProfile {
    /// Build the profile of a `family` device with `flash_size` bytes of
    /// flash.
    pub fn new(family: Family, chip_id: u32, flash_size: u32) -> DeviceProfile {
        let flash_start_addr = family.flash_base();
        let flash_end = flash_start_addr + flash_size;

        let (unique_address_secondary_offset, bootloader_config_address, bootloader_disable_value) =
            match family {
                Family::CC2538 => (
                    constants::CC2538_IEEE_ADDRESS_SECONDARY,
                    flash_end - constants::CC2538_BL_CONFIG_FROM_END,
                    constants::CC2538_BOOTLOADER_DISABLE,
                ),
                Family::CC26X0 | Family::CC26X2 => {
                    let ccfg = flash_end - constants::CCFG_SIZE;
                    (
                        ccfg + constants::CCFG_O_IEEE_MAC_0,
                        ccfg + constants::CCFG_O_BL_CONFIG,
                        constants::CC26XX_BOOTLOADER_DISABLE,
                    )
                }
            };

        DeviceProfile {
            family,
            chip_id,
            flash_start_addr,
            flash_size,
            page_size: family.sector_size(),
            supports_external_oscillator: family.supports_set_xosc(),
            unique_address_secondary_offset,
            bootloader_config_address,
            bootloader_disable_value,
        }
    }

    /// Select the variant matching `chip_id` and probe its flash size.
    ///
    /// Unknown chip IDs are handled as CC13xx/CC26xx parts.
    pub fn identify<T>(transport: &mut T, chip_id: u32) -> io::Result<DeviceProfile>
    where
        T: Transport + ?Sized,
    {
        let (family, flash_size) = if Family::is_cc2538_chip_id(chip_id) {
            log::info!("Target id {:#X}, CC2538", chip_id);
            let diecfg0 = transport
                .read_word(Family::CC2538, constants::CC2538_FLASH_CTRL_O_DIECFG0)?;
            (Family::CC2538, cc2538_flash_size(diecfg0))
        } else {
            log::warn!("Unrecognized chip ID {:#X}, trying CC13xx/CC26xx", chip_id);
            let device_id = transport
                .read_word(Family::CC26X0, constants::CC26XX_ICEPICK_DEVICE_ID)?;
            let family = Family::from_wafer_id(wafer_id(device_id));
            let flash_size_reg = transport
                .read_word(family, constants::CC26XX_FLASH_O_FLASH_SIZE)?;
            (family, cc26xx_flash_size(family, flash_size_reg))
        };

        if flash_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "device reports an empty flash",
            ));
        }

        let profile = DeviceProfile::new(family, chip_id, flash_size);
        log::info!(
            "{} with {} KiB of flash at {:#X}",
            profile.family,
            profile.flash_size / 1024,
            profile.flash_start_addr
        );

        Ok(profile)
    }

    /// Resolve `range` to a page aligned `(start address, byte count)`
    /// pair inside the flash.
    pub fn resolve_pages(&self, range: &PageRange) -> Result<(u32, u32), PageRangeError> {
        let (start, end) = match *range {
            PageRange::Pages { first, last } => {
                let addr = |page: u32| {
                    page.checked_mul(self.page_size)
                        .and_then(|offset| offset.checked_add(self.flash_start_addr))
                        .ok_or(PageRangeError::OutOfFlash)
                };
                (addr(first)?, addr(last)?)
            }
            PageRange::Addresses { start, end } => {
                if start % self.page_size != 0 || end % self.page_size != 0 {
                    return Err(PageRangeError::Unaligned(self.page_size));
                }
                (start, end)
            }
        };

        if start >= end {
            return Err(PageRangeError::Empty);
        }

        if start < self.flash_start_addr
            || u64::from(end) > u64::from(self.flash_start_addr) + u64::from(self.flash_size)
        {
            return Err(PageRangeError::OutOfFlash);
        }

        Ok((start, end - start))
    }
}

/// Wafer ID field of the ICEPICK device identification register.
fn wafer_id(device_id: [u8; 4]) -> u32 {
    (u32::from_le_bytes(device_id) >> 12) & 0xFFFF
}

/// Decode FLASH_CTRL.DIECFG0.
fn cc2538_flash_size(diecfg0: [u8; 4]) -> u32 {
    let flash_ctrl = u32::from_le_bytes(diecfg0);
    match (flash_ctrl >> 4) & 0x07 {
        1 => 0x20000, // 128 KB
        2 => 0x40000, // 256 KB
        3 => 0x60000, // 384 KB
        4 => 0x80000, // 512 KB
        _ => 0x10000, // 64 KB, all invalid values are interpreted as 64 KB
    }
}

/// Decode FLASH.FLASH_SIZE, the number of sectors.
fn cc26xx_flash_size(family: Family, flash_size: [u8; 4]) -> u32 {
    (u32::from_le_bytes(flash_size) & 0xFF) * family.sector_size()
}

/// A range of flash pages to erase, the end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRange {
    /// Page numbers, counted from the start of flash.
    Pages { first: u32, last: u32 },
    /// Page aligned addresses.
    Addresses { start: u32, end: u32 },
}

impl fmt::Display for PageRange {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PageRange::Pages { first, last } => write!(fmt, "pages {}..{}", first, last),
            PageRange::Addresses { start, end } => write!(fmt, "{:#X}..{:#X}", start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageRangeError {
    #[error("page range must look like `first,last` or `0xSTART,0xEND`")]
    Syntax,
    #[error("page range is empty")]
    Empty,
    #[error("addresses must be aligned to the {0} bytes page size")]
    Unaligned(u32),
    #[error("page range is outside of the flash")]
    OutOfFlash,
}

impl FromStr for PageRange {
    type Err = PageRangeError;

    /// Both ends decimal for page numbers, both `0x` prefixed for
    /// addresses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let (a, b) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => (a, b),
            _ => return Err(PageRangeError::Syntax),
        };

        let hex = |v: &str| {
            v.strip_prefix("0x")
                .or_else(|| v.strip_prefix("0X"))
                .map(|digits| u32::from_str_radix(digits, 16))
        };

        match (hex(a), hex(b)) {
            (Some(Ok(start)), Some(Ok(end))) => Ok(PageRange::Addresses { start, end }),
            (None, None) => {
                let first = a.parse().map_err(|_| PageRangeError::Syntax)?;
                let last = b.parse().map_err(|_| PageRangeError::Syntax)?;
                Ok(PageRange::Pages { first, last })
            }
            _ => Err(PageRangeError::Syntax),
        }
    }
}
