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

use std::fmt::{self, Display, Formatter};

use crate::constants::CC2538_CHIP_IDS;

/// ICEPICK wafer IDs of the CC13x2/CC26x2 parts (8 KiB flash sectors).
const CC26X2_WAFER_IDS: &[u32] = &[0xBB41, 0xBB77, 0xBB7A];

/// The type of the bootloader.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Family {
    /// CC2538 microcontrollers.
    CC2538,
    /// CC26x0 and CC13x0 microcontrollers.
    CC26X0,
    /// CC26x2 and CC13x2 microcontrollers.
    CC26X2,
}

impl Family {
    /// Whether `chip_id`, as returned by `COMMAND_GET_CHIP_ID`, is a
    /// known CC2538 part.
    ///
    /// Every other value is treated as a CC13xx/CC26xx part, newer silicon
    /// revisions report IDs we don't know about.
    #[inline]
    pub fn is_cc2538_chip_id(chip_id: u32) -> bool {
        CC2538_CHIP_IDS.contains(&chip_id)
    }

    /// Pick the CC13xx/CC26xx variant from the ICEPICK wafer ID.
    pub fn from_wafer_id(wafer_id: u32) -> Family {
        if CC26X2_WAFER_IDS.contains(&wafer_id) {
            Family::CC26X2
        } else {
            Family::CC26X0
        }
    }

    /// Human readable family name.
    pub fn name(&self) -> &'static str {
        match *self {
            Family::CC2538 => "CC2538",
            Family::CC26X0 => "CC13x0/CC26x0",
            Family::CC26X2 => "CC13x2/CC26x2",
        }
    }

    /// Whether the device supports the ranged `COMMAND_ERASE`.
    ///
    /// - **Note:** supported only on [`Family::CC2538`].
    #[inline]
    pub fn supports_erase(&self) -> bool {
        matches!(*self, Family::CC2538)
    }

    /// Whether the device supports `COMMAND_SECTOR_ERASE`.
    ///
    /// - **Note:** supported only on [`Family::CC26X0`] and [`Family::CC26X2`].
    #[inline]
    pub fn supports_sector_erase(&self) -> bool {
        matches!(*self, Family::CC26X0 | Family::CC26X2)
    }

    /// Whether the device supports `COMMAND_BANK_ERASE`.
    ///
    /// - **Note:** supported only on [`Family::CC26X0`] and [`Family::CC26X2`].
    #[inline]
    pub fn supports_bank_erase(&self) -> bool {
        matches!(*self, Family::CC26X0 | Family::CC26X2)
    }

    /// Whether the device supports `COMMAND_SET_XOSC`.
    ///
    /// - **Note:** supported only on [`Family::CC2538`].
    #[inline]
    pub fn supports_set_xosc(&self) -> bool {
        matches!(*self, Family::CC2538)
    }

    /// Sector erase size, in bytes.
    #[inline]
    pub fn sector_size(&self) -> u32 {
        match *self {
            Family::CC2538 => 2048,
            Family::CC26X0 => 4096,
            Family::CC26X2 => 8192,
        }
    }

    /// Flash base address.
    #[inline]
    pub fn flash_base(&self) -> u32 {
        match *self {
            Family::CC2538 => 0x0020_0000,
            Family::CC26X0 | Family::CC26X2 => 0x0000_0000,
        }
    }

    /// Convert a flash address to the flash page.
    #[inline]
    pub fn address_to_page(&self, address: u32) -> u32 {
        (address - self.flash_base()) / self.sector_size()
    }
}

impl Display for Family {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_chip_id_selection() {
        assert!(Family::is_cc2538_chip_id(0xB964));
        assert!(Family::is_cc2538_chip_id(0xB965));
        assert!(!Family::is_cc2538_chip_id(0x3102));
        assert!(!Family::is_cc2538_chip_id(0));
    }

    #[test]
    fn test_wafer_id_selection() {
        assert_eq!(Family::from_wafer_id(0xBB41), Family::CC26X2);
        assert_eq!(Family::from_wafer_id(0xB99A), Family::CC26X0);
        assert_eq!(Family::from_wafer_id(0xFFFF), Family::CC26X0);
    }

    #[test]
    fn test_address_to_page() {
        assert_eq!(Family::CC2538.address_to_page(0x0020_0800), 1);
        assert_eq!(Family::CC26X2.address_to_page(0x4000), 2);
    }
}
