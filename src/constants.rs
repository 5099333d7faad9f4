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

pub const CMD_PING: u8                  = 0x20;
pub const CMD_DOWNLOAD: u8              = 0x21;
pub const CMD_GET_STATUS: u8            = 0x23;
pub const CMD_SEND_DATA: u8             = 0x24;
pub const CMD_RESET: u8                 = 0x25;
pub const CC2538_CMD_ERASE: u8          = 0x26;
pub const CC26XX_CMD_SECTOR_ERASE: u8   = 0x26;
pub const CMD_CRC32: u8                 = 0x27;
pub const CMD_GET_CHIP_ID: u8           = 0x28;
pub const CC2538_CMD_SET_XOSC: u8       = 0x29;
pub const CMD_MEMORY_READ: u8           = 0x2A;
pub const CC26XX_CMD_BANK_ERASE: u8     = 0x2C;

/// ACK byte
pub const ACK: u8                       = 0xCC;
/// NACK byte
pub const NACK: u8                      = 0x33;

/// Auto baud synchronization byte, sent twice.
pub const SYNC_BYTE: u8                 = 0x55;

/// Maximum bytes per transfer, on [`CMD_SEND_DATA`] commands.
pub const MAX_BYTES_PER_TRANSFER: usize = 252;

pub const COMMAND_RET_SUCCESS: u8       = 0x40;
pub const COMMAND_RET_UNKNOWN_CMD: u8   = 0x41;
pub const COMMAND_RET_INVALID_CMD: u8   = 0x42;
pub const COMMAND_RET_INVALID_ADR: u8   = 0x43;
pub const COMMAND_RET_FLASH_FAIL: u8    = 0x44;

/// Chip IDs reported by `COMMAND_GET_CHIP_ID` on CC2538 silicon.
pub const CC2538_CHIP_IDS: &[u32]       = &[0xB964, 0xB965];

/// Baudrate used after switching the CC2538 to the external oscillator.
pub const XOSC_BAUDRATE: u32            = 1_000_000;

/// FLASH_CTRL.DIECFG0 register on CC2538
pub const CC2538_FLASH_CTRL_O_DIECFG0: u32 = 0x400D_3014;
/// FLASH.FLASH_SIZE register on CC13xx/CC26xx
pub const CC26XX_FLASH_O_FLASH_SIZE: u32   = 0x4003_002C;
/// ICEPICK device identification register on CC13xx/CC26xx
pub const CC26XX_ICEPICK_DEVICE_ID: u32    = 0x5000_1318;

/// CC26xx/CC13xx CCFG size in bytes.
pub const CCFG_SIZE: u32                = 88;
/// Offset of the secondary IEEE address inside the CCFG.
pub const CCFG_O_IEEE_MAC_0: u32        = 0x20;
/// Offset of the BL_CONFIG word inside the CCFG.
pub const CCFG_O_BL_CONFIG: u32         = 0x30;

/// Secondary IEEE address location on CC2538.
pub const CC2538_IEEE_ADDRESS_SECONDARY: u32 = 0x0027_FFCC;
/// Distance from the end of flash to the CC2538 bootloader backdoor word.
pub const CC2538_BL_CONFIG_FROM_END: u32     = 0x2C;

pub const CC2538_BOOTLOADER_DISABLE: u32 = 0xEFFF_FFFF;
pub const CC26XX_BOOTLOADER_DISABLE: u32 = 0x0000_0000;
