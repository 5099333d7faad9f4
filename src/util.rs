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

//! # Utilities
//!
//! Operations spanning more than one bootloader command: erasing, writing
//! chunked data, each followed by the `COMMAND_GET_STATUS` check the
//! bootloader requires.

use std::{convert::TryFrom, io};

use serial::SerialPort;

use crate::{
    constants::{
        COMMAND_RET_FLASH_FAIL, COMMAND_RET_INVALID_ADR,
        COMMAND_RET_INVALID_CMD, COMMAND_RET_SUCCESS, COMMAND_RET_UNKNOWN_CMD,
        MAX_BYTES_PER_TRANSFER,
    },
    protocol::Bootloader,
    Family,
};

fn check_status<P>(bootloader: &mut Bootloader<P>, what: &str) -> io::Result<()>
where
    P: SerialPort,
{
    let ret = bootloader.get_status()?;
    if ret != COMMAND_RET_SUCCESS {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} failed: `{}` ({:#X})", what, status_code_to_str(ret), ret),
        ));
    }

    Ok(())
}

/// Erase the whole flash.
///
/// Returns `false` if the bootloader reported a failure.
pub fn mass_erase<P>(
    bootloader: &mut Bootloader<P>,
    family: Family,
    flash_size: u32,
) -> io::Result<bool>
where
    P: SerialPort,
{
    if family.supports_bank_erase() {
        bootloader.bank_erase(family)?;
    } else {
        bootloader.erase(family, family.flash_base(), flash_size)?;
    }

    let ret = bootloader.get_status()?;
    if ret != COMMAND_RET_SUCCESS {
        log::error!(
            "Mass erase failed: `{}` ({:#X})",
            status_code_to_str(ret),
            ret
        );
        return Ok(false);
    }

    Ok(true)
}

/// Erase a flash range.
pub fn erase_flash_range<P>(
    bootloader: &mut Bootloader<P>,
    family: Family,
    start_address: u32,
    byte_count: u32,
) -> io::Result<()>
where
    P: SerialPort,
{
    if family.supports_erase() {
        bootloader.erase(family, start_address, byte_count)?;
        check_status(bootloader, "CMD_ERASE")?;
    } else {
        let sector_size = family.sector_size();
        let sector_count = (byte_count + sector_size - 1) / sector_size;

        for i in 0..sector_count {
            let sector_address = start_address + (i * sector_size);
            log::info!("Erasing sector #{}, address: {:#X}", i, sector_address);

            bootloader.sector_erase(family, sector_address)?;
            check_status(bootloader, "CMD_SECTOR_ERASE")?;
        }
    }

    Ok(())
}

/// Write `data` into flash starting at `start_address`.
pub fn write_flash_range<P>(
    bootloader: &mut Bootloader<P>,
    start_address: u32,
    data: &[u8],
) -> io::Result<()>
where
    P: SerialPort,
{
    let size = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "data too large to download")
    })?;

    log::info!(
        "Writing {} bytes at {:#X} in {} chunks",
        data.len(),
        start_address,
        (data.len() + MAX_BYTES_PER_TRANSFER - 1) / MAX_BYTES_PER_TRANSFER
    );

    // Prepare device for flash download, each download command requires to
    // check the latest status to verify it worked.
    bootloader.download(start_address, size)?;
    check_status(bootloader, "CMD_DOWNLOAD")?;

    for (chunk_index, chunk) in data.chunks(MAX_BYTES_PER_TRANSFER).enumerate() {
        let chunk_addr =
            start_address + (chunk_index * MAX_BYTES_PER_TRANSFER) as u32;
        log::debug!(
            "Writing chunk #{} ({} B) at address {:#X}",
            chunk_index,
            chunk.len(),
            chunk_addr
        );

        if !bootloader.send_data(&chunk)? {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "Chunk #{} of size {} not acknowledged at address {:#X}",
                    chunk_index,
                    chunk.len(),
                    chunk_addr,
                ),
            ));
        }

        check_status(bootloader, "CMD_SEND_DATA")?;
    }

    Ok(())
}

pub fn status_code_to_str(ret: u8) -> &'static str {
    match ret {
        COMMAND_RET_SUCCESS => "COMMAND_RET_SUCCESS",
        COMMAND_RET_UNKNOWN_CMD => "COMMAND_RET_UNKNOWN_CMD",
        COMMAND_RET_INVALID_CMD => "COMMAND_RET_INVALID_CMD",
        COMMAND_RET_INVALID_ADR => "COMMAND_RET_INVALID_ADR",
        COMMAND_RET_FLASH_FAIL => "COMMAND_RET_FLASH_FAIL",
        _ => "Unknown",
    }
}
