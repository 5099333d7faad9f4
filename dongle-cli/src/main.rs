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
    env,
    path::Path,
    sync::atomic::Ordering,
};

use anyhow::{Context, Result};
use cc_dongle::{
    boot::GENERIC_DEVICE,
    config::{parse_ieee_address, DEFAULT_READ_LENGTH},
    BootSequencer, BootState, FlashConfig, PageRange, PlatformProfile,
};
use clap::{
    crate_authors, crate_version, App, AppSettings, Arg, ArgMatches,
    SubCommand,
};
use log::LevelFilter;

const LOG_ENV: &str = "DONGLE_LOG";

fn main() -> Result<()> {
    let args = cli().get_matches_safe()?;

    // -v may be given before or after the subcommand.
    let verbosity = match args.subcommand() {
        (_, Some(m)) => m
            .occurrences_of("verbose")
            .max(args.occurrences_of("verbose")),
        _ => args.occurrences_of("verbose"),
    };
    init_logger(verbosity);

    match args.subcommand() {
        ("boot", Some(m)) => boot(m),
        ("flash", Some(m)) => flash(m),
        _ => {
            println!("Error: Sub-command required");
            println!("{}", args.usage());
            Ok(())
        }
    }
}

fn init_logger(verbosity: u64) {
    #[cfg(feature = "pretty-env-logger")]
    let mut builder = pretty_env_logger::formatted_builder();
    #[cfg(not(feature = "pretty-env-logger"))]
    let mut builder = env_logger::Builder::new();

    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = env::var(LOG_ENV) {
        builder.parse_filters(&filters);
    }

    match verbosity {
        0 => (),
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }

    builder.init();
}

/// Boot subcommand entry point.
fn boot(matches: &ArgMatches<'_>) -> Result<()> {
    let mut platform = PlatformProfile::detect();
    if matches.is_present("simulate-gpio") {
        platform = platform.simulated();
    }

    let sequencer = BootSequencer::new(platform);
    log::info!("Radio device: `{}`", sequencer.device().display());

    let interrupted = sequencer.interrupt_flag();
    ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
        .context("Couldn't install the interrupt handler")?;

    let firmware = matches.value_of("firmware").map(Path::new);
    match sequencer.boot(firmware)? {
        BootState::SkipGpio | BootState::Interrupted => (),
        BootState::ReturnToRun => log::info!("Radio running"),
    }

    Ok(())
}

/// Flash subcommand entry point.
fn flash(matches: &ArgMatches<'_>) -> Result<()> {
    let config = flash_config(matches)?;
    let firmware = matches.value_of("FIRMWARE").map(Path::new);

    cc_dongle::flash_firmware(&config, firmware)?;

    Ok(())
}

fn flash_config(matches: &ArgMatches<'_>) -> Result<FlashConfig> {
    let port = matches.value_of("port").unwrap_or(GENERIC_DEVICE);
    let mut builder = FlashConfig::builder(port)
        .erase(true)
        .write(true)
        .verify(true)
        .force_speed(matches.is_present("force-speed"))
        .disable_bootloader(matches.is_present("disable-bootloader"))
        .bootloader_active_high(matches.is_present("bootloader-active-high"))
        .bootloader_invert_lines(matches.is_present("bootloader-invert-lines"));

    if let Some(baudrate) = matches.value_of("baudrate") {
        builder = builder.baudrate(
            baudrate
                .parse()
                .with_context(|| format!("Invalid baudrate `{}`", baudrate))?,
        );
    }

    if let Some(address) = matches.value_of("address") {
        builder = builder.address(parse_number(address).with_context(
            || format!("Invalid flash address `{}`", address),
        )?);
    }

    if let Some(pages) = matches.value_of("erase-page") {
        let range = pages
            .parse::<PageRange>()
            .with_context(|| format!("Invalid page range `{}`", pages))?;
        builder = builder.erase(false).erase_pages(range);
    }

    if let Some(address) = matches.value_of("ieee-address") {
        builder = builder.unique_address(parse_ieee_address(address)?);
    }

    if let Some(output) = matches.value_of("read-to") {
        let length = match matches.value_of("read-len") {
            Some(len) => parse_number(len)
                .with_context(|| format!("Invalid read length `{}`", len))?,
            None => DEFAULT_READ_LENGTH,
        };
        builder = builder.read(length, output);
    }

    Ok(builder.build()?)
}

/// Parse a `0x` prefixed hexadecimal or a decimal number.
fn parse_number(s: &str) -> Result<u32> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };

    Ok(value)
}

fn cli() -> App<'static, 'static> {
    App::new("Dongle flasher")
        .usage("dongle [OPTIONS] <SUBCOMMAND>")
        .setting(AppSettings::ColoredHelp)
        .version(crate_version!())
        .author(crate_authors!())
        .about("Boots and flashes CC2538/CC26xx radios through their serial bootloader")
        .arg(
            opt("verbose", "Use verbose output: -v (debug), -vv (trace)")
                .short("v")
                .multiple(true)
                .global(true)
        )
        .subcommand(
            SubCommand::with_name("boot")
                .about("Put the on-board radio in run mode, flashing it first if a firmware is given")
                .setting(AppSettings::ColoredHelp)
                .arg(
                    opt("firmware", "Firmware to flash before running")
                        .short("f")
                        .takes_value(true)
                )
                .arg(
                    opt(
                        "simulate-gpio",
                        "Only log the bootloader and reset line changes"
                    )
                )
        )
        .subcommand(
            SubCommand::with_name("flash")
                .about("Flash a firmware through a serial port, the radio must already be in bootloader mode")
                .setting(AppSettings::ColoredHelp)
                .arg(
                    Arg::with_name("FIRMWARE")
                        .required(true)
                        .takes_value(true)
                        .help("Binary or Intel HEX file to flash")
                )
                .arg(
                    opt("port", "Serial port to use")
                        .short("p")
                        .takes_value(true)
                        .default_value(GENERIC_DEVICE)
                )
                .arg(
                    opt("baudrate", "Serial port baudrate")
                        .short("b")
                        .takes_value(true)
                )
                .arg(
                    opt(
                        "address",
                        "Address in memory where the firmware is flashed, defaults to the flash start"
                    )
                        .short("a")
                        .takes_value(true)
                )
                .arg(
                    opt(
                        "erase-page",
                        "Erase only the given pages instead of the whole flash: `first,last` page numbers or `0xstart,0xend` addresses"
                    )
                        .takes_value(true)
                )
                .arg(
                    opt(
                        "ieee-address",
                        "Program the secondary IEEE address, e.g. 00:12:4b:00:01:02:03:04"
                    )
                        .short("i")
                        .takes_value(true)
                )
                .arg(
                    opt("read-to", "Read flash back into this file after flashing")
                        .takes_value(true)
                )
                .arg(
                    opt("read-len", "Number of bytes to read back")
                        .takes_value(true)
                        .requires("read-to")
                )
                .arg(
                    opt(
                        "force-speed",
                        "Don't switch to the external oscillator baudrate on CC2538"
                    )
                )
                .arg(
                    opt(
                        "disable-bootloader",
                        "Disable the bootloader backdoor. Warning: the bootloader can't be invoked afterwards"
                    )
                )
                .arg(
                    opt(
                        "bootloader-active-high",
                        "The bootloader pin is active high when invoking it through DTR/RTS"
                    )
                )
                .arg(
                    opt(
                        "bootloader-invert-lines",
                        "Use RTS for the bootloader pin and DTR for !RESET"
                    )
                )
        )
}

fn opt(name: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name).long(name).help(help)
}
