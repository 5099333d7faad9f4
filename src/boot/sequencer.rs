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
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use super::{
    mode::{Level, Line, ModeController, ModeError},
    platform::{PlatformProfile, GENERIC_DEVICE},
};
use crate::{
    config::FlashConfig,
    error::{Failure, RunOutcome, Stage, StageContext},
    flasher,
};

/// How long each line level is held before the next change.
pub const SETTLE_TIME: Duration = Duration::from_millis(300);

/// Where a boot sequence ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BootState {
    /// The radio sits behind a USB serial adapter, nothing to drive.
    SkipGpio,
    /// The radio was released from reset into its application.
    ReturnToRun,
    /// The operator asked to stop before the sequence finished.
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error(transparent)]
    Flash(#[from] Failure),
    #[error("interrupted")]
    Interrupted,
}

/// Drives the radio into its bootloader, flashes it, and puts it back
/// into its application.
#[derive(Debug)]
pub struct BootSequencer {
    platform: PlatformProfile,
    device: PathBuf,
    settle_time: Duration,
    interrupted: Arc<AtomicBool>,
}

impl BootSequencer {
    /// Sequencer for the serial device resolved on `platform`.
    pub fn new(platform: PlatformProfile) -> BootSequencer {
        let device = platform.resolve_device();
        BootSequencer::with_device(platform, device)
    }

    pub fn with_device<P>(platform: PlatformProfile, device: P) -> BootSequencer
    where
        P: Into<PathBuf>,
    {
        BootSequencer {
            platform,
            device: device.into(),
            settle_time: SETTLE_TIME,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settle_time(mut self, settle_time: Duration) -> BootSequencer {
        self.settle_time = settle_time;
        self
    }

    /// Flag checked before the lines leave their idle level and again
    /// before flashing. Once a line went low the radio is always returned
    /// to run mode, and a flash that started runs to completion.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn skips_gpio(&self) -> bool {
        self.device == Path::new(GENERIC_DEVICE)
    }

    /// Run the sequence with the platform's own mode controller, flashing
    /// `firmware` through the serial bootloader when given.
    pub fn boot(&self, firmware: Option<&Path>) -> Result<BootState, BootError> {
        if self.skips_gpio() {
            return self.skip(firmware);
        }

        let mut mode = self.platform.mode_controller()?;
        self.boot_with(mode.as_mut(), firmware, flash_dongle)
    }

    /// Run the sequence on `mode`, calling `flash` with the device and
    /// firmware paths while the radio sits in its bootloader.
    pub fn boot_with<M, F>(
        &self,
        mode: &mut M,
        firmware: Option<&Path>,
        flash: F,
    ) -> Result<BootState, BootError>
    where
        M: ModeController + ?Sized,
        F: FnOnce(&Path, &Path) -> RunOutcome,
    {
        if self.skips_gpio() {
            return self.skip(firmware);
        }

        match self.sequence(mode, firmware, flash) {
            Err(BootError::Interrupted) => {
                log::debug!("Boot sequence interrupted");
                Ok(BootState::Interrupted)
            }
            other => other,
        }
    }

    fn skip(&self, firmware: Option<&Path>) -> Result<BootState, BootError> {
        log::info!(
            "Radio on `{}`, no mode switching needed",
            self.device.display()
        );
        if let Some(firmware) = firmware {
            log::warn!(
                "Not flashing `{}` through a USB adapter, use the `flash` command",
                firmware.display()
            );
        }

        Ok(BootState::SkipGpio)
    }

    fn sequence<M, F>(
        &self,
        mode: &mut M,
        firmware: Option<&Path>,
        flash: F,
    ) -> Result<BootState, BootError>
    where
        M: ModeController + ?Sized,
        F: FnOnce(&Path, &Path) -> RunOutcome,
    {
        mode.setup()?;
        self.check_interrupt()?;

        // From here on a line may be low, the sequence always ends with
        // the radio released into run mode.
        let mut interrupted = false;
        let outcome = match firmware {
            Some(firmware) => {
                log::info!("Entering bootloader on `{}`", self.device.display());
                mode.set_both(Level::Low, Level::Low)?;
                self.settle();
                mode.set(Line::Reset, Level::High)?;
                self.settle();

                interrupted = self.interrupted.load(Ordering::SeqCst);
                if interrupted {
                    Ok(())
                } else {
                    flash(&self.device, firmware)
                }
            }
            None => Ok(()),
        };

        log::info!("Returning to run mode");
        mode.set_both(Level::High, Level::Low)?;
        self.settle();
        mode.set(Line::Reset, Level::High)?;
        self.settle();

        outcome?;
        if interrupted {
            return Err(BootError::Interrupted);
        }

        Ok(BootState::ReturnToRun)
    }

    fn check_interrupt(&self) -> Result<(), BootError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(BootError::Interrupted);
        }

        Ok(())
    }

    fn settle(&self) {
        if self.settle_time > Duration::from_millis(0) {
            thread::sleep(self.settle_time);
        }
    }
}

fn flash_dongle(device: &Path, firmware: &Path) -> RunOutcome {
    let config = FlashConfig::dongle(device.to_string_lossy())
        .at(Stage::Precondition)?;
    flasher::flash_firmware(&config, Some(firmware))
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::boot::{Board, SimulatedModeController};

    const RETURN_TO_RUN: [(Line, Level); 3] = [
        (Line::Bootloader, Level::High),
        (Line::Reset, Level::Low),
        (Line::Reset, Level::High),
    ];

    fn pi3() -> BootSequencer {
        BootSequencer::with_device(
            PlatformProfile::for_board(Board::RaspberryPi3B),
            "/dev/ttyS0",
        )
        .settle_time(Duration::from_millis(0))
    }

    fn setup_levels() -> Vec<(Line, Level)> {
        vec![(Line::Reset, Level::High), (Line::Bootloader, Level::High)]
    }

    #[test]
    fn test_run_without_firmware() {
        let mut mode = SimulatedModeController::new();
        let state = pi3()
            .boot_with(&mut mode, None, |_, _| panic!("nothing to flash"))
            .unwrap();

        assert_eq!(state, BootState::ReturnToRun);
        let mut expected = setup_levels();
        expected.extend_from_slice(&RETURN_TO_RUN);
        assert_eq!(mode.history(), expected.as_slice());
    }

    #[test]
    fn test_flash_then_run() {
        let mut mode = SimulatedModeController::new();
        let mut flashed = None;
        let state = pi3()
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |device, firmware| {
                flashed = Some((device.to_owned(), firmware.to_owned()));
                Ok(())
            })
            .unwrap();

        assert_eq!(state, BootState::ReturnToRun);
        assert_eq!(
            flashed,
            Some((PathBuf::from("/dev/ttyS0"), PathBuf::from("fw.bin")))
        );

        let mut expected = setup_levels();
        expected.extend_from_slice(&[
            (Line::Bootloader, Level::Low),
            (Line::Reset, Level::Low),
            (Line::Reset, Level::High),
        ]);
        expected.extend_from_slice(&RETURN_TO_RUN);
        assert_eq!(mode.history(), expected.as_slice());
    }

    #[test]
    fn test_flash_failure_still_returns_to_run() {
        let mut mode = SimulatedModeController::new();
        let err = pi3()
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                Err(Failure::new(Stage::Connect, "no answer"))
            })
            .unwrap_err();

        match err {
            BootError::Flash(failure) => assert_eq!(failure.stage, Stage::Connect),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(&mode.history()[mode.history().len() - 3..], &RETURN_TO_RUN);
    }

    #[test]
    fn test_generic_device_skips_gpio() {
        let sequencer = BootSequencer::with_device(
            PlatformProfile::for_board(Board::RaspberryPi3B),
            GENERIC_DEVICE,
        );
        let mut mode = SimulatedModeController::new();
        let state = sequencer
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                panic!("no flashing through the adapter")
            })
            .unwrap();

        assert_eq!(state, BootState::SkipGpio);
        assert!(mode.history().is_empty());
    }

    /// Raises the interrupt flag as soon as the radio is put in reset.
    struct InterruptOnReset {
        inner: SimulatedModeController,
        flag: Arc<AtomicBool>,
    }

    impl ModeController for InterruptOnReset {
        fn setup(&mut self) -> Result<(), ModeError> {
            self.inner.setup()
        }

        fn set(&mut self, line: Line, level: Level) -> Result<(), ModeError> {
            if (line, level) == (Line::Reset, Level::Low) {
                self.flag.store(true, Ordering::SeqCst);
            }
            self.inner.set(line, level)
        }
    }

    #[test]
    fn test_interrupt_while_entering_bootloader() {
        let sequencer = pi3();
        let mut mode = InterruptOnReset {
            inner: SimulatedModeController::new(),
            flag: sequencer.interrupt_flag(),
        };
        let state = sequencer
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                panic!("interrupted before flashing")
            })
            .unwrap();

        assert_eq!(state, BootState::Interrupted);
        let history = mode.inner.history();
        assert_eq!(&history[history.len() - 3..], &RETURN_TO_RUN);
    }

    #[test]
    fn test_interrupt_during_flash_keeps_failure() {
        let sequencer = pi3();
        let flag = sequencer.interrupt_flag();

        let mut mode = SimulatedModeController::new();
        let err = sequencer
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                flag.store(true, Ordering::SeqCst);
                Err(Failure::new(Stage::Verify, "Local=0x1, Target=0x2"))
            })
            .unwrap_err();

        match err {
            BootError::Flash(failure) => assert_eq!(failure.stage, Stage::Verify),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(&mode.history()[mode.history().len() - 3..], &RETURN_TO_RUN);
    }

    #[test]
    fn test_interrupt_during_successful_flash() {
        let sequencer = pi3();
        let flag = sequencer.interrupt_flag();

        let mut mode = SimulatedModeController::new();
        let state = sequencer
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(state, BootState::ReturnToRun);
        assert_eq!(&mode.history()[mode.history().len() - 3..], &RETURN_TO_RUN);
    }

    #[test]
    fn test_interrupt_aborts_silently() {
        let sequencer = pi3();
        sequencer.interrupt_flag().store(true, Ordering::SeqCst);

        let mut mode = SimulatedModeController::new();
        let state = sequencer
            .boot_with(&mut mode, Some(Path::new("fw.bin")), |_, _| {
                panic!("interrupted before flashing")
            })
            .unwrap();

        assert_eq!(state, BootState::Interrupted);
        assert_eq!(mode.history(), setup_levels().as_slice());
    }
}
