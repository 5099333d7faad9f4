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

use std::fmt::{self, Display, Formatter};

/// A step of the flashing sequence.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Stage {
    /// Checks done before talking to the target: configuration, firmware
    /// file.
    Precondition,
    Connect,
    Identify,
    SpeedUpgrade,
    Erase,
    PartialErase,
    Write,
    Verify,
    ProgramUniqueAddress,
    Read,
    DisableBootloader,
    Reset,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match *self {
            Stage::Precondition => "precondition",
            Stage::Connect => "connect",
            Stage::Identify => "identify",
            Stage::SpeedUpgrade => "speed upgrade",
            Stage::Erase => "erase",
            Stage::PartialErase => "partial erase",
            Stage::Write => "write",
            Stage::Verify => "verify",
            Stage::ProgramUniqueAddress => "program unique address",
            Stage::Read => "read",
            Stage::DisableBootloader => "disable bootloader",
            Stage::Reset => "reset",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Why a flashing run stopped.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{stage} failed: {message}")]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

impl Failure {
    pub fn new<M: Into<String>>(stage: Stage, message: M) -> Failure {
        Failure {
            stage,
            message: message.into(),
        }
    }
}

/// Terminal result of a flashing run.
pub type RunOutcome = Result<(), Failure>;

/// Attach the stage a fallible operation belongs to.
pub trait StageContext<T> {
    fn at(self, stage: Stage) -> Result<T, Failure>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Display,
{
    fn at(self, stage: Stage) -> Result<T, Failure> {
        self.map_err(|e| Failure::new(stage, e.to_string()))
    }
}
