// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod history;
mod turn;

pub use history::project_history;
pub use turn::{Loop, LoopError, TurnInput, TurnOutput};
