//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Zard Lobby Server
//!
//! The `zard` binary wires the session layer to the lobby command layer:
//!
//! ```text
//! main ── Settings (TOML file + CLI overrides)
//!   ↓
//! tokio runtime (worker pool)
//!   ↓
//! SessionServer<Mode> ── Lobby ── Game
//! ```

mod config;
mod error;
mod game;
mod lobby;

pub use config::{DEFAULT_CONFIG_PATH, GREETING, LogLevel, Settings};
pub use error::{Result, ServerError};
pub use game::{Game, Player, Role};
pub use lobby::{Lobby, Mode};
