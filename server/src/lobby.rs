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

//! Lobby command layer
//!
//! Every received message is one command. What a command means depends on
//! the session's [`Mode`]:
//!
//! | mode            | commands                                  |
//! |-----------------|-------------------------------------------|
//! | `connected`     | `help`, `user <id>`                       |
//! | `lobby`         | `help`, `game create <id>`, `game list`   |
//! | `creating_game` | `help`                                    |
//!
//! Empty commands are ignored. Unknown commands are answered with `EINVAL`
//! and failed commands with `ERROR`.

use crate::game::Game;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use zard_codec::Message;
use zard_service::{Result, ServiceError, Session, SessionHandler, SessionRegistry};

const OK: &str = "OK\n";
const ERROR: &str = "ERROR\n";
const UNKNOWN_COMMAND: &str = "EINVAL\nUnknown command.\n";

const CMD_USER: &str = "user ";
const CMD_GAME_CREATE: &str = "game create ";
const CMD_GAME_LIST: &str = "game list";

/// Session mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Connected but not logged in
    #[default]
    Connected,
    /// Logged in
    Lobby,
    /// Setting up a game as its game master
    CreatingGame,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Connected => write!(f, "connected"),
            Mode::Lobby => write!(f, "lobby"),
            Mode::CreatingGame => write!(f, "creating_game"),
        }
    }
}

/// The lobby
pub struct Lobby {
    registry: Arc<SessionRegistry<Mode>>,
    games: RwLock<Vec<Game>>,
}

impl Lobby {
    /// Create a lobby logging users in to `registry`.
    pub fn new(registry: Arc<SessionRegistry<Mode>>) -> Self {
        Self {
            registry,
            games: RwLock::new(Vec::new()),
        }
    }

    /// Ids of all games, in creation order.
    pub fn game_list(&self) -> Vec<String> {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|game| game.id().to_string())
            .collect()
    }

    fn execute_connected(&self, session: &Arc<Session<Mode>>, command: &str) -> Result<()> {
        if command.is_empty() {
            // Nothing to do
        } else if command == "help" {
            session.send("OK\nNo help available.\n");
        } else if let Some(id) = command.strip_prefix(CMD_USER) {
            self.user(session, id)?;
        } else {
            session.send(UNKNOWN_COMMAND);
        }
        Ok(())
    }

    fn execute_lobby(&self, session: &Arc<Session<Mode>>, command: &str) -> Result<()> {
        if command.is_empty() {
            // Nothing to do
        } else if command == "help" {
            session.send("OK\nNo help available.\n");
        } else if let Some(id) = command.strip_prefix(CMD_GAME_CREATE) {
            self.game_create(session, id)?;
        } else if command == CMD_GAME_LIST {
            let mut reply = String::from(OK);
            for id in self.game_list() {
                reply.push_str(&id);
                reply.push('\n');
            }
            session.send(reply);
        } else {
            session.send(UNKNOWN_COMMAND);
        }
        Ok(())
    }

    fn execute_creating_game(&self, session: &Arc<Session<Mode>>, command: &str) -> Result<()> {
        if command.is_empty() {
            // Nothing to do
        } else if command == "help" {
            session.send("OK\nStill no help available.\n");
        } else {
            session.send(UNKNOWN_COMMAND);
        }
        Ok(())
    }

    fn user(&self, session: &Arc<Session<Mode>>, id: &str) -> Result<()> {
        self.registry.login(session, id)?;
        session.set_mode(Mode::Lobby);
        session.send(OK);
        Ok(())
    }

    fn game_create(&self, session: &Arc<Session<Mode>>, id: &str) -> Result<()> {
        {
            let mut games = self.games.write().unwrap_or_else(PoisonError::into_inner);
            if games.iter().any(|game| game.id() == id) {
                return Err(ServiceError::Busy(format!(
                    "a game with id `{}` is already created",
                    id
                )));
            }
            let master = session.identity().unwrap_or_default();
            games.push(Game::new(id, session.id(), master));
        }
        info!(session = %session.id(), game = id, "Game created");

        session.set_mode(Mode::CreatingGame);
        session.send(format!("OK\nCreated game '{}'.\n", id));
        Ok(())
    }
}

impl SessionHandler<Mode> for Lobby {
    fn on_accept(&self, session: &Arc<Session<Mode>>) {
        debug!(session = %session.id(), "Session entered the lobby");
    }

    fn on_message(&self, session: &Arc<Session<Mode>>, message: &Message) {
        let command = message.contents_lossy();
        let mode = session.mode();
        debug!(session = %session.id(), %mode, command = %command, "Execute");

        let result = match mode {
            Mode::Connected => self.execute_connected(session, &command),
            Mode::Lobby => self.execute_lobby(session, &command),
            Mode::CreatingGame => self.execute_creating_game(session, &command),
        };
        if let Err(error) = result {
            debug!(session = %session.id(), %mode, "Command failed: {}", error);
            session.send(ERROR);
        }
    }

    fn on_error(&self, session: &Arc<Session<Mode>>, error: &ServiceError) {
        debug!(
            session = %session.id(),
            identity = session.identity().unwrap_or("-"),
            "Session left the lobby: {}",
            error
        );
    }
}
