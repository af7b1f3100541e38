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

//! Games hosted by the lobby

use zard_service::SessionId;

/// What a player does in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Game master, the player who created the game
    GameMaster,
    Player,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub session: SessionId,
    pub name: String,
    pub role: Role,
}

/// A game being set up in the lobby
#[derive(Debug, Clone)]
pub struct Game {
    id: String,
    players: Vec<Player>,
}

impl Game {
    /// Create a game with `master` as its game master.
    pub fn new(id: impl Into<String>, master: SessionId, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            players: vec![Player {
                session: master,
                name: name.into(),
                role: Role::GameMaster,
            }],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn game_master(&self) -> Option<&Player> {
        self.players
            .iter()
            .find(|player| player.role == Role::GameMaster)
    }
}
