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

//! Completion handler types and the session handler trait

use crate::{ServiceError, Session};
use std::sync::Arc;
use zard_codec::Message;

/// Called once per completed read with the decoded message or the error that
/// ended the receive loop, and the number of bytes involved.
pub type ReceiveHandler =
    Arc<dyn Fn(std::result::Result<&Message, &ServiceError>, usize) + Send + Sync + 'static>;

/// Called once per queued message after its write finished or failed.
pub type SendHandler =
    Arc<dyn Fn(std::result::Result<(), &ServiceError>, usize, &Message) + Send + Sync + 'static>;

/// Called when an accept completes.
pub type AcceptHandler = Arc<dyn Fn(std::result::Result<(), &ServiceError>) + Send + Sync + 'static>;

/// Called exactly once per `connect()`, after success or the final failure.
pub type ConnectHandler =
    Arc<dyn Fn(std::result::Result<(), &ServiceError>) + Send + Sync + 'static>;

/// Session event handler trait
///
/// Implement this trait to drive a command layer on top of sessions. Every
/// method is invoked from inside the session's serializer, so calls for one
/// session never overlap. Session status has already been updated when a
/// method runs.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zard_codec::Message;
/// use zard_service::{Session, SessionHandler};
///
/// struct Echo;
///
/// impl SessionHandler<()> for Echo {
///     fn on_message(&self, session: &Arc<Session<()>>, message: &Message) {
///         session.send(message.contents().clone());
///     }
/// }
/// ```
pub trait SessionHandler<M>: Send + Sync + 'static {
    /// Called after a pending session accepted its peer.
    fn on_accept(&self, _session: &Arc<Session<M>>) {}

    /// Called for every decoded inbound message.
    fn on_message(&self, session: &Arc<Session<M>>, message: &Message);

    /// Called with the first accept, receive or send failure of a session.
    fn on_error(&self, _session: &Arc<Session<M>>, _error: &ServiceError) {}
}
