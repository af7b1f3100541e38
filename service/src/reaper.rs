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

//! Timer driven removal of dead sessions

use crate::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically sweeps reapable sessions out of a registry.
///
/// Each sweep is scheduled `interval` after the previous one finished. Once
/// the cancellation token fires the reaper stops for good.
pub struct SessionReaper<M> {
    registry: Arc<SessionRegistry<M>>,
    interval: Duration,
}

impl<M> SessionReaper<M>
where
    M: Clone + Default + Send + Sync + 'static,
{
    /// Create a reaper sweeping `registry` every `interval`.
    pub fn new(registry: Arc<SessionRegistry<M>>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Delay between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now. Returns the number of sessions removed.
    pub fn sweep(&self) -> usize {
        let reaped = self.registry.reap();
        if reaped > 0 {
            info!(reaped, remaining = self.registry.len(), "Reaped sessions");
        } else {
            debug!(remaining = self.registry.len(), "Reaper found nothing to reap");
        }
        reaped
    }

    /// Start sweeping on `handle` until `shutdown` is cancelled.
    pub fn start(self, handle: &Handle, shutdown: CancellationToken) -> JoinHandle<()> {
        handle.spawn(async move {
            debug!(interval = ?self.interval, "Reaper started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("Reaper stopped");
                        return;
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        self.sweep();
                    }
                }
            }
        })
    }
}
