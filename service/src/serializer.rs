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

//! Per-connection exclusion contexts
//!
//! A [`Strand`] is a single consumer task draining an unbounded queue of
//! closures. Everything posted to one strand runs one at a time, in
//! submission order, on whichever runtime worker currently polls the
//! consumer. Different strands run in parallel.
//!
//! A [`Serializer`] is the binding a connection holds to a strand:
//!
//! ```text
//! Disabled  -> execute() runs the closure inline, in the caller's context
//! Owned     -> the strand lives and dies with the connection
//! Shared    -> the strand belongs to a longer lived owner; disable() only detaches
//! ```

use crate::{read_lock, write_lock};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// A unit of work posted to a strand.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A completion callback handed to an asynchronous operation.
pub type Completion<A> = Box<dyn FnOnce(A) + Send + 'static>;

static NEXT_STRAND_ID: AtomicU64 = AtomicU64::new(1);

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string payload"
    }
}

/// An exclusion context: posted tasks never run concurrently with each other.
///
/// Cloning a strand yields another handle to the same queue. The consumer
/// task ends once every handle has been dropped and the queue is drained.
/// A panicking task is logged and the consumer moves on to the next one.
#[derive(Clone)]
pub struct Strand {
    id: u64,
    queue: mpsc::UnboundedSender<Task>,
}

impl Strand {
    /// Create a strand whose consumer runs on the given runtime.
    pub fn new(handle: &Handle) -> Self {
        let id = NEXT_STRAND_ID.fetch_add(1, Ordering::Relaxed);
        let (queue, mut tasks) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            trace!(strand = id, "Strand started");
            while let Some(task) = tasks.recv().await {
                if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    error!(
                        strand = id,
                        "Task panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
            trace!(strand = id, "Strand drained");
        });
        Self { id, queue }
    }

    /// Numeric identifier, for logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue `task` behind everything already posted to this strand.
    ///
    /// Once the runtime is shutting down the consumer is gone; the task then
    /// runs inline so that teardown work still happens.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if let Err(mpsc::error::SendError(task)) = self.queue.send(Box::new(task)) {
            debug!(strand = self.id, "Strand consumer stopped, running task inline");
            task();
        }
    }

    /// Check if both handles refer to the same queue.
    pub fn same_as(&self, other: &Strand) -> bool {
        self.queue.same_channel(&other.queue)
    }
}

impl fmt::Debug for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strand").field("id", &self.id).finish()
    }
}

#[derive(Debug, Default)]
enum Binding {
    #[default]
    Disabled,
    Owned(Strand),
    Shared(Strand),
}

/// The serialization binding of one connection.
#[derive(Debug, Default)]
pub struct Serializer {
    binding: RwLock<Binding>,
}

impl Serializer {
    /// Create a disabled serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a serializer that owns a fresh strand.
    pub fn owned(handle: &Handle) -> Self {
        let serializer = Self::new();
        serializer.enable_owned(handle);
        serializer
    }

    /// Create a serializer bound to a strand owned elsewhere.
    pub fn shared(strand: &Strand) -> Self {
        let serializer = Self::new();
        serializer.enable_shared(strand);
        serializer
    }

    /// Bind to a fresh strand owned by this serializer.
    pub fn enable_owned(&self, handle: &Handle) {
        let strand = Strand::new(handle);
        debug!(strand = strand.id(), "Serializer enabled with owned strand");
        *write_lock(&self.binding) = Binding::Owned(strand);
    }

    /// Bind to a strand owned by a longer lived component.
    pub fn enable_shared(&self, strand: &Strand) {
        debug!(strand = strand.id(), "Serializer enabled with shared strand");
        *write_lock(&self.binding) = Binding::Shared(strand.clone());
    }

    /// Detach from the current strand; later work runs inline.
    ///
    /// An owned strand stops once its queue drains. A shared strand is left
    /// running for its owner.
    pub fn disable(&self) {
        let previous = std::mem::take(&mut *write_lock(&self.binding));
        if let Binding::Owned(strand) | Binding::Shared(strand) = &previous {
            debug!(strand = strand.id(), "Serializer disabled");
        }
    }

    /// Check if tasks are posted to a strand.
    pub fn is_enabled(&self) -> bool {
        !matches!(*read_lock(&self.binding), Binding::Disabled)
    }

    /// Check if the strand is owned elsewhere.
    pub fn is_shared(&self) -> bool {
        matches!(*read_lock(&self.binding), Binding::Shared(_))
    }

    /// The strand currently bound, if any.
    pub fn strand(&self) -> Option<Strand> {
        match &*read_lock(&self.binding) {
            Binding::Disabled => None,
            Binding::Owned(strand) | Binding::Shared(strand) => Some(strand.clone()),
        }
    }

    /// Run `f` under the connection's exclusion guarantee, or inline when
    /// disabled.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        match self.strand() {
            Some(strand) => strand.post(f),
            None => f(),
        }
    }

    /// Wrap a completion so that, whenever and wherever it fires, its body
    /// runs inside the strand bound at the time of wrapping.
    pub fn wrap<A, C>(&self, completion: C) -> Completion<A>
    where
        A: Send + 'static,
        C: FnOnce(A) + Send + 'static,
    {
        let Some(strand) = self.strand() else {
            return Box::new(completion);
        };
        Box::new(move |argument: A| strand.post(move || completion(argument)))
    }

    /// Run `f` under the exclusion guarantee, handing it a wrapped version of
    /// `completion` for the asynchronous call it starts.
    pub fn execute_with<A, F, C>(&self, f: F, completion: C)
    where
        A: Send + 'static,
        F: FnOnce(Completion<A>) + Send + 'static,
        C: FnOnce(A) + Send + 'static,
    {
        let completion = self.wrap(completion);
        self.execute(move || f(completion));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_disabled_runs_inline() {
        let serializer = Serializer::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        serializer.execute(move || *flag.lock().unwrap() = true);
        assert!(*ran.lock().unwrap());
        assert!(!serializer.is_enabled());
    }

    #[tokio::test]
    async fn test_owned_preserves_submission_order() {
        let serializer = Serializer::owned(&Handle::current());
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..50 {
            let tx = tx.clone();
            serializer.execute(move || tx.send(i).unwrap());
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_disable_detaches_shared_strand() {
        let strand = Strand::new(&Handle::current());
        let serializer = Serializer::shared(&strand);
        assert!(serializer.is_shared());
        assert!(serializer.strand().unwrap().same_as(&strand));

        serializer.disable();
        assert!(!serializer.is_enabled());

        // The owner's strand keeps running
        let (tx, rx) = tokio::sync::oneshot::channel();
        strand.post(move || tx.send(()).unwrap());
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_wrap_runs_completion_in_strand() {
        let serializer = Serializer::owned(&Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let completion = serializer.wrap(move |value: u32| tx.send(value * 2).unwrap());
        tokio::spawn(async move { completion(21) });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_execute_with_hands_over_wrapped_completion() {
        let serializer = Serializer::owned(&Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        serializer.execute_with(
            |done: Completion<&'static str>| {
                tokio::spawn(async move { done("finished") });
            },
            move |value| tx.send(value).unwrap(),
        );
        assert_eq!(rx.await.unwrap(), "finished");
    }
}
