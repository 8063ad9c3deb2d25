// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Supervisor Signals
//!
//! The two control loops only talk through the primitives in this module:
//!
//! - `CloseSignal` / `CloseEvent`: connections report that they died; the supervisor reacts.
//! - `ChannelPublisher` / `Readiness`: the supervisor publishes a freshly built channel; the
//!   consumption loop wakes up and reads the channel current at that instant.
//!
//! The readiness cell is a `tokio::sync::watch` slot. The supervisor is its only writer, and a
//! reader only ever obtains a channel together with the signal announcing it, so a consumer
//! cannot hold on to a channel older than the last signal it observed. Signals published while
//! the consumer is busy coalesce into the newest one.

use crate::{broker::BrokerChannel, errors::FatalSetupError};
use std::{fmt, sync::Arc};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Notification that a broker connection terminated.
///
/// `generation` identifies the connection that produced the event. Generation `0` is reserved
/// for the bootstrap event, which is how the very first connection gets established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    generation: u64,
    reason: Option<String>,
}

impl CloseEvent {
    pub fn new(generation: u64, reason: Option<String>) -> Self {
        CloseEvent { generation, reason }
    }

    /// The synthetic event injected at startup to trigger the first connect.
    pub fn bootstrap() -> Self {
        CloseEvent {
            generation: 0,
            reason: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Sending half of the close-event channel, handed to every connection.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: mpsc::UnboundedSender<CloseEvent>,
}

impl CloseSignal {
    /// Reports a close event. Never blocks; safe to call from broker callbacks.
    pub fn notify(&self, event: CloseEvent) {
        if self.tx.send(event).is_err() {
            debug!("close event dropped, supervisor is gone");
        }
    }
}

pub(crate) fn close_channel() -> (CloseSignal, mpsc::UnboundedReceiver<CloseEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CloseSignal { tx }, rx)
}

/// A channel announced by a readiness signal, with the connection generation it belongs to.
#[derive(Clone)]
pub struct ReadyChannel {
    generation: u64,
    channel: Arc<dyn BrokerChannel>,
}

impl ReadyChannel {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }
}

impl fmt::Debug for ReadyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyChannel")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Writing half of the readiness cell. Owned by the supervisor.
#[derive(Debug)]
pub struct ChannelPublisher {
    tx: watch::Sender<Option<ReadyChannel>>,
}

impl ChannelPublisher {
    /// Replaces the current channel and signals readiness.
    pub fn publish(&self, generation: u64, channel: Arc<dyn BrokerChannel>) {
        self.tx.send_replace(Some(ReadyChannel {
            generation,
            channel,
        }));
    }
}

/// Reading half of the readiness cell. Owned by the consumption loop.
#[derive(Debug)]
pub struct Readiness {
    rx: watch::Receiver<Option<ReadyChannel>>,
}

impl Readiness {
    /// Waits for the next readiness signal and returns the channel current at that moment.
    ///
    /// Cancel safe. Fails once the publisher is gone, i.e. the supervisor has stopped.
    pub async fn wait(&mut self) -> Result<ReadyChannel, FatalSetupError> {
        loop {
            self.rx
                .changed()
                .await
                .map_err(|_| FatalSetupError::SupervisorStopped)?;

            if let Some(ready) = self.rx.borrow_and_update().clone() {
                return Ok(ready);
            }
        }
    }

    /// Peeks at the current channel without consuming a signal.
    pub fn current(&self) -> Option<ReadyChannel> {
        self.rx.borrow().clone()
    }
}

pub fn readiness_channel() -> (ChannelPublisher, Readiness) {
    let (tx, rx) = watch::channel(None);
    (ChannelPublisher { tx }, Readiness { rx })
}
