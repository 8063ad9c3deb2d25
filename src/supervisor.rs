// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Supervisor
//!
//! Owns the broker connection and the single current channel. Every close event (the bootstrap
//! one included) drives the same path:
//!
//! `Disconnected -> Connecting -> TopologyBuilding -> Ready`
//!
//! Connecting retries forever through [`RetryPolicy`]. Channel creation and topology failures
//! are fatal: the supervisor returns a `FatalSetupError` and never publishes readiness for the
//! broken channel. A partially installed topology is not rolled back; the next start declares
//! it again.

use crate::{
    broker::{BrokerConnection, Connector},
    errors::FatalSetupError,
    retry::{connect_with_retry, RetryPolicy},
    signals::{
        close_channel, readiness_channel, ChannelPublisher, CloseEvent, CloseSignal, Readiness,
    },
    topology::OrderTopology,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where the supervisor is in the rebuild cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    TopologyBuilding,
    Ready,
}

/// Single writer of the current broker channel.
pub struct ConnectionSupervisor<C> {
    connector: C,
    retry: RetryPolicy,
    topology: OrderTopology,
    close_signal: CloseSignal,
    close_events: mpsc::UnboundedReceiver<CloseEvent>,
    publisher: ChannelPublisher,
    connection: Option<Box<dyn BrokerConnection>>,
    generation: u64,
    state: SupervisorState,
}

impl<C> ConnectionSupervisor<C>
where
    C: Connector,
{
    /// Creates a supervisor in the `Disconnected` state together with the readiness handle the
    /// consumption loop listens on. Nothing happens until a close event is delivered, see
    /// [`CloseEvent::bootstrap`].
    pub fn new(connector: C, retry: RetryPolicy) -> (Self, Readiness) {
        let (close_signal, close_events) = close_channel();
        let (publisher, readiness) = readiness_channel();

        let supervisor = ConnectionSupervisor {
            connector,
            retry,
            topology: OrderTopology::default(),
            close_signal,
            close_events,
            publisher,
            connection: None,
            generation: 0,
            state: SupervisorState::Disconnected,
        };

        (supervisor, readiness)
    }

    /// Handle used to inject close events from outside, typically the bootstrap event.
    pub fn close_signal(&self) -> CloseSignal {
        self.close_signal.clone()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The topology installed on every connection; its queue is the one to consume.
    pub fn topology(&self) -> &OrderTopology {
        &self.topology
    }

    /// Processes close events one at a time, forever.
    ///
    /// Events tagged with a generation other than the current one come from a connection that
    /// was already replaced and are ignored.
    pub async fn run(mut self) -> Result<(), FatalSetupError> {
        while let Some(event) = self.close_events.recv().await {
            if event.generation() != self.generation {
                debug!(
                    stale = event.generation(),
                    current = self.generation,
                    "ignoring close event from a replaced connection"
                );
                continue;
            }

            match event.reason() {
                Some(reason) => warn!(
                    reason,
                    generation = event.generation(),
                    "rabbitmq connection lost"
                ),
                None => info!("connecting to rabbitmq"),
            }

            self.transition(SupervisorState::Disconnected);
            self.reconnect().await?;
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), FatalSetupError> {
        if self.connection.take().is_some() {
            debug!(generation = self.generation, "releasing closed connection");
        }

        self.transition(SupervisorState::Connecting);
        let connection = connect_with_retry(&self.connector, &self.retry).await?;

        self.generation += 1;
        connection.notify_close(self.generation, self.close_signal.clone());

        let channel = connection
            .create_channel()
            .await
            .map_err(FatalSetupError::Channel)?;

        self.transition(SupervisorState::TopologyBuilding);
        self.topology
            .install(channel.clone())
            .await
            .map_err(FatalSetupError::Topology)?;

        self.connection = Some(connection);
        self.transition(SupervisorState::Ready);
        self.publisher.publish(self.generation, channel);
        info!(generation = self.generation, "rabbitmq ready");

        Ok(())
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = ?self.state, to = ?next, "supervisor state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::{BrokerChannel, MockBrokerChannel, MockBrokerConnection, MockConnector},
        errors::AmqpError,
    };
    use mockall::{predicate::eq, Sequence};
    use std::{sync::Arc, time::Duration};
    use tokio::time::{timeout, Instant};

    fn healthy_channel() -> MockBrokerChannel {
        let mut channel = MockBrokerChannel::new();
        channel.expect_exchange_declare().returning(|_| Ok(()));
        channel.expect_queue_declare().returning(|_| Ok(()));
        channel.expect_queue_bind().returning(|_| Ok(()));
        channel
    }

    fn connection_with(generation: u64, channel: MockBrokerChannel) -> Box<dyn BrokerConnection> {
        let mut conn = MockBrokerConnection::new();
        conn.expect_notify_close()
            .with(eq(generation), mockall::predicate::always())
            .times(1)
            .return_const(());
        conn.expect_create_channel().return_once(move || {
            let channel: Arc<dyn BrokerChannel> = Arc::new(channel);
            Ok(channel)
        });
        Box::new(conn)
    }

    #[test]
    fn starts_disconnected() {
        let (supervisor, readiness) =
            ConnectionSupervisor::new(MockConnector::new(), RetryPolicy::default());
        assert_eq!(supervisor.state(), SupervisorState::Disconnected);
        assert_eq!(supervisor.topology().queue_name(), "orders");
        assert!(readiness.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_signals_ready_once() {
        let mut connector = MockConnector::new();
        let mut seq = Sequence::new();
        connector
            .expect_connect()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|| Err(AmqpError::ConnectionError));
        let conn = connection_with(1, healthy_channel());
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(conn));

        let (supervisor, mut readiness) =
            ConnectionSupervisor::new(connector, RetryPolicy::default());
        supervisor.close_signal().notify(CloseEvent::bootstrap());

        let start = Instant::now();
        let handle = tokio::spawn(supervisor.run());

        let ready = readiness.wait().await.unwrap();
        assert_eq!(ready.generation(), 1);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        let second = timeout(Duration::from_secs(30), readiness.wait()).await;
        assert!(second.is_err(), "exactly one readiness signal expected");

        handle.abort();
    }

    #[tokio::test]
    async fn exchange_failure_is_fatal_and_never_signals() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_exchange_declare()
            .returning(|def| Err(AmqpError::DeclareExchangeError(def.name().to_owned())));
        channel.expect_queue_declare().never();
        channel.expect_queue_bind().never();

        let mut connector = MockConnector::new();
        let conn = connection_with(1, channel);
        connector.expect_connect().return_once(move || Ok(conn));

        let (supervisor, mut readiness) =
            ConnectionSupervisor::new(connector, RetryPolicy::default());
        supervisor.close_signal().notify(CloseEvent::bootstrap());

        let err = supervisor.run().await.unwrap_err();
        assert_eq!(
            err,
            FatalSetupError::Topology(AmqpError::DeclareExchangeError("robot-shop".to_owned()))
        );
        assert!(readiness.current().is_none());
        assert_eq!(
            readiness.wait().await.unwrap_err(),
            FatalSetupError::SupervisorStopped
        );
    }

    #[tokio::test]
    async fn channel_failure_is_fatal() {
        let mut conn = MockBrokerConnection::new();
        conn.expect_notify_close().return_const(());
        conn.expect_create_channel()
            .returning(|| Err(AmqpError::ChannelError));
        let conn: Box<dyn BrokerConnection> = Box::new(conn);

        let mut connector = MockConnector::new();
        connector.expect_connect().return_once(move || Ok(conn));

        let (supervisor, _readiness) =
            ConnectionSupervisor::new(connector, RetryPolicy::default());
        supervisor.close_signal().notify(CloseEvent::bootstrap());

        assert_eq!(
            supervisor.run().await.unwrap_err(),
            FatalSetupError::Channel(AmqpError::ChannelError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_close_events_are_ignored() {
        let mut connector = MockConnector::new();
        let mut seq = Sequence::new();
        let first = connection_with(1, healthy_channel());
        let second = connection_with(2, healthy_channel());
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(first));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(second));

        let (supervisor, mut readiness) =
            ConnectionSupervisor::new(connector, RetryPolicy::default());
        let signal = supervisor.close_signal();
        signal.notify(CloseEvent::bootstrap());
        let handle = tokio::spawn(supervisor.run());

        assert_eq!(readiness.wait().await.unwrap().generation(), 1);

        // a second bootstrap and an event from an unknown connection change nothing
        signal.notify(CloseEvent::bootstrap());
        signal.notify(CloseEvent::new(7, Some("unrelated".to_owned())));
        assert!(timeout(Duration::from_secs(5), readiness.wait()).await.is_err());

        signal.notify(CloseEvent::new(1, Some("connection reset".to_owned())));
        assert_eq!(readiness.wait().await.unwrap().generation(), 2);

        handle.abort();
    }
}
