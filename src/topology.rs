// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module provides functionality for declaring the exchanges, queues and bindings a
//! consumer depends on. Declarations are declare-if-absent on the broker, so installing the
//! same topology again after a reconnect is always safe.
//!
//! The main components are:
//! - `Topology` trait: Interface for topology management
//! - `AmqpTopology`: Installs registered definitions through a `BrokerChannel`
//! - `OrderTopology`: The fixed `robot-shop` / `orders` topology consumed by this worker

use crate::{
    broker::BrokerChannel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Exchange orders are published to.
pub const ORDERS_EXCHANGE: &str = "robot-shop";
/// Queue this worker consumes.
pub const ORDERS_QUEUE: &str = "orders";
/// Binding key between `ORDERS_EXCHANGE` and `ORDERS_QUEUE`.
pub const ORDERS_ROUTING_KEY: &str = "orders";

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: &'tp ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: &'tp QueueBinding) -> Self;

    /// Declares everything registered so far on the broker.
    ///
    /// Stops at the first failing declaration; what was already declared is left in place.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// Collects definitions and installs them, in registration order, through a channel.
pub struct AmqpTopology<'tp> {
    channel: Arc<dyn BrokerChannel>,
    pub(crate) queues: Vec<&'tp QueueDefinition>,
    pub(crate) queues_binding: Vec<&'tp QueueBinding>,
    pub(crate) exchanges: Vec<&'tp ExchangeDefinition>,
}

impl<'tp> AmqpTopology<'tp> {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> AmqpTopology<'tp> {
        AmqpTopology {
            channel,
            queues: vec![],
            queues_binding: vec![],
            exchanges: vec![],
        }
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn exchange(mut self, def: &'tp ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    fn queue_binding(mut self, binding: &'tp QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    /// Installs the topology in three steps: exchanges, then queues, then bindings.
    async fn install(&self) -> Result<(), AmqpError> {
        self.install_exchange().await?;
        self.install_queue().await?;
        self.binding_queues().await
    }
}

impl<'tp> AmqpTopology<'tp> {
    async fn install_exchange(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);
            self.channel.exchange_declare(exch).await?;
            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queue(&self) -> Result<(), AmqpError> {
        for def in &self.queues {
            debug!("creating queue: {}", def.name);
            self.channel.queue_declare(def).await?;
            debug!("queue: {} was created", def.name);
        }

        Ok(())
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );
            self.channel.queue_bind(binding).await?;
        }

        debug!("queue was bounded");

        Ok(())
    }
}

/// The topology the dispatch worker needs: a durable direct exchange, a durable shared queue
/// and the binding between them.
#[derive(Debug, Clone)]
pub struct OrderTopology {
    exchange: ExchangeDefinition,
    queue: QueueDefinition,
    binding: QueueBinding,
}

impl Default for OrderTopology {
    fn default() -> Self {
        OrderTopology {
            exchange: ExchangeDefinition::new(ORDERS_EXCHANGE).durable(),
            queue: QueueDefinition::new(ORDERS_QUEUE).durable(),
            binding: QueueBinding::new(ORDERS_QUEUE)
                .exchange(ORDERS_EXCHANGE)
                .routing_key(ORDERS_ROUTING_KEY),
        }
    }
}

impl OrderTopology {
    /// Queue the consumption loop subscribes to.
    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }

    pub async fn install(&self, channel: Arc<dyn BrokerChannel>) -> Result<(), AmqpError> {
        AmqpTopology::new(channel)
            .exchange(&self.exchange)
            .queue(&self.queue)
            .queue_binding(&self.binding)
            .install()
            .await
    }
}
