// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Capabilities
//!
//! The supervisor and the consumption loop never touch lapin directly; they work against the
//! traits below. [`crate::channel`] provides the RabbitMQ implementation.

use crate::{
    errors::AmqpError, exchange::ExchangeDefinition, queue::QueueBinding,
    queue::QueueDefinition, signals::CloseSignal,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::protocol::basic::AMQPProperties;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// A message delivered by a subscription: raw body plus AMQP properties (headers included).
#[derive(Debug, Clone, Default)]
pub struct OrderDelivery {
    pub data: Vec<u8>,
    pub properties: AMQPProperties,
}

impl OrderDelivery {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        OrderDelivery {
            data: data.into(),
            properties: AMQPProperties::default(),
        }
    }
}

/// Lazy, unbounded, in-order sequence of deliveries. Ends when the subscription is invalidated.
pub type DeliveryStream = BoxStream<'static, Result<OrderDelivery, AmqpError>>;

/// Subscription parameters for `basic_consume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeOptions {
    pub consumer_tag: String,
    pub auto_ack: bool,
    pub exclusive: bool,
}

/// Opens connections to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs a single connection attempt.
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, AmqpError>;
}

/// A live network session with the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Registers `signal` to receive a `CloseEvent` tagged with `generation` when this
    /// connection terminates.
    fn notify_close(&self, generation: u64, signal: CloseSignal);

    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError>;
}

/// A logical session multiplexed over a connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn exchange_declare(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    async fn queue_declare(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    async fn queue_bind(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    async fn basic_consume(
        &self,
        queue: &str,
        options: &ConsumeOptions,
    ) -> Result<DeliveryStream, AmqpError>;
}
