// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumption Loop
//!
//! Turns readiness signals into a subscription on the orders queue and feeds every delivery,
//! one at a time, to a `DeliveryHandler`.
//!
//! Subscriptions use auto-ack: a message counts as handled as soon as it is delivered, so a
//! crash mid-processing loses it rather than redelivering it. When the delivery stream ends the
//! loop goes back to waiting for the supervisor. If the supervisor announces a new channel while
//! the old stream is still open, the old stream is dropped and the loop subscribes on the new
//! channel straight away.

use crate::{
    broker::{ConsumeOptions, DeliveryStream, OrderDelivery},
    errors::FatalSetupError,
    signals::{ReadyChannel, Readiness},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Processes a single delivery. Implementations must not fail; errors stay inside them.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: OrderDelivery);
}

/// Why a subscription stopped producing deliveries.
#[derive(Debug)]
enum SubscriptionEnd {
    /// The stream ended or failed; wait for the supervisor to rebuild.
    Invalidated,
    /// A newer channel was announced while the stream was still open.
    Superseded(ReadyChannel),
}

/// Subscribes to the orders queue on every announced channel and feeds its deliveries to a
/// handler.
pub struct ConsumptionLoop {
    readiness: Readiness,
    queue: String,
    options: ConsumeOptions,
    handler: Arc<dyn DeliveryHandler>,
}

impl ConsumptionLoop {
    pub fn new(readiness: Readiness, queue: &str, handler: Arc<dyn DeliveryHandler>) -> Self {
        ConsumptionLoop {
            readiness,
            queue: queue.to_owned(),
            options: ConsumeOptions {
                consumer_tag: format!("dispatch-{}", Uuid::new_v4()),
                auto_ack: true,
                exclusive: false,
            },
            handler,
        }
    }

    pub fn consume_options(&self) -> &ConsumeOptions {
        &self.options
    }

    /// Runs until a subscription cannot be opened or the supervisor goes away.
    pub async fn run(mut self) -> Result<(), FatalSetupError> {
        let mut ready = self.readiness.wait().await?;

        loop {
            info!(generation = ready.generation(), "subscribing to {}", self.queue);

            let deliveries = ready
                .channel()
                .basic_consume(&self.queue, &self.options)
                .await
                .map_err(FatalSetupError::Consume)?;

            ready = match self.drain(deliveries).await? {
                SubscriptionEnd::Invalidated => self.readiness.wait().await?,
                SubscriptionEnd::Superseded(next) => next,
            };
        }
    }

    async fn drain(
        &mut self,
        mut deliveries: DeliveryStream,
    ) -> Result<SubscriptionEnd, FatalSetupError> {
        loop {
            let next = tokio::select! {
                biased;

                ready = self.readiness.wait() => {
                    let ready = ready?;
                    debug!(generation = ready.generation(), "dropping superseded subscription");
                    return Ok(SubscriptionEnd::Superseded(ready));
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => self.handler.handle(delivery).await,
                Some(Err(err)) => {
                    warn!(error = %err, "subscription failed");
                    return Ok(SubscriptionEnd::Invalidated);
                }
                None => {
                    info!("delivery stream closed, waiting for rabbitmq");
                    return Ok(SubscriptionEnd::Invalidated);
                }
            }
        }
    }
}
