//! The topology synthesizer: given a [`Contract`] and a [`ChannelLike`],
//! performs idempotent broker declarations in the order exchanges → queues →
//! queue-bindings → exchange-bindings. Declarations within a phase run
//! concurrently; a phase's failures are aggregated into one [`TopologyError`].
//!
//! Runs on first connect and on every reconnect, via a
//! [`ChannelSetupHook`](crate::connection::ChannelSetupHook).

use crate::channel::ChannelLike;
use crate::connection::ChannelSetupHook;
use crate::error::{TechnicalError, TopologyError};
use crate::model::{Binding, Contract};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Declares every resource in `contract` against `channel`, in the
/// exchanges → queues → queue-bindings → exchange-bindings order, failing
/// fast between phases (later phases assume earlier ones already landed) but
/// running concurrently within a phase.
pub async fn synthesize(contract: &Contract, channel: &dyn ChannelLike) -> Result<(), TopologyError> {
    run_phase("exchanges", contract.exchanges().count(), || async {
        join_all(contract.exchanges().map(|exchange| channel.assert_exchange(exchange))).await
    })
    .await?;

    run_phase("queues", contract.queues().count(), || async {
        join_all(contract.queues().map(|queue| channel.assert_queue(queue))).await
    })
    .await?;

    let (queue_bindings, exchange_bindings): (Vec<&Binding>, Vec<&Binding>) = contract
        .bindings()
        .partition(|binding| matches!(binding, Binding::QueueBinding { .. }));

    run_phase("queue-bindings", queue_bindings.len(), || async {
        join_all(queue_bindings.iter().map(|binding| channel.assert_binding(binding))).await
    })
    .await?;

    run_phase("exchange-bindings", exchange_bindings.len(), || async {
        join_all(exchange_bindings.iter().map(|binding| channel.assert_binding(binding))).await
    })
    .await?;

    debug!("topology synthesized");
    Ok(())
}

async fn run_phase<F, Fut>(phase: &'static str, attempted: usize, declare: F) -> Result<(), TopologyError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Vec<Result<(), TechnicalError>>>,
{
    let results = declare().await;
    let causes: Vec<TechnicalError> = results.into_iter().filter_map(Result::err).collect();

    if causes.is_empty() {
        Ok(())
    } else {
        warn!(phase, failed = causes.len(), attempted, "topology phase failed");
        Err(TopologyError {
            phase,
            attempted,
            causes,
        })
    }
}

/// A [`ChannelSetupHook`] that re-declares a contract's topology on every
/// (re)connect.
pub struct TopologySetupHook {
    contract: Arc<Contract>,
}

impl TopologySetupHook {
    /// Creates a hook that declares `contract`'s topology.
    pub fn new(contract: Arc<Contract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl ChannelSetupHook for TopologySetupHook {
    async fn setup(&self, channel: &dyn ChannelLike) -> Result<(), TechnicalError> {
        synthesize(&self.contract, channel)
            .await
            .map_err(|error| TechnicalError::wrap("topology synthesis failed", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockChannel;
    use crate::model::{DeadLetter, Exchange, ExchangeKind, MessageSchema, Publisher, Queue};
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;

    fn sample_contract() -> Contract {
        let exchange = Exchange::builder("orders", ExchangeKind::Topic).build();
        let publisher = Publisher::new(
            "orderCreated",
            exchange,
            MessageSchema::new(NoopValidator).build(),
            Some("order.created".into()),
        );
        let queue = Queue::builder("order-processing")
            .with_dead_letter(DeadLetter::new("order-processing-dlx"))
            .build();

        Contract::builder()
            .with_publisher(publisher)
            .unwrap()
            .with_queue(queue)
            .unwrap()
            .with_binding(
                "orderCreatedBinding",
                Binding::queue_binding("order-processing", "orders", Some("order.created".into())),
            )
            .unwrap()
            .assemble()
            .unwrap()
    }

    #[tokio::test]
    async fn synthesize_declares_every_resource() {
        // Given
        let contract = sample_contract();
        let channel = MockChannel::default();

        // When
        synthesize(&contract, &channel).await.unwrap();

        // Then
        assert!(channel.declared_exchanges.lock().contains("orders"));
        assert!(channel.declared_exchanges.lock().contains("order-processing-dlx"));
        assert!(channel.declared_queues.lock().contains("order-processing"));
        assert!(channel.declared_queues.lock().contains("order-processing-wait"));
        assert_eq!(channel.declared_bindings.lock().len(), 3);
    }

    #[tokio::test]
    async fn synthesize_is_idempotent() {
        // Given
        let contract = sample_contract();
        let channel = MockChannel::default();

        // When
        synthesize(&contract, &channel).await.unwrap();
        synthesize(&contract, &channel).await.unwrap();

        // Then
        assert!(channel.declared_exchanges.lock().contains("orders"));
    }
}
