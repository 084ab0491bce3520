//! Wiring of the engine components into one process.

use std::sync::Arc;

use dealdesk_ledger::{InMemoryOrderStore, InMemoryPromotionStore, OrderLedger, PromotionLedger};
use dealdesk_negotiation::{InMemoryCatalog, InMemoryOfferStore, NegotiationService, OfferMachine};
use dealdesk_settlement::{AccountRegistry, Ed25519WebhookVerifier, SettlementReconciler};
use dealdesk_sweeper::ExpirySweeper;
use dealdesk_types::{Clock, EngineConfig, Notification, NotificationSink, Result};

pub type NodeNegotiation = NegotiationService<InMemoryOfferStore, InMemoryCatalog, InMemoryOrderStore>;
pub type NodeReconciler = SettlementReconciler<InMemoryOrderStore, InMemoryPromotionStore>;
pub type NodeSweeper = ExpirySweeper<InMemoryOfferStore, InMemoryCatalog, InMemoryOrderStore>;

/// All long-lived components, sharing one order ledger.
pub struct Node {
    pub negotiation: Arc<NodeNegotiation>,
    pub reconciler: Arc<NodeReconciler>,
    pub sweeper: Arc<NodeSweeper>,
}

impl Node {
    /// # Errors
    /// `Configuration` if the provider key is missing or invalid.
    pub fn build(
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let verifier = Ed25519WebhookVerifier::from_config(&config.settlement)?;
        let orders = Arc::new(OrderLedger::new(InMemoryOrderStore::new(), config.fees));
        let promotions = Arc::new(PromotionLedger::new(
            InMemoryPromotionStore::new(),
            config.sweeper.promotion_duration(),
        ));

        let negotiation = Arc::new(NegotiationService::new(
            OfferMachine::new(&config.negotiation),
            InMemoryOfferStore::new(),
            InMemoryCatalog::new(),
            Arc::clone(&orders),
            Arc::clone(&sink),
            Arc::clone(&clock),
        ));
        let reconciler = Arc::new(SettlementReconciler::new(
            Arc::new(verifier),
            orders,
            promotions,
            Arc::new(AccountRegistry::new()),
            Arc::clone(&sink),
            Arc::clone(&clock),
            config.settlement.idempotency_cache_size,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&negotiation),
            sink,
            clock,
            &config.sweeper,
        ));

        tracing::info!(
            buyer_fee_bps = config.fees.buyer_fee_bps,
            seller_fee_bps = config.fees.seller_fee_bps,
            hold_policy = ?config.sweeper.hold_policy,
            "Node assembled"
        );
        Ok(Self {
            negotiation,
            reconciler,
            sweeper,
        })
    }
}

/// Hands notifications to the log until a delivery channel is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            notification = %notification.id,
            recipient = %notification.recipient,
            kind = %notification.kind,
            order_id = ?notification.order_id,
            offer_id = ?notification.offer_id,
            detail = notification.detail.as_deref().unwrap_or(""),
            "Notification"
        );
        Ok(())
    }
}
