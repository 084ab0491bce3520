//! Persistence seams for orders and promotions.
//!
//! Writes are compare-and-swap on the record's `version`: a store commits
//! `next` only if the stored version still equals `expected_version`, and
//! the committed copy carries `expected_version + 1`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dealdesk_types::{
    DealdeskError, EscrowStatus, OfferId, Order, OrderId, PaymentIntentId, Promotion, PromotionId,
    Result,
};

/// Order persistence.
pub trait OrderStore: Send + Sync {
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn find_by_payment_intent(&self, payment_intent: &PaymentIntentId) -> Result<Option<Order>>;

    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn find_by_offer(&self, offer_id: OfferId) -> Result<Option<Order>>;

    /// Insert a new order at version 0.
    ///
    /// At most one order exists per offer; the check and the insert are one
    /// atomic step.
    ///
    /// # Errors
    /// `ConcurrentModification` if an order for the same offer already
    /// exists, `Persistence` on a duplicate id or backend failure.
    fn insert(&self, order: Order) -> Result<Order>;

    /// Commit `next` if the stored version equals `expected_version`.
    ///
    /// # Errors
    /// `OrderNotFound`, `ConcurrentModification` on a version mismatch,
    /// `Persistence` on backend failure.
    fn compare_and_swap(&self, expected_version: u64, next: Order) -> Result<Order>;

    /// Orders whose escrow has been `held` since before `cutoff`.
    ///
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn held_since_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Promotion persistence.
pub trait PromotionStore: Send + Sync {
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn get(&self, id: PromotionId) -> Result<Option<Promotion>>;

    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn find_by_payment_intent(
        &self,
        payment_intent: &PaymentIntentId,
    ) -> Result<Option<Promotion>>;

    /// # Errors
    /// `Persistence` on a duplicate id or backend failure.
    fn insert(&self, promotion: Promotion) -> Result<Promotion>;

    /// # Errors
    /// `Internal` if the promotion is missing, `ConcurrentModification` on a
    /// version mismatch, `Persistence` on backend failure.
    fn compare_and_swap(&self, expected_version: u64, next: Promotion) -> Result<Promotion>;
}

fn poisoned() -> DealdeskError {
    DealdeskError::Persistence("store lock poisoned".into())
}

// =================================================================
// In-memory orders
// =================================================================

#[derive(Debug, Default)]
struct OrderTables {
    orders: HashMap<OrderId, Order>,
    by_payment_intent: HashMap<PaymentIntentId, OrderId>,
    by_offer: HashMap<OfferId, OrderId>,
}

impl OrderTables {
    fn index(&mut self, order: &Order) {
        if let Some(pi) = &order.payment_intent_id {
            self.by_payment_intent.insert(pi.clone(), order.id);
        }
        if let Some(offer_id) = order.offer_id {
            self.by_offer.insert(offer_id, order.id);
        }
    }
}

/// Order store backed by a mutex-guarded map.
///
/// `set_unavailable(true)` makes every call fail with `Persistence`, for
/// exercising retry paths.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<OrderTables>,
    unavailable: AtomicBool,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DealdeskError::Persistence("order store unavailable".into()));
        }
        Ok(())
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.orders.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderStore for InMemoryOrderStore {
    fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables.orders.get(&id).cloned())
    }

    fn find_by_payment_intent(&self, payment_intent: &PaymentIntentId) -> Result<Option<Order>> {
        self.check_available()?;
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables
            .by_payment_intent
            .get(payment_intent)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    fn find_by_offer(&self, offer_id: OfferId) -> Result<Option<Order>> {
        self.check_available()?;
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables
            .by_offer
            .get(&offer_id)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    fn insert(&self, mut order: Order) -> Result<Order> {
        self.check_available()?;
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        if tables.orders.contains_key(&order.id) {
            return Err(DealdeskError::Persistence(format!(
                "duplicate order id {}",
                order.id
            )));
        }
        if order
            .offer_id
            .is_some_and(|offer_id| tables.by_offer.contains_key(&offer_id))
        {
            return Err(DealdeskError::ConcurrentModification);
        }
        order.version = 0;
        tables.index(&order);
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn compare_and_swap(&self, expected_version: u64, mut next: Order) -> Result<Order> {
        self.check_available()?;
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        let current = tables
            .orders
            .get(&next.id)
            .ok_or(DealdeskError::OrderNotFound(next.id))?;
        if current.version != expected_version {
            return Err(DealdeskError::ConcurrentModification);
        }
        next.version = expected_version + 1;
        tables.index(&next);
        tables.orders.insert(next.id, next.clone());
        Ok(next)
    }

    fn held_since_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        self.check_available()?;
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        let mut stale: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| {
                o.escrow_status == EscrowStatus::Held
                    && o.escrow_held_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.escrow_held_at);
        Ok(stale)
    }
}

// =================================================================
// In-memory promotions
// =================================================================

#[derive(Debug, Default)]
struct PromotionTables {
    promotions: HashMap<PromotionId, Promotion>,
    by_payment_intent: HashMap<PaymentIntentId, PromotionId>,
}

#[derive(Debug, Default)]
pub struct InMemoryPromotionStore {
    tables: Mutex<PromotionTables>,
}

impl InMemoryPromotionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PromotionStore for InMemoryPromotionStore {
    fn get(&self, id: PromotionId) -> Result<Option<Promotion>> {
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables.promotions.get(&id).cloned())
    }

    fn find_by_payment_intent(
        &self,
        payment_intent: &PaymentIntentId,
    ) -> Result<Option<Promotion>> {
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables
            .by_payment_intent
            .get(payment_intent)
            .and_then(|id| tables.promotions.get(id))
            .cloned())
    }

    fn insert(&self, mut promotion: Promotion) -> Result<Promotion> {
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        if tables.promotions.contains_key(&promotion.id)
            || tables
                .by_payment_intent
                .contains_key(&promotion.payment_intent_id)
        {
            return Err(DealdeskError::Persistence(format!(
                "duplicate promotion {}",
                promotion.id
            )));
        }
        promotion.version = 0;
        tables
            .by_payment_intent
            .insert(promotion.payment_intent_id.clone(), promotion.id);
        tables.promotions.insert(promotion.id, promotion.clone());
        Ok(promotion)
    }

    fn compare_and_swap(&self, expected_version: u64, mut next: Promotion) -> Result<Promotion> {
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        let current = tables.promotions.get(&next.id).ok_or_else(|| {
            DealdeskError::Internal(format!("promotion {} vanished", next.id))
        })?;
        if current.version != expected_version {
            return Err(DealdeskError::ConcurrentModification);
        }
        next.version = expected_version + 1;
        tables.promotions.insert(next.id, next.clone());
        Ok(next)
    }
}
