//! In-process store implementations.
//!
//! Used when no database is configured and in tests. They uphold the same
//! conditional-update rules as the `PostgreSQL` stores, but state is lost on
//! restart and is not shared between instances.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use atelier_core::{
    AdminUserId, CurrencyCode, CustomOrderId, CustomOrderStatus, CustomerId, Email, FriendlyId,
    OrderId, OrderStatus, OutboxTaskId, PaymentStatus, ProductId, ShippingAddress,
};

use super::accounts::Credentials;
use super::{
    AccountRepository, CustomOrderRepository, DecrementOutcome, OrderRepository, OutboxStore,
    RateLimitStore, RepositoryError, StockDecrement, StockLedger, WebhookEventStore, WindowState,
    stock::clamp_decrement,
};
use crate::models::{
    AdminUser, CustomOrder, Customer, NewCustomOrder, NewOrder, Notification, Order, OrderPatch,
    OutboxTask, PaymentSettlement,
};
use crate::services::rate_limit::window_end;

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryOrderRepository {
    async fn update_by_session(
        &self,
        session_id: &str,
        update: impl FnOnce(&mut Order) -> bool + Send,
    ) -> Option<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .values_mut()
            .find(|o| o.provider_session_id.as_deref() == Some(session_id))?;
        update(order).then(|| order.clone())
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn insert_for_session(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders
            .values()
            .find(|o| o.provider_session_id.as_deref() == Some(new.provider_session_id.as_str()))
        {
            return Ok(existing.clone());
        }
        if orders
            .values()
            .any(|o| o.order_number == new.order_number || o.id == new.id)
        {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let order = Order {
            id: new.id,
            order_number: new.order_number.clone(),
            contact: new.contact.clone(),
            customer_id: new.customer_id,
            line_items: new.line_items.clone(),
            currency: new.currency,
            subtotal_minor: new.subtotal_minor,
            shipping_minor: new.shipping_minor,
            tax_minor: new.tax_minor,
            total_minor: new.total_minor,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            provider_session_id: Some(new.provider_session_id.clone()),
            shipping_address: None,
            courier_name: None,
            tracking_number: None,
            tracking_url: None,
            notes: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.provider_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, RepositoryError> {
        let mut all: Vec<Order> = self.orders.read().await.values().cloned().collect();
        newest_first(&mut all, |o| o.created_at);
        Ok(page(all, limit, offset))
    }

    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| &o.contact.email == email)
            .cloned()
            .collect();
        newest_first(&mut matching, |o| o.created_at);
        Ok(matching)
    }

    async fn mark_paid(
        &self,
        session_id: &str,
        settlement: &PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .update_by_session(session_id, |order| {
                if order.payment_status.has_settled() {
                    return false;
                }
                order.payment_status = PaymentStatus::Paid;
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Processing;
                }
                order.paid_at = Some(now);
                if let Some(v) = settlement.subtotal_minor {
                    order.subtotal_minor = v;
                }
                if let Some(v) = settlement.shipping_minor {
                    order.shipping_minor = v;
                }
                if let Some(v) = settlement.tax_minor {
                    order.tax_minor = v;
                }
                if let Some(v) = settlement.total_minor {
                    order.total_minor = v;
                }
                if let Some(address) = &settlement.shipping_address {
                    order.shipping_address = Some(address.clone());
                }
                order.updated_at = now;
                true
            })
            .await)
    }

    async fn mark_payment_failed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .update_by_session(session_id, |order| {
                if order.payment_status != PaymentStatus::Pending {
                    return false;
                }
                order.payment_status = PaymentStatus::Failed;
                order.updated_at = now;
                true
            })
            .await)
    }

    async fn cancel_unpaid(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .update_by_session(session_id, |order| {
                if order.status != OrderStatus::Pending || order.payment_status.has_settled() {
                    return false;
                }
                order.status = OrderStatus::Cancelled;
                order.payment_status = PaymentStatus::Failed;
                order.updated_at = now;
                true
            })
            .await)
    }

    async fn apply_patch(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        patch: &OrderPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        if (order.status, order.payment_status) != expected {
            return Ok(None);
        }
        patch.apply_to(order, now);
        Ok(Some(order.clone()))
    }

    async fn delete(&self, id: OrderId) -> Result<bool, RepositoryError> {
        Ok(self.orders.write().await.remove(&id).is_some())
    }
}

// =============================================================================
// Custom orders
// =============================================================================

#[derive(Default)]
pub struct MemoryCustomOrderRepository {
    orders: RwLock<HashMap<CustomOrderId, CustomOrder>>,
}

impl MemoryCustomOrderRepository {
    async fn update(
        &self,
        id: CustomOrderId,
        update: impl FnOnce(&mut CustomOrder) -> bool + Send,
    ) -> Option<CustomOrder> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id)?;
        update(order).then(|| order.clone())
    }
}

#[async_trait]
impl CustomOrderRepository for MemoryCustomOrderRepository {
    async fn insert(
        &self,
        new: &NewCustomOrder,
        now: DateTime<Utc>,
    ) -> Result<CustomOrder, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.friendly_id == new.friendly_id || o.id == new.id)
        {
            return Err(RepositoryError::Conflict(
                "friendly id already exists".to_owned(),
            ));
        }
        let order = new.clone().into_custom_order(now);
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: CustomOrderId) -> Result<Option<CustomOrder>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_friendly_id(
        &self,
        friendly_id: &FriendlyId,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| &o.friendly_id == friendly_id)
            .cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CustomOrder>, RepositoryError> {
        let mut all: Vec<CustomOrder> = self.orders.read().await.values().cloned().collect();
        newest_first(&mut all, |o| o.created_at);
        Ok(page(all, limit, offset))
    }

    async fn set_quote(
        &self,
        id: CustomOrderId,
        price: Decimal,
        currency: CurrencyCode,
        expected: CustomOrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        Ok(self
            .update(id, |order| {
                if order.status != expected {
                    return false;
                }
                order.price = Some(price);
                order.currency = currency;
                order.status = CustomOrderStatus::AwaitingPayment;
                order.updated_at = now;
                true
            })
            .await)
    }

    async fn attach_session(
        &self,
        id: CustomOrderId,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        Ok(self
            .update(id, |order| {
                if order.status != CustomOrderStatus::AwaitingPayment {
                    return false;
                }
                order.provider_session_id = Some(session_id.to_owned());
                order.updated_at = now;
                true
            })
            .await)
    }

    async fn mark_paid(
        &self,
        id: CustomOrderId,
        session_id: &str,
        shipping_address: Option<&ShippingAddress>,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        Ok(self
            .update(id, |order| {
                if order.status != CustomOrderStatus::AwaitingPayment {
                    return false;
                }
                order.status = CustomOrderStatus::Paid;
                order.provider_session_id = Some(session_id.to_owned());
                if let Some(address) = shipping_address {
                    order.shipping_address = Some(address.clone());
                }
                order.paid_at = Some(now);
                order.updated_at = now;
                true
            })
            .await)
    }
}

// =============================================================================
// Stock
// =============================================================================

struct ProductRecord {
    stock: i32,
    applied: HashSet<OrderId>,
}

/// Stock ledger with a mutex per product.
///
/// The product map is only locked long enough to find the product, so
/// decrements of different products never wait on each other.
#[derive(Default)]
pub struct MemoryStockLedger {
    products: RwLock<HashMap<ProductId, Arc<Mutex<ProductRecord>>>>,
}

#[async_trait]
impl StockLedger for MemoryStockLedger {
    async fn level(&self, product_id: ProductId) -> Result<Option<i32>, RepositoryError> {
        let record = self.products.read().await.get(&product_id).cloned();
        match record {
            Some(record) => Ok(Some(record.lock().await.stock)),
            None => Ok(None),
        }
    }

    async fn set_level(
        &self,
        product_id: ProductId,
        _name: &str,
        stock: u32,
    ) -> Result<(), RepositoryError> {
        let stock = i32::try_from(stock)
            .map_err(|_| RepositoryError::Conflict(format!("stock {stock} is out of range")))?;
        let record = {
            let mut products = self.products.write().await;
            Arc::clone(products.entry(product_id).or_insert_with(|| {
                Arc::new(Mutex::new(ProductRecord {
                    stock,
                    applied: HashSet::new(),
                }))
            }))
        };
        record.lock().await.stock = stock;
        Ok(())
    }

    async fn decrement(
        &self,
        decrement: &StockDecrement,
    ) -> Result<DecrementOutcome, RepositoryError> {
        let Some(record) = self.products.read().await.get(&decrement.product_id).cloned() else {
            return Ok(DecrementOutcome::UnknownProduct);
        };

        let mut record = record.lock().await;
        if record.applied.contains(&decrement.order_id) {
            return Ok(DecrementOutcome::AlreadyApplied);
        }
        let outcome = clamp_decrement(record.stock, decrement.quantity);
        if let DecrementOutcome::Applied { remaining, .. } = outcome {
            record.stock = remaining;
            record.applied.insert(decrement.order_id);
        }
        Ok(outcome)
    }
}

// =============================================================================
// Webhook events
// =============================================================================

#[derive(Default)]
pub struct MemoryWebhookEventStore {
    processed: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

#[async_trait]
impl WebhookEventStore for MemoryWebhookEventStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.processed.lock().await.contains_key(event_id))
    }

    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut processed = self.processed.lock().await;
        if processed.contains_key(event_id) {
            return Ok(false);
        }
        processed.insert(event_id.to_owned(), (event_type.to_owned(), now));
        Ok(true)
    }
}

// =============================================================================
// Rate limits
// =============================================================================

/// Rate-limit windows in a `moka` cache.
///
/// Each hit is a single atomic compute on the key's entry, so concurrent
/// hits on one key serialize without blocking other keys.
#[derive(Clone)]
pub struct MemoryRateLimitStore {
    windows: Cache<String, WindowState>,
}

impl MemoryRateLimitStore {
    #[must_use]
    pub fn new() -> Self {
        let windows = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(24 * 60 * 60))
            .build();
        Self { windows }
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RepositoryError> {
        let result = self
            .windows
            .entry(key.to_owned())
            .and_compute_with(|entry| {
                let next = WindowState::hit(entry.map(moka::Entry::into_value), window, now);
                std::future::ready(Op::Put(next))
            })
            .await;

        match result {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry) => Ok(entry.into_value()),
            CompResult::Removed(_) | CompResult::StillNone(_) => Ok(WindowState {
                count: 1,
                reset_at: window_end(now, window),
            }),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let expired: Vec<Arc<String>> = self
            .windows
            .iter()
            .filter(|(_, state)| state.reset_at <= now)
            .map(|(key, _)| key)
            .collect();
        for key in &expired {
            self.windows.invalidate(key.as_str()).await;
        }
        Ok(u64::try_from(expired.len()).unwrap_or(u64::MAX))
    }
}

// =============================================================================
// Outbox
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Dead,
}

#[derive(Debug, Clone)]
struct OutboxEntry {
    notification: Notification,
    attempts: u32,
    next_attempt_at: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    status: OutboxStatus,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryOutboxStore {
    entries: Mutex<HashMap<OutboxTaskId, OutboxEntry>>,
}

impl MemoryOutboxStore {
    /// Every queued notification with its status, oldest first.
    pub async fn snapshot(&self) -> Vec<(Notification, OutboxStatus)> {
        let entries = self.entries.lock().await;
        let mut all: Vec<&OutboxEntry> = entries.values().collect();
        all.sort_by_key(|e| e.created_at);
        all.into_iter()
            .map(|e| (e.notification.clone(), e.status))
            .collect()
    }

    /// Last recorded delivery error for a task.
    pub async fn last_error(&self, id: OutboxTaskId) -> Option<String> {
        self.entries
            .lock()
            .await
            .get(&id)
            .and_then(|e| e.last_error.clone())
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn enqueue(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<OutboxTaskId, RepositoryError> {
        let id = OutboxTaskId::generate();
        self.entries.lock().await.insert(
            id,
            OutboxEntry {
                notification: notification.clone(),
                attempts: 0,
                next_attempt_at: now,
                locked_until: None,
                status: OutboxStatus::Pending,
                last_error: None,
                created_at: now,
            },
        );
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxTask>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut entries = self.entries.lock().await;
        let mut due: Vec<(OutboxTaskId, DateTime<Utc>)> = entries
            .iter()
            .filter(|(_, e)| {
                e.status == OutboxStatus::Pending
                    && e.next_attempt_at <= now
                    && e.locked_until.is_none_or(|until| until <= now)
            })
            .map(|(id, e)| (*id, e.next_attempt_at))
            .collect();
        due.sort_by_key(|(_, at)| *at);

        let locked_until = window_end(now, lease);
        let mut claimed = Vec::new();
        for (id, _) in due.into_iter().take(limit) {
            if let Some(entry) = entries.get_mut(&id) {
                entry.locked_until = Some(locked_until);
                claimed.push(OutboxTask {
                    id,
                    notification: entry.notification.clone(),
                    attempts: entry.attempts,
                    created_at: entry.created_at,
                });
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: OutboxTaskId, _now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        entry.status = OutboxStatus::Delivered;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.locked_until = None;
        entry.last_error = None;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        entry.attempts = attempts;
        entry.next_attempt_at = next_attempt_at;
        entry.locked_until = None;
        entry.last_error = Some(error.to_owned());
        Ok(())
    }

    async fn mark_dead(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        entry.status = OutboxStatus::Dead;
        entry.attempts = attempts;
        entry.locked_until = None;
        entry.last_error = Some(error.to_owned());
        Ok(())
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Default)]
pub struct MemoryAccountRepository {
    customers: RwLock<HashMap<Email, Credentials<Customer>>>,
    admins: RwLock<HashMap<String, Credentials<AdminUser>>>,
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create_customer(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
    ) -> Result<Customer, RepositoryError> {
        let mut customers = self.customers.write().await;
        if customers.contains_key(email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let customer = Customer {
            id: CustomerId::generate(),
            email: email.clone(),
            name: name.to_owned(),
            created_at: Utc::now(),
        };
        customers.insert(
            email.clone(),
            Credentials {
                account: customer.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        Ok(customer)
    }

    async fn customer_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials<Customer>>, RepositoryError> {
        Ok(self.customers.read().await.get(email).cloned())
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<AdminUser, RepositoryError> {
        let mut admins = self.admins.write().await;
        if admins.contains_key(username) {
            return Err(RepositoryError::Conflict(
                "username already exists".to_owned(),
            ));
        }
        let admin = AdminUser {
            id: AdminUserId::generate(),
            username: username.to_owned(),
            created_at: Utc::now(),
        };
        admins.insert(
            username.to_owned(),
            Credentials {
                account: admin.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        Ok(admin)
    }

    async fn admin_credentials(
        &self,
        username: &str,
    ) -> Result<Option<Credentials<AdminUser>>, RepositoryError> {
        Ok(self.admins.read().await.get(username).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::{CustomerContact, LineItem, OrderNumber};
    use chrono::TimeDelta;

    use super::*;

    fn new_order(session_id: &str) -> NewOrder {
        NewOrder {
            id: OrderId::generate(),
            order_number: OrderNumber::from_string(format!("ORD-{session_id}")),
            contact: CustomerContact {
                email: Email::parse("buyer@shop.example").unwrap(),
                name: "Buyer".to_owned(),
                phone: None,
            },
            customer_id: None,
            line_items: vec![LineItem {
                product_id: None,
                name: "Ring".to_owned(),
                unit_price: Decimal::new(15000, 2),
                quantity: 1,
            }],
            currency: CurrencyCode::USD,
            subtotal_minor: 15000,
            shipping_minor: 0,
            tax_minor: 0,
            total_minor: 15000,
            provider_session_id: session_id.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_insert_for_session_is_idempotent() {
        let repo = MemoryOrderRepository::default();
        let first = repo.insert_for_session(&new_order("cs_1")).await.unwrap();
        let again = repo.insert_for_session(&new_order("cs_1")).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(repo.list(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_paid_only_once() {
        let repo = MemoryOrderRepository::default();
        repo.insert_for_session(&new_order("cs_1")).await.unwrap();
        let now = Utc::now();

        let paid = repo
            .mark_paid("cs_1", &PaymentSettlement::default(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Processing);
        assert_eq!(paid.paid_at, Some(now));

        let replay = repo
            .mark_paid("cs_1", &PaymentSettlement::default(), now)
            .await
            .unwrap();
        assert!(replay.is_none());
        assert!(repo.mark_payment_failed("cs_1", now).await.unwrap().is_none());
        assert!(repo.cancel_unpaid("cs_1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_patch_compares_and_sets() {
        let repo = MemoryOrderRepository::default();
        let order = repo.insert_for_session(&new_order("cs_1")).await.unwrap();
        let patch = OrderPatch {
            notes: Some("gift wrap".to_owned()),
            ..OrderPatch::default()
        };

        let stale = (OrderStatus::Processing, PaymentStatus::Paid);
        assert!(
            repo.apply_patch(order.id, stale, &patch, Utc::now())
                .await
                .unwrap()
                .is_none()
        );

        let current = (order.status, order.payment_status);
        let patched = repo
            .apply_patch(order.id, current, &patch, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patched.notes.as_deref(), Some("gift wrap"));
    }

    #[tokio::test]
    async fn test_stock_decrement_once_per_order() {
        let ledger = MemoryStockLedger::default();
        let product_id = ProductId::generate();
        ledger.set_level(product_id, "Ring", 5).await.unwrap();

        let decrement = StockDecrement {
            order_id: OrderId::generate(),
            product_id,
            quantity: 2,
        };
        assert!(matches!(
            ledger.decrement(&decrement).await.unwrap(),
            DecrementOutcome::Applied { remaining: 3, .. }
        ));
        assert_eq!(
            ledger.decrement(&decrement).await.unwrap(),
            DecrementOutcome::AlreadyApplied
        );
        assert_eq!(ledger.level(product_id).await.unwrap(), Some(3));

        let unknown = StockDecrement {
            product_id: ProductId::generate(),
            ..decrement
        };
        assert_eq!(
            ledger.decrement(&unknown).await.unwrap(),
            DecrementOutcome::UnknownProduct
        );
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_go_negative() {
        let ledger = Arc::new(MemoryStockLedger::default());
        let product_id = ProductId::generate();
        ledger.set_level(product_id, "Ring", 10).await.unwrap();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    ledger
                        .decrement(&StockDecrement {
                            order_id: OrderId::generate(),
                            product_id,
                            quantity: 1,
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.level(product_id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_rate_limit_purge() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();
        store.hit("a", Duration::from_secs(1), now).await.unwrap();
        store.hit("b", Duration::from_secs(600), now).await.unwrap();

        let purged = store
            .purge_expired(now + TimeDelta::seconds(2))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }

    #[tokio::test]
    async fn test_outbox_lease_and_reschedule() {
        let outbox = MemoryOutboxStore::default();
        let now = Utc::now();
        let notification = Notification::AdminNewOrder {
            reference: "ORD-1".to_owned(),
            customer_email: Email::parse("a@b.co").unwrap(),
            total_minor: 100,
            currency: CurrencyCode::USD,
        };
        let id = outbox.enqueue(&notification, now).await.unwrap();

        let lease = Duration::from_secs(60);
        let claimed = outbox.claim_due(now, 10, lease).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(outbox.claim_due(now, 10, lease).await.unwrap().is_empty());

        let retry_at = now + TimeDelta::seconds(30);
        outbox.reschedule(id, 1, retry_at, "smtp down").await.unwrap();
        assert!(outbox.claim_due(now, 10, lease).await.unwrap().is_empty());
        let retried = outbox.claim_due(retry_at, 10, lease).await.unwrap();
        assert_eq!(retried.first().map(|t| t.attempts), Some(1));
        assert_eq!(outbox.last_error(id).await.as_deref(), Some("smtp down"));

        outbox.complete(id, retry_at).await.unwrap();
        assert_eq!(
            outbox.snapshot().await,
            vec![(notification, OutboxStatus::Delivered)]
        );
    }
}
