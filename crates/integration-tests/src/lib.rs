//! Integration tests for Dispatch Sync.
//!
//! The engine runs against in-memory fakes of every collaborator seam: the
//! order and credential stores, the event sink, the flag store and the
//! delivery provider. No database or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dispatch-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `reconciliation` - Sweeps, status mapping and stock release
//! - `deletion_guard` - Verification before irreversible deletes
//! - `accounts` - Credential resolution and account lifecycle
//! - `orchestrator` - Phases, overlap rejection and the periodic timer
//! - `api` - HTTP surface with a lazily connected pool

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use dispatch_sync_core::{
    AccountUsername, CredentialId, DeliveryFee, OrderId, OrderStatus, ProductId, RemoteOrderId,
    TrackingKey, UserId, VariantId,
};
use dispatch_sync_server::config::EngineSettings;
use dispatch_sync_server::db::{
    CredentialStore, EventSink, OrderStore, RepositoryError, SettingsStore,
};
use dispatch_sync_server::models::{
    LocalOrder, NewCredential, OrderFilter, OrderLineItem, OrderUpdate, ProviderCredential,
    StockRelease,
};
use dispatch_sync_server::provider::{
    City, CreateOrderPayload, CreatedOrder, DeliveryProvider, ProviderError, ProviderSession,
    Region, RemoteOrder, RemoteStatus,
};
use dispatch_sync_server::sync::{Actor, EngineDeps, SyncEngine, SyncEvent};

/// Provider name every fake record is filed under.
pub const PROVIDER: &str = "default";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Builders
// =============================================================================

/// A pending order owned by `owner`, created `age` ago.
#[must_use]
pub fn order(id: i32, owner: i32, key: &str, age: chrono::Duration) -> LocalOrder {
    LocalOrder {
        id: OrderId::new(id),
        owner_id: UserId::new(owner),
        tracking_key: TrackingKey::parse(key),
        remote_order_id: None,
        status: OrderStatus::Pending,
        remote_status_text: None,
        funds_confirmed: false,
        delivery_fee: None,
        created_at: Utc::now() - age,
        provider: PROVIDER.to_string(),
    }
}

/// A credential row for `owner` that expires `expires_in` from now.
#[must_use]
pub fn credential(
    id: i32,
    owner: i32,
    username: &str,
    token: &str,
    expires_in: chrono::Duration,
    is_default: bool,
) -> ProviderCredential {
    let now = Utc::now();
    ProviderCredential {
        id: CredentialId::new(id),
        owner_id: UserId::new(owner),
        provider: PROVIDER.to_string(),
        account_username: AccountUsername::new(username),
        token: SecretString::from(token),
        expires_at: now + expires_in,
        is_default,
        last_used_at: None,
        merchant_id: None,
        created_at: now - chrono::Duration::days(1),
    }
}

/// A remote order record with an id, a tracking key and free status text.
#[must_use]
pub fn remote(id: &str, key: &str, status_text: &str) -> RemoteOrder {
    RemoteOrder {
        remote_id: RemoteOrderId::parse(id),
        tracking_key: TrackingKey::parse(key),
        alias_tracking_key: None,
        status_code: None,
        status_text: Some(status_text.to_string()),
        funds_confirmed: false,
        delivery_fee: None,
    }
}

/// A fee of a whole number of currency units.
#[must_use]
pub fn fee(units: i64) -> Option<DeliveryFee> {
    DeliveryFee::new(rust_decimal::Decimal::from(units))
}

/// Engine settings with no countdown and no settle delay.
#[must_use]
pub fn engine_settings() -> EngineSettings {
    EngineSettings {
        provider_name: PROVIDER.to_string(),
        countdown: Duration::ZERO,
        deletion_settle: Duration::ZERO,
        deletion_retries: 1,
        deletion_grace: chrono::Duration::minutes(10),
        ..EngineSettings::default()
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Default)]
struct OrdersState {
    orders: BTreeMap<OrderId, LocalOrder>,
    line_items: HashMap<OrderId, Vec<OrderLineItem>>,
    reserved: HashMap<(ProductId, Option<VariantId>), i32>,
}

impl OrdersState {
    fn release(&mut self, id: OrderId) -> Vec<StockRelease> {
        let items = self.line_items.get(&id).cloned().unwrap_or_default();
        for item in &items {
            let reserved = self
                .reserved
                .entry((item.product_id, item.variant_id))
                .or_default();
            *reserved = (*reserved - item.quantity).max(0);
        }
        items.into_iter().map(StockRelease::from).collect()
    }
}

/// Order store with reserved inventory, kept in memory.
#[derive(Default)]
pub struct InMemoryOrders {
    state: Mutex<OrdersState>,
}

impl InMemoryOrders {
    /// Store an order.
    pub fn insert(&self, order: LocalOrder) {
        lock(&self.state).orders.insert(order.id, order);
    }

    /// Attach a line item and reserve its quantity.
    pub fn reserve(&self, id: OrderId, product: i32, quantity: i32) {
        let mut state = lock(&self.state);
        let item = OrderLineItem {
            product_id: ProductId::new(product),
            variant_id: None,
            quantity,
        };
        *state
            .reserved
            .entry((item.product_id, item.variant_id))
            .or_default() += quantity;
        state.line_items.entry(id).or_default().push(item);
    }

    /// Current copy of an order.
    #[must_use]
    pub fn get(&self, id: i32) -> Option<LocalOrder> {
        lock(&self.state).orders.get(&OrderId::new(id)).cloned()
    }

    /// Quantity reserved for a product.
    #[must_use]
    pub fn reserved(&self, product: i32) -> i32 {
        lock(&self.state)
            .reserved
            .get(&(ProductId::new(product), None))
            .copied()
            .unwrap_or_default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Whether no orders are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrders {
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<LocalOrder>, RepositoryError> {
        let mut orders: Vec<LocalOrder> = lock(&self.state)
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<LocalOrder>, RepositoryError> {
        Ok(lock(&self.state).orders.get(&id).cloned())
    }

    async fn find_by_tracking_key(
        &self,
        provider: &str,
        key: &TrackingKey,
    ) -> Result<Option<LocalOrder>, RepositoryError> {
        Ok(lock(&self.state)
            .orders
            .values()
            .find(|order| order.provider == provider && order.tracking_key.as_ref() == Some(key))
            .cloned())
    }

    async fn line_items(&self, id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError> {
        Ok(lock(&self.state)
            .line_items
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_update(
        &self,
        update: &OrderUpdate,
    ) -> Result<Vec<StockRelease>, RepositoryError> {
        let mut state = lock(&self.state);
        let order = state
            .orders
            .get_mut(&update.order_id)
            .ok_or(RepositoryError::NotFound)?;
        let already_released = order.status.releases_stock();
        update.apply_to(order);

        Ok(if update.release_stock && !already_released {
            state.release(update.order_id)
        } else {
            Vec::new()
        })
    }

    async fn delete_releasing_stock(
        &self,
        verified: &LocalOrder,
    ) -> Result<Vec<StockRelease>, RepositoryError> {
        let id = verified.id;
        let mut state = lock(&self.state);
        let current = state.orders.get(&id).ok_or(RepositoryError::NotFound)?;
        if !verified.still_deletable_as(current) {
            return Err(RepositoryError::Changed);
        }
        state.orders.remove(&id);
        let released = state.release(id);
        state.line_items.remove(&id);
        Ok(released)
    }

    async fn record_handoff(
        &self,
        id: OrderId,
        remote_id: &RemoteOrderId,
        tracking_key: &TrackingKey,
    ) -> Result<bool, RepositoryError> {
        let mut state = lock(&self.state);
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.remote_order_id.is_some() {
            return Ok(false);
        }
        order.remote_order_id = Some(remote_id.clone());
        order.tracking_key = Some(tracking_key.clone());
        Ok(true)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credential store kept in memory.
pub struct InMemoryCredentials {
    rows: Mutex<Vec<ProviderCredential>>,
    next_id: AtomicI32,
}

impl Default for InMemoryCredentials {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1000),
        }
    }
}

impl InMemoryCredentials {
    /// Store a row as-is, bypassing every account rule.
    pub fn insert(&self, credential: ProviderCredential) {
        lock(&self.rows).push(credential);
    }

    /// Every stored row.
    #[must_use]
    pub fn all(&self) -> Vec<ProviderCredential> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn list_credentials(
        &self,
        owner: UserId,
        provider: &str,
    ) -> Result<Vec<ProviderCredential>, RepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| row.owner_id == owner && row.provider == provider)
            .cloned()
            .collect())
    }

    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<ProviderCredential, RepositoryError> {
        let mut rows = lock(&self.rows);
        if rows.iter().any(|row| {
            row.owner_id == credential.owner_id
                && row.provider == credential.provider
                && row.account_username == credential.account_username
        }) {
            return Err(RepositoryError::Conflict("duplicate username".to_string()));
        }

        let row = ProviderCredential {
            id: CredentialId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
            owner_id: credential.owner_id,
            provider: credential.provider.clone(),
            account_username: credential.account_username.clone(),
            token: credential.token.clone(),
            expires_at: credential.expires_at,
            is_default: credential.is_default,
            last_used_at: None,
            merchant_id: credential.merchant_id.clone(),
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn update_token(
        &self,
        id: CredentialId,
        token: &SecretString,
        expires_at: DateTime<Utc>,
        merchant_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut rows = lock(&self.rows);
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(RepositoryError::NotFound)?;
        row.token = token.clone();
        row.expires_at = expires_at;
        if let Some(merchant_id) = merchant_id {
            row.merchant_id = Some(merchant_id.to_string());
        }
        Ok(())
    }

    async fn delete_credential(&self, id: CredentialId) -> Result<(), RepositoryError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_default(
        &self,
        owner: UserId,
        provider: &str,
        id: CredentialId,
    ) -> Result<(), RepositoryError> {
        let mut rows = lock(&self.rows);
        if !rows.iter().any(|row| row.id == id) {
            return Err(RepositoryError::NotFound);
        }
        for row in rows
            .iter_mut()
            .filter(|row| row.owner_id == owner && row.provider == provider)
        {
            row.is_default = row.id == id;
        }
        Ok(())
    }

    async fn touch(&self, id: CredentialId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(row) = lock(&self.rows).iter_mut().find(|row| row.id == id) {
            row.last_used_at = Some(at);
        }
        Ok(())
    }
}

// =============================================================================
// Events and flags
// =============================================================================

/// Event sink that keeps every appended event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    /// Every event appended so far.
    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        lock(&self.events).clone()
    }

    /// Number of appended events of one kind.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn append(&self, event: &SyncEvent) -> Result<(), RepositoryError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

/// Flag store kept in memory.
#[derive(Default)]
pub struct MemorySettings {
    flags: Mutex<HashMap<(UserId, String), bool>>,
    read_delay: Mutex<Option<Duration>>,
}

impl MemorySettings {
    /// Delay the result of every flag read, to interleave engine calls.
    pub fn delay_reads(&self, delay: Duration) {
        *lock(&self.read_delay) = Some(delay);
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get_flag(&self, user: UserId, key: &str) -> Result<bool, RepositoryError> {
        let value = lock(&self.flags)
            .get(&(user, key.to_string()))
            .copied()
            .unwrap_or(false);
        // The value is read before the delay, so a slow read can be stale
        let delay = *lock(&self.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(value)
    }

    async fn set_flag(&self, user: UserId, key: &str, value: bool) -> Result<(), RepositoryError> {
        lock(&self.flags).insert((user, key.to_string()), value);
        Ok(())
    }
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Default)]
struct ProviderState {
    /// Orders returned by the listing, per token.
    listings: HashMap<String, Vec<RemoteOrder>>,
    /// Orders found by direct lookup but left out of the listing, per token.
    unlisted: HashMap<String, Vec<RemoteOrder>>,
    failing_listings: HashSet<String>,
    failing_lookups: bool,
    /// Lookups that fail before lookups succeed again.
    lookup_failures: usize,
    listing_delay: Option<Duration>,
    statuses: Vec<RemoteStatus>,
    next_remote_id: u64,
}

/// Scriptable delivery provider.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
    listing_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    lookup_tokens: Mutex<Vec<String>>,
}

impl FakeProvider {
    /// Add an order to the listing of a token.
    pub fn list(&self, token: &str, order: RemoteOrder) {
        lock(&self.state)
            .listings
            .entry(token.to_string())
            .or_default()
            .push(order);
    }

    /// Replace the whole listing of a token.
    pub fn set_listing(&self, token: &str, orders: Vec<RemoteOrder>) {
        lock(&self.state)
            .listings
            .insert(token.to_string(), orders);
    }

    /// Add an order that only a direct lookup under `token` finds.
    pub fn hide_from_listing(&self, token: &str, order: RemoteOrder) {
        lock(&self.state)
            .unlisted
            .entry(token.to_string())
            .or_default()
            .push(order);
    }

    /// Make listings under `token` fail.
    pub fn fail_listing(&self, token: &str) {
        lock(&self.state)
            .failing_listings
            .insert(token.to_string());
    }

    /// Make every direct lookup fail.
    pub fn fail_lookups(&self) {
        lock(&self.state).failing_lookups = true;
    }

    /// Make the next `count` direct lookups fail.
    pub fn fail_next_lookups(&self, count: usize) {
        lock(&self.state).lookup_failures = count;
    }

    /// Delay every listing, to hold a sweep open.
    pub fn delay_listings(&self, delay: Duration) {
        lock(&self.state).listing_delay = Some(delay);
    }

    /// Serve a status vocabulary entry.
    pub fn status(&self, code: &str, text: &str) {
        lock(&self.state).statuses.push(RemoteStatus {
            code: code.to_string(),
            text: text.to_string(),
        });
    }

    /// Number of listing calls so far.
    #[must_use]
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    /// Number of direct lookups so far.
    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Tokens direct lookups were made with, deduplicated.
    #[must_use]
    pub fn lookup_tokens(&self) -> HashSet<String> {
        lock(&self.lookup_tokens).iter().cloned().collect()
    }
}

#[async_trait]
impl DeliveryProvider for FakeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<ProviderSession, ProviderError> {
        if password.expose_secret() != "correct-horse" {
            return Err(ProviderError::AuthenticationFailed(
                "invalid username or password".to_string(),
            ));
        }
        Ok(ProviderSession {
            token: SecretString::from(format!("tok_{}", username.to_lowercase())),
            expires_at: Utc::now() + chrono::Duration::days(7),
            merchant_id: Some("m-1".to_string()),
        })
    }

    async fn list_merchant_orders(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteOrder>, ProviderError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let token = token.expose_secret();

        let delay = lock(&self.state).listing_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = lock(&self.state);
        if state.failing_listings.contains(token) {
            return Err(ProviderError::Unavailable(503));
        }
        Ok(state.listings.get(token).cloned().unwrap_or_default())
    }

    async fn get_order_by_tracking_key(
        &self,
        token: &SecretString,
        key: &TrackingKey,
    ) -> Result<Option<RemoteOrder>, ProviderError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let token = token.expose_secret();
        lock(&self.lookup_tokens).push(token.to_string());

        let mut state = lock(&self.state);
        if state.failing_lookups {
            return Err(ProviderError::Unavailable(503));
        }
        if state.lookup_failures > 0 {
            state.lookup_failures -= 1;
            return Err(ProviderError::Unavailable(503));
        }

        let mut visible = state
            .listings
            .get(token)
            .into_iter()
            .chain(state.unlisted.get(token))
            .flatten();
        Ok(visible
            .find(|order| {
                order.tracking_keys().any(|candidate| candidate == key)
                    || order
                        .remote_id
                        .as_ref()
                        .is_some_and(|id| id.as_str() == key.as_str())
            })
            .cloned())
    }

    async fn create_order(
        &self,
        token: &SecretString,
        payload: &CreateOrderPayload,
    ) -> Result<CreatedOrder, ProviderError> {
        let mut state = lock(&self.state);
        state.next_remote_id += 1;
        let id = 90_000 + state.next_remote_id;

        let remote_id = RemoteOrderId::parse(&id.to_string())
            .ok_or_else(|| ProviderError::Api("empty remote id".to_string()))?;
        let tracking_key = TrackingKey::parse(&format!("RY-{id}"))
            .ok_or_else(|| ProviderError::Api("empty tracking key".to_string()))?;

        let mut listed = remote(remote_id.as_str(), tracking_key.as_str(), "pending");
        listed.alias_tracking_key = TrackingKey::parse(&payload.merchant_reference);
        state
            .listings
            .entry(token.expose_secret().to_string())
            .or_default()
            .push(listed);

        Ok(CreatedOrder {
            remote_id,
            tracking_key,
        })
    }

    async fn list_cities(&self, _token: &SecretString) -> Result<Vec<City>, ProviderError> {
        Ok(vec![City {
            id: "1".to_string(),
            name: "Baghdad".to_string(),
        }])
    }

    async fn list_regions_by_city(
        &self,
        _token: &SecretString,
        city_id: &str,
    ) -> Result<Vec<Region>, ProviderError> {
        Ok(vec![Region {
            id: "10".to_string(),
            name: "Karrada".to_string(),
            city_id: city_id.to_string(),
        }])
    }

    async fn list_order_statuses(
        &self,
        _token: &SecretString,
    ) -> Result<Vec<RemoteStatus>, ProviderError> {
        Ok(lock(&self.state).statuses.clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Every fake wired together.
#[derive(Default)]
pub struct Harness {
    pub orders: Arc<InMemoryOrders>,
    pub credentials: Arc<InMemoryCredentials>,
    pub provider: Arc<FakeProvider>,
    pub events: Arc<RecordingSink>,
    pub flags: Arc<MemorySettings>,
}

impl Harness {
    /// Fresh fakes with nothing stored.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators for an engine.
    #[must_use]
    pub fn deps(&self) -> EngineDeps {
        EngineDeps {
            orders: self.orders.clone(),
            credentials: self.credentials.clone(),
            settings: self.flags.clone(),
            events: self.events.clone(),
            provider: self.provider.clone(),
            funds: None,
        }
    }

    /// An engine with [`engine_settings`].
    #[must_use]
    pub fn engine(&self, actor: Actor) -> SyncEngine {
        SyncEngine::new(actor, self.deps(), engine_settings())
    }

    /// An engine with custom settings.
    #[must_use]
    pub fn engine_with(&self, actor: Actor, settings: EngineSettings) -> SyncEngine {
        SyncEngine::new(actor, self.deps(), settings)
    }
}
