//! Merchant API HTTP client.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "status": true, "msg": "ok", "data": ... }
//! ```
//!
//! Some deployments send `success` instead of `status`. A `false` flag carries
//! the failure reason in `msg`.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::instrument;

use dispatch_sync_core::TrackingKey;

use super::auth::{self, ProviderSession};
use super::orders::{
    CreateOrderPayload, CreatedOrder, RawRemoteOrder, RemoteOrder, parse_remote_orders,
};
use super::reference::{City, RawReferenceEntry, Region, RemoteStatus};
use super::{DeliveryProvider, ProviderError};
use crate::config::ProviderConfig;

/// Response envelope shared by every merchant API endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    status: Option<serde_json::Value>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn succeeded(&self) -> bool {
        if self.success == Some(false) {
            return false;
        }
        match &self.status {
            Some(serde_json::Value::Bool(ok)) => *ok,
            Some(serde_json::Value::String(s)) => {
                !matches!(s.to_lowercase().as_str(), "error" | "fail" | "failed" | "false")
            }
            Some(serde_json::Value::Number(n)) => n.as_i64().is_none_or(|n| n < 400),
            _ => true,
        }
    }

    /// Unwrap the payload, or the provider's failure message.
    pub(crate) fn into_data(self) -> Result<T, String> {
        if !self.succeeded() {
            return Err(self
                .msg
                .unwrap_or_else(|| "Provider reported failure".to_string()));
        }
        self.data
            .ok_or_else(|| self.msg.unwrap_or_else(|| "No data in response".to_string()))
    }

    /// Unwrap the payload, treating a missing `data` field as absent.
    fn into_optional_data(self) -> Result<Option<T>, String> {
        if self.succeeded() {
            Ok(self.data)
        } else {
            Err(self
                .msg
                .unwrap_or_else(|| "Provider reported failure".to_string()))
        }
    }
}

/// Check transport-level failures and decode the response envelope.
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<ApiEnvelope<T>, ProviderError> {
    let status = response.status();

    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return Err(ProviderError::RateLimited(retry_after));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::TokenExpired);
    }

    if status.is_server_error() {
        return Err(ProviderError::Unavailable(status.as_u16()));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// HTTP client for one provider's merchant API.
///
/// Holds no tokens. Callers pass the token of whichever account they act as,
/// so a single client serves every staff member.
#[derive(Clone)]
pub struct ProviderClient {
    inner: Arc<ProviderClientInner>,
}

struct ProviderClientInner {
    client: reqwest::Client,
    base_url: url::Url,
    name: String,
}

impl ProviderClient {
    /// Create a client for the configured provider.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        // Url::join drops the last path segment unless the base ends with '/'
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(ProviderClientInner {
                client,
                base_url,
                name: config.name.clone(),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ProviderError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ProviderError::Api(format!("Invalid endpoint {path}: {e}")))
    }

    /// Authenticated GET returning the decoded envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        token: &SecretString,
        url: url::Url,
    ) -> Result<ApiEnvelope<T>, ProviderError> {
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        read_envelope(response).await
    }

    async fn list_reference(
        &self,
        token: &SecretString,
        url: url::Url,
    ) -> Result<Vec<RawReferenceEntry>, ProviderError> {
        let envelope: ApiEnvelope<Vec<serde_json::Value>> = self.get(token, url).await?;
        let values = envelope.into_data().map_err(ProviderError::Api)?;
        Ok(values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }
}

#[async_trait]
impl DeliveryProvider for ProviderClient {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<ProviderSession, ProviderError> {
        let endpoint = self.endpoint("auth/login")?;
        auth::login(&self.inner.client, endpoint, username, password).await
    }

    #[instrument(skip(self, token), fields(provider = %self.inner.name))]
    async fn list_merchant_orders(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteOrder>, ProviderError> {
        let url = self.endpoint("merchant/orders")?;
        let envelope: ApiEnvelope<Vec<serde_json::Value>> = self.get(token, url).await?;
        let values = envelope.into_data().map_err(ProviderError::Api)?;
        let orders = parse_remote_orders(values);
        tracing::debug!(count = orders.len(), "Fetched merchant orders");
        Ok(orders)
    }

    #[instrument(skip(self, token), fields(provider = %self.inner.name, tracking_key = %key))]
    async fn get_order_by_tracking_key(
        &self,
        token: &SecretString,
        key: &TrackingKey,
    ) -> Result<Option<RemoteOrder>, ProviderError> {
        let mut url = self.endpoint("merchant/orders/lookup")?;
        url.query_pairs_mut()
            .append_pair("tracking_key", key.as_str());

        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: ApiEnvelope<serde_json::Value> = read_envelope(response).await?;
        let data = envelope
            .into_optional_data()
            .map_err(ProviderError::Api)?;

        // Lookups answer with a single object, a list, or nothing
        let record = match data {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Array(items)) => items.into_iter().next(),
            Some(other) => Some(other),
        };

        Ok(record
            .map(serde_json::from_value::<RawRemoteOrder>)
            .transpose()?
            .map(RemoteOrder::from)
            .filter(|order| !order.is_malformed()))
    }

    #[instrument(skip(self, token, payload), fields(provider = %self.inner.name))]
    async fn create_order(
        &self,
        token: &SecretString,
        payload: &CreateOrderPayload,
    ) -> Result<CreatedOrder, ProviderError> {
        let url = self.endpoint("merchant/orders")?;
        let response = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(payload)
            .send()
            .await?;

        let envelope: ApiEnvelope<RawRemoteOrder> = read_envelope(response).await?;
        let created = RemoteOrder::from(envelope.into_data().map_err(ProviderError::Api)?);

        match (created.remote_id, created.tracking_key) {
            (Some(remote_id), Some(tracking_key)) => Ok(CreatedOrder {
                remote_id,
                tracking_key,
            }),
            _ => Err(ProviderError::Api(
                "Created order is missing its identifiers".to_string(),
            )),
        }
    }

    async fn list_cities(&self, token: &SecretString) -> Result<Vec<City>, ProviderError> {
        let url = self.endpoint("reference/cities")?;
        Ok(self
            .list_reference(token, url)
            .await?
            .into_iter()
            .filter_map(RawReferenceEntry::into_city)
            .collect())
    }

    async fn list_regions_by_city(
        &self,
        token: &SecretString,
        city_id: &str,
    ) -> Result<Vec<Region>, ProviderError> {
        let mut url = self.endpoint("reference/regions")?;
        url.query_pairs_mut().append_pair("city_id", city_id);
        Ok(self
            .list_reference(token, url)
            .await?
            .into_iter()
            .filter_map(|entry| entry.into_region(city_id))
            .collect())
    }

    async fn list_order_statuses(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteStatus>, ProviderError> {
        let url = self.endpoint("reference/order-statuses")?;
        Ok(self
            .list_reference(token, url)
            .await?
            .into_iter()
            .filter_map(RawReferenceEntry::into_status)
            .collect())
    }
}
