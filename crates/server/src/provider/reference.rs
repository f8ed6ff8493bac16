//! Provider reference data: cities, regions and the status vocabulary.
//!
//! Cities and regions change rarely, so [`ReferenceData`] caches them with
//! `moka` per provider account.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{DeliveryProvider, ProviderError};

/// A destination city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct City {
    /// Provider id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A region within a city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    /// Provider id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// City the region belongs to.
    pub city_id: String,
}

/// One entry of the provider's status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    /// Status code as sent on orders.
    pub code: String,
    /// Human-readable status text.
    pub text: String,
}

/// Raw reference entry. All three lists share the `{id, name}` shape.
#[derive(Debug, Deserialize)]
pub(crate) struct RawReferenceEntry {
    #[serde(default, alias = "code")]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "title", alias = "status", alias = "text")]
    name: Option<String>,
    #[serde(default)]
    city_id: Option<serde_json::Value>,
}

impl RawReferenceEntry {
    fn parts(self) -> Option<(String, String, Option<String>)> {
        let id = scalar(self.id.as_ref()?)?;
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        Some((id, name, self.city_id.as_ref().and_then(scalar)))
    }

    pub(crate) fn into_city(self) -> Option<City> {
        self.parts().map(|(id, name, _)| City { id, name })
    }

    pub(crate) fn into_region(self, requested_city: &str) -> Option<Region> {
        self.parts().map(|(id, name, city_id)| Region {
            id,
            name,
            city_id: city_id.unwrap_or_else(|| requested_city.to_string()),
        })
    }

    pub(crate) fn into_status(self) -> Option<RemoteStatus> {
        self.parts().map(|(code, text, _)| RemoteStatus { code, text })
    }
}

fn scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
enum CachedReference {
    Cities(Arc<Vec<City>>),
    Regions(Arc<Vec<Region>>),
}

/// Cached cities and regions for the order hand-off form.
#[derive(Clone)]
pub struct ReferenceData {
    provider: Arc<dyn DeliveryProvider>,
    cache: Cache<String, CachedReference>,
}

impl ReferenceData {
    /// Create a reference cache over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn DeliveryProvider>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(ttl)
            .build();
        Self { provider, cache }
    }

    /// Cities visible to an account.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the list is not cached and the provider call fails.
    #[instrument(skip(self, token))]
    pub async fn cities(
        &self,
        account: &str,
        token: &SecretString,
    ) -> Result<Arc<Vec<City>>, ProviderError> {
        let cache_key = format!("cities:{account}");
        if let Some(CachedReference::Cities(cities)) = self.cache.get(&cache_key).await {
            debug!("Cache hit for cities");
            return Ok(cities);
        }

        let cities = Arc::new(self.provider.list_cities(token).await?);
        self.cache
            .insert(cache_key, CachedReference::Cities(Arc::clone(&cities)))
            .await;
        Ok(cities)
    }

    /// Regions of a city visible to an account.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the list is not cached and the provider call fails.
    #[instrument(skip(self, token))]
    pub async fn regions(
        &self,
        account: &str,
        token: &SecretString,
        city_id: &str,
    ) -> Result<Arc<Vec<Region>>, ProviderError> {
        let cache_key = format!("regions:{account}:{city_id}");
        if let Some(CachedReference::Regions(regions)) = self.cache.get(&cache_key).await {
            debug!("Cache hit for regions");
            return Ok(regions);
        }

        let regions = Arc::new(self.provider.list_regions_by_city(token, city_id).await?);
        self.cache
            .insert(cache_key, CachedReference::Regions(Arc::clone(&regions)))
            .await;
        Ok(regions)
    }

    /// Drop every cached list.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: serde_json::Value) -> RawReferenceEntry {
        serde_json::from_value(json).expect("valid entry")
    }

    #[test]
    fn test_city_from_numeric_id() {
        let city = entry(serde_json::json!({"id": 1, "name": "Baghdad"})).into_city();
        assert_eq!(
            city,
            Some(City {
                id: "1".to_string(),
                name: "Baghdad".to_string()
            })
        );
    }

    #[test]
    fn test_region_defaults_to_requested_city() {
        let region = entry(serde_json::json!({"id": "12", "title": "Karrada"})).into_region("1");
        assert_eq!(region.map(|r| r.city_id), Some("1".to_string()));
    }

    #[test]
    fn test_status_aliases() {
        let status = entry(serde_json::json!({"code": 4, "status": "Delivered"})).into_status();
        assert_eq!(
            status,
            Some(RemoteStatus {
                code: "4".to_string(),
                text: "Delivered".to_string()
            })
        );
    }

    #[test]
    fn test_entry_without_name_is_dropped() {
        assert_eq!(entry(serde_json::json!({"id": 3})).into_city(), None);
        assert_eq!(entry(serde_json::json!({"name": "x"})).into_city(), None);
    }
}
