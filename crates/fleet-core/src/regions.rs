use rand::seq::IndexedRandom;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Regions with less spare capacity than this are never used as fallbacks.
pub const MIN_FALLBACK_CAPACITY: i64 = 100;

/// Lazily fetched list of regions eligible as creation fallbacks.
///
/// The list is fetched once and never refreshed. A failed or empty fetch
/// leaves the cache empty, so the next call tries again.
pub struct RegionCatalog {
    client: fly_api::FlyClient,
    codes: Mutex<Vec<String>>,
}

impl RegionCatalog {
    pub fn new(client: fly_api::FlyClient) -> Self {
        Self {
            client,
            codes: Mutex::new(Vec::new()),
        }
    }

    /// Fetch the region list if nothing is cached yet. Discovery errors are
    /// logged and leave the catalog empty.
    pub async fn ensure_loaded(&self) {
        let mut codes = self.codes.lock().await;
        if !codes.is_empty() {
            return;
        }

        match self.client.list_regions().await {
            Ok(regions) => {
                *codes = eligible(&regions);
                info!(count = codes.len(), "fly: loaded fallback regions");
            }
            Err(e) => warn!(error = %e, "fly: region discovery failed, no fallback regions"),
        }
    }

    /// Cached region codes, without triggering a fetch.
    pub async fn regions(&self) -> Vec<String> {
        self.codes.lock().await.clone()
    }

    /// Pick one fallback region uniformly at random, or `None` when
    /// discovery yielded nothing to pick from.
    pub async fn choose(&self) -> Option<String> {
        self.ensure_loaded().await;
        let codes = self.codes.lock().await;
        codes.choose(&mut rand::rng()).cloned()
    }
}

/// Free-tier regions with room to spare.
pub fn eligible(regions: &[fly_api::Region]) -> Vec<String> {
    regions
        .iter()
        .filter(|r| !r.requires_paid_plan && r.capacity > MIN_FALLBACK_CAPACITY)
        .map(|r| r.code.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::{client, regions_body};

    #[tokio::test]
    async fn filters_paid_and_low_capacity_regions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(regions_body(&[
                ("ams", false, 400),
                ("jnb", true, 900),
                ("gru", false, 100),
                ("cdg", false, 101),
            ])))
            .mount(&server)
            .await;

        let catalog = RegionCatalog::new(client(&server));
        catalog.ensure_loaded().await;
        assert_eq!(catalog.regions().await, ["ams", "cdg"]);
    }

    #[tokio::test]
    async fn populated_catalog_never_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/regions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(regions_body(&[("ams", false, 400)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let catalog = RegionCatalog::new(client(&server));
        catalog.ensure_loaded().await;
        for _ in 0..5 {
            assert_eq!(catalog.choose().await.as_deref(), Some("ams"));
        }
        catalog.ensure_loaded().await;
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_no_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/regions"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let catalog = RegionCatalog::new(client(&server));
        catalog.ensure_loaded().await;
        assert!(catalog.regions().await.is_empty());
        assert!(catalog.choose().await.is_none());
    }

    #[tokio::test]
    async fn empty_catalog_retries_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(regions_body(&[])))
            .expect(2)
            .mount(&server)
            .await;

        let catalog = RegionCatalog::new(client(&server));
        catalog.ensure_loaded().await;
        catalog.ensure_loaded().await;
        assert!(catalog.regions().await.is_empty());
    }

    #[tokio::test]
    async fn choose_only_returns_cached_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(regions_body(&[
                ("ams", false, 400),
                ("cdg", false, 400),
                ("fra", false, 400),
            ])))
            .mount(&server)
            .await;

        let catalog = RegionCatalog::new(client(&server));
        for _ in 0..20 {
            let region = catalog.choose().await.unwrap();
            assert!(["ams", "cdg", "fra"].contains(&region.as_str()));
        }
    }
}
