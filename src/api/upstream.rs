//! Upstream request dispatch.
//!
//! Centralizes how requests reach Chat Completions upstreams: Bearer auth,
//! per-account outbound proxies (one cached client per proxy URL, since
//! proxies are a client-level setting in reqwest) and per-account
//! concurrency permits.

use crate::core::{AccountConfig, AppError, Result};
use dashmap::DashMap;
use reqwest::header;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// HTTP dispatcher shared by all requests.
pub struct UpstreamClient {
    default_client: reqwest::Client,
    /// Clients keyed by proxy URL
    proxy_clients: DashMap<String, reqwest::Client>,
    /// In-flight limits keyed by account name
    semaphores: DashMap<String, Arc<Semaphore>>,
    verify_ssl: bool,
    timeout_secs: u64,
}

impl UpstreamClient {
    pub fn new(verify_ssl: bool, timeout_secs: u64) -> Result<Self> {
        let default_client = build_client(verify_ssl, timeout_secs, None)?;
        Ok(Self {
            default_client,
            proxy_clients: DashMap::new(),
            semaphores: DashMap::new(),
            verify_ssl,
            timeout_secs,
        })
    }

    /// POST a JSON body to the upstream with the account's credentials.
    pub async fn dispatch(
        &self,
        url: &str,
        body: Vec<u8>,
        account: &AccountConfig,
    ) -> Result<reqwest::Response> {
        let client = self.client_for(account.proxy_url.as_deref())?;
        let _permit = self.acquire_permit(account).await;

        let response = client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", account.api_key),
            )
            .body(body)
            .send()
            .await?;

        Ok(response)
    }

    fn client_for(&self, proxy_url: Option<&str>) -> Result<reqwest::Client> {
        let Some(proxy_url) = proxy_url.filter(|u| !u.is_empty()) else {
            return Ok(self.default_client.clone());
        };

        if let Some(client) = self.proxy_clients.get(proxy_url) {
            return Ok(client.clone());
        }

        let client = build_client(self.verify_ssl, self.timeout_secs, Some(proxy_url))?;
        self.proxy_clients
            .insert(proxy_url.to_string(), client.clone());
        Ok(client)
    }

    async fn acquire_permit(
        &self,
        account: &AccountConfig,
    ) -> Option<OwnedSemaphorePermit> {
        if account.concurrency == 0 {
            return None;
        }

        let semaphore = self
            .semaphores
            .entry(account.name.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(account.concurrency as usize)))
            .clone();

        semaphore.acquire_owned().await.ok()
    }
}

/// Build a pooled reqwest client, optionally routed through a proxy.
fn build_client(
    verify_ssl: bool,
    timeout_secs: u64,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(!verify_ssl)
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .tcp_keepalive(std::time::Duration::from_secs(60));

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| AppError::Internal(format!("invalid proxy URL: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn account(name: &str, concurrency: u32) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            proxy_url: None,
            model_mapping: HashMap::new(),
            concurrency,
        }
    }

    #[tokio::test]
    async fn test_unlimited_account_needs_no_permit() {
        let client = UpstreamClient::new(true, 30).unwrap();
        assert!(client.acquire_permit(&account("a", 0)).await.is_none());
        assert!(client.semaphores.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_permits_are_bounded() {
        let client = UpstreamClient::new(true, 30).unwrap();
        let acc = account("limited", 1);

        let permit = client.acquire_permit(&acc).await;
        assert!(permit.is_some());

        let semaphore = client.semaphores.get("limited").unwrap().clone();
        assert_eq!(semaphore.available_permits(), 0);

        drop(permit);
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[test]
    fn test_invalid_proxy_url_is_an_error() {
        let client = UpstreamClient::new(true, 30).unwrap();
        assert!(client.client_for(Some("::not a url::")).is_err());
    }

    #[test]
    fn test_empty_proxy_url_uses_default_client() {
        let client = UpstreamClient::new(true, 30).unwrap();
        assert!(client.client_for(Some("")).is_ok());
        assert!(client.proxy_clients.is_empty());
    }
}
