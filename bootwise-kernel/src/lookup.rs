use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::KernelResult;
use crate::ports::LookupStore;

/// Address of the relay a request came through, taken from the proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    pub ip: String,
    pub port: Option<String>,
}

impl ProxyAddress {
    pub fn url(&self) -> String {
        match &self.port {
            Some(port) => format!("http://{}:{}", self.ip, port),
            None => format!("http://{}", self.ip),
        }
    }
}

/// What a booting device told us about itself, plus where the request came from.
#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    pub macs: Option<Vec<String>>,
    pub ips: Option<Vec<String>>,
    pub requester_ip: Option<String>,
    pub proxy: Option<ProxyAddress>,
}

pub struct LookupMapper {
    lookups: Arc<dyn LookupStore>,
}

impl LookupMapper {
    pub fn new(lookups: Arc<dyn LookupStore>) -> Self {
        Self { lookups }
    }

    /// Records which MAC sits behind the requesting IP. The device reports
    /// parallel `macs`/`ips` lists; only the pair whose IP matches the
    /// requester is trusted.
    pub async fn set_lookup(&self, req: &LookupRequest) -> KernelResult<()> {
        let (Some(macs), Some(ips)) = (&req.macs, &req.ips) else {
            return Ok(());
        };
        let Some(requester) = req.requester_ip.as_deref() else {
            return Ok(());
        };

        let Some(index) = ips.iter().position(|ip| !ip.is_empty() && ip == requester) else {
            return Ok(());
        };
        let mac = match macs.get(index) {
            Some(mac) if !mac.is_empty() => mac,
            _ => return Ok(()),
        };

        self.lookups.upsert_ip_to_mac(&ips[index], mac).await?;
        debug!(ip = %ips[index], %mac, "ip lookup set");

        if let Some(proxy) = &req.proxy {
            let url = proxy.url();
            self.lookups.upsert_proxy_to_mac(&url, mac).await?;
            debug!(%mac, proxy = %url, "proxy lookup set");
        }
        Ok(())
    }

    /// Same as `set_lookup` but never fails the caller.
    pub async fn set_lookup_best_effort(&self, req: &LookupRequest) {
        if let Err(e) = self.set_lookup(req).await {
            warn!(requester = ?req.requester_ip, error = %e, "lookup registration failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::JsonStore;

    fn request(ips: &[&str], requester: &str, proxy: Option<ProxyAddress>) -> LookupRequest {
        LookupRequest {
            macs: Some(vec!["mac1".into(), "mac2".into()]),
            ips: Some(ips.iter().map(|s| s.to_string()).collect()),
            requester_ip: Some(requester.into()),
            proxy,
        }
    }

    fn mapper() -> (tempfile::TempDir, Arc<JsonStore>, LookupMapper) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("s.json")).unwrap());
        let mapper = LookupMapper::new(store.clone());
        (dir, store, mapper)
    }

    #[test]
    fn test_proxy_url() {
        let proxy = ProxyAddress { ip: "12.1.1.1".into(), port: Some("8080".into()) };
        assert_eq!(proxy.url(), "http://12.1.1.1:8080");
    }

    #[tokio::test]
    async fn test_sets_ip_and_proxy_for_requester_pair() {
        let (_dir, store, mapper) = mapper();
        let proxy = ProxyAddress { ip: "12.1.1.1".into(), port: Some("9090".into()) };
        mapper.set_lookup(&request(&["ip1", "ip2"], "ip1", Some(proxy))).await.unwrap();

        let records = store.lookups();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mac_address, "mac1");
        assert_eq!(records[0].ip_address.as_deref(), Some("ip1"));
        assert_eq!(records[0].proxy.as_deref(), Some("http://12.1.1.1:9090"));
    }

    #[tokio::test]
    async fn test_noop_without_both_lists() {
        let (_dir, store, mapper) = mapper();
        let mut req = request(&["ip1"], "ip1", None);
        req.ips = None;
        mapper.set_lookup(&req).await.unwrap();
        assert!(store.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_noop_when_requester_not_listed_or_ips_blank() {
        let (_dir, store, mapper) = mapper();
        mapper.set_lookup(&request(&["", ""], "ip1", None)).await.unwrap();
        mapper.set_lookup(&request(&["ip7", "ip8"], "ip1", None)).await.unwrap();
        assert!(store.lookups().is_empty());
    }
}
