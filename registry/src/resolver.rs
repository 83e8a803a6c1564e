//! Caching client for the [`crate::NameRegistry`].

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use log::debug;
use net::{NetError, RequestClient};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    cache::{TtlCache, DEFAULT_CACHE_TTL},
    RegistryError, ACK,
};

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("valid IPv4 pattern")
});

/// Whether `host` is already a dotted IPv4 literal.
pub fn is_ipv4(host: &str) -> bool {
    IPV4.is_match(host)
}

/// Client side of the [`crate::NameRegistry`]. Known names are cached for
/// the cache TTL.
pub struct NameResolver {
    client: RequestClient,
    cache: Mutex<TtlCache<String, String>>,
}

impl NameResolver {
    /// Connect to the name service at `addr` (`ip:port`).
    ///
    /// The service cannot resolve its own name, so `addr` must use an IPv4
    /// literal.
    pub fn new(addr: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let host = addr.split(':').next().unwrap_or_default();
        if !is_ipv4(host) {
            return Err(RegistryError::NameServiceAddress(addr.to_string()));
        }
        Ok(Self {
            client: RequestClient::new(addr, timeout),
            cache: Mutex::new(TtlCache::new(DEFAULT_CACHE_TTL)),
        })
    }

    /// Trust cached answers for `ttl` instead of the default.
    pub fn with_cache_ttl(self, ttl: Duration) -> Self {
        self.cache().set_ttl(ttl);
        self
    }

    fn cache(&self) -> MutexGuard<'_, TtlCache<String, String>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn command(&self, request: String) -> Result<String, NetError> {
        let reply = self.client.request(request.as_bytes()).await?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    pub async fn add_name(&self, name: &str, ip: &str) -> Result<bool, NetError> {
        let reply = self.command(format!("+{name}@{ip}")).await?;
        Ok(reply.as_bytes().eq_ignore_ascii_case(ACK))
    }

    pub async fn remove_name(&self, name: &str) -> Result<bool, NetError> {
        let reply = self.command(format!("-{name}")).await?;
        self.cache().remove(name);
        Ok(reply.as_bytes().eq_ignore_ascii_case(ACK))
    }

    /// Address of `name`. IPv4 literals are returned unchanged without a
    /// round trip; `Ok(None)` means the service does not know the name.
    pub async fn ip(&self, name: &str) -> Result<Option<String>, NetError> {
        if is_ipv4(name) {
            return Ok(Some(name.to_string()));
        }
        if let Some(ip) = self.cache().get(name) {
            return Ok(Some(ip));
        }
        let ip = self.command(format!("?{name}")).await?;
        if ip.is_empty() {
            return Ok(None);
        }
        debug!("resolved {name} to {ip}");
        self.cache().insert(name.to_string(), ip.clone());
        Ok(Some(ip))
    }

    /// Resolve `host[:port]`, keeping the port suffix.
    pub async fn resolve_host(&self, spec: &str) -> Result<Option<String>, NetError> {
        let (host, port) = match spec.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (spec, None),
        };
        let Some(ip) = self.ip(host).await? else {
            return Ok(None);
        };
        Ok(Some(match port {
            Some(port) => format!("{ip}:{port}"),
            None => ip,
        }))
    }
}
