use std::{sync::Arc, time::Duration};

use crate::{NameResolver, RegistryError, TopicClient};

/// Shared handles to the naming services.
///
/// Cloned into every channel, router and component that needs to resolve
/// hosts or topic encodings.
#[derive(Clone)]
pub struct BusContext {
    names: Arc<NameResolver>,
    topics: Arc<TopicClient>,
}

impl BusContext {
    pub fn new(names: Arc<NameResolver>, topics: Arc<TopicClient>) -> Self {
        Self { names, topics }
    }

    /// Connect to the name service at `names_addr` and to the topic service at
    /// `topics_addr`, which may use a machine name.
    pub async fn connect(
        names_addr: &str,
        topics_addr: &str,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let names = NameResolver::new(names_addr, timeout)?;
        let resolved = names
            .resolve_host(topics_addr)
            .await?
            .ok_or_else(|| RegistryError::Unresolved(topics_addr.to_string()))?;
        let topics = TopicClient::new(resolved, timeout);
        Ok(Self::new(Arc::new(names), Arc::new(topics)))
    }

    pub fn names(&self) -> &Arc<NameResolver> {
        &self.names
    }

    pub fn topics(&self) -> &Arc<TopicClient> {
        &self.topics
    }
}
