//! Entry points for the long-running pieces of a bus deployment.

use std::{future::Future, path::Path, sync::Arc};

use component::{ComponentError, ComponentRuntime, Configurable, DataHandler, Scheduler};
use log::info;
use net::{NetError, RequestServer};
use registry::{NameRegistry, RegistryError, TopicRegistry};

/// Serve the name registry on `addr`, seeded from a machine list file.
pub async fn serve_names(
    addr: &str,
    machines: Option<&Path>,
) -> Result<RequestServer, RegistryError> {
    let registry = match machines {
        Some(path) => NameRegistry::from_json_file(path)?,
        None => NameRegistry::new(),
    };
    let server = RequestServer::bind(addr, Arc::new(registry)).await?;
    info!("name service listening on {}", server.local_addr());
    Ok(server)
}

/// Serve an empty topic registry on `addr`.
pub async fn serve_topics(addr: &str) -> Result<RequestServer, NetError> {
    let server = RequestServer::bind(addr, Arc::new(TopicRegistry::new())).await?;
    info!("topic service listening on {}", server.local_addr());
    Ok(server)
}

/// Tick `scheduler` until `shutdown` resolves.
pub async fn run_scheduler(scheduler: Scheduler, shutdown: impl Future<Output = ()>) {
    tokio::select! {
        _ = scheduler.run() => {}
        _ = shutdown => scheduler.close(),
    }
}

/// Configure `runtime`, keep it running until `shutdown` resolves, then
/// close it.
pub async fn run_component<C>(
    mut runtime: ComponentRuntime<C>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ComponentError>
where
    C: Configurable + DataHandler + 'static,
{
    runtime.configure().await?;
    shutdown.await;
    runtime.close().await
}
