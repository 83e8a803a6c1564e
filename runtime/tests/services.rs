use std::time::Duration;

use component::{
    ComponentConfig, ComponentRuntime, DebugLevel, Lifecycle, LogSink, Publisher, Scheduler,
    SystemMonitor,
};
use registry::{BusContext, NameResolver};
use runtime::services::{run_component, run_scheduler, serve_names, serve_topics};
use tokio::sync::oneshot;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn machine_list_seeds_the_name_service() {
    let path = std::env::temp_dir().join(format!("blockrun-machines-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"machines": ["robot@10.1.2.3", "hub@127.0.0.1"]}"#).unwrap();
    let server = serve_names("127.0.0.1:0", Some(&path)).await.unwrap();
    std::fs::remove_file(&path).ok();

    let resolver = NameResolver::new(&server.local_addr().to_string(), TIMEOUT).unwrap();
    assert_eq!(resolver.ip("robot").await.unwrap().as_deref(), Some("10.1.2.3"));
    assert_eq!(
        resolver.resolve_host("hub:7001").await.unwrap().as_deref(),
        Some("127.0.0.1:7001")
    );
    assert_eq!(resolver.ip("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn missing_machine_list_is_an_error() {
    assert!(serve_names("127.0.0.1:0", Some("/no/such/machines.json".as_ref()))
        .await
        .is_err());
}

#[tokio::test]
async fn log_sink_collects_debug_lines() {
    let path = std::env::temp_dir().join(format!("blockrun-hub-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"machines": ["hub@127.0.0.1"]}"#).unwrap();
    let names = serve_names("127.0.0.1:0", Some(&path)).await.unwrap();
    std::fs::remove_file(&path).ok();
    let topics = serve_topics("127.0.0.1:0").await.unwrap();
    let ctx = BusContext::connect(
        &names.local_addr().to_string(),
        &format!("hub:{}", topics.local_addr().port()),
        TIMEOUT,
    )
    .await
    .unwrap();

    let hub = ComponentConfig::new().with("hostname", "hub");
    let monitor = ComponentRuntime::construct(
        "SystemMonitor",
        SystemMonitor::new(),
        hub.clone(),
        ctx.clone(),
    )
    .await
    .unwrap();
    let source = monitor.handle().identity().to_string();
    assert!(source.starts_with("hub:"));

    let mut sink = ComponentRuntime::construct(
        "LogSink",
        LogSink::new(),
        hub.with("subscribe", format!("SystemMonitor.debug@{source}")),
        ctx,
    )
    .await
    .unwrap();
    sink.configure().await.unwrap();
    eventually("sink subscription", || {
        monitor.handle().outbound().filter_count() == 1
    })
    .await;

    monitor.handle().debug(DebugLevel::Critical, "disk almost full").await;
    for _ in 0..300 {
        if sink.with_component(|s| s.lines().count()).await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let dump = sink.with_component(|s| s.dump()).await;
    assert_eq!(dump, "(CRITICAL)[SystemMonitor] disk almost full");
    sink.close().await.unwrap();
    assert_eq!(sink.state(), Lifecycle::Closed);
}

#[tokio::test]
async fn runners_stop_on_shutdown() {
    let names = serve_names("127.0.0.1:0", None).await.unwrap();
    let topics = serve_topics("127.0.0.1:0").await.unwrap();
    let ctx = BusContext::connect(
        &names.local_addr().to_string(),
        &topics.local_addr().to_string(),
        TIMEOUT,
    )
    .await
    .unwrap();

    let scheduler = Scheduler::open("127.0.0.1", 0, Duration::from_millis(5), ctx.topics().clone())
        .await
        .unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let ticking = tokio::spawn(run_scheduler(scheduler, async {
        let _ = stopped.await;
    }));
    tokio::time::sleep(Duration::from_millis(30)).await;
    stop.send(()).unwrap();
    tokio::time::timeout(TIMEOUT, ticking).await.unwrap().unwrap();

    let config = ComponentConfig::new().with("hostname", "127.0.0.1");
    let runtime = ComponentRuntime::construct("LogSink", LogSink::new(), config, ctx)
        .await
        .unwrap();
    tokio::time::timeout(TIMEOUT, run_component(runtime, async {}))
        .await
        .unwrap()
        .unwrap();
}
