use std::{collections::HashSet, sync::Arc, time::Duration};

use net::{EncodingKey, RequestServer};
use registry::{BusContext, NameRegistry, NameResolver, TopicClient, TopicRegistry};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn topic_service() -> (RequestServer, TopicClient) {
    let server = RequestServer::bind("127.0.0.1:0", Arc::new(TopicRegistry::new()))
        .await
        .unwrap();
    let client = TopicClient::new(server.local_addr().to_string(), TIMEOUT);
    (server, client)
}

#[tokio::test]
async fn encodings_are_unique_and_round_trip() {
    let (_server, client) = topic_service().await;
    let topics: Vec<String> = (0..300).map(|i| format!("feed.{i}")).collect();

    let mut seen = HashSet::new();
    for topic in &topics {
        let key = client.encoding(topic, "pc:5000").await.unwrap().unwrap();
        assert!(!key.is_unknown());
        assert!(seen.insert(key), "duplicate key for {topic}");
    }

    // A fresh client has no cache, so lookups go to the service.
    let other = TopicClient::new(client.addr(), TIMEOUT);
    for topic in &topics {
        let key = other.encoding(topic, "pc:5000").await.unwrap().unwrap();
        let back = other.topic(key).await.unwrap();
        assert_eq!(back, Some(format!("{topic}@pc:5000")));
    }
}

#[tokio::test]
async fn re_registration_keeps_the_first_key() {
    let (_server, client) = topic_service().await;
    assert!(client.add_topic("text.data", "a:1").await.unwrap());
    let first = client.encoding("text.data", "a:1").await.unwrap();
    assert!(client.add_topic("text.data", "a:1").await.unwrap());

    let fresh = TopicClient::new(client.addr(), TIMEOUT);
    assert_eq!(fresh.encoding("text.data", "a:1").await.unwrap(), first);
}

#[tokio::test]
async fn same_topic_on_two_hosts_gets_two_keys() {
    let (_server, client) = topic_service().await;
    let a = client.encoding("text.data", "a:1").await.unwrap();
    let b = client.encoding("text.data", "b:1").await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn unknown_key_resolves_to_nothing() {
    let (_server, client) = topic_service().await;
    assert_eq!(client.topic(EncodingKey::new([9, 9, 9])).await.unwrap(), None);
}

#[tokio::test]
async fn removal_is_seen_by_the_removing_client() {
    let (_server, client) = topic_service().await;
    let key = client.encoding("gone", "a:1").await.unwrap().unwrap();
    assert!(client.remove_topic("gone", "a:1").await.unwrap());
    assert_eq!(client.topic(key).await.unwrap(), None);
}

#[tokio::test]
async fn stale_cache_survives_remote_removal() {
    let (_server, client) = topic_service().await;
    let key = client.encoding("stale", "a:1").await.unwrap().unwrap();
    assert_eq!(client.topic(key).await.unwrap().as_deref(), Some("stale@a:1"));

    let other = TopicClient::new(client.addr(), TIMEOUT);
    other.remove_topic("stale", "a:1").await.unwrap();

    // Cached answers outlive another party's removal until they expire.
    assert_eq!(client.topic(key).await.unwrap().as_deref(), Some("stale@a:1"));
}

#[tokio::test]
async fn expired_entries_see_remote_removal() {
    let (_server, client) = topic_service().await;
    let client = client.with_cache_ttl(Duration::from_millis(20));
    let key = client.encoding("brief", "a:1").await.unwrap().unwrap();

    let other = TopicClient::new(client.addr(), TIMEOUT);
    other.remove_topic("brief", "a:1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.topic(key).await.unwrap(), None);
}

#[tokio::test]
async fn names_resolve_through_the_service_and_cache() {
    let registry = Arc::new(NameRegistry::with_machines(["robot@127.0.0.1"]));
    let server = RequestServer::bind("127.0.0.1:0", registry).await.unwrap();
    let resolver = NameResolver::new(&server.local_addr().to_string(), TIMEOUT).unwrap();

    assert_eq!(
        resolver.resolve_host("robot:5000").await.unwrap().as_deref(),
        Some("127.0.0.1:5000")
    );
    assert_eq!(resolver.ip("nobody").await.unwrap(), None);

    assert!(resolver.add_name("desk", "10.1.1.1").await.unwrap());
    assert_eq!(resolver.ip("desk").await.unwrap().as_deref(), Some("10.1.1.1"));

    // Served from cache once the service is gone.
    server.close();
    drop(server);
    assert_eq!(resolver.ip("robot").await.unwrap().as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn context_resolves_the_topic_service_by_name() {
    let topics = RequestServer::bind("127.0.0.1:0", Arc::new(TopicRegistry::new()))
        .await
        .unwrap();
    let names = RequestServer::bind(
        "127.0.0.1:0",
        Arc::new(NameRegistry::with_machines(["hub@127.0.0.1"])),
    )
    .await
    .unwrap();

    let topics_spec = format!("hub:{}", topics.local_addr().port());
    let ctx = BusContext::connect(&names.local_addr().to_string(), &topics_spec, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(ctx.topics().addr(), topics.local_addr().to_string());
    assert!(ctx.topics().add_topic("x", "hub:1").await.unwrap());
}

#[tokio::test]
async fn full_registry_answers_empty() {
    let server = RequestServer::bind("127.0.0.1:0", Arc::new(TopicRegistry::with_capacity(1)))
        .await
        .unwrap();
    let client = TopicClient::new(server.local_addr().to_string(), TIMEOUT);
    assert!(client.add_topic("text.data", "a:1").await.unwrap());
    assert!(!client.add_topic("text.data", "b:1").await.unwrap());
    assert_eq!(client.encoding("text.data", "b:1").await.unwrap(), None);
    assert!(client.encoding("text.data", "a:1").await.unwrap().is_some());
}
