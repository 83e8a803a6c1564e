use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use net::{NetError, RequestClient, RequestHandler, RequestServer};
use tokio::net::TcpListener;

struct Echo {
    calls: AtomicUsize,
}

impl RequestHandler for Echo {
    fn handle(&self, request: &[u8]) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reply = b"re:".to_vec();
        reply.extend_from_slice(request);
        reply
    }
}

#[tokio::test]
async fn request_gets_matching_reply() {
    let handler = Arc::new(Echo {
        calls: AtomicUsize::new(0),
    });
    let server = RequestServer::bind("127.0.0.1:0", handler.clone()).await.unwrap();
    let client = RequestClient::new(server.local_addr().to_string(), Duration::from_secs(1));

    assert_eq!(&client.request(b"one").await.unwrap()[..], b"re:one");
    assert_eq!(&client.request(b"two").await.unwrap()[..], b"re:two");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn silent_service_times_out() {
    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = RequestClient::new(addr.to_string(), Duration::from_millis(100));
    let err = client.request(b"?anything").await.unwrap_err();
    assert!(matches!(err, NetError::Timeout { .. }));
}

#[tokio::test]
async fn closed_server_refuses_new_clients() {
    let handler = Arc::new(Echo {
        calls: AtomicUsize::new(0),
    });
    let server = RequestServer::bind("127.0.0.1:0", handler).await.unwrap();
    let addr = server.local_addr().to_string();
    server.close();
    drop(server);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = RequestClient::new(addr, Duration::from_millis(200));
    assert!(client.request(b"x").await.is_err());
}
