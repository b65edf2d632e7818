//! Graceful shutdown lets accepted messages finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use absolute_learner::server::{serve_with_shutdown, AppState};

use crate::mocks::{Harness, MemoryStore, ScriptedProvider};

#[tokio::test]
async fn accepted_message_is_delivered_after_shutdown_begins() {
    let h = Harness::new(
        MemoryStore::default(),
        ScriptedProvider::slow(Duration::from_millis(300), "late but sent"),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_with_shutdown(
        listener,
        AppState {
            orchestrator: Arc::clone(&h.orchestrator),
        },
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_secs(5),
    ));

    {
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{addr}/webhook"))
            .form(&[
                ("Body", "what is a rebase?"),
                ("From", "whatsapp:+15550004444"),
            ])
            .send()
            .await
            .expect("webhook call");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }
    assert!(h.sender.sent().is_empty(), "reply is still being generated");

    stop_tx.send(()).expect("server should be waiting");
    server
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");

    assert_eq!(
        h.sender.sent(),
        vec![("+15550004444".to_owned(), "late but sent".to_owned())]
    );
    assert_eq!(h.orchestrator.in_flight(), 0);
}
