#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rsa::RsaPrivateKey;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// A throwaway 2048-bit RSA key for signing requests in tests. Generated
/// fresh rather than a fixture since a couple of scenarios exercise the
/// real signing path end to end.
pub fn test_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand_core::OsRng, 2048).expect("generate test rsa key")
}

/// A local WebSocket server standing in for Kalshi's exchange feed. On
/// each accepted connection it plays back a fixed script of text frames,
/// pausing briefly between each, then either closes the socket (to force
/// a client reconnect) or holds it open. Every client text frame received
/// across every connection is recorded in `received`, and `connection_count`
/// tracks how many times a client has (re)connected.
pub struct ScriptedWsServer {
    pub url: String,
    pub connection_count: Arc<AtomicUsize>,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl ScriptedWsServer {
    pub async fn start(script: Vec<String>, close_after_script: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local port for scripted ws server");
        let addr = listener.local_addr().expect("resolve local addr");
        let connection_count = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let counter = connection_count.clone();
        let log = received.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();

                    let reader_log = log.clone();
                    tokio::spawn(async move {
                        while let Some(Ok(msg)) = read.next().await {
                            if let Message::Text(text) = msg {
                                reader_log.lock().expect("received log poisoned").push(text);
                            }
                        }
                    });

                    for frame in &script {
                        if write.send(Message::Text(frame.clone())).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }

                    if close_after_script {
                        let _ = write.close().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            connection_count,
            received,
        }
    }

    pub fn received_any_containing(&self, needle: &str) -> bool {
        self.received
            .lock()
            .expect("received log poisoned")
            .iter()
            .any(|m| m.contains(needle))
    }
}
