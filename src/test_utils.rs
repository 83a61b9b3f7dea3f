#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) async fn get_mock_server(response_code: u16) -> MockServer {
    get_mock_server_with_content(response_code, None).await
}

/// Mock server answering `/` with `response_code` and an optional
/// `(content type, body)` pair
pub(crate) async fn get_mock_server_with_content(
    response_code: u16,
    content: Option<(&str, &str)>,
) -> MockServer {
    let mock_server = MockServer::start().await;
    let template = ResponseTemplate::new(response_code);

    let template = if let Some((mime, body)) = content {
        template.set_body_raw(body, mime)
    } else {
        template
    };

    Mock::given(path("/"))
        .respond_with(template)
        .mount(&mock_server)
        .await;

    mock_server
}

/// Plain TCP server that writes a fixed response on every connection and
/// hangs up. Keeps count of the connections it has seen and of the most
/// connections it had open at once.
pub(crate) struct RawServer {
    pub(crate) uri: String,
    connections: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RawServer {
    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Starts a [`RawServer`] that waits `delay` before it answers
pub(crate) async fn spawn_raw_server(response: &'static str, delay: Duration) -> RawServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("http://{}/", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let open = Arc::new(AtomicUsize::new(0));

    let (total, max) = (connections.clone(), peak.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            total.fetch_add(1, Ordering::SeqCst);
            let now_open = open.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now_open, Ordering::SeqCst);

            let open = open.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                tokio::time::sleep(delay).await;
                // Closed before the client sees the response, so the count
                // never lags behind the client's own view
                open.fetch_sub(1, Ordering::SeqCst);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    RawServer {
        uri,
        connections,
        peak,
    }
}
