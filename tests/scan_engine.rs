//! End-to-end scans through the real HTTP prober against a local responder.

use probesweep::core::models::ScanPhase;
use probesweep::{OutputTarget, ScanCoordinator, ScanRegistry, ScanRequest, ScanSettings};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers every plain-HTTP connection with `response`. TLS handshakes
/// against it fail, which is how the https attempt is expected to end.
async fn serve(response: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

fn settings(terms: &[&str], port: Option<u16>) -> ScanSettings {
    ScanSettings::builder(terms.iter().copied())
        .port(port)
        .timeout(Duration::from_secs(3))
        .concurrency_limit(8)
        .build()
        .unwrap()
}

#[tokio::test]
async fn server_header_match_is_written_to_output() {
    let port = serve(
        "HTTP/1.1 200 OK\r\nServer: Apache/2.4\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("output.txt");

    let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
    let handle = coordinator
        .start(
            ScanRequest::new(vec!["127.0.0.1".to_string()], settings(&["Apache", "nginx"], Some(port))),
            OutputTarget::File(out.clone()),
        )
        .unwrap();
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].matched_terms, vec!["Apache"]);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "127.0.0.1: Apache\n");
}

#[tokio::test]
async fn terms_spanning_header_names_match() {
    let port = serve(
        "HTTP/1.1 200 OK\r\nServer: Apache/2.4\r\nX-Powered-By: PHP/8\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
    )
    .await;
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("output.txt");

    let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
    let handle = coordinator
        .start(
            ScanRequest::new(
                vec!["127.0.0.1".to_string()],
                settings(&["Server: Apache", "X-Powered-By", "x-powered-by"], Some(port)),
            ),
            OutputTarget::File(out.clone()),
        )
        .unwrap();
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.results_total, 1);
    assert_eq!(snapshot.results[0].matched_terms, vec!["Server: Apache", "X-Powered-By"]);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "127.0.0.1: Server: Apache, X-Powered-By\n"
    );
}

#[tokio::test]
async fn body_match_on_error_page_counts() {
    let port = serve(
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 21\r\nConnection: close\r\n\r\nPHP Fatal error: oops",
    )
    .await;
    let dir = TempDir::new().unwrap();

    let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
    let handle = coordinator
        .start(
            ScanRequest::new(vec!["127.0.0.1".to_string()], settings(&["PHP Fatal"], Some(port))),
            OutputTarget::Directory(dir.path().to_path_buf()),
        )
        .unwrap();
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.results_total, 1);
    let written = std::fs::read_to_string(&snapshot.output_path).unwrap();
    assert_eq!(written, "127.0.0.1: PHP Fatal\n");
}

#[tokio::test]
async fn unresolvable_domain_completes_without_results() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("output.txt");

    let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
    let handle = coordinator
        .start(
            ScanRequest::new(vec!["dead.invalid".to_string()], settings(&["Apache"], None)),
            OutputTarget::File(out.clone()),
        )
        .unwrap();
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.completed, 1);
    assert!(snapshot.results.is_empty());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
}

#[tokio::test]
async fn snapshot_serialises_for_status_queries() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(ScanRegistry::new());
    let coordinator = ScanCoordinator::new(registry.clone());
    let handle = coordinator
        .start(
            ScanRequest::new(Vec::new(), settings(&["x"], None)),
            OutputTarget::Directory(dir.path().to_path_buf()),
        )
        .unwrap();
    handle.wait().await;

    let snapshot = registry.snapshot(handle.id()).unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["phase"], "completed");
    assert_eq!(json["total"], 0);
    assert_eq!(json["is_complete"], true);
    assert_eq!(snapshot.progress(), 1.0);
}
