use ivsurface_rs::SurfaceError;
use ivsurface_rs::reconcile::{
    HttpReferenceFeed, ReconcilerConfig, ReconciliationOutcome, ReferenceFeed,
    ReferenceFeedConfig, ReferenceReconciler,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serves one canned HTTP response and reports the request line it saw.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);
        }
        let request = String::from_utf8_lossy(&request).to_string();
        let request_line = request.lines().next().unwrap_or_default().to_string();
        let _ = seen_tx.send(request_line);

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (format!("http://{address}/api/v2/public/get_historical_volatility"), seen_rx)
}

fn feed(base_url: String) -> HttpReferenceFeed {
    HttpReferenceFeed::new(
        ReferenceFeedConfig::default()
            .with_base_url(base_url)
            .with_request_timeout_ms(2_000),
    )
    .unwrap()
}

#[tokio::test]
async fn test_http_feed_reads_latest_percentage() {
    let (url, seen) = serve_once(
        "200 OK",
        r#"{"jsonrpc":"2.0","result":[[1735689600000,55.0],[1735693200000,57.5]],"usIn":1,"usOut":2}"#,
    )
    .await;

    let volatility = feed(url).latest_volatility("BTC").await.unwrap();
    assert!((volatility - 0.575).abs() < 1e-12);

    let request_line = seen.await.unwrap();
    assert!(request_line.starts_with("GET /api/v2/public/get_historical_volatility?currency=BTC "));
}

#[tokio::test]
async fn test_http_error_status_is_unavailable() {
    let (url, _seen) = serve_once("400 Bad Request", r#"{"error":{"message":"Invalid params"}}"#).await;
    let result = feed(url).latest_volatility("DOGE").await;
    assert!(matches!(
        result,
        Err(SurfaceError::ReferenceUnavailable { symbol, .. }) if symbol == "DOGE"
    ));
}

#[tokio::test]
async fn test_http_empty_result_is_unavailable() {
    let (url, _seen) = serve_once("200 OK", r#"{"result":[]}"#).await;
    assert!(feed(url).latest_volatility("BTC").await.is_err());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_skipped_by_reconciler() {
    // Bind then drop to get a port with nothing listening.
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let reconciler = ReferenceReconciler::new(
        feed(format!("http://{address}/vol")),
        ReconcilerConfig::default().with_timeout_ms(1_000),
    );

    let expiry = chrono::NaiveDate::from_ymd_opt(2030, 1, 25).unwrap();
    let rec = reconciler.reconcile("BTC", expiry, 70_000.0, 0.48).await;
    assert_eq!(rec.volatility, 0.48);
    assert!(matches!(rec.outcome, ReconciliationOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_silent_server_hits_reconciler_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    });

    let reconciler = ReferenceReconciler::new(
        HttpReferenceFeed::new(
            ReferenceFeedConfig::default()
                .with_base_url(format!("http://{address}/vol"))
                .with_request_timeout_ms(30_000),
        )
        .unwrap(),
        ReconcilerConfig::default().with_timeout_ms(100),
    );

    let expiry = chrono::NaiveDate::from_ymd_opt(2030, 1, 25).unwrap();
    let rec = reconciler.reconcile("ETH", expiry, 3_000.0, 0.7).await;
    assert_eq!(rec.volatility, 0.7);
    match rec.outcome {
        ReconciliationOutcome::Skipped { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected timeout skip, got {other:?}"),
    }
}
