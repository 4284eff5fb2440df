//! HTTP adapter against a canned local provider

use agelens_model::{AgeStage, DescriptorBuilder};
use agelens_synthesis::{HttpSynthesisAdapter, SynthesisAdapter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone)]
struct Route {
    path: &'static str,
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

/// Serve `routes` until the test ends; records every request head.
async fn serve(routes: Vec<Route>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let head_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buf.len() < head_end + content_length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
                log.lock().await.push(format!("{head}{body}"));

                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let route = routes.iter().find(|r| r.path == path);
                let (status, content_type, payload) = match route {
                    Some(r) => (r.status, r.content_type, r.body.clone()),
                    None => ("404 Not Found", "text/plain", b"missing".to_vec()),
                };

                let mut response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    payload.len()
                )
                .into_bytes();
                response.extend_from_slice(&payload);
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

fn adapter(addr: SocketAddr, key: Option<&str>) -> HttpSynthesisAdapter {
    HttpSynthesisAdapter::new(
        &format!("http://{addr}/generate"),
        key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn image_response_is_returned_verbatim() {
    let (addr, seen) = serve(vec![Route {
        path: "/generate",
        status: "200 OK",
        content_type: "image/png",
        body: vec![0x89, b'P', b'N', b'G', 1, 2, 3],
    }])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let bytes = adapter(addr, Some("secret"))
        .generate(&descriptor, AgeStage::Teen)
        .await
        .unwrap();

    assert_eq!(bytes.as_slice(), &[0x89, b'P', b'N', b'G', 1, 2, 3]);

    let requests = seen.lock().await;
    assert_eq!(requests.len(), 1);
    let request = requests[0].to_ascii_lowercase();
    assert!(request.starts_with("post /generate"));
    assert!(request.contains("authorization: bearer secret"));
    assert!(request.contains("\"stage\":\"teen\""));
    assert!(request.contains(&format!("\"seed\":{}", descriptor.seed())));
}

#[tokio::test]
async fn url_response_is_downloaded() {
    let (addr, seen) = serve(vec![
        Route {
            path: "/generate",
            status: "200 OK",
            content_type: "application/json",
            body: br#"{"url":"/files/ava-child.png"}"#.to_vec(),
        },
        Route {
            path: "/files/ava-child.png",
            status: "200 OK",
            content_type: "application/octet-stream",
            body: vec![7u8; 16],
        },
    ])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let bytes = adapter(addr, None)
        .generate(&descriptor, AgeStage::Child)
        .await
        .unwrap();

    assert_eq!(bytes.as_slice(), &[7u8; 16]);
    assert_eq!(seen.lock().await.len(), 2);
}

#[tokio::test]
async fn overload_is_transient() {
    let (addr, _) = serve(vec![Route {
        path: "/generate",
        status: "503 Service Unavailable",
        content_type: "text/plain",
        body: b"busy".to_vec(),
    }])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let err = adapter(addr, None)
        .generate(&descriptor, AgeStage::Adult)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(err.reason().contains("busy"));
}

#[tokio::test]
async fn policy_rejection_is_permanent() {
    let (addr, _) = serve(vec![Route {
        path: "/generate",
        status: "422 Unprocessable Entity",
        content_type: "application/json",
        body: br#"{"error":"content policy"}"#.to_vec(),
    }])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let err = adapter(addr, None)
        .generate(&descriptor, AgeStage::Infant)
        .await
        .unwrap_err();

    assert!(err.is_permanent());
}

#[tokio::test]
async fn json_without_url_is_transient() {
    let (addr, _) = serve(vec![Route {
        path: "/generate",
        status: "200 OK",
        content_type: "application/json",
        body: br#"{"status":"queued"}"#.to_vec(),
    }])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let err = adapter(addr, None)
        .generate(&descriptor, AgeStage::Infant)
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_provider_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let err = adapter(addr, None)
        .generate(&descriptor, AgeStage::Infant)
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn oversized_image_is_rejected() {
    let (addr, _) = serve(vec![Route {
        path: "/generate",
        status: "200 OK",
        content_type: "image/png",
        body: vec![1u8; 64],
    }])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let err = adapter(addr, None)
        .with_max_image_bytes(16)
        .generate(&descriptor, AgeStage::Teen)
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert!(err.reason().contains("exceeds 16 bytes"));
}

#[tokio::test]
async fn oversized_download_is_rejected() {
    let (addr, seen) = serve(vec![
        Route {
            path: "/generate",
            status: "200 OK",
            content_type: "application/json",
            body: br#"{"image_url":"/files/huge.png"}"#.to_vec(),
        },
        Route {
            path: "/files/huge.png",
            status: "200 OK",
            content_type: "image/png",
            body: vec![2u8; 4096],
        },
    ])
    .await;

    let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
    let limited = adapter(addr, None).with_max_image_bytes(1024);
    let err = limited
        .generate(&descriptor, AgeStage::Adult)
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(seen.lock().await.len(), 2);

    let roomy = adapter(addr, None).with_max_image_bytes(4096);
    let bytes = roomy.generate(&descriptor, AgeStage::Adult).await.unwrap();
    assert_eq!(bytes.len(), 4096);
}
