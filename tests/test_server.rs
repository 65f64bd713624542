mod common;

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{
    body_of, eventually, local_config, request, send_raw, start_server, start_server_with, status_of,
};
use switchyard::{Method, Server, ServerConfig, ServerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_matching_route_returns_handler_output() {
    let (server, addr) = start_server(|s| {
        s.on(Method::GET, "/hello", |req, res| {
            let name = req.query_param("name").unwrap_or_else(|| "world".into());
            res.status(201)
                .header("Content-Type", "text/plain")
                .header("X-Route", "hello")
                .append(format!("hello {name}"));
            Ok(())
        });
    })
    .await;

    let response = request(addr, "GET", "/hello?name=yard").await;

    assert!(response.starts_with("HTTP/1.1 201 Created\r\n"));
    assert!(response.contains("X-Route: hello\r\n"));
    assert!(response.contains("Content-Length: 10\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert_eq!(body_of(&response), "hello yard");

    server.halt().await;
}

#[tokio::test]
async fn test_post_body_reaches_handler() {
    let (server, addr) = start_server(|s| {
        s.on(Method::POST, "/echo", |req, res| {
            res.append(req.body());
            Ok(())
        });
    })
    .await;

    let response = send_raw(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nabcde",
    )
    .await;

    assert_eq!(status_of(&response), 200);
    assert_eq!(body_of(&response), "abcde");

    server.halt().await;
}

#[tokio::test]
async fn test_unmatched_request_gets_404() {
    let (server, addr) = start_server(|s| {
        s.on(Method::GET, "/known", |_, _| Ok(()));
    })
    .await;

    assert_eq!(status_of(&request(addr, "GET", "/unknown").await), 404);
    // Method is part of the match.
    assert_eq!(status_of(&request(addr, "POST", "/known").await), 404);

    server.halt().await;
}

#[tokio::test]
async fn test_first_registered_handler_wins() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let (server, addr) = start_server(|s| {
        let hits = first.clone();
        s.on(Method::GET, "/dup", move |_, res| {
            hits.fetch_add(1, Ordering::SeqCst);
            res.append("first");
            Ok(())
        });
        let hits = second.clone();
        s.on(Method::GET, "/dup", move |_, res| {
            hits.fetch_add(1, Ordering::SeqCst);
            res.append("second");
            Ok(())
        });
    })
    .await;

    let response = request(addr, "GET", "/dup").await;

    assert_eq!(body_of(&response), "first");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);

    server.halt().await;
}

#[tokio::test]
async fn test_failing_and_panicking_handlers_become_500() {
    let (server, addr) = start_server(|s| {
        s.on(Method::GET, "/fail", |_, res| {
            res.append("partial");
            anyhow::bail!("backend unavailable")
        });
        s.on(Method::GET, "/panic", |_, _| panic!("handler blew up"));
        s.on(Method::GET, "/ok", |_, res| {
            res.append("still up");
            Ok(())
        });
    })
    .await;

    let failed = request(addr, "GET", "/fail").await;
    assert_eq!(status_of(&failed), 500);
    assert_eq!(body_of(&failed), "");

    assert_eq!(status_of(&request(addr, "GET", "/panic").await), 500);

    let ok = request(addr, "GET", "/ok").await;
    assert_eq!(status_of(&ok), 200);
    assert_eq!(body_of(&ok), "still up");

    server.halt().await;
}

#[tokio::test]
async fn test_malformed_request_is_dropped_without_reply() {
    let (server, addr) = start_server(|s| {
        s.on(Method::GET, "/ok", |_, _| Ok(()));
    })
    .await;

    let garbage = send_raw(addr, b"NOT A VALID REQUEST LINE\r\n\r\n").await;
    assert_eq!(garbage, "");

    let unknown_method = send_raw(addr, b"BREW /pot HTTP/1.1\r\n\r\n").await;
    assert_eq!(unknown_method, "");

    assert_eq!(status_of(&request(addr, "GET", "/ok").await), 200);

    server.halt().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_halt_waits_for_in_flight_requests() {
    const CLIENTS: usize = 4;
    let finished = Arc::new(AtomicUsize::new(0));

    let (server, addr) = start_server(|s| {
        let finished = finished.clone();
        s.on(Method::GET, "/slow", move |_, res| {
            std::thread::sleep(Duration::from_millis(300));
            finished.fetch_add(1, Ordering::SeqCst);
            res.append("done");
            Ok(())
        });
    })
    .await;

    let clients: Vec<_> = (0..CLIENTS)
        .map(|_| tokio::spawn(async move { request(addr, "GET", "/slow").await }))
        .collect();

    eventually(|| server.status().active_connections == CLIENTS).await;

    server.halt().await;

    assert_eq!(finished.load(Ordering::SeqCst), CLIENTS);
    assert!(!server.listening());
    assert_eq!(server.status().active_connections, 0);
    assert_eq!(server.local_addr(), None);

    for client in clients {
        let response = client.await.unwrap();
        assert_eq!(status_of(&response), 200);
        assert_eq!(body_of(&response), "done");
    }

    // The listening socket is gone once halt returns.
    StdTcpListener::bind(addr).expect("port should be free after halt");
}

#[tokio::test]
async fn test_halt_without_start_and_twice_is_noop() {
    let server = Server::with_config(local_config());
    server.halt().await;

    server.start(false).await.unwrap();
    server.halt().await;
    server.halt().await;

    assert!(!server.listening());
}

#[tokio::test]
async fn test_start_while_listening_is_rejected() {
    let (server, _) = start_server(|_| {}).await;

    assert!(matches!(
        server.start(false).await,
        Err(ServerError::AlreadyListening)
    ));
    assert!(server.listening());

    server.halt().await;
}

#[tokio::test]
async fn test_start_on_busy_port_fails_with_bind_error() {
    let occupied = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let server = Server::with_config(ServerConfig {
        port,
        ..local_config()
    });

    assert!(matches!(
        server.start(false).await,
        Err(ServerError::Bind { .. })
    ));
    assert!(!server.listening());
}

#[tokio::test]
async fn test_server_restarts_after_halt() {
    let (server, addr) = start_server(|s| {
        s.on(Method::GET, "/", |_, res| {
            res.append("up");
            Ok(())
        });
    })
    .await;
    assert_eq!(body_of(&request(addr, "GET", "/").await), "up");
    server.halt().await;

    server.start(false).await.unwrap();
    let addr = server.local_addr().unwrap();
    assert_eq!(body_of(&request(addr, "GET", "/").await), "up");
    server.halt().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_start_returns_after_halt() {
    let server = Arc::new(Server::with_config(local_config()));

    let blocking = {
        let server = server.clone();
        tokio::spawn(async move { server.start(true).await })
    };

    eventually(|| server.listening()).await;
    let status = server.status();
    assert!(status.listening);
    assert!(status.local_addr.is_some());
    assert_eq!(status.websocket_connections, 0);

    server.halt().await;

    tokio::time::timeout(Duration::from_secs(2), blocking)
        .await
        .expect("blocking start should return")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_limit_holds_extra_clients_back() {
    let config = ServerConfig {
        max_connections: 1,
        ..local_config()
    };
    let (server, addr) = start_server_with(config, |s| {
        s.on(Method::GET, "/", |_, res| {
            res.append("served");
            Ok(())
        });
    })
    .await;

    // Holds the only permit until it sends its request.
    let mut first = TcpStream::connect(addr).await.unwrap();
    eventually(|| server.status().active_connections == 1).await;

    let second = tokio::spawn(async move { request(addr, "GET", "/").await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!second.is_finished());
    assert_eq!(server.status().active_connections, 1);

    first
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let mut out = Vec::new();
    first.read_to_end(&mut out).await.unwrap();
    assert_eq!(body_of(&String::from_utf8_lossy(&out)), "served");

    let response = tokio::time::timeout(Duration::from_secs(2), second)
        .await
        .expect("second client should be served once the first finishes")
        .unwrap();
    assert_eq!(status_of(&response), 200);

    server.halt().await;
}

#[tokio::test]
async fn test_incomplete_head_is_dropped_after_read_timeout() {
    let config = ServerConfig {
        read_timeout_secs: 1,
        ..local_config()
    };
    let (server, addr) = start_server_with(config, |s| {
        s.on(Method::GET, "/", |_, _| Ok(()));
    })
    .await;

    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();

    let began = Instant::now();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(3), stalled.read_to_end(&mut out))
        .await
        .expect("server should drop the connection")
        .unwrap();

    assert!(out.is_empty());
    assert!(began.elapsed() >= Duration::from_millis(900));
    eventually(|| server.status().active_connections == 0).await;

    tokio::time::timeout(Duration::from_secs(2), server.halt())
        .await
        .expect("halt should not wait on the dropped connection");
}
