//! End-to-end: a real listener, raw HTTP/1.1 over TCP.

use std::net::SocketAddr;

use errmux::{HttpError, Request, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
}

#[tokio::test]
async fn serves_and_shuts_down() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut app = Router::with_error_handler(errmux::json_error_handler);
    app.handle_func("/items/{id}", |req: Request| async move {
        match req.param("id") {
            Some("0") => {
                Err(HttpError::new(404, "Not Found").with_internal_message("item 0 was deleted"))
            }
            Some(id) => Ok(format!("item {id}")),
            None => Err(HttpError::new(400, "Bad Request")),
        }
    });
    app.handle_func("/echo", |req: Request| async move {
        Ok::<_, HttpError>(String::from_utf8_lossy(req.body()).into_owned())
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener);
    let addr = server.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let (tx, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        server
            .serve_with_shutdown(app, async {
                let _ = rx.await;
            })
            .await
    });

    let ok = roundtrip(addr, &get("/items/7")).await;
    assert!(ok.starts_with("HTTP/1.1 200 OK"), "{ok}");
    assert!(ok.ends_with("item 7"), "{ok}");

    let missing = roundtrip(addr, &get("/items/0")).await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"), "{missing}");
    assert!(missing.contains("application/json"), "{missing}");
    assert!(missing.ends_with(r#"{"code":404,"message":"Not Found"}"#), "{missing}");

    let echo = roundtrip(
        addr,
        concat!(
            "POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-length: 5\r\n",
            "connection: close\r\n\r\nhello",
        ),
    )
    .await;
    assert!(echo.ends_with("hello"), "{echo}");

    let unknown = roundtrip(addr, &get("/nowhere")).await;
    assert!(unknown.starts_with("HTTP/1.1 404 Not Found"), "{unknown}");

    tx.send(()).unwrap();
    let result: Result<(), errmux::Error> = server.await.unwrap();
    assert!(result.is_ok());
}
