//! End to end conversations with a server listening on a real socket.

mod common;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use common::{Client, Recorder, codes};
use mailin::{
    server::{Server, Signal},
    session::SessionConfig,
};
use pretty_assertions::assert_eq;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};

struct TestServer {
    addr: SocketAddr,
    recorder: Arc<Recorder>,
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(config: SessionConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorder = Arc::new(Recorder::default());
        let (shutdown, receiver) = broadcast::channel(1);

        let server = Server::new(config, recorder.clone());
        let handle = tokio::spawn(async move { server.serve(listener, receiver).await });

        Self {
            addr,
            recorder,
            shutdown,
            handle,
        }
    }

    async fn connect(&self) -> Client<TcpStream> {
        let mut client = Client::new(TcpStream::connect(self.addr).await.unwrap());
        assert_eq!(client.reply().await, "220 mx.example.com ESMTP\r\n");
        client
    }

    async fn stop(self) {
        self.shutdown.send(Signal::Shutdown).unwrap();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("Server should stop once its sessions end")
            .unwrap()
            .unwrap();
    }
}

fn config() -> SessionConfig {
    SessionConfig::builder()
        .with_hostname("mx.example.com")
        .with_auth(true)
        .build()
}

#[tokio::test]
async fn deliver_one_message() {
    let server = TestServer::start(config()).await;
    let mut client = server.connect().await;

    assert_eq!(client.code("EHLO client.example.com").await, 250);
    assert_eq!(client.code("MAIL FROM:<a@x.com>").await, 250);
    assert_eq!(client.code("RCPT TO:<b@x.com>").await, 250);
    assert_eq!(client.code("DATA").await, 354);
    assert_eq!(
        client
            .code("Subject: test\r\n\r\nHello\r\n..\r\n.")
            .await,
        250
    );
    assert_eq!(client.code("QUIT").await, 221);
    assert!(client.closed().await);

    let messages = server.recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, "a@x.com");
    assert_eq!(messages[0].recipients, vec!["b@x.com"]);
    assert_eq!(messages[0].message, b"Subject: test\r\n\r\nHello\r\n.\r\n");

    server.stop().await;
}

#[tokio::test]
async fn transaction_commands_before_greeting() {
    let server = TestServer::start(config()).await;
    let mut client = server.connect().await;

    for line in ["MAIL FROM:<a@x.com>", "RCPT TO:<b@x.com>", "DATA", "RSET"] {
        assert_eq!(client.code(line).await, 503, "{line}");
    }

    assert_eq!(client.code("QUIT").await, 221);
    server.stop().await;
}

#[tokio::test]
async fn auth_prompt_then_response() {
    let server = TestServer::start(config()).await;
    let mut client = server.connect().await;

    assert_eq!(client.code("EHLO client").await, 250);
    assert_eq!(client.command("AUTH PLAIN").await, "334\r\n");
    assert_eq!(client.code(&BASE64.encode("\0user\0pass")).await, 235);

    assert_eq!(
        *server.recorder.verified.lock().unwrap(),
        vec![("user".to_string(), "pass".to_string(), None)]
    );

    assert_eq!(client.code("QUIT").await, 221);
    server.stop().await;
}

#[tokio::test]
async fn byte_at_a_time() {
    let server = TestServer::start(config()).await;
    let mut client = server.connect().await;

    let conversation = b"EHLO client\r\nMAIL FROM:<a@x.com>\r\nRCPT TO:<b@x.com>\r\nDATA\r\nbody\r\n.\r\nQUIT\r\n";
    for byte in conversation {
        client.send(std::slice::from_ref(byte)).await;
    }

    let mut replies = String::new();
    for _ in 0..6 {
        replies.push_str(&client.reply().await);
    }

    assert_eq!(codes(&replies), vec!["250", "250", "250", "354", "250", "221"]);
    assert_eq!(server.recorder.messages()[0].message, b"body\r\n");

    server.stop().await;
}

#[tokio::test]
async fn sessions_are_independent() {
    let server = TestServer::start(config()).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;

    assert_eq!(first.code("EHLO one").await, 250);
    assert_eq!(first.code("MAIL FROM:<one@x.com>").await, 250);

    // The second connection has not greeted and has no transaction
    assert_eq!(second.code("RCPT TO:<b@x.com>").await, 503);
    assert_eq!(second.code("HELO two").await, 250);
    assert_eq!(second.code("RCPT TO:<b@x.com>").await, 503);

    assert_eq!(first.code("RCPT TO:<b@x.com>").await, 250);
    assert_eq!(first.code("QUIT").await, 221);
    assert_eq!(second.code("QUIT").await, 221);

    server.stop().await;
}

#[tokio::test]
async fn shutdown_waits_for_sessions() {
    let server = TestServer::start(config()).await;
    let mut client = server.connect().await;

    server.shutdown.send(Signal::Shutdown).unwrap();

    // The open session keeps working until the client leaves
    assert_eq!(client.code("HELO client").await, 250);
    assert!(!server.handle.is_finished());
    assert_eq!(client.code("QUIT").await, 221);

    timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
