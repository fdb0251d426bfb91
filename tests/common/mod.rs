#![allow(dead_code, reason = "Not every test binary uses every helper")]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mailin::{
    envelope::Message,
    error::SessionError,
    handler::{SessionInfo, TransactionHandler},
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Records everything a session reports, accepting only `user`/`pass`.
#[derive(Default)]
pub struct Recorder {
    pub messages: Mutex<Vec<Message>>,
    pub verified: Mutex<Vec<(String, String, Option<String>)>>,
    pub errors: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionHandler for Recorder {
    async fn deliver(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    async fn verify(
        &self,
        _session: &SessionInfo,
        username: &str,
        password: &str,
        identity: Option<&str>,
    ) -> bool {
        self.verified.lock().unwrap().push((
            username.to_string(),
            password.to_string(),
            identity.map(str::to_string),
        ));
        username == "user" && password == "pass"
    }

    async fn transport_error(&self, _peer: SocketAddr, error: &SessionError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// A line based client speaking to a session over any stream.
pub struct Client<S: AsyncRead + AsyncWrite + Unpin> {
    reader: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Read one complete reply, joining continuation lines.
    pub async fn reply(&mut self) -> String {
        let mut reply = String::new();

        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.unwrap();
            assert!(read > 0, "Connection closed while awaiting a reply");
            reply.push_str(&line);

            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                return reply;
            }
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        let stream = self.reader.get_mut();
        stream.write_all(bytes).await.unwrap();
        stream.flush().await.unwrap();
    }

    pub async fn command(&mut self, line: &str) -> String {
        self.send(format!("{line}\r\n").as_bytes()).await;
        self.reply().await
    }

    pub async fn code(&mut self, line: &str) -> u32 {
        self.command(line).await[..3].parse().unwrap()
    }

    /// Whether the server has closed the connection.
    pub async fn closed(&mut self) -> bool {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.map_or(true, |read| read == 0)
    }
}

/// The reply codes in `replies`, in order.
pub fn codes(replies: &str) -> Vec<&str> {
    replies
        .split("\r\n")
        .filter(|line| line.len() >= 3 && line.as_bytes().get(3) != Some(&b'-'))
        .map(|line| &line[..3])
        .collect()
}
