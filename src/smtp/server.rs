//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

//! The SMTP sink.
//!
//! Accepts every sender and recipient, stores each delivered message
//! through the storage engine, and fans the envelope out to the enabled
//! auto-relays. A storage failure is reported to the client as a transient
//! error so a real MTA will retry.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use super::relay;
use super::Envelope;
use crate::storage::engine::Engine;
use crate::support::error::Error;
use crate::support::system_config::SmtpConfig;

const MAX_MESSAGE_SIZE: usize = 25 * 1024 * 1024;

pub struct SmtpServer {
    config: SmtpConfig,
    engine: Arc<Engine>,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(SmtpServer { config, engine })
    }

    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        log::info!("starting smtp server on {}", self.config.addr);
        self.serve(listener).await
    }

    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Error> {
        loop {
            let (socket, peer) = listener.accept().await?;
            log::debug!("new connection from {}", peer);
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(socket, peer).await {
                    log::warn!("smtp connection from {}: {}", peer, e);
                }
            });
        }
    }

    async fn serve_connection(
        &self,
        socket: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), Error> {
        let (read_half, mut writer) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        reply(
            &mut writer,
            &format!("220 {} mockmta ready", self.config.host_name),
        )
        .await?;

        let mut sender: Option<String> = None;
        let mut recipients: Vec<String> = Vec::new();

        loop {
            let line = match read_line(&mut reader).await? {
                Some(line) => line,
                None => break,
            };
            log::debug!("smtp <= {}", line);

            let verb = line
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_uppercase();

            match verb.as_str() {
                "HELO" => {
                    reply(&mut writer, &format!("250 {}", self.config.host_name))
                        .await?
                },
                "EHLO" => {
                    reply(
                        &mut writer,
                        &format!(
                            "250-{}\r\n250-SIZE {}\r\n250 OK",
                            self.config.host_name, MAX_MESSAGE_SIZE
                        ),
                    )
                    .await?
                },
                "MAIL" => {
                    sender = Some(parse_path(&line));
                    recipients.clear();
                    log::debug!("received sender {:?}", sender);
                    reply(&mut writer, "250 2.1.0 OK").await?
                },
                "RCPT" => {
                    if sender.is_none() {
                        reply(&mut writer, "503 5.5.1 MAIL first").await?;
                        continue;
                    }
                    let recipient = parse_path(&line);
                    log::debug!("received recipient {}", recipient);
                    recipients.push(recipient);
                    reply(&mut writer, "250 2.1.5 OK").await?
                },
                "DATA" => {
                    if recipients.is_empty() {
                        reply(&mut writer, "503 5.5.1 RCPT first").await?;
                        continue;
                    }
                    reply(
                        &mut writer,
                        "354 End data with <CR><LF>.<CR><LF>",
                    )
                    .await?;

                    let data = read_data(&mut reader).await?;
                    let data = match data {
                        Some(data) => data,
                        None => {
                            reply(&mut writer, "552 5.3.4 Message too big")
                                .await?;
                            sender = None;
                            recipients.clear();
                            continue;
                        },
                    };

                    let envelope = Envelope {
                        sender: sender.take().unwrap_or_default(),
                        recipients: std::mem::take(&mut recipients),
                        data,
                    };
                    match self.handle_message(peer, envelope).await {
                        Ok(()) => {
                            reply(&mut writer, "250 2.0.0 OK: queued")
                                .await?
                        },
                        Err(e) => {
                            log::error!("cannot store message: {}", e);
                            reply(
                                &mut writer,
                                "451 4.3.0 Temporary server error",
                            )
                            .await?
                        },
                    }
                },
                "RSET" => {
                    sender = None;
                    recipients.clear();
                    reply(&mut writer, "250 2.0.0 OK").await?
                },
                "NOOP" => reply(&mut writer, "250 2.0.0 OK").await?,
                "VRFY" => {
                    reply(&mut writer, "252 2.1.5 Cannot verify").await?
                },
                "QUIT" => {
                    reply(&mut writer, "221 2.0.0 Bye").await?;
                    break;
                },
                _ => {
                    reply(&mut writer, "500 5.5.2 Syntax error").await?
                },
            }
        }

        Ok(())
    }

    /// The ingress callback: parse and store, then fan out to auto-relays.
    ///
    /// Relay failures are logged but do not fail the delivery; the message
    /// is already safely stored.
    async fn handle_message(
        &self,
        peer: SocketAddr,
        envelope: Envelope,
    ) -> Result<(), Error> {
        log::debug!(
            "delivery from {} (sender={}, recipients={:?}, {} bytes)",
            peer,
            envelope.sender,
            envelope.recipients,
            envelope.data.len()
        );

        let email_id = self.engine.set(&envelope.data)?;

        for (name, relay_config) in &self.config.relays {
            if !relay_config.enabled || !relay_config.auto_relay {
                continue;
            }
            log::info!("relaying message to {}", relay_config.addr);
            if let Err(e) =
                relay::relay_message(relay_config, &email_id, &envelope)
                    .await
            {
                log::error!("failed to relay message via {}: {}", name, e);
            }
        }
        Ok(())
    }
}

async fn reply(
    writer: &mut OwnedWriteHalf,
    text: &str,
) -> Result<(), Error> {
    log::debug!("smtp => {}", text);
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_line(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<String>, Error> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with(b"\n") || line.ends_with(b"\r") {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Read the DATA payload up to the lone-dot terminator, undoing dot
/// stuffing. Returns `None` when the message exceeds the size limit (the
/// stream is still drained to the terminator).
async fn read_data(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<Vec<u8>>, Error> {
    let mut data = Vec::new();
    let mut oversized = false;

    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(Error::UnexpectedSmtpReply(
                "connection closed during DATA".to_owned(),
            ));
        }

        let trimmed = trim_crlf(&line);
        if trimmed == b"." {
            break;
        }

        if !oversized {
            let content: &[u8] = if line.starts_with(b".") {
                &line[1..]
            } else {
                &line
            };
            data.extend_from_slice(content);
            if data.len() > MAX_MESSAGE_SIZE {
                oversized = true;
            }
        }
    }

    if oversized {
        Ok(None)
    } else {
        Ok(Some(data))
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut line = line;
    while line.ends_with(b"\n") || line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    line
}

/// Extract the path from `MAIL FROM:<a@x>` / `RCPT TO:<a@x>` style lines,
/// tolerating missing angle brackets.
fn parse_path(line: &str) -> String {
    let after_colon = match line.find(':') {
        Some(ix) => &line[ix + 1..],
        None => return String::new(),
    };
    let after_colon = after_colon.trim();
    if let Some(start) = after_colon.find('<') {
        if let Some(end) = after_colon[start + 1..].find('>') {
            return after_colon[start + 1..start + 1 + end].to_owned();
        }
    }
    after_colon
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_owned()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    use super::*;
    use crate::storage::engine::test::MockLayer;
    use crate::storage::engine::Engine;
    use crate::storage::{Storage, StorageLayer};
    use crate::support::system_config::SmtpConfig;

    #[test]
    fn parse_path_variants() {
        assert_eq!("a@x", parse_path("MAIL FROM:<a@x>"));
        assert_eq!("a@x", parse_path("MAIL FROM: <a@x> SIZE=100"));
        assert_eq!("a@x", parse_path("RCPT TO:a@x"));
        assert_eq!("", parse_path("MAIL FROM:<>"));
        assert_eq!("", parse_path("DATA"));
    }

    #[test]
    fn trim_crlf_variants() {
        assert_eq!(b"x", trim_crlf(b"x\r\n"));
        assert_eq!(b"x", trim_crlf(b"x\n"));
        assert_eq!(b"x", trim_crlf(b"x"));
        assert_eq!(b"", trim_crlf(b"\r\n"));
    }

    async fn send_line(
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> String {
        stream
            .get_mut()
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
        read_reply_line(stream).await
    }

    async fn read_reply_line(stream: &mut BufReader<TcpStream>) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            stream.read_line(&mut line).await.unwrap();
            let done = line.len() < 4 || line.as_bytes()[3] == b' ';
            reply.push_str(&line);
            if done {
                return reply.trim_end().to_owned();
            }
        }
    }

    #[tokio::test]
    async fn full_session_stores_message() {
        let mock = Arc::new(MockLayer::new("mock", &[]));
        let engine = Arc::new(
            Engine::from_layers(vec![Box::new(Arc::clone(&mock))
                as Box<dyn StorageLayer>])
            .unwrap(),
        );
        let server = SmtpServer::new(SmtpConfig::default(), engine.clone());

        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut stream = BufReader::new(stream);

        assert!(read_reply_line(&mut stream).await.starts_with("220"));
        assert!(send_line(&mut stream, "EHLO client.example")
            .await
            .starts_with("250"));
        assert!(send_line(&mut stream, "MAIL FROM:<a@x>")
            .await
            .starts_with("250"));
        assert!(send_line(&mut stream, "RCPT TO:<b@y>")
            .await
            .starts_with("250"));
        assert!(send_line(&mut stream, "DATA").await.starts_with("354"));

        let reply = send_line(
            &mut stream,
            "From: a@x\r\nTo: b@y\r\nSubject: Hi\r\n\r\nBody\r\n.",
        )
        .await;
        assert!(reply.starts_with("250"), "unexpected reply: {}", reply);
        assert!(send_line(&mut stream, "QUIT").await.starts_with("221"));

        // Exactly one message was stored, and it parses as expected
        let stored = mock.stored.lock().unwrap();
        assert_eq!(1, stored.len());
        let email_id = stored.keys().next().unwrap().clone();
        drop(stored);
        let header = Storage::get_email_by_id(&*mock, &email_id).unwrap();
        assert_eq!("Hi", header.subject);
        assert_eq!("b@y", header.tos[0].address);
    }

    #[tokio::test]
    async fn rcpt_before_mail_is_rejected() {
        let mock = Arc::new(MockLayer::new("mock", &[]));
        let engine = Arc::new(
            Engine::from_layers(vec![
                Box::new(mock) as Box<dyn StorageLayer>
            ])
            .unwrap(),
        );
        let server = SmtpServer::new(SmtpConfig::default(), engine);

        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut stream = BufReader::new(stream);
        read_reply_line(&mut stream).await;

        assert!(send_line(&mut stream, "RCPT TO:<b@y>")
            .await
            .starts_with("503"));
        assert!(send_line(&mut stream, "DATA").await.starts_with("503"));
        assert!(send_line(&mut stream, "BOGUS").await.starts_with("500"));
    }

    #[tokio::test]
    async fn dot_stuffed_data_is_unstuffed() {
        let mock = Arc::new(MockLayer::new("mock", &[]));
        let engine = Arc::new(
            Engine::from_layers(vec![Box::new(Arc::clone(&mock))
                as Box<dyn StorageLayer>])
            .unwrap(),
        );
        let server = SmtpServer::new(SmtpConfig::default(), engine);

        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut stream = BufReader::new(stream);
        read_reply_line(&mut stream).await;

        send_line(&mut stream, "HELO c").await;
        send_line(&mut stream, "MAIL FROM:<a@x>").await;
        send_line(&mut stream, "RCPT TO:<b@y>").await;
        send_line(&mut stream, "DATA").await;
        send_line(
            &mut stream,
            "Subject: dots\r\n\r\n..leading dot\r\n.",
        )
        .await;

        let stored = mock.stored.lock().unwrap();
        let (_, raw) = stored.iter().next().unwrap();
        let raw = String::from_utf8_lossy(raw);
        assert!(
            raw.contains("\n.leading dot"),
            "dot stuffing not undone: {:?}",
            raw
        );
    }
}
