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

//! The relay dispatcher: a minimal SMTP client that re-emits a stored
//! message to one configured upstream server, optionally authenticating
//! with PLAIN, LOGIN or CRAM-MD5.

use std::fmt::Write as _;

use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::Envelope;
use crate::support::error::Error;
use crate::support::system_config::{RelayConfig, RelayMechanism};

/// Re-emit `envelope` through the upstream server of `config`.
pub async fn relay_message(
    config: &RelayConfig,
    email_id: &str,
    envelope: &Envelope,
) -> Result<(), Error> {
    log::info!(
        "relaying message {} (addr={} auth={:?}, sender={}, recipients={:?})",
        email_id,
        config.addr,
        config.mechanism,
        envelope.sender,
        envelope.recipients
    );

    let stream = TcpStream::connect(&config.addr).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    expect(&mut reader, 220).await?;
    send(&mut writer, "EHLO localhost").await?;
    expect(&mut reader, 250).await?;

    authenticate(config, &mut reader, &mut writer).await?;

    send(&mut writer, &format!("MAIL FROM:<{}>", envelope.sender)).await?;
    expect(&mut reader, 250).await?;
    for recipient in &envelope.recipients {
        send(&mut writer, &format!("RCPT TO:<{}>", recipient)).await?;
        expect(&mut reader, 250).await?;
    }

    send(&mut writer, "DATA").await?;
    expect(&mut reader, 354).await?;
    write_data(&mut writer, &envelope.data).await?;
    expect(&mut reader, 250).await?;

    send(&mut writer, "QUIT").await?;
    // The server may close without a goodbye; don't fail delivery on it.
    let _ = read_reply(&mut reader).await;

    Ok(())
}

async fn authenticate(
    config: &RelayConfig,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<(), Error> {
    match config.mechanism {
        RelayMechanism::None => Ok(()),
        RelayMechanism::Plain => {
            let token = base64::encode(format!(
                "\0{}\0{}",
                config.username, config.password
            ));
            send(writer, &format!("AUTH PLAIN {}", token)).await?;
            expect(reader, 235).await?;
            Ok(())
        },
        RelayMechanism::Login => {
            send(writer, "AUTH LOGIN").await?;
            for _ in 0..2 {
                let challenge = read_challenge(reader).await?;
                let answer = match challenge.trim() {
                    "Username:" => config.username.as_bytes(),
                    "Password:" => config.password.as_bytes(),
                    other => {
                        return Err(Error::UnexpectedServerChallenge(
                            other.to_owned(),
                        ))
                    },
                };
                send(writer, &base64::encode(answer)).await?;
            }
            expect(reader, 235).await?;
            Ok(())
        },
        RelayMechanism::CramMd5 => {
            send(writer, "AUTH CRAM-MD5").await?;
            let challenge = read_challenge(reader).await?;
            let response = cram_md5_response(
                &config.username,
                &config.password,
                challenge.as_bytes(),
            )?;
            send(writer, &base64::encode(response)).await?;
            expect(reader, 235).await?;
            Ok(())
        },
    }
}

/// The CRAM-MD5 answer of RFC 2195: `<user> HEX(HMAC-MD5(secret, challenge))`.
fn cram_md5_response(
    username: &str,
    password: &str,
    challenge: &[u8],
) -> Result<String, Error> {
    let key = PKey::hmac(password.as_bytes())?;
    let mut signer = Signer::new(MessageDigest::md5(), &key)?;
    signer.update(challenge)?;
    let digest = signer.sign_to_vec()?;

    let mut response = String::with_capacity(username.len() + 1 + 32);
    response.push_str(username);
    response.push(' ');
    for byte in digest {
        let _ = write!(response, "{:02x}", byte);
    }
    Ok(response)
}

/// Read a 334 continuation and return its base64-decoded challenge.
async fn read_challenge(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<String, Error> {
    let (code, text) = read_reply(reader).await?;
    if code != 334 {
        return Err(Error::UnexpectedSmtpReply(format!(
            "{} {}",
            code, text
        )));
    }
    let decoded = base64::decode(text.trim())
        .map_err(|_| Error::UnexpectedServerChallenge(text.clone()))?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), Error> {
    log::debug!("relay => {}", line);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Write the message data with dot stuffing and the terminating dot line.
async fn write_data(
    writer: &mut OwnedWriteHalf,
    data: &[u8],
) -> Result<(), Error> {
    for line in data.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b".") {
            writer.write_all(b".").await?;
        }
        writer.write_all(line).await?;
    }
    if !data.is_empty() && !data.ends_with(b"\n") {
        writer.write_all(b"\r\n").await?;
    }
    writer.write_all(b".\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one (possibly multi-line) SMTP reply.
async fn read_reply(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<(u16, String), Error> {
    let mut text = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::UnexpectedSmtpReply(
                "connection closed".to_owned(),
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 3 {
            return Err(Error::UnexpectedSmtpReply(line.to_owned()));
        }
        let code: u16 = line[..3]
            .parse()
            .map_err(|_| Error::UnexpectedSmtpReply(line.to_owned()))?;

        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(line[3..].trim_start_matches(['-', ' ']));

        if line.len() == 3 || line.as_bytes()[3] == b' ' {
            return Ok((code, text));
        }
    }
}

async fn expect(
    reader: &mut BufReader<OwnedReadHalf>,
    expected: u16,
) -> Result<(), Error> {
    let (code, text) = read_reply(reader).await?;
    if code != expected {
        return Err(Error::UnexpectedSmtpReply(format!(
            "{} {}",
            code, text
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn cram_md5_rfc2195_vector() {
        let response = cram_md5_response(
            "tim",
            "tanstaaftanstaaf",
            b"<1896.697170952@postoffice.reston.mci.net>",
        )
        .unwrap();
        assert_eq!(
            "tim b913a602c7eda7a495b4e6e7334d3890",
            response
        );
    }

    /// A one-connection fake upstream that scripts the server side of the
    /// dialogue and captures everything the client sends.
    async fn fake_upstream(
        listener: TcpListener,
        script: Vec<&'static str>,
    ) -> Vec<String> {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = vec![0u8; 65536];
        let mut pending = String::new();

        socket.write_all(b"220 fake ready\r\n").await.unwrap();
        for reply in script {
            // Read until we have at least one complete line
            while !pending.contains('\n') {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return received;
                }
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            let split = pending.find('\n').unwrap() + 1;
            let line: String = pending.drain(..split).collect();
            received.push(line.trim_end().to_owned());
            socket
                .write_all(format!("{}\r\n", reply).as_bytes())
                .await
                .unwrap();
        }
        received
    }

    #[tokio::test]
    async fn plain_auth_dialogue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = tokio::spawn(fake_upstream(
            listener,
            vec![
                "250 OK",        // EHLO
                "235 2.7.0 OK",  // AUTH PLAIN <token>
                "250 OK",        // MAIL
                "250 OK",        // RCPT
                "354 go ahead",  // DATA
                "250 queued",    // after dot (the fake reads line-wise)
            ],
        ));

        let config = RelayConfig {
            enabled: true,
            auto_relay: false,
            addr: addr.to_string(),
            username: "u".to_owned(),
            password: "p".to_owned(),
            mechanism: RelayMechanism::Plain,
        };
        let envelope = Envelope {
            sender: "a@x".to_owned(),
            recipients: vec!["b@y".to_owned()],
            data: b"Subject: s\r\n\r\nbody\r\n".to_vec(),
        };

        relay_message(&config, "id-1", &envelope).await.unwrap();

        let received = upstream.await.unwrap();
        assert!(received[0].starts_with("EHLO"));
        assert_eq!(
            format!("AUTH PLAIN {}", base64::encode("\0u\0p")),
            received[1]
        );
        assert_eq!("MAIL FROM:<a@x>", received[2]);
        assert_eq!("RCPT TO:<b@y>", received[3]);
        assert_eq!("DATA", received[4]);
    }

    #[tokio::test]
    async fn login_auth_answers_username_and_password() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let username_challenge =
            format!("334 {}", base64::encode("Username:"));
        let password_challenge =
            format!("334 {}", base64::encode("Password:"));
        let username_challenge: &'static str =
            Box::leak(username_challenge.into_boxed_str());
        let password_challenge: &'static str =
            Box::leak(password_challenge.into_boxed_str());

        let upstream = tokio::spawn(fake_upstream(
            listener,
            vec![
                "250 OK",            // EHLO
                username_challenge,  // AUTH LOGIN
                password_challenge,  // username
                "235 2.7.0 OK",      // password
                "250 OK",            // MAIL
                "250 OK",            // RCPT
                "354 go ahead",      // DATA
                "250 queued",
            ],
        ));

        let config = RelayConfig {
            enabled: true,
            auto_relay: false,
            addr: addr.to_string(),
            username: "user".to_owned(),
            password: "secret".to_owned(),
            mechanism: RelayMechanism::Login,
        };
        let envelope = Envelope {
            sender: "a@x".to_owned(),
            recipients: vec!["b@y".to_owned()],
            data: b"Subject: s\r\n\r\nbody\r\n".to_vec(),
        };

        relay_message(&config, "id-1", &envelope).await.unwrap();

        let received = upstream.await.unwrap();
        assert_eq!("AUTH LOGIN", received[1]);
        assert_eq!(base64::encode("user"), received[2]);
        assert_eq!(base64::encode("secret"), received[3]);
    }

    #[tokio::test]
    async fn login_auth_rejects_unknown_challenge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let bogus = format!("334 {}", base64::encode("Realm:"));
        let bogus: &'static str = Box::leak(bogus.into_boxed_str());
        tokio::spawn(fake_upstream(
            listener,
            vec!["250 OK", bogus],
        ));

        let config = RelayConfig {
            enabled: true,
            auto_relay: false,
            addr: addr.to_string(),
            username: "user".to_owned(),
            password: "secret".to_owned(),
            mechanism: RelayMechanism::Login,
        };
        let envelope = Envelope {
            sender: "a@x".to_owned(),
            recipients: vec!["b@y".to_owned()],
            data: b"x".to_vec(),
        };

        match relay_message(&config, "id-1", &envelope).await {
            Err(Error::UnexpectedServerChallenge(challenge)) => {
                assert_eq!("Realm:", challenge)
            },
            other => panic!("unexpected: {:?}", other),
        }
    }
}
