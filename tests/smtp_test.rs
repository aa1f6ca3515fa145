#![allow(clippy::similar_names)]

//! End-to-end SMTP submission tests: a real gateway bound to a
//! loopback socket, TLS disabled, driven by a plain `TcpStream`.

mod support;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::ReadHalf;

use support::{spawn_smtp_gateway, MockUpstreamBuilder, TEST_API_KEY};

async fn read_line(reader: &mut BufReader<ReadHalf<'_>>) -> String {
    let mut line = String::new();
    let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a reply")
        .expect("read_line");
    assert!(n > 0, "connection closed unexpectedly");
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Read multi-line `250-`/`250 ` EHLO-style replies until the final
/// (space-separated, not dash-separated) line.
async fn read_multiline(reader: &mut BufReader<ReadHalf<'_>>, code: &str) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader).await;
        let is_last = line.starts_with(&format!("{code} "));
        lines.push(line);
        if is_last {
            return lines;
        }
    }
}

fn plain_auth(username: &str, password: &str) -> String {
    let mut raw = Vec::new();
    raw.push(0u8);
    raw.extend_from_slice(username.as_bytes());
    raw.push(0u8);
    raw.extend_from_slice(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(raw)
}

#[tokio::test]
async fn ehlo_auth_mail_rcpt_data_round_trip() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_smtp_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let greeting = read_line(&mut reader).await;
    assert!(greeting.starts_with("220"), "unexpected greeting: {greeting}");

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    let lines = read_multiline(&mut reader, "250").await;
    assert!(lines.iter().any(|l| l.contains("AUTH PLAIN LOGIN")), "missing AUTH advertisement: {lines:?}");

    let auth_response = plain_auth("alice@example.com", TEST_API_KEY);
    write_half
        .write_all(format!("AUTH PLAIN {auth_response}\r\n").as_bytes())
        .await
        .unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("235"), "auth failed: {reply}");

    write_half.write_all(b"MAIL FROM:<alice@example.com>\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("250"), "MAIL FROM rejected: {reply}");

    write_half.write_all(b"RCPT TO:<bob@example.net>\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("250"), "RCPT TO rejected: {reply}");

    write_half.write_all(b"DATA\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("354"), "DATA not accepted: {reply}");

    write_half
        .write_all(b"Subject: hello\r\nFrom: alice@example.com\r\n\r\nBody text.\r\n.\r\n")
        .await
        .unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("250"), "message not accepted: {reply}");

    write_half.write_all(b"QUIT\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("221"));
}

#[tokio::test]
async fn auth_login_two_step_continuation() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_smtp_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    read_line(&mut reader).await;

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    read_multiline(&mut reader, "250").await;

    write_half.write_all(b"AUTH LOGIN\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("334"), "expected username prompt: {reply}");

    let encoded_user = base64::engine::general_purpose::STANDARD.encode("alice@example.com");
    write_half.write_all(format!("{encoded_user}\r\n").as_bytes()).await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("334"), "expected password prompt: {reply}");

    let encoded_pass = base64::engine::general_purpose::STANDARD.encode(TEST_API_KEY);
    write_half.write_all(format!("{encoded_pass}\r\n").as_bytes()).await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("235"), "auth login failed: {reply}");
}

#[tokio::test]
async fn rcpt_before_mail_from_is_rejected() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_smtp_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    read_line(&mut reader).await;

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    read_multiline(&mut reader, "250").await;

    let auth_response = plain_auth("alice@example.com", TEST_API_KEY);
    write_half
        .write_all(format!("AUTH PLAIN {auth_response}\r\n").as_bytes())
        .await
        .unwrap();
    read_line(&mut reader).await;

    write_half.write_all(b"RCPT TO:<bob@example.net>\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("503"), "expected out-of-order rejection: {reply}");
}

#[tokio::test]
async fn commands_before_auth_are_rejected() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_smtp_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    read_line(&mut reader).await;

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    read_multiline(&mut reader, "250").await;

    write_half.write_all(b"MAIL FROM:<alice@example.com>\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("530"), "expected auth-required rejection: {reply}");
}

#[tokio::test]
async fn bad_password_prefix_is_rejected() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_smtp_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    read_line(&mut reader).await;

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    read_multiline(&mut reader, "250").await;

    let auth_response = plain_auth("alice@example.com", "not-an-api-key");
    write_half
        .write_all(format!("AUTH PLAIN {auth_response}\r\n").as_bytes())
        .await
        .unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("535"), "expected credentials-invalid rejection: {reply}");
}
