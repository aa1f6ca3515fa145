#![allow(clippy::similar_names)]

//! End-to-end IMAP wire tests: a real gateway bound to a loopback
//! socket, driven by a plain `TcpStream`, backed by an in-memory
//! upstream fixture. No mocking below the `Upstream` trait boundary --
//! everything from the socket through the framer, parser, dispatcher
//! and formatter runs for real.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use support::{spawn_imap_gateway, MockUpstreamBuilder, TEST_API_KEY};

#[tokio::test]
async fn login_then_list_reports_seeded_folders() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .folder("sender1", "Sent", Some("sent"))
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    reader.read_line(&mut line).await.expect("greeting");
    assert!(line.starts_with("* OK"));

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    let lines = read_tagged(&mut reader, "a1").await;
    assert!(lines.last().unwrap().starts_with("a1 OK"));

    write_half.write_all(b"a2 LIST \"\" \"*\"\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a2").await;
    assert!(lines.iter().any(|l| l.contains("INBOX")), "missing INBOX in {lines:?}");
    assert!(lines.iter().any(|l| l.contains("Sent")), "missing Sent in {lines:?}");
    assert!(lines.last().unwrap().starts_with("a2 OK"));
}

async fn read_tagged(reader: &mut BufReader<tokio::net::tcp::ReadHalf<'_>>, tag: &str) -> Vec<String> {
    let prefix = format!("{tag} ");
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for response")
            .expect("read_line");
        assert!(n > 0, "connection closed before tagged response");
        let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
        let done = trimmed.starts_with(&prefix);
        lines.push(trimmed);
        if done {
            return lines;
        }
    }
}

#[tokio::test]
async fn select_empty_mailbox_then_logout() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    read_tagged(&mut reader, "a1").await;

    write_half.write_all(b"a2 SELECT INBOX\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a2").await;
    assert!(lines.iter().any(|l| l.contains("0 EXISTS")), "expected 0 EXISTS in {lines:?}");
    assert!(lines.last().unwrap().starts_with("a2 OK"));

    write_half.write_all(b"a3 LOGOUT\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a3").await;
    assert!(lines.iter().any(|l| l.starts_with("* BYE")));
    assert!(lines.last().unwrap().starts_with("a3 OK"));
}

#[tokio::test]
async fn append_then_fetch_round_trips_body() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    read_tagged(&mut reader, "a1").await;

    let literal = b"Hello world\r\n";
    write_half
        .write_all(format!("a2 APPEND INBOX {{{}}}\r\n", literal.len()).as_bytes())
        .await
        .unwrap();
    let mut cont = String::new();
    reader.read_line(&mut cont).await.unwrap();
    assert!(cont.starts_with('+'), "expected continuation, got {cont}");
    write_half.write_all(literal).await.unwrap();
    write_half.write_all(b"\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a2").await;
    assert!(lines.last().unwrap().contains("APPENDUID"), "expected APPENDUID in {lines:?}");

    write_half.write_all(b"a3 SELECT INBOX\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a3").await;
    assert!(lines.iter().any(|l| l.contains("1 EXISTS")), "expected 1 EXISTS in {lines:?}");

    write_half.write_all(b"a4 UID FETCH 1 (BODY.PEEK[])\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a4").await;
    let joined = lines.join("\n");
    assert!(joined.contains("Hello world"), "expected message body in {joined}");
    assert!(lines.last().unwrap().starts_with("a4 OK"));
}

#[tokio::test]
async fn move_shifts_sequence_numbers() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .folder("sender1", "Archive", Some("archive"))
        .message("sender1", "INBOX", 10, &["\\Seen"], b"Subject: one\r\n\r\nbody one")
        .message("sender1", "INBOX", 20, &[], b"Subject: two\r\n\r\nbody two")
        .message("sender1", "INBOX", 30, &[], b"Subject: three\r\n\r\nbody three")
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    read_tagged(&mut reader, "a1").await;

    write_half.write_all(b"a2 SELECT INBOX\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a2").await;
    assert!(lines.iter().any(|l| l.contains("3 EXISTS")), "expected 3 EXISTS in {lines:?}");

    // Sequence number 2 (UID 20) moves to Archive; 3 (UID 30) shifts down to 2.
    write_half.write_all(b"a3 MOVE 2 Archive\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a3").await;
    assert!(lines.last().unwrap().starts_with("a3 OK"), "move failed: {lines:?}");

    write_half.write_all(b"a4 UID SEARCH ALL\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a4").await;
    let search_line = lines.iter().find(|l| l.starts_with("* SEARCH")).expect("search result");
    assert!(search_line.contains("10"), "expected uid 10 to remain: {search_line}");
    assert!(search_line.contains("30"), "expected uid 30 to remain: {search_line}");
    assert!(!search_line.contains("20"), "uid 20 should have moved out: {search_line}");
}

#[tokio::test]
async fn idle_then_done_returns_to_command_mode() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    read_tagged(&mut reader, "a1").await;

    write_half.write_all(b"a2 SELECT INBOX\r\n").await.unwrap();
    read_tagged(&mut reader, "a2").await;

    write_half.write_all(b"a3 IDLE\r\n").await.unwrap();
    let mut cont = String::new();
    reader.read_line(&mut cont).await.unwrap();
    assert!(cont.starts_with('+'), "expected idle continuation, got {cont}");

    write_half.write_all(b"DONE\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a3").await;
    assert!(lines.last().unwrap().starts_with("a3 OK"), "idle did not complete cleanly: {lines:?}");

    write_half.write_all(b"a4 NOOP\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a4").await;
    assert!(lines.last().unwrap().starts_with("a4 OK"));
}

#[tokio::test]
async fn append_literal_too_large_is_rejected() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .folder("sender1", "INBOX", Some("inbox"))
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half
        .write_all(format!("a1 LOGIN \"api\" \"{TEST_API_KEY}\"\r\n").as_bytes())
        .await
        .unwrap();
    read_tagged(&mut reader, "a1").await;

    // Oversized literal: the framer rejects before reading the declared
    // byte count off the wire, reports an untagged BAD and closes the
    // connection rather than waiting for bytes that were never going
    // to arrive inside any reasonable buffer.
    write_half
        .write_all(b"a2 APPEND INBOX {999999999}\r\n")
        .await
        .unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("* BAD"), "expected untagged BAD, got {line}");

    let mut rest = String::new();
    let n = reader.read_to_string(&mut rest).await.unwrap_or(0);
    assert_eq!(n, 0, "expected connection to close after the oversized literal, got {rest:?}");
}

#[tokio::test]
async fn login_with_bad_password_prefix_is_rejected() {
    let upstream = MockUpstreamBuilder::new()
        .sender("sender1", "alice@example.com")
        .build();
    let mut stream = spawn_imap_gateway(Arc::new(upstream)).await;
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();

    write_half.write_all(b"a1 LOGIN \"api\" \"not-an-api-key\"\r\n").await.unwrap();
    let lines = read_tagged(&mut reader, "a1").await;
    assert!(lines.last().unwrap().starts_with("a1 NO"), "expected login rejection: {lines:?}");
}
