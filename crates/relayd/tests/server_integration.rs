//! Integration tests for the TCP chat server.
//!
//! These tests drive a real `ChatServer` over loopback sockets, covering
//! name negotiation, broadcast, private messages, commands and shutdown.
//! Line framing is used so replies can be read one line at a time.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; production code is checked for
//! panic-free behavior through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_protocol::Framing;
use relayd::assistant::{AssistantError, TextAssistant};
use relayd::config::ServerConfig;
use relayd::registry::RegistryHandle;
use relayd::server::ChatServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for an expected line
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a client must stay silent to count as "received nothing"
const SILENCE: Duration = Duration::from_millis(200);

/// Interval between registry polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    server: ChatServer,
    addr: SocketAddr,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(|_| {}, None).await
    }

    async fn spawn_with(
        configure: impl FnOnce(&mut ServerConfig),
        assistant: Option<Arc<dyn TextAssistant>>,
    ) -> Self {
        let mut config = ServerConfig::local_ephemeral();
        config.framing = Framing::Line;
        configure(&mut config);

        let mut server = ChatServer::new(config);
        if let Some(assistant) = assistant {
            server = server.with_assistant(assistant);
        }
        let addr = server.start().await.expect("start server");
        Self { server, addr }
    }

    fn registry(&self) -> RegistryHandle {
        self.server.registry().expect("server running")
    }

    /// Connects and sends `name`, then waits until the registry holds `expected_users`.
    async fn join(&self, name: &str, expected_users: usize) -> TestClient {
        let mut client = TestClient::connect(self.addr).await;
        client.send(name).await;
        self.wait_for_users(expected_users).await;
        client
    }

    async fn wait_for_users(&self, count: usize) {
        let registry = self.registry();
        let start = tokio::time::Instant::now();
        while registry.names().await.len() != count {
            assert!(
                start.elapsed() < READ_TIMEOUT,
                "registry never reached {count} users"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn stop(mut self) -> relayd::server::ShutdownReport {
        self.server.stop().await.expect("stop server")
    }
}

/// Line-oriented test client.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    local_port: u16,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to server");
        let local_port = stream.local_addr().expect("local addr").port();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            local_port,
        }
    }

    async fn send(&mut self, text: &str) {
        self.writer
            .write_all(format!("{text}\n").as_bytes())
            .await
            .expect("write to server");
    }

    /// Next line, or `None` at EOF.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("read from server");
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_string())
    }

    async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    async fn expect_silence(&mut self) {
        let mut line = String::new();
        let result = timeout(SILENCE, self.reader.read_line(&mut line)).await;
        assert!(result.is_err(), "unexpected message: {line:?}");
    }

    /// Reads until the shutdown sentinel, then expects EOF.
    async fn expect_shutdown(&mut self) {
        loop {
            match self.recv().await {
                Some(line) if line == "SERVER_SHUTDOWN" => break,
                Some(_) => continue,
                None => panic!("connection closed before SERVER_SHUTDOWN"),
            }
        }
        assert_eq!(self.recv().await, None);
    }
}

// ============================================================================
// Name negotiation
// ============================================================================

#[tokio::test]
async fn test_join_is_announced_to_others() {
    let server = TestServer::spawn().await;

    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;

    alice.expect("SYSTEM: Bob has joined the chat.").await;
    bob.expect_silence().await;

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_name_gets_suffix() {
    let server = TestServer::spawn().await;

    let mut first = server.join("Alice", 1).await;
    let mut second = server.join("Alice", 2).await;

    second
        .expect("SYSTEM: The username 'Alice' is already in use, so you have been renamed to 'Alice_1'.")
        .await;
    first.expect("SYSTEM: Alice_1 has joined the chat.").await;

    let mut third = server.join("Alice", 3).await;
    third
        .expect("SYSTEM: The username 'Alice' is already in use, so you have been renamed to 'Alice_2'.")
        .await;

    server.stop().await;
}

#[tokio::test]
async fn test_reserved_name_replaced_by_port_name() {
    let server = TestServer::spawn().await;

    let mut client = server.join("SERVER", 1).await;
    let expected = format!("User{}", client.local_port);

    client
        .expect(&format!(
            "SYSTEM: The requested username was invalid, so you have been named {expected}."
        ))
        .await;
    assert_eq!(server.registry().names().await, vec![expected.as_str()]);

    server.stop().await;
}

#[tokio::test]
async fn test_empty_name_replaced_by_port_name() {
    let server = TestServer::spawn().await;

    let mut client = server.join("   ", 1).await;
    let expected = format!("User{}", client.local_port);

    let notice = client.recv().await.expect("fallback notice");
    assert!(notice.ends_with(&format!("named {expected}.")), "{notice}");

    server.stop().await;
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_not_echoed_to_sender() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    alice.send("hello everyone").await;

    bob.expect("Alice: hello everyone").await;
    alice.expect_silence().await;

    server.stop().await;
}

#[tokio::test]
async fn test_messages_from_one_sender_arrive_in_order() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;

    for i in 0..20 {
        alice.send(&format!("msg {i}")).await;
    }
    for i in 0..20 {
        bob.expect(&format!("Alice: msg {i}")).await;
    }

    server.stop().await;
}

#[tokio::test]
async fn test_history_keeps_last_fifty_lines() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;

    for i in 0..55 {
        alice.send(&format!("msg {i}")).await;
    }
    for i in 0..55 {
        bob.expect(&format!("Alice: msg {i}")).await;
    }

    let history = server.registry().history(100).await;
    assert_eq!(history.len(), 50);
    assert_eq!(history.first().map(String::as_str), Some("Alice: msg 5"));
    assert_eq!(history.last().map(String::as_str), Some("Alice: msg 54"));

    server.stop().await;
}

#[tokio::test]
async fn test_leave_is_announced() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    drop(bob);

    alice.expect("SYSTEM: Bob has left the chat.").await;
    server.wait_for_users(1).await;

    server.stop().await;
}

// ============================================================================
// Private messages and commands
// ============================================================================

#[tokio::test]
async fn test_private_message_exactly_two_deliveries() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    let mut carol = server.join("Carol", 3).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;
    alice.expect("SYSTEM: Carol has joined the chat.").await;
    bob.expect("SYSTEM: Carol has joined the chat.").await;

    alice.send("/w Bob see you at five").await;

    bob.expect("(private from Alice): see you at five").await;
    alice.expect("(private to Bob): see you at five").await;
    carol.expect_silence().await;
    assert!(server.registry().history(10).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_private_message_errors() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;

    alice.send("/w Alice hi me").await;
    alice
        .expect("SYSTEM: You cannot send a private message to yourself.")
        .await;

    alice.send("/msg Nobody hello").await;
    alice.expect("SYSTEM: User 'Nobody' was not found.").await;

    alice.send("/w Bob").await;
    alice
        .expect("SYSTEM: Invalid private message format. Usage: /w <username> <message>")
        .await;

    server.stop().await;
}

#[tokio::test]
async fn test_list_users_in_join_order() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let _bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    alice.send("/users").await;
    alice.expect("SYSTEM: Connected users: Alice, Bob").await;

    alice.send("  /USERS  ").await;
    alice.expect("SYSTEM: Connected users: Alice, Bob").await;

    server.stop().await;
}

#[tokio::test]
async fn test_nick_renames_and_notifies() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    bob.send("/nick Robert").await;
    bob.expect("SYSTEM: You are now known as Robert.").await;
    alice.expect("SYSTEM: Bob is now known as Robert.").await;

    bob.send("hi").await;
    alice.expect("Robert: hi").await;

    bob.send("/nick system").await;
    let rejected = bob.recv().await.expect("rejection");
    assert!(rejected.starts_with("SYSTEM: "), "{rejected}");
    assert!(rejected.contains("reserved"), "{rejected}");

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_command_not_broadcast() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    alice.send("/dance wildly").await;

    alice
        .expect("SYSTEM: Unknown command: /dance. Type /help for a list of commands.")
        .await;
    bob.expect_silence().await;

    server.stop().await;
}

// ============================================================================
// Assistant commands
// ============================================================================

struct Cheerful;

#[async_trait]
impl TextAssistant for Cheerful {
    async fn transform(&self, text: &str, _context: &[String]) -> Result<String, AssistantError> {
        Ok(format!("{text}, and that's wonderful"))
    }

    async fn summarize(&self, history: &[String]) -> Result<String, AssistantError> {
        Ok(format!("{} messages about greetings", history.len()))
    }

    async fn ask(&self, question: &str) -> Result<String, AssistantError> {
        Ok(format!("{question} Absolutely."))
    }
}

struct Offline;

#[async_trait]
impl TextAssistant for Offline {
    async fn transform(&self, _text: &str, _context: &[String]) -> Result<String, AssistantError> {
        Err(AssistantError::Unavailable("no credentials".to_string()))
    }

    async fn summarize(&self, _history: &[String]) -> Result<String, AssistantError> {
        Err(AssistantError::Unavailable("no credentials".to_string()))
    }
}

#[tokio::test]
async fn test_positive_transform_broadcast_to_all() {
    let server = TestServer::spawn_with(|_| {}, Some(Arc::new(Cheerful))).await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    alice.send("/positive_transform it rained").await;

    let progress = alice.recv().await.expect("progress notice");
    assert!(progress.starts_with("SYSTEM_INFO: "), "{progress}");
    alice
        .expect("AI_POSITIVE_RESPONSE:Alice : it rained, and that's wonderful")
        .await;
    bob.expect("AI_POSITIVE_RESPONSE:Alice : it rained, and that's wonderful")
        .await;

    server.stop().await;
}

#[tokio::test]
async fn test_ask_answer_broadcast_to_all() {
    let server = TestServer::spawn_with(|_| {}, Some(Arc::new(Cheerful))).await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    bob.send("/ask Is Rust fun?").await;

    let progress = bob.recv().await.expect("progress notice");
    assert!(progress.starts_with("SYSTEM_INFO: "), "{progress}");
    bob.expect("AI_ANSWER:Bob : Is Rust fun? Absolutely.").await;
    alice.expect("AI_ANSWER:Bob : Is Rust fun? Absolutely.").await;

    server.stop().await;
}

#[tokio::test]
async fn test_summarize_replies_to_requester_only() {
    let server = TestServer::spawn_with(|_| {}, Some(Arc::new(Cheerful))).await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    bob.send("hello").await;
    alice.expect("Bob: hello").await;

    alice.send("/summarize").await;
    let progress = alice.recv().await.expect("progress notice");
    assert!(progress.starts_with("SYSTEM_INFO: "), "{progress}");
    alice
        .expect("SYSTEM_SUMMARY: 1 messages about greetings")
        .await;
    bob.expect_silence().await;

    server.stop().await;
}

#[tokio::test]
async fn test_assistant_failure_reported_to_requester() {
    let server = TestServer::spawn_with(|_| {}, Some(Arc::new(Offline))).await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    alice.expect("SYSTEM: Bob has joined the chat.").await;

    alice.send("/positive_transform hi").await;

    let _progress = alice.recv().await.expect("progress notice");
    let failure = alice.recv().await.expect("failure notice");
    assert!(failure.starts_with("SYSTEM: AI transformation failed"), "{failure}");
    bob.expect_silence().await;

    // Offline relies on the default answer, which always fails.
    alice.send("/ask anyone there?").await;

    let _progress = alice.recv().await.expect("progress notice");
    let failure = alice.recv().await.expect("failure notice");
    assert!(failure.starts_with("SYSTEM: AI question failed"), "{failure}");
    bob.expect_silence().await;

    server.stop().await;
}

#[tokio::test]
async fn test_ai_commands_unavailable_without_assistant() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;

    alice.send("/positive_transform hi").await;
    alice.expect("SYSTEM: AI features are currently unavailable.").await;

    server.stop().await;
}

// ============================================================================
// Capacity and shutdown
// ============================================================================

#[tokio::test]
async fn test_server_full_rejects_client() {
    let server = TestServer::spawn_with(|c| c.max_clients = 1, None).await;
    let _alice = server.join("Alice", 1).await;

    let mut bob = TestClient::connect(server.addr).await;
    bob.send("Bob").await;

    bob.expect("SYSTEM: The server is full (1 users). Try again later.")
        .await;
    assert_eq!(bob.recv().await, None);
    assert_eq!(server.registry().names().await, vec!["Alice"]);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_every_client() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice", 1).await;
    let mut bob = server.join("Bob", 2).await;
    let mut carol = server.join("Carol", 3).await;

    let report = server.stop().await;

    assert_eq!(report.sessions, 3);
    assert_eq!(report.notified, 3);
    assert!(report.listener_stopped);
    assert!(report.sessions_finished);

    alice.expect_shutdown().await;
    bob.expect_shutdown().await;
    carol.expect_shutdown().await;
}

#[tokio::test]
async fn test_shutdown_reaches_client_still_negotiating() {
    let server = TestServer::spawn().await;
    let mut silent = TestClient::connect(server.addr).await;
    sleep(Duration::from_millis(50)).await;

    server.stop().await;

    silent.expect_shutdown().await;
}

#[tokio::test]
async fn test_port_released_after_stop() {
    let server = TestServer::spawn().await;
    let addr = server.addr;
    server.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
}
