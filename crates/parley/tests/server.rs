//! Integration tests for the Parley server: full connection flow over
//! real sockets, from login through broadcast, admin commands, and
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use parley::{
    Codec, Envelope, FrameConnection, FrameListener, INACTIVITY_REASON, JsonCodec,
    MemoryRepository, ParleyServerBuilder, Shutdown, TransportError,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const LONG_IDLE: Duration = Duration::from_secs(60);

// =========================================================================
// Helpers
// =========================================================================

/// Starts a server on a random port with "root" preseeded as admin.
/// Returns the address, the shutdown handle, the run() task, and a
/// handle to the repository for persistence assertions.
async fn start_server(
    idle_timeout: Duration,
) -> (
    String,
    Shutdown,
    tokio::task::JoinHandle<()>,
    Arc<MemoryRepository>,
) {
    let repo = Arc::new(MemoryRepository::with_admins(["root"]));

    let server = ParleyServerBuilder::new()
        .bind("127.0.0.1:0")
        .idle_timeout(idle_timeout)
        .build(Arc::clone(&repo))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let shutdown = server.shutdown_handle();

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, shutdown, handle, repo)
}

/// A test client speaking the Parley wire protocol.
struct TestClient {
    conn: FrameConnection,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let conn = FrameConnection::connect(addr)
            .await
            .expect("client should connect");
        // Give the server a moment to register the session before we
        // rely on broadcast membership.
        tokio::time::sleep(Duration::from_millis(10)).await;
        Self { conn }
    }

    async fn connect_as(addr: &str, name: &str) -> Self {
        let client = Self::connect(addr).await;
        client
            .send(&Envelope::Login {
                user_name: name.to_string(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        client
    }

    async fn send(&self, envelope: &Envelope) {
        let bytes = JsonCodec.encode(envelope).expect("encode");
        self.conn.send(&bytes).await.expect("send should succeed");
    }

    async fn chat(&self, text: &str) {
        self.send(&Envelope::Chat {
            from_user: String::new(),
            text: text.to_string(),
            sent_at: 0,
        })
        .await;
    }

    /// Receives the next envelope; panics on close or timeout.
    async fn recv(&self) -> Envelope {
        let bytes = self
            .conn
            .recv(Some(RECV_TIMEOUT))
            .await
            .expect("recv should succeed")
            .expect("peer should not be closed");
        JsonCodec.decode(&bytes).expect("server sent valid envelope")
    }

    /// Sends a command and waits for its `CommandResult`, skipping any
    /// interleaved chat broadcasts.
    async fn command(&self, command: &str, parameter: &str) -> (Vec<String>, bool) {
        self.send(&Envelope::Command {
            command: command.to_string(),
            parameter: parameter.to_string(),
        })
        .await;

        loop {
            match self.recv().await {
                Envelope::CommandResult {
                    command: echoed,
                    lines,
                    success,
                } => {
                    assert_eq!(echoed, command, "result echoes the invoked command");
                    return (lines, success);
                }
                _ => continue,
            }
        }
    }

    /// Asserts nothing arrives within a short window.
    async fn expect_silence(&self) {
        let result = self.conn.recv(Some(Duration::from_millis(150))).await;
        assert!(
            matches!(result, Err(TransportError::Timeout)),
            "expected silence, got {result:?}"
        );
    }

    /// Asserts the server closed this connection, optionally after a
    /// final server notice containing `notice_fragment`.
    async fn expect_closed(&self, notice_fragment: Option<&str>) {
        let mut saw_notice = false;
        loop {
            match self.conn.recv(Some(RECV_TIMEOUT)).await {
                Ok(Some(bytes)) => {
                    let envelope: Envelope =
                        JsonCodec.decode(&bytes).expect("valid envelope");
                    if let (Some(fragment), Envelope::Chat { from_user, text, .. }) =
                        (notice_fragment, &envelope)
                    {
                        if from_user == "server" && text.contains(fragment) {
                            saw_notice = true;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => panic!("expected clean close, got {e}"),
            }
        }

        if let Some(fragment) = notice_fragment {
            assert!(saw_notice, "expected a final notice containing {fragment:?}");
        }
    }
}

// =========================================================================
// Broadcast
// =========================================================================

#[tokio::test]
async fn test_chat_broadcasts_to_others_but_not_sender() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let alice = TestClient::connect_as(&addr, "alice").await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    alice.chat("hello everyone").await;

    match bob.recv().await {
        Envelope::Chat {
            from_user,
            text,
            sent_at,
        } => {
            assert_eq!(from_user, "alice");
            assert_eq!(text, "hello everyone");
            assert!(sent_at > 0, "server stamps the send time");
        }
        other => panic!("expected chat broadcast, got {other:?}"),
    }

    // Suppress-echo: the sender never hears their own message.
    alice.expect_silence().await;
}

#[tokio::test]
async fn test_lone_sender_chat_is_a_quiet_no_op() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    alice.chat("anyone there?").await;
    // No recipients, no error, session still usable.
    let (_lines, success) = alice.command("help", "").await;
    assert!(success);
}

#[tokio::test]
async fn test_unauthenticated_chat_uses_socket_label() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let ghost = TestClient::connect(&addr).await; // never logs in
    let bob = TestClient::connect_as(&addr, "bob").await;

    ghost.chat("who am I?").await;

    match bob.recv().await {
        Envelope::Chat { from_user, .. } => {
            assert!(
                from_user.starts_with("Socket"),
                "unauthenticated senders get the synthetic label, got {from_user:?}"
            );
        }
        other => panic!("expected chat broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_broadcasts_notice() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let alice = TestClient::connect_as(&addr, "alice").await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    drop(alice);

    match bob.recv().await {
        Envelope::Chat { from_user, text, .. } => {
            assert_eq!(from_user, "alice");
            assert_eq!(text, "disconnected");
        }
        other => panic!("expected disconnect notice, got {other:?}"),
    }
}

// =========================================================================
// Persistence
// =========================================================================

#[tokio::test]
async fn test_chat_from_logged_in_user_is_persisted() {
    let (addr, _shutdown, _server, repo) = start_server(LONG_IDLE).await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    alice.chat("for the record").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rows = repo.chat_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text, "for the record");
}

#[tokio::test]
async fn test_unauthenticated_chat_is_not_persisted() {
    let (addr, _shutdown, _server, repo) = start_server(LONG_IDLE).await;
    let ghost = TestClient::connect(&addr).await;

    ghost.chat("off the record").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(repo.chat_rows().is_empty());
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_help_is_not_admin_gated() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    let (lines, success) = bob.command("help", "").await;
    assert!(success);
    for name in ["help", "list", "quit", "kickout", "make-admin"] {
        assert!(
            lines.iter().any(|l| l.starts_with(name)),
            "help must mention {name}"
        );
    }
}

#[tokio::test]
async fn test_list_shows_connected_users() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;
    let _bob = TestClient::connect_as(&addr, "bob").await;

    let (lines, success) = root.command("list", "").await;
    assert!(success);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l.contains("root") && l.contains("[admin]")));
    assert!(lines.iter().any(|l| l.contains("bob") && !l.contains("[admin]")));
}

#[tokio::test]
async fn test_unknown_command_is_reported_unsupported() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    let (lines, success) = bob.command("teleport", "moon").await;
    assert!(!success);
    assert!(lines[0].contains("unsupported command"));
}

#[tokio::test]
async fn test_quit_from_non_admin_is_unauthorized() {
    let (addr, shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    let (lines, success) = bob.command("quit", "").await;
    assert!(!success);
    assert_eq!(lines, vec!["unauthorized".to_string()]);

    // The running flag is untouched and the session stays open.
    assert!(!shutdown.is_triggered());
    let (_lines, success) = bob.command("help", "").await;
    assert!(success);
}

#[tokio::test]
async fn test_kickout_disconnects_target_with_reason() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    let (lines, success) = root.command("kickout", "alice").await;
    assert!(success, "kickout of a connected user succeeds: {lines:?}");

    alice.expect_closed(Some("kicked out by root")).await;
}

#[tokio::test]
async fn test_kickout_unknown_name_reports_not_connected() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    let (lines, success) = root.command("kickout", "carol").await;
    assert!(!success);
    assert!(lines[0].contains("not connected"));

    // Nobody else was touched.
    let (_lines, success) = alice.command("help", "").await;
    assert!(success);
}

#[tokio::test]
async fn test_make_admin_requires_admin_and_propagates() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;
    let bob = TestClient::connect_as(&addr, "bob").await;

    // Bob isn't an admin yet: gated commands bounce.
    let (lines, success) = bob.command("kickout", "nobody").await;
    assert!(!success);
    assert_eq!(lines, vec!["unauthorized".to_string()]);

    let (lines, success) = root.command("make-admin", "bob").await;
    assert!(success, "make-admin by an admin succeeds: {lines:?}");

    // Bob's live session sees the new rights immediately: the gate now
    // passes and he gets a real answer instead of "unauthorized".
    let (lines, success) = bob.command("kickout", "nobody").await;
    assert!(!success);
    assert!(lines[0].contains("not connected"));
}

#[tokio::test]
async fn test_make_admin_unknown_user_fails_without_creating() {
    let (addr, _shutdown, _server, repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;

    let (lines, success) = root.command("make-admin", "ghost").await;
    assert!(!success);
    assert!(lines[0].contains("ghost"));

    // The typo didn't mint an account.
    assert_eq!(repo.user_count(), 1, "only the preseeded root exists");
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[tokio::test]
async fn test_idle_client_is_disconnected_with_inactivity_notice() {
    let (addr, _shutdown, _server, _repo) =
        start_server(Duration::from_millis(100)).await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    // No client-side input at all: the server must notice on its own.
    alice.expect_closed(Some(INACTIVITY_REASON)).await;
}

#[tokio::test]
async fn test_undecodable_frame_closes_session() {
    let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;
    let broken = TestClient::connect(&addr).await;

    // A well-framed payload that isn't an envelope at all.
    broken.conn.send(b"\xffnot an envelope").await.expect("send");
    broken.expect_closed(None).await;
}

#[tokio::test]
async fn test_quit_from_admin_stops_server_and_all_handlers() {
    let (addr, shutdown, server, _repo) = start_server(LONG_IDLE).await;
    let root = TestClient::connect_as(&addr, "root").await;
    let alice = TestClient::connect_as(&addr, "alice").await;

    let (_lines, success) = root.command("quit", "").await;
    assert!(success);
    assert!(shutdown.is_triggered());

    // Every session is kicked with the shutdown reason...
    alice.expect_closed(Some("server quitting")).await;

    // ...and run() returns once all handlers have provably exited.
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("run() should return after quit")
        .expect("server task should not panic");
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_concurrent_chats_and_logins_do_not_deadlock() {
    // Broadcasting (registry lock) races user creation and chat
    // persistence (store lock) across many sessions; if any code path
    // nested the two locks this would wedge and trip the timeout.
    let scenario = async {
        let (addr, _shutdown, _server, _repo) = start_server(LONG_IDLE).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let addr = addr.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("user-{i}");
                let client = TestClient::connect_as(&addr, &name).await;
                for n in 0..5 {
                    client.chat(&format!("message {n} from {name}")).await;
                }
                // Drain whatever broadcasts arrived, then finish with a
                // command round-trip to prove the session is healthy.
                let (_lines, success) = client.command("help", "").await;
                assert!(success);
            }));
        }

        for task in tasks {
            task.await.expect("client task should not panic");
        }
    };

    tokio::time::timeout(Duration::from_secs(10), scenario)
        .await
        .expect("scenario must complete without deadlocking");
}

// =========================================================================
// Wire round-trip (transport + protocol together, no server)
// =========================================================================

#[tokio::test]
async fn test_login_round_trips_through_framed_transport() {
    let listener = FrameListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let accept = tokio::spawn(async move { listener.accept().await.expect("accept") });

    let sender = FrameConnection::connect(&addr).await.expect("connect");
    let receiver = accept.await.expect("accept task");

    let envelope = Envelope::Login {
        user_name: "carol".to_string(),
    };
    let bytes = JsonCodec.encode(&envelope).expect("encode");
    sender.send(&bytes).await.expect("send");

    let received = receiver
        .recv(Some(RECV_TIMEOUT))
        .await
        .expect("recv")
        .expect("frame");
    let decoded: Envelope = JsonCodec.decode(&received).expect("decode");

    assert_eq!(decoded, envelope);
    match decoded {
        Envelope::Login { user_name } => assert_eq!(user_name, "carol"),
        other => panic!("expected Login, got {other:?}"),
    }
}
