//! Client lifecycle tests - validates the connect-on-demand behavior
//! against an in-process fake spa board speaking real frames.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;

use spalink::config::ClientConfig;
use spalink::protocol::{crc8, FrameCodec, RawFrame, CONFIG_TAG, DELIMITER, STATUS_TAG};
use spalink::types::ConnectionState;
use spalink::{SpaClient, SpaEvent};

// ============================================================================
// Fake spa board
// ============================================================================

enum BoardMsg {
    /// Write raw bytes to the connected client.
    Send(Vec<u8>),
    /// Drop the current connection (board-side close).
    Close,
}

/// Minimal board: accepts one connection at a time, records every frame the
/// client sends, and optionally answers configuration requests.
struct FakeBoard {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<RawFrame>>>,
    tx: mpsc::UnboundedSender<BoardMsg>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeBoard {
    async fn start(auto_config: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run(
            listener,
            Arc::clone(&received),
            rx,
            auto_config,
            Arc::clone(&accepted),
            Arc::clone(&closed),
        ));

        Self {
            addr,
            received,
            tx,
            accepted,
            closed,
        }
    }

    async fn run(
        listener: TcpListener,
        received: Arc<Mutex<Vec<RawFrame>>>,
        mut rx: mpsc::UnboundedReceiver<BoardMsg>,
        auto_config: bool,
        accepted: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    ) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            accepted.fetch_add(1, Ordering::SeqCst);

            let (read_half, mut write_half) = stream.into_split();
            let mut frames = FramedRead::new(read_half, FrameCodec::new());

            loop {
                tokio::select! {
                    frame = frames.next() => match frame {
                        Some(Ok(frame)) => {
                            let body = frame.body();
                            let is_config_request =
                                body.len() >= 3 && body[..2] == [0x0A, 0xBF] && body[2] == 0x04;
                            received.lock().unwrap().push(frame);

                            if is_config_request && auto_config {
                                let _ = write_half.write_all(&config_frame()).await;
                            }
                        }
                        _ => break,
                    },
                    msg = rx.recv() => match msg {
                        Some(BoardMsg::Send(bytes)) => {
                            let _ = write_half.write_all(&bytes).await;
                        }
                        Some(BoardMsg::Close) => break,
                        None => return,
                    },
                }
            }

            closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn send_status(&self, overrides: &[(usize, u8)]) {
        let _ = self.tx.send(BoardMsg::Send(status_frame(overrides)));
    }

    fn close_connection(&self) {
        let _ = self.tx.send(BoardMsg::Close);
    }

    /// Commands the client has sent so far, as (type, payload) pairs.
    fn received_commands(&self) -> Vec<(u8, Vec<u8>)> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|frame| {
                let body = frame.body();
                (body[2], body[3..].to_vec())
            })
            .collect()
    }
}

// ============================================================================
// Frame helpers
// ============================================================================

fn frame_bytes(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(DELIMITER);
    out.push((body.len() + 2) as u8);
    out.extend_from_slice(body);
    out.push(crc8(&out[1..]));
    out.push(DELIMITER);
    out
}

/// A status frame: all-zero snapshot with the given byte overrides
/// (offsets relative to the FF tag byte).
fn status_frame(overrides: &[(usize, u8)]) -> Vec<u8> {
    let mut body = vec![0u8; 27];
    body[..3].copy_from_slice(&STATUS_TAG);
    for &(index, value) in overrides {
        body[index] = value;
    }
    frame_bytes(&body)
}

fn config_frame() -> Vec<u8> {
    let mut body = vec![0u8; 14];
    body[..3].copy_from_slice(&CONFIG_TAG);
    body[3 + 4] = 0x0f; // pumps 1-2
    body[3 + 6] = 0x03; // light 1
    body[3 + 7] = 0x0c; // blower
    frame_bytes(&body)
}

/// Fast lifecycle timings so the suite stays quick; the ratios between the
/// windows match the defaults.
fn fast_config(port: u16) -> ClientConfig {
    ClientConfig {
        port,
        connect_timeout: Duration::from_secs(5),
        command_guard: Duration::from_millis(100),
        idle_disconnect_delay: Duration::from_millis(800),
        disconnect_grace: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

fn client_for(board: &FakeBoard, config: ClientConfig) -> SpaClient {
    SpaClient::with_config(board.addr.ip(), config)
}

/// Wait until the client reaches the given state, returning the elapsed
/// time. Panics after the deadline.
async fn wait_for_state(client: &SpaClient, state: ConnectionState, deadline: Duration) -> Duration {
    let start = Instant::now();
    while client.state() != state {
        assert!(
            start.elapsed() < deadline,
            "client did not reach {state} within {deadline:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    start.elapsed()
}

/// Wait for the next status event on the subscription.
async fn wait_for_status(events: &mut tokio::sync::broadcast::Receiver<SpaEvent>) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let SpaEvent::Status(_) = events.recv().await.unwrap() {
                return;
            }
        }
    })
    .await
    .expect("no status event");
}

// ============================================================================
// Lifecycle tests
// ============================================================================

#[tokio::test]
async fn test_connect_requests_config_and_decodes_status() {
    let board = FakeBoard::start(true).await;
    let client = client_for(&board, fast_config(board.addr.port()));
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    assert!(client.is_connected());

    // Connected, then the decoded configuration reply.
    let mut saw_connected = false;
    let mut saw_config = false;
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.unwrap() {
                SpaEvent::Connected => saw_connected = true,
                SpaEvent::Config(config) => {
                    assert_eq!(config.pumps[..2], [true, true]);
                    assert!(config.blower);
                    saw_config = true;
                    return;
                }
                _ => {}
            }
        }
    })
    .await
    .expect("no config event");
    assert!(saw_connected && saw_config);

    // The very first frame on the wire must be the configuration request.
    let commands = board.received_commands();
    assert_eq!(commands[0].0, 0x04);
    assert!(commands[0].1.is_empty());

    // A status snapshot flows through decoded and is cached.
    board.send_status(&[(5, 80), (14, 0b01)]);
    wait_for_status(&mut events).await;
    let status = client.last_status().unwrap();
    assert_eq!(status.current_temperature, 80.0);
    assert!(status.pump_on(0));

    client.disconnect().await;
}

#[tokio::test]
async fn test_idle_disconnect_armed_once_not_per_message() {
    let board = FakeBoard::start(true).await;
    let client = client_for(&board, fast_config(board.addr.port()));
    let mut events = client.subscribe();

    client.connect().await.unwrap();

    // Let the config-request guard window (100ms) expire first.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // First status arms the 800ms idle timer...
    let armed_at = Instant::now();
    board.send_status(&[]);
    wait_for_status(&mut events).await;

    // ...and a second status inside the window must NOT push it back.
    tokio::time::sleep(Duration::from_millis(400)).await;
    board.send_status(&[]);
    assert!(client.is_connected());

    wait_for_state(&client, ConnectionState::Disconnected, Duration::from_secs(3)).await;
    let elapsed = armed_at.elapsed();

    // One timer, armed by the first status: disconnect lands around
    // 850ms after it (800ms window + 50ms grace). A timer re-armed by
    // the second status would land past 1200ms.
    assert!(
        elapsed >= Duration::from_millis(700),
        "idle disconnect fired early: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(1250),
        "idle timer was re-armed: disconnected after {elapsed:?}"
    );

    // Exactly one board-side connection was opened and closed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(board.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(board.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pending_command_guard_suppresses_idle_disconnect() {
    let board = FakeBoard::start(true).await;
    let config = ClientConfig {
        command_guard: Duration::from_millis(800),
        idle_disconnect_delay: Duration::from_millis(200),
        disconnect_grace: Duration::from_millis(50),
        ..fast_config(board.addr.port())
    };
    let client = client_for(&board, config);
    let mut events = client.subscribe();

    // Connecting sends the config request, which opens the 800ms guard.
    client.connect().await.unwrap();

    // A status well inside the guard window must not schedule the
    // 200ms idle disconnect.
    tokio::time::sleep(Duration::from_millis(300)).await;
    board.send_status(&[]);
    wait_for_status(&mut events).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        client.is_connected(),
        "idle disconnect fired during the command guard window"
    );

    // Once the guard has expired, the next status arms the timer normally.
    tokio::time::sleep(Duration::from_millis(300)).await;
    board.send_status(&[]);
    wait_for_state(&client, ConnectionState::Disconnected, Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_board_side_close_does_not_reconnect() {
    let board = FakeBoard::start(true).await;
    let client = client_for(&board, fast_config(board.addr.port()));

    client.connect().await.unwrap();
    assert_eq!(board.accepted.load(Ordering::SeqCst), 1);

    board.close_connection();
    wait_for_state(&client, ConnectionState::Disconnected, Duration::from_secs(2)).await;

    // No automatic reconnect: the board sees no new connection.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(board.accepted.load(Ordering::SeqCst), 1);

    // A command is the way back.
    client.ensure_connected().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(board.accepted.load(Ordering::SeqCst), 2);

    client.disconnect().await;
}

#[tokio::test]
async fn test_connect_when_already_connected_is_noop() {
    let board = FakeBoard::start(true).await;
    let client = client_for(&board, fast_config(board.addr.port()));

    client.connect().await.unwrap();
    // A second connect neither errors nor opens a second socket.
    client.connect().await.unwrap();
    assert_eq!(board.accepted.load(Ordering::SeqCst), 1);

    client.disconnect().await;
}

#[tokio::test]
async fn test_ensure_connected_failure_leaves_disconnected() {
    // Bind-then-drop gives an address that refuses (or, behind some
    // firewalls, times out); either way ensure_connected must fail and
    // leave the state machine in Disconnected.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig {
        port: addr.port(),
        connect_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    };
    let client = SpaClient::with_config(addr.ip(), config);

    let err = client.ensure_connected().await.unwrap_err();
    assert!(err.is_connection_error(), "unexpected error: {err}");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

// ============================================================================
// Command guard tests
// ============================================================================

#[tokio::test]
async fn test_toggle_idempotent_on_stale_cache() {
    let board = FakeBoard::start(true).await;
    let mut config = fast_config(board.addr.port());
    config.idle_disconnect_delay = Duration::from_secs(10); // keep the link up
    let client = client_for(&board, config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    board.send_status(&[]); // pump 0 off
    wait_for_status(&mut events).await;

    // First call observes OFF and toggles. The status cache is not
    // updated by the command itself, but the sent toggle is remembered,
    // so repeating the intent before the next snapshot sends nothing.
    assert!(client.set_jet_state(0, true).await.unwrap());
    assert!(!client.set_jet_state(0, true).await.unwrap());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let toggles: Vec<_> = board
        .received_commands()
        .into_iter()
        .filter(|(ty, _)| *ty == 0x11)
        .collect();
    assert_eq!(toggles.len(), 1);
    assert_eq!(toggles[0].1, vec![0x04, 0x00]);

    // A fresh snapshot reconciles the expectation; the board still
    // reports the pump off (the toggle "failed"), so the intent fires
    // again.
    board.send_status(&[]);
    wait_for_status(&mut events).await;
    assert!(client.set_jet_state(0, true).await.unwrap());

    client.disconnect().await;
}

#[tokio::test]
async fn test_set_temperature_encodes_for_board_scale() {
    let board = FakeBoard::start(true).await;
    let mut config = fast_config(board.addr.port());
    config.idle_disconnect_delay = Duration::from_secs(10);
    let client = client_for(&board, config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();

    // Celsius board: setpoint is doubled on the wire.
    board.send_status(&[(12, 0x01)]);
    wait_for_status(&mut events).await;
    client.set_temperature(38.5).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let commands = board.received_commands();
    let (ty, payload) = commands.last().unwrap();
    assert_eq!(*ty, 0x20);
    assert_eq!(payload, &vec![77]);

    client.disconnect().await;
}

#[tokio::test]
async fn test_commands_cancel_scheduled_idle_disconnect() {
    let board = FakeBoard::start(true).await;
    let client = client_for(&board, fast_config(board.addr.port()));
    let mut events = client.subscribe();

    client.connect().await.unwrap();

    // Arm the idle timer (guard expired, status received).
    tokio::time::sleep(Duration::from_millis(200)).await;
    board.send_status(&[]);
    wait_for_status(&mut events).await;

    // A command half-way through the idle window must cancel it.
    tokio::time::sleep(Duration::from_millis(400)).await;
    client.request_configuration().await.unwrap();

    // Well past the original 800ms window: still connected.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(
        client.is_connected(),
        "idle disconnect fired despite an intervening command"
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_concurrent_commands_queue() {
    let board = FakeBoard::start(true).await;
    let mut config = fast_config(board.addr.port());
    config.idle_disconnect_delay = Duration::from_secs(10);
    let client = client_for(&board, config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    board.send_status(&[]); // everything off
    wait_for_status(&mut events).await;

    // Two different intents racing: both serialize on the command queue
    // and both frames arrive intact.
    let (jets, light) = tokio::join!(
        client.set_jet_state(0, true),
        client.set_light_state(0, true),
    );
    assert!(jets.unwrap());
    assert!(light.unwrap());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let toggles: Vec<_> = board
        .received_commands()
        .into_iter()
        .filter(|(ty, _)| *ty == 0x11)
        .collect();
    assert_eq!(toggles.len(), 2);

    client.disconnect().await;
}
