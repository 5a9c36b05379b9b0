//! Spa client: connection lifecycle, command guards, and events.
//!
//! One [`SpaClient`] owns at most one live socket to one board. The
//! lifecycle is connect-on-demand: the socket is opened by a command or an
//! explicit [`SpaClient::connect`], and an idle timer closes it a few
//! seconds after the first unguarded status receipt so the embedded
//! controller is not kept occupied. There is no automatic reconnect;
//! the only way back to a live socket is another command or
//! [`SpaClient::ensure_connected`].
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --TCP established--> Connected
//!       ^                                                        │
//!       └-- disconnect() / idle timer / socket close ------------┘
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    Command, ConfigMessage, FrameCodec, Message, RawFrame, StatusMessage, ToggleItem,
};
use crate::types::{ConnectionState, HeaterMode, TemperatureRange};

/// Events emitted to the consumer.
///
/// The consumer translates these into whatever capability model its
/// platform uses; none of that mapping lives here.
#[derive(Debug, Clone)]
pub enum SpaEvent {
    /// The socket reached the Connected state.
    Connected,
    /// A status snapshot was decoded.
    Status(StatusMessage),
    /// A configuration response was decoded.
    Config(ConfigMessage),
    /// A socket or protocol error was observed. The connection is dropped;
    /// no reconnect is attempted.
    Error(String),
}

/// Client for one Balboa board on the local network.
///
/// Cheap to clone; clones share the connection, caches, and event channel.
#[derive(Clone)]
pub struct SpaClient {
    shared: Arc<Shared>,
}

struct Shared {
    addr: SocketAddr,
    config: ClientConfig,

    /// Connection state, owned exclusively by this module. A watch channel
    /// lets `ensure_connected` await the Connected transition.
    state: watch::Sender<ConnectionState>,

    /// Write half of the live socket, if any.
    writer: AsyncMutex<Option<FramedWrite<OwnedWriteHalf, FrameCodec>>>,

    /// Reader task draining inbound frames.
    reader_task: Mutex<Option<JoinHandle<()>>>,

    /// Single-shot idle-disconnect timer. Armed on the first unguarded
    /// status/config receipt, never re-armed by later messages.
    idle_timer: Mutex<Option<JoinHandle<()>>>,

    /// Timer clearing the pending-command flag after the guard window.
    guard_timer: Mutex<Option<JoinHandle<()>>>,

    /// True while a command is in flight (time-based guard, not an
    /// acknowledgement); suppresses arming the idle timer.
    pending_command: AtomicBool,

    /// Last decoded snapshots, the baseline for toggle decisions.
    last_status: RwLock<Option<StatusMessage>>,
    last_config: RwLock<Option<ConfigMessage>>,

    /// Optimistic overlay on the status baseline. Toggles are never
    /// acknowledged, so each sent toggle records the state it expects;
    /// repeating an intent before the next snapshot is then a no-op
    /// instead of a second toggle. Reconciled (cleared) whenever a status
    /// snapshot arrives.
    expected: Mutex<ExpectedState>,

    /// Serializes `send_command` callers so commands queue rather than
    /// racing independent connection attempts.
    command_lock: AsyncMutex<()>,

    event_tx: broadcast::Sender<SpaEvent>,
}

/// States the last sent toggles are expected to have produced, pending
/// confirmation by the next status snapshot.
#[derive(Debug, Default, Clone, Copy)]
struct ExpectedState {
    pumps: [Option<bool>; 4],
    light: Option<bool>,
    blower: Option<bool>,
    heater_mode: Option<HeaterMode>,
    temp_range: Option<TemperatureRange>,
}

impl SpaClient {
    /// Create a client for a board at the given address, with defaults.
    pub fn new(host: IpAddr) -> Self {
        Self::with_config(host, ClientConfig::default())
    }

    /// Create a client with explicit lifecycle configuration.
    pub fn with_config(host: IpAddr, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                addr: SocketAddr::new(host, config.port),
                config,
                state,
                writer: AsyncMutex::new(None),
                reader_task: Mutex::new(None),
                idle_timer: Mutex::new(None),
                guard_timer: Mutex::new(None),
                pending_command: AtomicBool::new(false),
                last_status: RwLock::new(None),
                last_config: RwLock::new(None),
                expected: Mutex::new(ExpectedState::default()),
                command_lock: AsyncMutex::new(()),
                event_tx,
            }),
        }
    }

    /// Scan the local /24 subnets for boards answering on the control port.
    pub async fn discover(timeout: Duration) -> Vec<Ipv4Addr> {
        crate::discovery::discover(timeout).await
    }

    /// Address this client talks to.
    pub fn addr(&self) -> SocketAddr {
        self.shared.addr
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SpaEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Whether the socket is currently established.
    pub fn is_connected(&self) -> bool {
        self.state().is_established()
    }

    /// Last decoded status snapshot, if any has been observed.
    pub fn last_status(&self) -> Option<StatusMessage> {
        self.shared.last_status.read().clone()
    }

    /// Last decoded configuration response, if any has been observed.
    pub fn last_config(&self) -> Option<ConfigMessage> {
        *self.shared.last_config.read()
    }

    /// Open the socket. Rejected while another attempt is in flight; a
    /// no-op when already connected. On success the board is immediately
    /// asked for its configuration.
    pub async fn connect(&self) -> Result<()> {
        Shared::connect(&self.shared).await
    }

    /// Close the socket for energy saving: cancel all timers, half-close
    /// the stream, then drop it after the grace period. No reconnect is
    /// attempted; the next command or `ensure_connected` reopens.
    pub async fn disconnect(&self) {
        info!("disconnecting from {} (no auto-reconnect)", self.shared.addr);
        Shared::disconnect_inner(&self.shared, self.shared.config.disconnect_grace).await;
    }

    /// Resolve immediately when connected, otherwise drive a connection
    /// attempt, failing with [`Error::ConnectionTimeout`] after the
    /// configured deadline.
    pub async fn ensure_connected(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.state.borrow().is_established() {
            return Ok(());
        }

        // A reconnect supersedes any scheduled idle disconnect.
        Shared::cancel_timer(&shared.idle_timer);

        let attempt = async {
            match Shared::connect(shared).await {
                Ok(()) => Ok(()),
                Err(Error::ConnectInProgress) => {
                    // Another task owns the attempt; wait for its outcome.
                    let mut rx = shared.state.subscribe();
                    loop {
                        if rx.borrow_and_update().is_established() {
                            return Ok(());
                        }
                        rx.changed().await.map_err(|_| Error::ConnectionClosed)?;
                    }
                }
                Err(e) => Err(e),
            }
        };

        match tokio::time::timeout(shared.config.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!("connection to {} timed out", shared.addr);
                Shared::disconnect_inner(shared, Duration::ZERO).await;
                Err(Error::ConnectionTimeout)
            }
        }
    }

    /// Send a protocol command, connecting on demand.
    ///
    /// Callers queue on a per-instance lock, the pending-command flag is
    /// held for the guard window, and any scheduled idle disconnect is
    /// cancelled first.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        let shared = &self.shared;
        let _queued = shared.command_lock.lock().await;

        shared.pending_command.store(true, Ordering::SeqCst);
        Shared::cancel_timer(&shared.idle_timer);

        if let Err(e) = self.ensure_connected().await {
            warn!("failed to connect for command: {e}");
            shared.pending_command.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let result = Shared::write_command(shared, command).await;
        if result.is_err() {
            shared.pending_command.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Request a configuration response (also sent automatically on
    /// connect).
    pub async fn request_configuration(&self) -> Result<()> {
        self.send_command(Command::ConfigRequest).await
    }

    /// Turn a jet pump on or off.
    ///
    /// The protocol only has a toggle, so this diffs the desired state
    /// against the last observed status (plus any unconfirmed toggles
    /// already sent) and sends at most one toggle. Returns whether a
    /// command was sent. Toggles are optimistic: nothing acknowledges
    /// them, and the expectation is only reconciled by the next status
    /// snapshot.
    pub async fn set_jet_state(&self, port: u8, on: bool) -> Result<bool> {
        if port > 3 {
            return Err(Error::InvalidPort(port));
        }
        let status = self.baseline()?;
        let current = self.shared.expected.lock().pumps[usize::from(port)]
            .unwrap_or_else(|| status.pump_on(port));
        if current == on {
            return Ok(false);
        }
        info!("toggling pump {} {}", port + 1, on_off(on));
        self.send_command(Command::Toggle(ToggleItem::Pump(port)))
            .await?;
        self.shared.expected.lock().pumps[usize::from(port)] = Some(on);
        Ok(true)
    }

    /// Turn the light on or off. The board exposes a single light on
    /// port 0.
    pub async fn set_light_state(&self, port: u8, on: bool) -> Result<bool> {
        if port != 0 {
            return Err(Error::InvalidPort(port));
        }
        let status = self.baseline()?;
        let current = self
            .shared
            .expected
            .lock()
            .light
            .unwrap_or_else(|| status.light_on());
        if current == on {
            return Ok(false);
        }
        info!("toggling light {}", on_off(on));
        self.send_command(Command::Toggle(ToggleItem::Light)).await?;
        self.shared.expected.lock().light = Some(on);
        Ok(true)
    }

    /// Turn the blower on or off.
    pub async fn set_blower_state(&self, on: bool) -> Result<bool> {
        let status = self.baseline()?;
        let current = self
            .shared
            .expected
            .lock()
            .blower
            .unwrap_or_else(|| status.blower_on());
        if current == on {
            return Ok(false);
        }
        info!("toggling blower {}", on_off(on));
        self.send_command(Command::Toggle(ToggleItem::Blower))
            .await?;
        self.shared.expected.lock().blower = Some(on);
        Ok(true)
    }

    /// Switch the heater mode, if it differs from the last observed one.
    pub async fn set_heater_mode(&self, mode: HeaterMode) -> Result<bool> {
        let status = self.baseline()?;
        let current = self
            .shared
            .expected
            .lock()
            .heater_mode
            .unwrap_or(status.heater_mode);
        if current == mode {
            return Ok(false);
        }
        info!("toggling heater mode to {mode}");
        self.send_command(Command::Toggle(ToggleItem::HeatMode))
            .await?;
        self.shared.expected.lock().heater_mode = Some(mode);
        Ok(true)
    }

    /// Switch the temperature range, if it differs from the last observed
    /// one.
    pub async fn set_temp_range(&self, range: TemperatureRange) -> Result<bool> {
        let status = self.baseline()?;
        let current = self
            .shared
            .expected
            .lock()
            .temp_range
            .unwrap_or(status.range);
        if current == range {
            return Ok(false);
        }
        info!("toggling temperature range to {range}");
        self.send_command(Command::Toggle(ToggleItem::TempRange))
            .await?;
        self.shared.expected.lock().temp_range = Some(range);
        Ok(true)
    }

    /// Set the target temperature, given in degrees Celsius. Always sends;
    /// the wire value depends on the board's reported scale, so a prior
    /// status is still required.
    pub async fn set_temperature(&self, celsius: f64) -> Result<()> {
        let status = self.baseline()?;
        let command = Command::set_temperature(celsius, status.scale);
        info!("setting target temperature to {celsius} °C");
        self.send_command(command).await
    }

    /// Baseline status for toggle decisions; commands with no baseline are
    /// rejected rather than silently sent.
    fn baseline(&self) -> Result<StatusMessage> {
        self.shared
            .last_status
            .read()
            .clone()
            .ok_or(Error::StateUnknown)
    }
}

impl Shared {
    async fn connect(shared: &Arc<Self>) -> Result<()> {
        let started = shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return match *shared.state.borrow() {
                ConnectionState::Connected => Ok(()),
                _ => Err(Error::ConnectInProgress),
            };
        }

        debug!("connecting to {}", shared.addr);
        let stream = match TcpStream::connect(shared.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                shared.state.send_replace(ConnectionState::Disconnected);
                let _ = shared
                    .event_tx
                    .send(SpaEvent::Error(format!("connect failed: {e}")));
                return Err(Error::ConnectionFailed {
                    addr: shared.addr,
                    reason: e.to_string(),
                });
            }
        };
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        *shared.writer.lock().await = Some(FramedWrite::new(write_half, FrameCodec::new()));

        let reader = tokio::spawn(Self::read_loop(
            Arc::clone(shared),
            FramedRead::new(read_half, FrameCodec::new()),
        ));
        if let Some(stale) = shared.reader_task.lock().replace(reader) {
            stale.abort();
        }

        shared.state.send_replace(ConnectionState::Connected);
        info!("connected to {}", shared.addr);
        let _ = shared.event_tx.send(SpaEvent::Connected);

        // Ask for the component configuration straight away.
        Self::write_command(shared, Command::ConfigRequest).await
    }

    /// Serialize and write one command, then hold the pending flag for the
    /// guard window.
    async fn write_command(shared: &Arc<Self>, command: Command) -> Result<()> {
        shared.pending_command.store(true, Ordering::SeqCst);
        Self::cancel_timer(&shared.idle_timer);

        let send_result = {
            let mut writer = shared.writer.lock().await;
            match writer.as_mut() {
                Some(framed) => {
                    trace!(
                        "sending command type {:#04x} payload {}",
                        command.message_type(),
                        hex::encode(command.payload())
                    );
                    framed.send(command).await
                }
                None => Err(Error::ConnectionClosed),
            }
        };
        if let Err(e) = send_result {
            shared.pending_command.store(false, Ordering::SeqCst);
            return Err(e);
        }

        // Allow idle disconnect again once the guard window has passed.
        // Time-based: the protocol never acknowledges commands.
        let s = Arc::clone(shared);
        let guard = tokio::spawn(async move {
            tokio::time::sleep(s.config.command_guard).await;
            s.pending_command.store(false, Ordering::SeqCst);
            s.guard_timer.lock().take();
        });
        if let Some(stale) = shared.guard_timer.lock().replace(guard) {
            stale.abort();
        }

        Ok(())
    }

    async fn read_loop(shared: Arc<Self>, mut frames: FramedRead<OwnedReadHalf, FrameCodec>) {
        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => Self::handle_frame(&shared, &frame),
                Err(e) => {
                    warn!("socket error on {}: {e}", shared.addr);
                    let _ = shared.event_tx.send(SpaEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        // Socket gone, either by error or by the board closing. No
        // reconnect; the next command reopens on demand.
        debug!("connection to {} closed", shared.addr);
        shared.writer.lock().await.take();
        shared.state.send_replace(ConnectionState::Disconnected);
    }

    fn handle_frame(shared: &Arc<Self>, frame: &RawFrame) {
        match Message::parse(frame) {
            Ok(Some(Message::Status(status))) => {
                trace!(
                    "status: {:.1}{} (target {:.1}{})",
                    status.current_temperature,
                    status.scale,
                    status.target_temperature,
                    status.scale
                );
                // A fresh snapshot supersedes any optimistic expectations.
                *shared.expected.lock() = ExpectedState::default();
                *shared.last_status.write() = Some(status.clone());
                let _ = shared.event_tx.send(SpaEvent::Status(status));
                Self::arm_idle_timer(shared);
            }
            Ok(Some(Message::Config(config))) => {
                debug!("configuration received: {config:?}");
                *shared.last_config.write() = Some(config);
                let _ = shared.event_tx.send(SpaEvent::Config(config));
                Self::arm_idle_timer(shared);
            }
            Ok(None) => {
                trace!("ignoring frame type {:#04x}", frame.message_type());
            }
            Err(e) => {
                warn!("undecodable frame: {e} ({})", hex::encode(frame.bytes()));
            }
        }
    }

    /// Arm the energy-saving disconnect, once. Messages arriving while it
    /// is armed do not push it back; a steady status stream must not keep
    /// the connection open.
    fn arm_idle_timer(shared: &Arc<Self>) {
        if shared.pending_command.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = shared.idle_timer.lock();
        if slot.is_some() {
            return;
        }

        let delay = shared.config.idle_disconnect_delay;
        debug!("scheduling energy-saving disconnect in {delay:?}");
        let s = Arc::clone(shared);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Disarm ourselves before tearing down so the teardown does not
            // abort the very task running it.
            s.idle_timer.lock().take();
            debug!("idle window elapsed, disconnecting");
            Self::disconnect_inner(&s, s.config.disconnect_grace).await;
        }));
    }

    async fn disconnect_inner(shared: &Arc<Self>, grace: Duration) {
        Self::cancel_timer(&shared.idle_timer);
        Self::cancel_timer(&shared.guard_timer);
        shared.pending_command.store(false, Ordering::SeqCst);

        if let Some(mut framed) = shared.writer.lock().await.take() {
            // Half-close first so the board releases its connection slot,
            // then give it the grace period before dropping the socket.
            let _ = framed.get_mut().shutdown().await;
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
        }

        if let Some(reader) = shared.reader_task.lock().take() {
            reader.abort();
        }

        shared.state.send_replace(ConnectionState::Disconnected);
    }

    fn cancel_timer(slot: &Mutex<Option<JoinHandle<()>>>) {
        if let Some(timer) = slot.lock().take() {
            timer.abort();
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
