//! The client engine: connection state machine, QoS flow handling,
//! keep-alive scheduling and the producer-facing publish API.
//!
//! Exactly one long-lived engine context owns the transport and performs all
//! socket I/O. [`Engine::run`] drives the session forever: connect,
//! handshake, subscribe the fixed topic set, then multiplex over the broker
//! socket and the publish bridge, reconnecting after a fixed backoff on any
//! failure. The only way out is a `"DISCONNECT"` control envelope submitted
//! through [`Publisher::send_command`].
//!
//! Producer contexts never touch the engine: they hold [`Publisher`] values
//! that marshal publishes into bridge envelopes. The single piece of shared
//! state is the connected flag in [`SharedState`].

use core::sync::atomic::{AtomicBool, Ordering};

use crate::bridge::{self, BridgeSender, PublishBridge};
use crate::codec::{Codec, ConnectOptions, PacketType};
use crate::dispatch::{MessageHandler, SubscriptionTable};
use crate::error::Error;
use crate::frame;
use crate::message::QoS;
use crate::transport::{Clock, Transport};

/// Capacity of the read buffer; one full inbound frame (or bridge envelope)
/// must fit or the read fails.
pub const READ_BUF_LEN: usize = 1024;

/// Capacity of the write buffer; bounds the largest outbound packet.
pub const WRITE_BUF_LEN: usize = 1024;

/// Largest valid MQTT packet identifier.
pub const MAX_PACKET_ID: u16 = 65_535;

/// Fixed delay, in clock seconds, between a disconnect and the next
/// connection attempt.
pub const RECONNECT_DELAY: u32 = 5;

/// Seconds subtracted from the keep-alive interval when computing the
/// steady-state wait, so the PINGREQ goes out before the broker's deadline.
pub const KEEPALIVE_MARGIN: u32 = 10;

/// Smallest effective keep-alive interval; configured values below this are
/// clamped so the margin subtraction cannot underflow.
pub const KEEPALIVE_MIN: u16 = 15;

/// Bounded wait, in transport ticks, for CONNACK and SUBACK responses.
const RESPONSE_WAIT: u32 = 5;

/// Bounded wait, in transport ticks, for PINGRESP after a PINGREQ.
const PING_WAIT: u32 = 5;

/// QoS requested for every subscription.
const SUBSCRIBE_QOS: QoS = QoS::ExactlyOnce;

/// Session configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config<'a> {
    /// Broker host name or address.
    pub host: &'a str,
    /// Broker TCP port.
    pub port: u16,
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; values below [`KEEPALIVE_MIN`] are
    /// clamped up.
    pub keep_alive_seconds: u16,
    /// Whether to start a clean session.
    pub clean_session: bool,
}

/// State shared between the engine context and producer contexts.
///
/// The engine is the only writer; producers read the connected flag before
/// marshalling a publish. This is the sole synchronization point besides the
/// bridge channel itself.
#[derive(Debug)]
pub struct SharedState {
    connected: AtomicBool,
}

impl SharedState {
    /// Creates the shared state, initially disconnected.
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the session is currently online.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle hooks exposed to the embedding application.
///
/// All methods default to no-ops; implement only what you need.
pub trait EventHooks {
    /// Called before each connection attempt.
    fn on_connect_attempt(&mut self) {}
    /// Called after all topics subscribed successfully.
    fn on_online(&mut self) {}
    /// Called after every disconnect, including the terminal one.
    fn on_offline(&mut self) {}
}

impl EventHooks for () {}

/// Advances the packet-id counter, wrapping from 65535 back to 1.
/// Never yields 0, which the protocol reserves.
pub fn next_packet_id(counter: &mut u16) -> u16 {
    *counter = if *counter == MAX_PACKET_ID {
        1
    } else {
        *counter + 1
    };
    *counter
}

fn effective_keep_alive(configured: u16) -> u16 {
    configured.max(KEEPALIVE_MIN)
}

/// Producer-side handle submitting publishes and commands to the engine.
///
/// Cheap to clone (when the bridge sender is) and safe to use from any
/// context; both operations fail with [`Error::NotConnected`] while the
/// session is offline.
pub struct Publisher<'a, S> {
    shared: &'a SharedState,
    sender: S,
}

impl<'a, S: BridgeSender> Publisher<'a, S> {
    /// Marshals one publish across the bridge.
    ///
    /// The payload and topic are copied into the envelope; the engine picks
    /// a packet id at send time for QoS > 0. Fails with [`Error::Overflow`]
    /// when the envelope would not fit the engine's read buffer.
    pub fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<(), Error> {
        if !self.shared.is_connected() {
            return Err(Error::NotConnected);
        }
        let mut buf = [0u8; READ_BUF_LEN];
        let len = bridge::encode_envelope(qos, retained, false, 0, topic, payload, &mut buf)?;
        self.sender.send_local(&buf[..len])
    }

    /// Submits a control command, `"DISCONNECT"` being the only one the
    /// engine acts on.
    pub fn send_command(&self, command: &str) -> Result<(), Error> {
        if !self.shared.is_connected() {
            return Err(Error::NotConnected);
        }
        // A command envelope must stay below the fixed header size to be
        // distinguishable from a publish envelope.
        let len = command.len() + 1;
        if len >= bridge::ENVELOPE_HEADER_LEN {
            return Err(Error::Overflow);
        }
        let mut buf = [0u8; bridge::ENVELOPE_HEADER_LEN];
        buf[..command.len()].copy_from_slice(command.as_bytes());
        self.sender.send_local(&buf[..len])
    }
}

impl<'a, S: Clone> Clone for Publisher<'a, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared,
            sender: self.sender.clone(),
        }
    }
}

impl<'a, S> core::fmt::Debug for Publisher<'a, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publisher")
            .field("connected", &self.shared.is_connected())
            .finish_non_exhaustive()
    }
}

/// Connection state machine states.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Connecting,
    Handshaking,
    Subscribing,
    Online,
    Disconnecting(Exit),
    Backoff,
    Terminated,
}

/// How a disconnect resolves: retry after backoff, or terminate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Exit {
    Restart,
    Shutdown,
}

enum BridgeOutcome {
    Continue,
    Shutdown,
}

/// The socket-owning session engine.
///
/// Generic over the transport, bridge, codec, clock, message handler and
/// lifecycle hooks; all seams the embedding platform provides.
pub struct Engine<'a, T, B, C, K, H, E>
where
    T: Transport,
    B: PublishBridge<T>,
    C: Codec,
    K: Clock,
    H: MessageHandler,
    E: EventHooks,
{
    transport: T,
    bridge: B,
    codec: C,
    clock: K,
    config: Config<'a>,
    subscriptions: SubscriptionTable<'a, H>,
    hooks: E,
    shared: &'a SharedState,
    sock: Option<T::Handle>,
    session_up: bool,
    next_packet_id: u16,
    keep_alive: u16,
    last_ping: u32,
    read_buf: [u8; READ_BUF_LEN],
    write_buf: [u8; WRITE_BUF_LEN],
}

impl<'a, T, B, C, K, H, E> Engine<'a, T, B, C, K, H, E>
where
    T: Transport,
    B: PublishBridge<T>,
    C: Codec,
    K: Clock,
    H: MessageHandler,
    E: EventHooks,
{
    /// Creates an engine. The subscription table is fixed from here on.
    pub fn new(
        transport: T,
        bridge: B,
        codec: C,
        clock: K,
        config: Config<'a>,
        subscriptions: SubscriptionTable<'a, H>,
        hooks: E,
        shared: &'a SharedState,
    ) -> Self {
        let keep_alive = effective_keep_alive(config.keep_alive_seconds);
        Self {
            transport,
            bridge,
            codec,
            clock,
            config,
            subscriptions,
            hooks,
            shared,
            sock: None,
            session_up: false,
            next_packet_id: 0,
            keep_alive,
            last_ping: 0,
            read_buf: [0; READ_BUF_LEN],
            write_buf: [0; WRITE_BUF_LEN],
        }
    }

    /// Creates a producer handle bound to this engine's bridge.
    pub fn publisher(&self) -> Publisher<'a, B::Sender> {
        Publisher {
            shared: self.shared,
            sender: self.bridge.sender(),
        }
    }

    /// Runs the session until an explicit `"DISCONNECT"` command arrives.
    ///
    /// Every transport, protocol or timeout failure routes through the
    /// disconnect path, waits [`RECONNECT_DELAY`] and retries; the retry
    /// loop is unbounded.
    pub fn run(&mut self) {
        let mut state = State::Connecting;
        loop {
            state = self.step(state);
            if state == State::Terminated {
                return;
            }
        }
    }

    fn step(&mut self, state: State) -> State {
        match state {
            State::Connecting => {
                self.hooks.on_connect_attempt();
                match self.transport.connect(self.config.host, self.config.port) {
                    Ok(sock) => {
                        self.sock = Some(sock);
                        self.next_packet_id = 0;
                        State::Handshaking
                    }
                    Err(_) => {
                        mq_warn!("connect failed");
                        State::Disconnecting(Exit::Restart)
                    }
                }
            }
            State::Handshaking => match self.handshake() {
                Ok(()) => State::Subscribing,
                Err(_) => {
                    mq_warn!("handshake failed");
                    State::Disconnecting(Exit::Restart)
                }
            },
            State::Subscribing => match self.subscribe_all() {
                Ok(()) => {
                    self.shared.set_connected(true);
                    self.hooks.on_online();
                    self.last_ping = self.clock.now();
                    State::Online
                }
                Err(_) => {
                    mq_warn!("subscribe failed");
                    State::Disconnecting(Exit::Restart)
                }
            },
            State::Online => self.online_step(),
            State::Disconnecting(exit) => {
                if self.session_up {
                    // Best effort; the link may already be gone.
                    let _ = self.send_disconnect();
                    self.session_up = false;
                }
                self.shared.set_connected(false);
                if let Some(sock) = self.sock.take() {
                    self.transport.close(sock);
                }
                self.hooks.on_offline();
                match exit {
                    Exit::Restart => State::Backoff,
                    Exit::Shutdown => State::Terminated,
                }
            }
            State::Backoff => {
                self.clock.sleep(RECONNECT_DELAY);
                mq_debug!("restarting session");
                State::Connecting
            }
            State::Terminated => State::Terminated,
        }
    }

    /// One steady-state iteration: multiplex over socket and bridge under
    /// the keep-alive deadline.
    fn online_step(&mut self) -> State {
        let Some(sock) = self.sock else {
            return State::Disconnecting(Exit::Restart);
        };
        let elapsed = self.clock.now().saturating_sub(self.last_ping);
        let timeout = u32::from(self.keep_alive)
            .saturating_sub(KEEPALIVE_MARGIN)
            .saturating_sub(elapsed)
            .max(1);

        let handles = [sock, self.bridge.handle()];
        let ready = match self.transport.wait_readable(&handles, timeout) {
            Ok(ready) => ready,
            Err(_) => return State::Disconnecting(Exit::Restart),
        };

        if ready.is_empty() {
            // Keep-alive deadline: prove liveness before the broker drops us.
            return match self.ping() {
                Ok(()) => State::Online,
                Err(_) => {
                    mq_warn!("keep-alive failed");
                    State::Disconnecting(Exit::Restart)
                }
            };
        }

        if ready.contains(0) {
            return match self.cycle() {
                Ok(()) => State::Online,
                Err(_) => State::Disconnecting(Exit::Restart),
            };
        }

        if ready.contains(1) {
            return match self.handle_bridge() {
                Ok(BridgeOutcome::Continue) => State::Online,
                Ok(BridgeOutcome::Shutdown) => State::Disconnecting(Exit::Shutdown),
                Err(_) => State::Disconnecting(Exit::Restart),
            };
        }

        State::Online
    }

    fn handshake(&mut self) -> Result<(), Error> {
        let options = ConnectOptions {
            client_id: self.config.client_id,
            keep_alive_seconds: self.keep_alive,
            clean_session: self.config.clean_session,
        };
        let len = self.codec.encode_connect(&options, &mut self.write_buf)?;
        self.send_packet(len)?;

        self.wait_socket(RESPONSE_WAIT)?;
        let (packet_type, len) = self.read_frame()?;
        if packet_type != PacketType::Connack {
            return Err(Error::Protocol);
        }
        self.codec.decode_connack(&self.read_buf[..len])?;
        self.session_up = true;
        Ok(())
    }

    /// Subscribes every registered filter sequentially, each confirmed by
    /// its SUBACK before the next goes out.
    fn subscribe_all(&mut self) -> Result<(), Error> {
        let mut filters: heapless::Vec<&'a str, { crate::dispatch::MAX_SUBSCRIPTIONS }> =
            heapless::Vec::new();
        for filter in self.subscriptions.filters() {
            // Capacity matches the table's by construction.
            let _ = filters.push(filter);
        }

        for filter in filters {
            let packet_id = next_packet_id(&mut self.next_packet_id);
            let len =
                self.codec
                    .encode_subscribe(packet_id, filter, SUBSCRIBE_QOS, &mut self.write_buf)?;
            self.send_packet(len)?;

            self.wait_socket(RESPONSE_WAIT)?;
            let (packet_type, len) = self.read_frame()?;
            if packet_type != PacketType::Suback {
                return Err(Error::Protocol);
            }
            let suback = self.codec.decode_suback(&self.read_buf[..len])?;
            if suback.packet_id != packet_id {
                return Err(Error::Protocol);
            }
            mq_debug!("subscribed {}", filter);
        }
        Ok(())
    }

    /// Reads one frame and runs the QoS flow it calls for.
    ///
    /// Handlers always run before the corresponding ack goes out, so a
    /// handler failure can never suppress acknowledgment.
    fn cycle(&mut self) -> Result<(), Error> {
        let (packet_type, len) = self.read_frame()?;
        match packet_type {
            PacketType::Publish => {
                let (topic, message) = self.codec.decode_publish(&self.read_buf[..len])?;
                self.subscriptions.deliver(topic, &message);
                let (qos, packet_id) = (message.qos, message.packet_id);
                match qos {
                    QoS::AtMostOnce => {}
                    QoS::AtLeastOnce => self.send_ack(PacketType::Puback, packet_id)?,
                    QoS::ExactlyOnce => self.send_ack(PacketType::Pubrec, packet_id)?,
                }
            }
            PacketType::Pubrec => {
                let (_, packet_id) = self.codec.decode_ack(&self.read_buf[..len])?;
                self.send_ack(PacketType::Pubrel, packet_id)?;
            }
            PacketType::Pubrel => {
                let (_, packet_id) = self.codec.decode_ack(&self.read_buf[..len])?;
                self.send_ack(PacketType::Pubcomp, packet_id)?;
            }
            PacketType::Pingresp => {
                self.last_ping = self.clock.now();
            }
            // CONNACK, PUBACK, SUBACK and PUBCOMP complete their flows with
            // no response from us.
            _ => {}
        }
        Ok(())
    }

    /// Reads one envelope off the bridge and either executes the control
    /// command or serializes and sends the publish.
    fn handle_bridge(&mut self) -> Result<BridgeOutcome, Error> {
        let handle = self.bridge.handle();
        let len = self
            .transport
            .receive(handle, &mut self.read_buf, 0)
            .map_err(|_| Error::Transport)?;
        let received = &self.read_buf[..len];

        if bridge::is_command(received) {
            if bridge::command(received) == Some(bridge::DISCONNECT_COMMAND) {
                mq_debug!("disconnect requested");
                return Ok(BridgeOutcome::Shutdown);
            }
            mq_warn!("unknown bridge command dropped");
            return Ok(BridgeOutcome::Continue);
        }

        let envelope = bridge::decode_envelope(received)?;
        let packet_id = if envelope.qos != QoS::AtMostOnce && envelope.packet_id == 0 {
            next_packet_id(&mut self.next_packet_id)
        } else {
            envelope.packet_id
        };
        let len = self.codec.encode_publish(
            envelope.dup,
            envelope.qos,
            envelope.retained,
            packet_id,
            envelope.topic,
            envelope.payload,
            &mut self.write_buf,
        )?;
        self.send_packet(len)?;
        Ok(BridgeOutcome::Continue)
    }

    fn send_ack(&mut self, packet_type: PacketType, packet_id: u16) -> Result<(), Error> {
        let len = self.codec.encode_ack(packet_type, packet_id, &mut self.write_buf)?;
        self.send_packet(len)
    }

    fn ping(&mut self) -> Result<(), Error> {
        let len = self.codec.encode_pingreq(&mut self.write_buf)?;
        self.send_packet(len)?;
        self.wait_socket(PING_WAIT)?;
        // The response refreshes `last_ping` inside the regular cycle.
        self.cycle()
    }

    fn send_disconnect(&mut self) -> Result<(), Error> {
        let len = self.codec.encode_disconnect(&mut self.write_buf)?;
        self.send_packet(len)
    }

    fn send_packet(&mut self, len: usize) -> Result<(), Error> {
        let sock = self.sock.ok_or(Error::Transport)?;
        let written = self
            .transport
            .send(sock, &self.write_buf[..len])
            .map_err(|_| Error::Transport)?;
        if written != len {
            return Err(Error::Transport);
        }
        Ok(())
    }

    fn wait_socket(&mut self, timeout: u32) -> Result<(), Error> {
        let sock = self.sock.ok_or(Error::Transport)?;
        let ready = self
            .transport
            .wait_readable(&[sock], timeout)
            .map_err(|_| Error::Transport)?;
        if ready.is_empty() {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<(PacketType, usize), Error> {
        let sock = self.sock.ok_or(Error::Transport)?;
        frame::read_one_frame(&mut self.transport, sock, &mut self.read_buf)
    }
}

impl<'a, T, B, C, K, H, E> core::fmt::Debug for Engine<'a, T, B, C, K, H, E>
where
    T: Transport,
    B: PublishBridge<T>,
    C: Codec,
    K: Clock,
    H: MessageHandler,
    E: EventHooks,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("session_up", &self.session_up)
            .field("next_packet_id", &self.next_packet_id)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

/// Spawns the engine on its own thread, the execution context the session
/// owns for its whole lifetime. The thread exits once `run` does, after an
/// explicit disconnect command.
#[cfg(feature = "std")]
pub fn start<T, B, C, K, H, E>(
    mut engine: Engine<'static, T, B, C, K, H, E>,
) -> std::thread::JoinHandle<()>
where
    T: Transport + Send + 'static,
    T::Handle: Send,
    B: PublishBridge<T> + Send + 'static,
    C: Codec + Send + 'static,
    K: Clock + Send + 'static,
    H: MessageHandler + Send + 'static,
    E: EventHooks + Send + 'static,
{
    std::thread::spawn(move || engine.run())
}
