//! Scripted transport, bridge, clock and handler doubles for engine tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use mqlink::bridge::{BridgeSender, PublishBridge};
use mqlink::message::{InboundMessage, QoS};
use mqlink::transport::{Clock, ReadySet, Transport};
use mqlink::{Error, MessageHandler};

/// Handle of the broker socket.
pub const SOCK: u8 = 1;
/// Handle of the bridge endpoint.
pub const BRIDGE: u8 = 2;

/// One scripted external event, consumed when the engine blocks on
/// `wait_readable` with nothing already pending.
#[derive(Debug, Clone)]
pub enum Step {
    /// The broker sends a complete wire frame.
    Frame(Vec<u8>),
    /// A producer context placed an envelope on the bridge.
    Envelope(Vec<u8>),
    /// Nothing happens; the wait times out once.
    Silence,
}

#[derive(Debug)]
pub struct MockError;

pub struct MockTransport {
    script: VecDeque<Step>,
    stream: VecDeque<u8>,
    bridge_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Fail this many connection attempts before succeeding.
    pub failing_connects: usize,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
    closed: Rc<Cell<usize>>,
}

impl Transport for MockTransport {
    type Handle = u8;
    type Error = MockError;

    fn connect(&mut self, _host: &str, _port: u16) -> Result<u8, MockError> {
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(MockError);
        }
        Ok(SOCK)
    }

    fn send(&mut self, handle: u8, buf: &[u8]) -> Result<usize, MockError> {
        assert_eq!(handle, SOCK);
        self.sent.borrow_mut().push(buf.to_vec());
        Ok(buf.len())
    }

    fn receive(&mut self, handle: u8, buf: &mut [u8], _timeout: u32) -> Result<usize, MockError> {
        match handle {
            SOCK => {
                let mut filled = 0;
                while filled < buf.len() {
                    match self.stream.pop_front() {
                        Some(byte) => {
                            buf[filled] = byte;
                            filled += 1;
                        }
                        None => break,
                    }
                }
                Ok(filled)
            }
            BRIDGE => {
                let Some(envelope) = self.bridge_queue.lock().unwrap().pop_front() else {
                    return Ok(0);
                };
                buf[..envelope.len()].copy_from_slice(&envelope);
                Ok(envelope.len())
            }
            _ => Err(MockError),
        }
    }

    fn wait_readable(&mut self, handles: &[u8], _timeout: u32) -> Result<ReadySet, MockError> {
        if !self.stream.is_empty() {
            return Ok(ready_at(handles, SOCK));
        }
        if !self.bridge_queue.lock().unwrap().is_empty() {
            let ready = ready_at(handles, BRIDGE);
            if !ready.is_empty() {
                return Ok(ready);
            }
        }
        match self.script.pop_front() {
            Some(Step::Frame(bytes)) => {
                self.stream.extend(bytes);
                Ok(ready_at(handles, SOCK))
            }
            Some(Step::Envelope(bytes)) => {
                self.bridge_queue.lock().unwrap().push_back(bytes);
                Ok(ready_at(handles, BRIDGE))
            }
            Some(Step::Silence) | None => Ok(ReadySet::empty()),
        }
    }

    fn close(&mut self, handle: u8) {
        assert_eq!(handle, SOCK);
        self.closed.set(self.closed.get() + 1);
    }
}

fn ready_at(handles: &[u8], handle: u8) -> ReadySet {
    let mut set = ReadySet::empty();
    if let Some(index) = handles.iter().position(|&h| h == handle) {
        set.insert(index);
    }
    set
}

#[derive(Clone)]
pub struct MockBridge {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl<T: Transport<Handle = u8>> PublishBridge<T> for MockBridge {
    type Sender = MockSender;

    fn handle(&self) -> u8 {
        BRIDGE
    }

    fn sender(&self) -> MockSender {
        MockSender {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl MockBridge {
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().unwrap().pop_front()
    }
}

#[derive(Clone)]
pub struct MockSender {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl BridgeSender for MockSender {
    fn send_local(&self, envelope: &[u8]) -> Result<(), Error> {
        self.queue.lock().unwrap().push_back(envelope.to_vec());
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockClock {
    now: Rc<Cell<u32>>,
    pub sleeps: Rc<RefCell<Vec<u32>>>,
}

impl Clock for MockClock {
    fn now(&self) -> u32 {
        self.now.get()
    }

    fn sleep(&self, secs: u32) {
        self.sleeps.borrow_mut().push(secs);
        self.now.set(self.now.get() + secs);
    }
}

/// One observed handler invocation.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub label: &'static str,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub packet_id: u16,
    /// Number of frames the engine had sent when the handler ran; lets tests
    /// assert that delivery happened before the acknowledgment.
    pub frames_sent_at_call: usize,
}

#[derive(Clone)]
pub struct RecordingHandler {
    pub label: &'static str,
    pub deliveries: Rc<RefCell<Vec<Delivery>>>,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MessageHandler for RecordingHandler {
    fn on_message(&mut self, topic: &str, message: &InboundMessage<'_>) {
        self.deliveries.borrow_mut().push(Delivery {
            label: self.label,
            topic: topic.to_string(),
            payload: message.payload.to_vec(),
            qos: message.qos,
            packet_id: message.packet_id,
            frames_sent_at_call: self.sent.borrow().len(),
        });
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookCounts {
    pub attempts: u32,
    pub online: u32,
    pub offline: u32,
}

#[derive(Clone, Default)]
pub struct CountingHooks {
    pub counts: Rc<RefCell<HookCounts>>,
}

impl mqlink::EventHooks for CountingHooks {
    fn on_connect_attempt(&mut self) {
        self.counts.borrow_mut().attempts += 1;
    }

    fn on_online(&mut self) {
        self.counts.borrow_mut().online += 1;
    }

    fn on_offline(&mut self) {
        self.counts.borrow_mut().offline += 1;
    }
}

/// Everything an engine test needs, wired to one shared script.
pub struct Rig {
    pub transport: MockTransport,
    pub bridge: MockBridge,
    pub clock: MockClock,
    pub hooks: CountingHooks,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub closed: Rc<Cell<usize>>,
    pub deliveries: Rc<RefCell<Vec<Delivery>>>,
}

impl Rig {
    pub fn new(script: Vec<Step>) -> Self {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let closed = Rc::new(Cell::new(0));
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        Self {
            transport: MockTransport {
                script: script.into(),
                stream: VecDeque::new(),
                bridge_queue: Arc::clone(&queue),
                failing_connects: 0,
                sent: Rc::clone(&sent),
                closed: Rc::clone(&closed),
            },
            bridge: MockBridge { queue },
            clock: MockClock {
                now: Rc::new(Cell::new(1000)),
                sleeps: Rc::new(RefCell::new(Vec::new())),
            },
            hooks: CountingHooks::default(),
            sent,
            closed,
            deliveries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn handler(&self, label: &'static str) -> RecordingHandler {
        RecordingHandler {
            label,
            deliveries: Rc::clone(&self.deliveries),
            sent: Rc::clone(&self.sent),
        }
    }
}

// Wire frame builders for scripted broker traffic.

pub fn connack(return_code: u8) -> Vec<u8> {
    vec![0x20, 0x02, 0x00, return_code]
}

pub fn suback(packet_id: u16, granted: u8) -> Vec<u8> {
    let id = packet_id.to_be_bytes();
    vec![0x90, 0x03, id[0], id[1], granted]
}

pub fn publish(qos: QoS, packet_id: u16, topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut remaining = 2 + topic.len() + payload.len();
    if qos != QoS::AtMostOnce {
        remaining += 2;
    }
    assert!(remaining < 128, "test frames stay single-length-byte");
    let mut frame = vec![0x30 | ((qos as u8) << 1), remaining as u8];
    frame.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    frame.extend_from_slice(topic.as_bytes());
    if qos != QoS::AtMostOnce {
        frame.extend_from_slice(&packet_id.to_be_bytes());
    }
    frame.extend_from_slice(payload);
    frame
}

pub fn ack(header: u8, packet_id: u16) -> Vec<u8> {
    let id = packet_id.to_be_bytes();
    vec![header, 0x02, id[0], id[1]]
}

pub fn pingresp() -> Vec<u8> {
    vec![0xD0, 0x00]
}

pub fn disconnect_envelope() -> Vec<u8> {
    b"DISCONNECT\0".to_vec()
}
