//! Operational session: connect handshake, MIB access, event delivery.
//!
//! Once the downloaded firmware runs, the device speaks the operational
//! protocol: sequenced request/response exchanges multiplexed with
//! unsolicited console, logger and disconnect messages. Three activities
//! cooperate here:
//!
//! - a *receiver* thread that reads frames off the socket into a bounded
//!   queue,
//! - a *reactor* thread that is the sole owner of mutable session state
//!   (sequence counter, the single in-flight request, the retransmission
//!   timer) and selects over received frames, caller requests and timer
//!   expiry,
//! - callers blocked in [`Session::exchange`], serialized by a mutex so at
//!   most one request is ever in flight.
//!
//! The device tears down sessions after roughly a minute of caller
//! silence; the reactor generates no keep-alive, so callers must stay
//! minimally chatty (any request does).

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{EbmEvent, EbmObserver};
use crate::mib::{self, MibValue, Oid, OidError};
use crate::protocol::constants::{
    LOG_TYPE_MODEM_STATUS, LOG_TYPE_SOC_MESSAGE_ERROR, LOGGER_CODE_OFFSET, LOGGER_TYPE_OFFSET,
    RECV_BUF_LEN, STATUS_ANSWER_CORRECT, STATUS_DEFAULT, STATUS_FORCED_CONNECT, STATUS_OK,
    STATUS_QUESTION, TYPE_CONNECT, TYPE_CONSOLE_OUTPUT, TYPE_DEVICE_DISCONNECT, TYPE_LOGGER_OUTPUT,
    TYPE_READ_MIB, TYPE_WRITE_MIB, error_name, log_type_name, modem_state_name,
};
use crate::protocol::message::{Message, MessageError};
use crate::transport::{FrameTransport, MacAddr, TransportError};

/// Interval between retransmissions of the in-flight request.
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);

/// First sequence number used by a session.
pub const INITIAL_SEQUENCE: u32 = 2;

/// Depth of the receiver-to-reactor frame queue.
const RX_QUEUE_DEPTH: usize = 10;

/// Answer function for the connect challenge.
pub type ChallengeHandler = Box<dyn Fn(u32) -> u32 + Send + Sync>;

/// Answer a connect challenge from the table of known pairs.
///
/// Unknown challenges answer 0, which the device rejects; the lookup is
/// logged so new pairs can be collected in the field.
pub fn default_challenge_handler(challenge: u32) -> u32 {
    match challenge {
        0x9574_3926 => 0x6e6f_6961,
        _ => {
            warn!(
                challenge = format!("{challenge:#010x}"),
                "unknown challenge, returning 0"
            );
            0
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,
    #[error("request could not be processed")]
    RequestFailed,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("device reported failure: {0}")]
    DeviceReported(String),
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
    #[error("OID codec error: {0}")]
    Oid(#[from] OidError),
    #[error("frame error: {0}")]
    Frame(#[from] MessageError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

enum ReactorInput {
    Frame(Vec<u8>),
    Request(Message),
    ReceiverClosed,
}

struct ExchangeHandle {
    requests: SyncSender<ReactorInput>,
    responses: Receiver<Option<Message>>,
}

/// A live operational session with one device.
pub struct Session {
    exchange_handle: Mutex<ExchangeHandle>,
    challenge_handler: ChallengeHandler,
    #[allow(dead_code)]
    receiver: thread::JoinHandle<()>,
    #[allow(dead_code)]
    reactor: thread::JoinHandle<()>,
}

impl Session {
    /// Start the receiver and reactor over `transport`, talking to the
    /// device at `device`. No traffic is generated until the first request.
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        device: MacAddr,
        observer: Arc<dyn EbmObserver>,
    ) -> Self {
        Self::with_challenge_handler(transport, device, observer, Box::new(default_challenge_handler))
    }

    /// Like [`new`](Self::new) with an overridable challenge answer
    /// function, so pairs discovered later can be injected without
    /// touching the engine.
    pub fn with_challenge_handler(
        transport: Arc<dyn FrameTransport>,
        device: MacAddr,
        observer: Arc<dyn EbmObserver>,
        challenge_handler: ChallengeHandler,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::sync_channel(RX_QUEUE_DEPTH);
        let (response_tx, response_rx) = mpsc::sync_channel(0);

        let receiver = {
            let transport = Arc::clone(&transport);
            let observer = Arc::clone(&observer);
            let input_tx = input_tx.clone();
            thread::spawn(move || {
                if let Err(e) = transport.set_read_deadline(None) {
                    debug!(error = %e, "could not clear read deadline");
                }
                loop {
                    let mut buf = [0u8; RECV_BUF_LEN];
                    match transport.recv(&mut buf) {
                        Ok(n) => {
                            if input_tx.send(ReactorInput::Frame(buf[..n].to_vec())).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            observer.on_event(&EbmEvent::ReceiverClosed {
                                error: e.to_string(),
                            });
                            let _ = input_tx.send(ReactorInput::ReceiverClosed);
                            return;
                        }
                    }
                }
            })
        };

        let reactor =
            thread::spawn(move || reactor_loop(transport, device, observer, input_rx, response_tx));

        Self {
            exchange_handle: Mutex::new(ExchangeHandle {
                requests: input_tx,
                responses: response_rx,
            }),
            challenge_handler,
            receiver,
            reactor,
        }
    }

    /// Submit one request and wait for the matching response.
    ///
    /// Callers are serialized; the sequence number is stamped by the
    /// reactor.
    pub fn exchange(&self, request: Message) -> Result<Message, SessionError> {
        let handle = self.exchange_handle.lock().unwrap();
        handle
            .requests
            .send(ReactorInput::Request(request))
            .map_err(|_| SessionError::Closed)?;
        match handle.responses.recv() {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(SessionError::RequestFailed),
            Err(_) => Err(SessionError::Closed),
        }
    }

    fn connect_request(&self, answer: u32, flags: u32) -> Result<Message, SessionError> {
        let mut payload = Vec::with_capacity(8);
        payload.write_u32::<BigEndian>(answer).unwrap();
        payload.write_u32::<BigEndian>(flags).unwrap();
        self.exchange(Message {
            msg_type: TYPE_CONNECT,
            sequence: 0,
            status: STATUS_DEFAULT,
            payload,
        })
    }

    /// Run the connect handshake.
    ///
    /// A device without an operator answers `FORCED_CONNECT` immediately;
    /// one with a configured challenge asks a `QUESTION` that is answered
    /// through the challenge handler.
    pub fn dial(&self) -> Result<(), SessionError> {
        let res = self.connect_request(0xffff_ffff, 0x3c)?;
        match res.status {
            STATUS_FORCED_CONNECT | STATUS_ANSWER_CORRECT => Ok(()),
            STATUS_QUESTION => {
                if res.payload.len() < 8 {
                    return Err(SessionError::MalformedResponse("short connect challenge"));
                }
                let challenge = BigEndian::read_u32(&res.payload[4..8]);
                let answer = (self.challenge_handler)(challenge);
                let res = self.connect_request(answer, 0)?;
                match res.status {
                    STATUS_FORCED_CONNECT | STATUS_ANSWER_CORRECT => Ok(()),
                    _ => Err(SessionError::ConnectFailed(res.to_string())),
                }
            }
            _ => Err(SessionError::ConnectFailed(res.to_string())),
        }
    }

    /// Read one MIB variable.
    pub fn read_mib(&self, oid: &Oid) -> Result<MibValue, SessionError> {
        let res = self.exchange(Message {
            msg_type: TYPE_READ_MIB,
            sequence: 0,
            status: STATUS_DEFAULT,
            payload: oid.marshal(),
        })?;
        if res.status != STATUS_OK {
            return Err(SessionError::DeviceReported(res.to_string()));
        }
        Ok(mib::parse_response(&res.payload)?.value)
    }

    /// Write one MIB variable.
    pub fn write_mib(&self, oid: &Oid, value: &MibValue) -> Result<(), SessionError> {
        let payload = oid.marshal_with_value(value)?;
        let res = self.exchange(Message {
            msg_type: TYPE_WRITE_MIB,
            sequence: 0,
            status: STATUS_DEFAULT,
            payload,
        })?;
        if res.status != STATUS_OK {
            return Err(SessionError::DeviceReported(res.to_string()));
        }
        Ok(())
    }
}

fn reactor_loop(
    transport: Arc<dyn FrameTransport>,
    device: MacAddr,
    observer: Arc<dyn EbmObserver>,
    input_rx: Receiver<ReactorInput>,
    response_tx: SyncSender<Option<Message>>,
) {
    let mut sequence = INITIAL_SEQUENCE;
    let mut in_flight: Option<Message> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let input = match deadline {
            Some(at) => {
                match input_rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                    Ok(input) => input,
                    Err(RecvTimeoutError::Timeout) => {
                        // Retransmission shares the stamped sequence number.
                        if let Some(request) = &in_flight {
                            observer.on_event(&EbmEvent::Retransmit {
                                sequence: request.sequence,
                            });
                            match resend(transport.as_ref(), device, request) {
                                Ok(()) => deadline = Some(Instant::now() + RETRANSMIT_INTERVAL),
                                Err(e) => {
                                    warn!(error = %e, "retransmission failed");
                                    in_flight = None;
                                    deadline = None;
                                    if response_tx.send(None).is_err() {
                                        return;
                                    }
                                }
                            }
                        } else {
                            deadline = None;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match input_rx.recv() {
                Ok(input) => input,
                Err(_) => return,
            },
        };

        match input {
            ReactorInput::Frame(raw) => {
                let msg = match Message::decode(&raw) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = %e, "error parsing message, ignoring");
                        continue;
                    }
                };
                match msg.msg_type {
                    TYPE_CONSOLE_OUTPUT => {
                        observer.on_event(&EbmEvent::ConsoleOutput { data: msg.payload });
                    }
                    TYPE_LOGGER_OUTPUT => deliver_logger_record(observer.as_ref(), &msg),
                    TYPE_DEVICE_DISCONNECT => {
                        observer.on_event(&EbmEvent::DeviceDisconnected);
                        return;
                    }
                    _ => {
                        let Some(request) = in_flight.take() else {
                            debug!(%msg, "message received with no request pending, dropping");
                            continue;
                        };
                        if request.sequence != msg.sequence {
                            // The device has been seen answering off by a
                            // few; deliver anyway and surface the skew.
                            observer.on_event(&EbmEvent::SequenceMismatch {
                                expected: request.sequence,
                                actual: msg.sequence,
                            });
                        }
                        deadline = None;
                        if response_tx.send(Some(msg)).is_err() {
                            return;
                        }
                    }
                }
            }
            ReactorInput::Request(mut request) => {
                request.sequence = sequence;
                match resend(transport.as_ref(), device, &request) {
                    Ok(()) => {
                        sequence = sequence.wrapping_add(1);
                        in_flight = Some(request);
                        deadline = Some(Instant::now() + RETRANSMIT_INTERVAL);
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to send request");
                        if response_tx.send(None).is_err() {
                            return;
                        }
                    }
                }
            }
            ReactorInput::ReceiverClosed => return,
        }
    }
}

fn resend(
    transport: &dyn FrameTransport,
    device: MacAddr,
    request: &Message,
) -> Result<(), SessionError> {
    let raw = request.encode()?;
    transport.send_to(&raw, device)?;
    Ok(())
}

fn deliver_logger_record(observer: &dyn EbmObserver, msg: &Message) {
    if msg.payload.len() < LOGGER_TYPE_OFFSET + 2 {
        warn!(len = msg.payload.len(), "short logger record, ignoring");
        return;
    }
    let log_type = BigEndian::read_u16(&msg.payload[LOGGER_TYPE_OFFSET..LOGGER_TYPE_OFFSET + 2]);
    let code = if msg.payload.len() >= LOGGER_CODE_OFFSET + 4 {
        Some(BigEndian::read_u32(
            &msg.payload[LOGGER_CODE_OFFSET..LOGGER_CODE_OFFSET + 4],
        ))
    } else {
        None
    };
    match (log_type, code) {
        (LOG_TYPE_MODEM_STATUS, Some(code)) => observer.on_event(&EbmEvent::ModemState {
            code,
            name: modem_state_name(code),
        }),
        (LOG_TYPE_SOC_MESSAGE_ERROR, Some(code)) => observer.on_event(&EbmEvent::SocError {
            code,
            name: error_name(code),
        }),
        _ => {
            debug!(log_type = %log_type_name(log_type), "raw logger record");
            observer.on_event(&EbmEvent::LoggerRecord {
                log_type,
                payload: msg.payload.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::protocol::constants::{STATUS_ANSWER_WRONG, TYPE_CONNECT_RESP, TYPE_READ_MIB_RESP};
    use crate::transport::MockTransport;

    const DEVICE: MacAddr = MacAddr([0xde, 0x21, 0x65, 0xaa, 0xbb, 0xcc]);

    #[derive(Default)]
    struct RecordingObserver {
        events: StdMutex<Vec<EbmEvent>>,
    }

    impl EbmObserver for RecordingObserver {
        fn on_event(&self, event: &EbmEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn session_with_observer(
        mock: &Arc<MockTransport>,
        observer: &Arc<RecordingObserver>,
    ) -> Session {
        Session::new(
            Arc::clone(mock) as Arc<dyn FrameTransport>,
            DEVICE,
            Arc::clone(observer) as Arc<dyn EbmObserver>,
        )
    }

    /// Wait until `count` frames were sent, then answer via `respond`.
    fn answer_after_send(
        mock: Arc<MockTransport>,
        count: usize,
        respond: impl FnOnce(&MockTransport) + Send + 'static,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            while mock.sent_count() < count {
                thread::sleep(Duration::from_millis(5));
            }
            respond(&mock);
        })
    }

    fn connect_response(sequence: u32, status: u8, payload: Vec<u8>) -> Vec<u8> {
        Message {
            msg_type: TYPE_CONNECT_RESP,
            sequence,
            status,
            payload,
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_default_challenge_handler() {
        assert_eq!(default_challenge_handler(0x9574_3926), 0x6e6f_6961);
        assert_eq!(default_challenge_handler(0xdead_beef), 0);
    }

    #[test]
    fn test_dial_forced_connect() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let responder = answer_after_send(Arc::clone(&mock), 1, |mock| {
            mock.push_frame(&connect_response(2, STATUS_FORCED_CONNECT, vec![]));
        });
        session.dial().unwrap();
        responder.join().unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, DEVICE);
        let req = Message::decode(&sent[0].1).unwrap();
        assert_eq!(req.msg_type, TYPE_CONNECT);
        assert_eq!(req.sequence, 2);
        assert_eq!(req.status, STATUS_DEFAULT);
        assert_eq!(req.payload, vec![0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x3c]);
    }

    #[test]
    fn test_dial_answers_challenge() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let first = answer_after_send(Arc::clone(&mock), 1, |mock| {
            let mut challenge = vec![0u8; 4];
            challenge.extend_from_slice(&[0x95, 0x74, 0x39, 0x26]);
            mock.push_frame(&connect_response(2, STATUS_QUESTION, challenge));
        });
        let second = answer_after_send(Arc::clone(&mock), 2, |mock| {
            mock.push_frame(&connect_response(3, STATUS_ANSWER_CORRECT, vec![]));
        });

        session.dial().unwrap();
        first.join().unwrap();
        second.join().unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        let answer = Message::decode(&sent[1].1).unwrap();
        assert_eq!(answer.sequence, 3);
        assert_eq!(answer.payload, vec![0x6e, 0x6f, 0x69, 0x61, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_dial_wrong_answer_fails() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let first = answer_after_send(Arc::clone(&mock), 1, |mock| {
            let mut challenge = vec![0u8; 4];
            challenge.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
            mock.push_frame(&connect_response(2, STATUS_QUESTION, challenge));
        });
        let second = answer_after_send(Arc::clone(&mock), 2, |mock| {
            mock.push_frame(&connect_response(3, STATUS_ANSWER_WRONG, vec![]));
        });

        assert!(matches!(session.dial(), Err(SessionError::ConnectFailed(_))));
        first.join().unwrap();
        second.join().unwrap();

        // The unknown challenge was answered with zero.
        let answer = Message::decode(&mock.sent()[1].1).unwrap();
        assert_eq!(&answer.payload[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_read_mib_roundtrip() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let oid = crate::mib::catalog::TICKS;
        let responder = answer_after_send(Arc::clone(&mock), 1, move |mock| {
            let payload = oid.marshal_with_value(&MibValue::Uint32(1234)).unwrap();
            mock.push_frame(
                &Message {
                    msg_type: TYPE_READ_MIB_RESP,
                    sequence: 2,
                    status: STATUS_OK,
                    payload,
                }
                .encode()
                .unwrap(),
            );
        });

        let value = session.read_mib(&oid).unwrap();
        responder.join().unwrap();
        assert_eq!(value, MibValue::Uint32(1234));
    }

    #[test]
    fn test_async_events_do_not_consume_the_in_flight_slot() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let oid = crate::mib::catalog::TICKS;
        let responder = answer_after_send(Arc::clone(&mock), 1, move |mock| {
            // Console text and a modem-status logger record arrive before
            // the response; both must bypass request matching.
            mock.push_frame(
                &Message {
                    msg_type: TYPE_CONSOLE_OUTPUT,
                    sequence: 0,
                    status: 0,
                    payload: b"G.fast PHY ready\r\n".to_vec(),
                }
                .encode()
                .unwrap(),
            );
            let mut logger = vec![0u8; 28];
            logger[21] = 1; // log type: modem status
            logger[27] = 4; // state: showtime
            mock.push_frame(
                &Message {
                    msg_type: TYPE_LOGGER_OUTPUT,
                    sequence: 0,
                    status: 0,
                    payload: logger,
                }
                .encode()
                .unwrap(),
            );
            let payload = oid.marshal_with_value(&MibValue::Uint32(7)).unwrap();
            mock.push_frame(
                &Message {
                    msg_type: TYPE_READ_MIB_RESP,
                    sequence: 2,
                    status: STATUS_OK,
                    payload,
                }
                .encode()
                .unwrap(),
            );
        });

        assert_eq!(session.read_mib(&oid).unwrap(), MibValue::Uint32(7));
        responder.join().unwrap();

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            EbmEvent::ConsoleOutput { data } if data.starts_with(b"G.fast")
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EbmEvent::ModemState { code: 4, name } if name == "showtime"
        )));
    }

    #[test]
    fn test_mismatched_sequence_is_warned_but_delivered() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let oid = crate::mib::catalog::TICKS;
        let responder = answer_after_send(Arc::clone(&mock), 1, move |mock| {
            let payload = oid.marshal_with_value(&MibValue::Uint32(1)).unwrap();
            mock.push_frame(
                &Message {
                    msg_type: TYPE_READ_MIB_RESP,
                    sequence: 9000,
                    status: STATUS_OK,
                    payload,
                }
                .encode()
                .unwrap(),
            );
        });

        assert_eq!(session.read_mib(&oid).unwrap(), MibValue::Uint32(1));
        responder.join().unwrap();
        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            EbmEvent::SequenceMismatch { expected: 2, actual: 9000 }
        )));
    }

    #[test]
    fn test_sequence_numbers_increase_per_request() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        let oid = crate::mib::catalog::TICKS;
        for (i, expected_seq) in [(1usize, 2u32), (2, 3), (3, 4)] {
            let responder = answer_after_send(Arc::clone(&mock), i, move |mock| {
                let payload = oid.marshal_with_value(&MibValue::Uint32(0)).unwrap();
                mock.push_frame(
                    &Message {
                        msg_type: TYPE_READ_MIB_RESP,
                        sequence: expected_seq,
                        status: STATUS_OK,
                        payload,
                    }
                    .encode()
                    .unwrap(),
                );
            });
            session.read_mib(&oid).unwrap();
            responder.join().unwrap();
        }

        let sequences: Vec<u32> = mock
            .sent()
            .iter()
            .map(|(_, raw)| Message::decode(raw).unwrap().sequence)
            .collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_device_disconnect_closes_the_session() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        mock.push_frame(
            &Message {
                msg_type: TYPE_DEVICE_DISCONNECT,
                sequence: 0,
                status: 0,
                payload: vec![],
            }
            .encode()
            .unwrap(),
        );
        // The reactor exits; any exchange can only fail closed.
        match session.read_mib(&crate::mib::catalog::TICKS) {
            Err(SessionError::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, EbmEvent::DeviceDisconnected)));
    }

    #[test]
    fn test_receiver_error_closes_the_session() {
        let mock = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = session_with_observer(&mock, &observer);

        mock.close();
        match session.read_mib(&crate::mib::catalog::TICKS) {
            // Depending on which side notices the close first, the
            // exchange either fails closed or could not be sent.
            Err(SessionError::Closed | SessionError::RequestFailed) => {}
            other => panic!("expected a teardown error, got {other:?}"),
        }
    }
}
