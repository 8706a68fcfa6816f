// src/readers/streamingestor.rs

//! Implements a [`StreamIngestor`], a background listener that receives
//! encrypted log records over UDP.
//!
//! Each datagram is
//!
//! ```text
//! ┌──────────┬──────────┬───────────────────────────────────────────┐
//! │ nonce 12 │  tag 16  │ AES-256-GCM ciphertext of zlib/gzip JSON  │
//! └──────────┴──────────┴───────────────────────────────────────────┘
//! ```
//!
//! The key is `SHA-256(secret)`. The JSON is either an envelope
//! `{"meta": {"counter": N, "pid": P}, "record": {…}}` or a flat record
//! object with an optional `"meta"` member.
//!
//! The listener thread owns only the socket and the sending half of a
//! bounded [`crossbeam_channel`]. It decodes packets, adds diagnostic
//! virtual records for undecodable packets, counter gaps and remote
//! restarts (see [`StreamSequencer`]), and queues the records. It never
//! touches a [`RawlogStore`]; the interactive thread drains the queue with
//! [`StreamIngestor::drain_into`].
//!
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore

use crate::common::{Bytes, SeqRange, GZ_MAGIC};
use crate::config::RawlogConfig;
use crate::data::record::{Fields, LogRecord, VirtualKind};
use crate::debug::printers::buffer_to_string_noraw;
use crate::readers::rawlogstore::{RawlogStore, RecordTransform};
#[allow(unused_imports)]
use crate::{de_err, de_wrn, e_err, e_wrn};

use std::fmt;
use std::io::{ErrorKind, Read, Result};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ::aes_gcm::aead::{Aead, KeyInit};
use ::aes_gcm::{Aes256Gcm, Nonce};
use ::crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use ::flate2::read::{GzDecoder, ZlibDecoder};
use ::flate2::write::ZlibEncoder;
use ::flate2::Compression;
use ::serde_json::Value;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};
use ::sha2::{Digest, Sha256};
use ::thiserror::Error;

/// Nonce bytes at the start of a packet.
pub const PACKET_NONCE_SZ: usize = 12;
/// Authentication tag bytes following the nonce.
pub const PACKET_TAG_SZ: usize = 16;
/// Largest UDP payload.
const DATAGRAM_SZ_MAX: usize = 65536;

/// Metadata member of a packet's JSON.
const FIELD_META: &str = "meta";
/// Record member of an envelope packet.
const FIELD_RECORD: &str = "record";
/// Per-stream counter within the metadata.
const META_COUNTER: &str = "counter";
/// Process identity within the metadata.
const META_PID: &str = "pid";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// packet decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure to decode one packet.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PacketError {
    #[error("packet of {0} bytes is too short")]
    TooShort(usize),
    #[error("decryption failed (wrong secret or damaged packet)")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("payload is not a JSON object")]
    NotObject,
}

/// AES-256-GCM cipher keyed by `SHA-256(secret)`.
#[derive(Clone)]
pub struct PacketCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for PacketCipher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("PacketCipher").finish_non_exhaustive()
    }
}

impl PacketCipher {
    pub fn new(secret: &[u8]) -> PacketCipher {
        let key = Sha256::digest(secret);

        PacketCipher {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Verify and decrypt a `nonce | tag | ciphertext` packet.
    pub fn decrypt(
        &self,
        packet: &[u8],
    ) -> std::result::Result<Bytes, PacketError> {
        if packet.len() < PACKET_NONCE_SZ + PACKET_TAG_SZ {
            return Err(PacketError::TooShort(packet.len()));
        }
        let nonce = Nonce::from_slice(&packet[..PACKET_NONCE_SZ]);
        let tag = &packet[PACKET_NONCE_SZ..PACKET_NONCE_SZ + PACKET_TAG_SZ];
        let ciphertext = &packet[PACKET_NONCE_SZ + PACKET_TAG_SZ..];
        // the cipher expects `ciphertext | tag`
        let mut sealed: Bytes = Bytes::with_capacity(ciphertext.len() + PACKET_TAG_SZ);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        self.cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| PacketError::Decrypt)
    }

    /// Encrypt `plaintext` into a `nonce | tag | ciphertext` packet.
    pub fn encrypt(
        &self,
        nonce: &[u8; PACKET_NONCE_SZ],
        plaintext: &[u8],
    ) -> std::result::Result<Bytes, PacketError> {
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| PacketError::Encrypt)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - PACKET_TAG_SZ);
        let mut packet: Bytes = Bytes::with_capacity(PACKET_NONCE_SZ + sealed.len());
        packet.extend_from_slice(nonce);
        packet.extend_from_slice(tag);
        packet.extend_from_slice(ciphertext);

        Ok(packet)
    }
}

/// Stream metadata of one packet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacketMeta {
    /// Monotonic per-stream counter.
    pub counter: Option<u64>,
    /// Identity of the sending process.
    pub identity: Option<Value>,
}

/// A decoded packet.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPacket {
    pub meta: PacketMeta,
    pub fields: Fields,
}

fn decompress(data: &[u8]) -> std::result::Result<Bytes, PacketError> {
    let mut out: Bytes = Bytes::with_capacity(data.len() * 4);
    let result = if data.starts_with(&GZ_MAGIC) {
        GzDecoder::new(data).read_to_end(&mut out)
    } else {
        ZlibDecoder::new(data).read_to_end(&mut out)
    };
    match result {
        Ok(_) => Ok(out),
        Err(err) => Err(PacketError::Decompress(err.to_string())),
    }
}

fn meta_from_value(meta: Option<Value>) -> PacketMeta {
    let mut map = match meta {
        Some(Value::Object(map)) => map,
        _ => return PacketMeta::default(),
    };

    PacketMeta {
        counter: map.get(META_COUNTER).and_then(Value::as_u64),
        identity: map.remove(META_PID),
    }
}

/// Decrypt, decompress and parse one packet.
pub fn decode_packet(
    cipher: &PacketCipher,
    packet: &[u8],
) -> std::result::Result<DecodedPacket, PacketError> {
    let plaintext = cipher.decrypt(packet)?;
    let json = decompress(&plaintext)?;
    let mut object = match serde_json::from_slice::<Value>(&json) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(PacketError::NotObject),
        Err(err) => return Err(PacketError::Json(err.to_string())),
    };
    let envelope: bool = matches!(object.get(FIELD_RECORD), Some(Value::Object(_)))
        && object.keys().all(|key| key == FIELD_META || key == FIELD_RECORD);
    let meta: Option<Value> = object.get(FIELD_META).cloned();
    let fields: Fields = if envelope {
        match object.remove(FIELD_RECORD) {
            Some(Value::Object(record)) => record,
            _ => Fields::new(),
        }
    } else {
        object.retain(|key, _| key != FIELD_META);
        object
    };

    Ok(DecodedPacket {
        meta: meta_from_value(meta),
        fields,
    })
}

/// Compress and encrypt `fields` and `meta` as an envelope packet.
pub fn encode_packet(
    cipher: &PacketCipher,
    nonce: &[u8; PACKET_NONCE_SZ],
    meta: &PacketMeta,
    fields: &Fields,
) -> std::result::Result<Bytes, PacketError> {
    let mut meta_map = Fields::new();
    if let Some(counter) = meta.counter {
        meta_map.insert(String::from(META_COUNTER), Value::from(counter));
    }
    if let Some(identity) = meta.identity.as_ref() {
        meta_map.insert(String::from(META_PID), identity.clone());
    }
    let mut envelope = Fields::new();
    envelope.insert(String::from(FIELD_META), Value::Object(meta_map));
    envelope.insert(String::from(FIELD_RECORD), Value::Object(fields.clone()));
    let json = serde_json::to_vec(&envelope).map_err(|err| PacketError::Json(err.to_string()))?;
    let mut encoder = ZlibEncoder::new(Bytes::new(), Compression::default());
    std::io::Write::write_all(&mut encoder, &json).map_err(|err| PacketError::Decompress(err.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|err| PacketError::Decompress(err.to_string()))?;

    cipher.encrypt(nonce, &compressed)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// sequencing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks the counter and identity of a stream and produces diagnostic
/// virtual records for gaps and restarts.
///
/// A changed identity is reported as a restart and the counter check is
/// skipped for that packet; the new process starts its own count.
#[derive(Debug)]
pub struct StreamSequencer {
    last_counter: Option<u64>,
    last_identity: Option<Value>,
    level_warning: i64,
    level_error: i64,
}

impl StreamSequencer {
    pub fn new(config: &RawlogConfig) -> StreamSequencer {
        StreamSequencer {
            last_counter: None,
            last_identity: None,
            level_warning: config.level_or_zero(&["WARNING", "WARN"]),
            level_error: config.level_or_zero(&["ERROR"]),
        }
    }

    /// Diagnostic records to insert before the record carrying `meta`.
    pub fn sequence(
        &mut self,
        meta: &PacketMeta,
    ) -> Vec<LogRecord> {
        let mut diagnostics: Vec<LogRecord> = Vec::new();
        let restarted: bool = match (self.last_identity.as_ref(), meta.identity.as_ref()) {
            (Some(last), Some(identity)) if last != identity => {
                let mut extra = Fields::new();
                extra.insert(String::from("previous_pid"), last.clone());
                extra.insert(String::from("pid"), identity.clone());
                diagnostics.push(LogRecord::new_virtual(
                    VirtualKind::StreamRestart,
                    self.level_warning,
                    format!("remote process restarted: identity changed from {} to {}", last, identity),
                    extra,
                ));
                true
            }
            _ => false,
        };
        if !restarted {
            if let (Some(last), Some(counter)) = (self.last_counter, meta.counter) {
                let expected = last.saturating_add(1);
                if counter != expected {
                    let dropped: u64 = counter.saturating_sub(expected);
                    let msg = if counter > expected {
                        format!("{} lines dropped: expected counter {}, got {}", dropped, expected, counter)
                    } else {
                        format!("counter went backwards: expected {}, got {}", expected, counter)
                    };
                    let mut extra = Fields::new();
                    extra.insert(String::from("dropped"), Value::from(dropped));
                    extra.insert(String::from("expected"), Value::from(expected));
                    extra.insert(String::from("counter"), Value::from(counter));
                    diagnostics.push(LogRecord::new_virtual(
                        VirtualKind::StreamGap,
                        self.level_warning,
                        msg,
                        extra,
                    ));
                }
            }
        }
        if meta.identity.is_some() {
            self.last_identity = meta.identity.clone();
        }
        if meta.counter.is_some() {
            self.last_counter = meta.counter;
        }

        diagnostics
    }

    /// A diagnostic record for a packet that could not be decoded.
    pub fn packet_error(
        &self,
        error: &PacketError,
        packet: &[u8],
        from: Option<SocketAddr>,
    ) -> LogRecord {
        let mut extra = Fields::new();
        extra.insert(String::from("bytes"), Value::from(packet.len()));
        extra.insert(String::from("error"), Value::from(error.to_string()));
        if let Some(from) = from {
            extra.insert(String::from("from"), Value::from(from.to_string()));
        }

        LogRecord::new_virtual(
            VirtualKind::PacketError,
            self.level_error,
            format!("failed to decode packet of {} bytes: {}", packet.len(), error),
            extra,
        )
    }

    /// Decode `packet` into the records to queue: diagnostics first, then
    /// the real record. Never fails; failures become a diagnostic record.
    pub fn ingest(
        &mut self,
        cipher: &PacketCipher,
        packet: &[u8],
        from: Option<SocketAddr>,
    ) -> Vec<LogRecord> {
        match decode_packet(cipher, packet) {
            Ok(decoded) => {
                let mut records = self.sequence(&decoded.meta);
                records.push(LogRecord::new(decoded.fields));
                records
            }
            Err(err) => {
                de_wrn!("packet from {:?}: {}: {}", from, err, buffer_to_string_noraw(packet));
                vec![self.packet_error(&err, packet, from)]
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StreamIngestor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Listens for packets on a background thread and queues the decoded
/// records.
pub struct StreamIngestor {
    local_addr: SocketAddr,
    /// dropped by `stop`, closing the socket once the thread exits
    socket: Option<Arc<UdpSocket>>,
    receiver: Receiver<LogRecord>,
    stop_flag: Arc<AtomicBool>,
    /// disconnected or signalled when the listener thread exits
    done_rx: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
    join_timeout: Duration,
}

impl fmt::Debug for StreamIngestor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("StreamIngestor")
            .field("local_addr", &self.local_addr)
            .field("queued", &self.receiver.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl StreamIngestor {
    /// Bind `bind_addr` and start the listener thread.
    pub fn start<A: ToSocketAddrs>(
        config: Arc<RawlogConfig>,
        secret: &[u8],
        bind_addr: A,
    ) -> Result<StreamIngestor> {
        defn!();
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(config.listener_poll_interval))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let (sender, receiver) = crossbeam_channel::bounded::<LogRecord>(config.listener_queue_capacity);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let cipher = PacketCipher::new(secret);
        let sequencer = StreamSequencer::new(&config);

        let socket_thread = socket.clone();
        let stop_thread = stop_flag.clone();
        let poll_interval = config.listener_poll_interval;
        let handle = thread::Builder::new()
            .name(format!("rawlog-listener-{}", local_addr))
            .spawn(move || {
                listen(socket_thread, cipher, sequencer, sender, stop_thread, poll_interval);
                // the receiver may be gone already
                let _ = done_tx.send(());
            })?;
        defx!("listening on {}", local_addr);

        Ok(StreamIngestor {
            local_addr,
            socket: Some(socket),
            receiver,
            stop_flag,
            done_rx,
            handle: Some(handle),
            join_timeout: config.listener_join_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// The receiving half of the record queue.
    pub fn receiver(&self) -> &Receiver<LogRecord> {
        &self.receiver
    }

    /// Take up to `max` queued records without waiting.
    pub fn try_drain(
        &self,
        max: usize,
    ) -> Vec<LogRecord> {
        self.receiver.try_iter().take(max).collect()
    }

    /// Wait up to `timeout` for one record.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Option<LogRecord> {
        match self.receiver.recv_timeout(timeout) {
            Ok(record) => Some(record),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Append every queued record to `store`.
    /// Returns the range of appended sequence indices.
    pub fn drain_into(
        &self,
        store: &mut RawlogStore,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Option<SeqRange> {
        let records: Vec<LogRecord> = self.receiver.try_iter().collect();
        if records.is_empty() {
            return None;
        }
        defñ!("{} records", records.len());

        store.append_live(records, transform)
    }

    /// Stop the listener thread and close the socket.
    ///
    /// Waits at most the configured join timeout; a thread that does not
    /// exit in time is detached. Calling `stop` again does nothing.
    pub fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                defñ!("already stopped");
                return;
            }
        };
        defn!("{}", self.local_addr);
        self.stop_flag.store(true, Ordering::Release);
        if handle.thread().id() == thread::current().id() {
            // joining itself would deadlock
            defo!("stop() called from the listener thread; detach");
        } else {
            match self.done_rx.recv_timeout(self.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if let Err(_err) = handle.join() {
                        e_err!("listener thread on {} panicked", self.local_addr);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    e_wrn!(
                        "listener thread on {} did not stop within {:?}; detached",
                        self.local_addr,
                        self.join_timeout
                    );
                }
            }
        }
        self.socket = None;
        defx!();
    }
}

impl Drop for StreamIngestor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The listener thread loop.
fn listen(
    socket: Arc<UdpSocket>,
    cipher: PacketCipher,
    mut sequencer: StreamSequencer,
    sender: Sender<LogRecord>,
    stop_flag: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    defn!();
    let mut buffer: Bytes = vec![0; DATAGRAM_SZ_MAX];
    'recv: while !stop_flag.load(Ordering::Acquire) {
        let (len, from) = match socket.recv_from(&mut buffer) {
            Ok(val) => val,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                continue;
            }
            Err(err) => {
                e_err!("listener socket: {}", err);
                break;
            }
        };
        defo!("{} bytes from {}", len, from);
        for record in sequencer.ingest(&cipher, &buffer[..len], Some(from)).into_iter() {
            let mut record = record;
            loop {
                if stop_flag.load(Ordering::Acquire) {
                    break 'recv;
                }
                match sender.send_timeout(record, poll_interval) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(record_)) => {
                        // queue full; wait for the consumer
                        record = record_;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        defo!("receiver disconnected");
                        break 'recv;
                    }
                }
            }
        }
    }
    defx!();
}
