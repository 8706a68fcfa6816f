// src/tests/streamingestor_tests.rs

use crate::common::GZ_MAGIC;
use crate::data::record::LogRecord;
use crate::readers::rawlogstore::RawlogStore;
use crate::readers::streamingestor::{
    decode_packet,
    encode_packet,
    PacketCipher,
    PacketError,
    PacketMeta,
    StreamIngestor,
    StreamSequencer,
    PACKET_NONCE_SZ,
    PACKET_TAG_SZ,
};
use crate::tests::common::{config, fields, gzip_bytes};

use std::io::Write;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use ::flate2::write::ZlibEncoder;
use ::flate2::Compression;
use ::serde_json::{json, Value};
use ::test_case::test_case;

const SECRET: &[u8] = b"correct horse battery staple";
const NONCE: [u8; PACKET_NONCE_SZ] = [7; PACKET_NONCE_SZ];
const WAIT: Duration = Duration::from_secs(5);

fn cipher() -> PacketCipher {
    PacketCipher::new(SECRET)
}

fn meta(
    counter: Option<u64>,
    pid: Option<u64>,
) -> PacketMeta {
    PacketMeta {
        counter,
        identity: pid.map(Value::from),
    }
}

fn zlib_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();

    encoder.finish().unwrap()
}

/// Encrypt an arbitrary JSON payload, zlib or gzip compressed.
fn seal(
    payload: &Value,
    gzip: bool,
) -> Vec<u8> {
    let json = serde_json::to_vec(payload).unwrap();
    let compressed = match gzip {
        true => gzip_bytes(&json),
        false => zlib_bytes(&json),
    };

    cipher().encrypt(&NONCE, &compressed).unwrap()
}

fn kinds(records: &[LogRecord]) -> Vec<Option<&str>> {
    records
        .iter()
        .map(|record| record.get("virtual_kind").and_then(Value::as_str))
        .collect()
}

#[test]
fn test_packet_layout() {
    let plaintext = b"some plaintext";
    let packet = cipher().encrypt(&NONCE, plaintext).unwrap();
    assert_eq!(packet.len(), PACKET_NONCE_SZ + PACKET_TAG_SZ + plaintext.len());
    assert_eq!(packet[..PACKET_NONCE_SZ], NONCE);
    assert_eq!(cipher().decrypt(&packet).unwrap(), plaintext);
}

#[test]
fn test_encode_decode_envelope() {
    let fields_ = fields(json!({"msg": "hello", "level": 20, "meta": "kept in record"}));
    let meta_ = meta(Some(41), Some(1234));
    let packet = encode_packet(&cipher(), &NONCE, &meta_, &fields_).unwrap();
    let decoded = decode_packet(&cipher(), &packet).unwrap();
    assert_eq!(decoded.meta, meta_);
    assert_eq!(decoded.fields, fields_);
}

#[test_case(false; "zlib")]
#[test_case(true; "gzip")]
fn test_decode_flat_record(gzip: bool) {
    let packet = seal(&json!({"msg": "flat", "meta": {"counter": 3, "pid": "abc"}, "level": 10}), gzip);
    let decoded = decode_packet(&cipher(), &packet).unwrap();
    assert_eq!(decoded.meta.counter, Some(3));
    assert_eq!(decoded.meta.identity, Some(Value::from("abc")));
    assert_eq!(decoded.fields, fields(json!({"msg": "flat", "level": 10})));
}

#[test]
fn test_decode_flat_record_named_record() {
    // a "record" member beside other fields is an ordinary field
    let packet = seal(&json!({"msg": "m", "record": {"a": 1}}), false);
    let decoded = decode_packet(&cipher(), &packet).unwrap();
    assert_eq!(decoded.meta, PacketMeta::default());
    assert_eq!(decoded.fields, fields(json!({"msg": "m", "record": {"a": 1}})));
}

#[test]
fn test_gzip_payload_starts_with_magic() {
    let json = serde_json::to_vec(&json!({"msg": "m"})).unwrap();
    assert_eq!(gzip_bytes(&json)[..2], GZ_MAGIC);
}

#[test]
fn test_decode_wrong_secret() {
    let packet = encode_packet(&cipher(), &NONCE, &PacketMeta::default(), &fields(json!({"msg": "m"}))).unwrap();
    let other = PacketCipher::new(b"wrong secret");
    assert_eq!(decode_packet(&other, &packet), Err(PacketError::Decrypt));
}

#[test]
fn test_decode_tampered() {
    let mut packet = encode_packet(&cipher(), &NONCE, &PacketMeta::default(), &fields(json!({"msg": "m"}))).unwrap();
    let last = packet.len() - 1;
    packet[last] ^= 0x01;
    assert_eq!(decode_packet(&cipher(), &packet), Err(PacketError::Decrypt));
}

#[test_case(0)]
#[test_case(PACKET_NONCE_SZ)]
#[test_case(PACKET_NONCE_SZ + PACKET_TAG_SZ - 1)]
fn test_decode_too_short(len: usize) {
    let packet: Vec<u8> = vec![0; len];
    assert_eq!(decode_packet(&cipher(), &packet), Err(PacketError::TooShort(len)));
}

#[test]
fn test_decode_not_compressed() {
    let packet = cipher().encrypt(&NONCE, b"{\"msg\": \"plain\"}").unwrap();
    assert!(matches!(decode_packet(&cipher(), &packet), Err(PacketError::Decompress(_))));
}

#[test]
fn test_decode_not_object() {
    let packet = seal(&json!([1, 2, 3]), false);
    assert_eq!(decode_packet(&cipher(), &packet), Err(PacketError::NotObject));
}

#[test]
fn test_decode_invalid_json() {
    let packet = cipher().encrypt(&NONCE, &zlib_bytes(b"{not json")).unwrap();
    assert!(matches!(decode_packet(&cipher(), &packet), Err(PacketError::Json(_))));
}

#[test]
fn test_sequencer_in_order() {
    let mut sequencer = StreamSequencer::new(&config());
    for counter in 1..5 {
        assert!(sequencer.sequence(&meta(Some(counter), Some(1))).is_empty());
    }
}

#[test]
fn test_sequencer_gap() {
    let mut sequencer = StreamSequencer::new(&config());
    assert!(sequencer.sequence(&meta(Some(1), Some(1))).is_empty());
    assert!(sequencer.sequence(&meta(Some(2), Some(1))).is_empty());
    let diagnostics = sequencer.sequence(&meta(Some(5), Some(1)));
    assert_eq!(diagnostics.len(), 1);
    let gap = &diagnostics[0];
    assert!(gap.is_virtual());
    assert_eq!(gap.get("virtual_kind"), Some(&Value::from("stream_gap")));
    assert_eq!(gap.get("dropped"), Some(&Value::from(2)));
    assert_eq!(gap.get("expected"), Some(&Value::from(3)));
    assert_eq!(gap.get("counter"), Some(&Value::from(5)));
    assert_eq!(gap.get("level"), Some(&Value::from(30)));
    assert!(sequencer.sequence(&meta(Some(6), Some(1))).is_empty());
}

#[test]
fn test_sequencer_backwards() {
    let mut sequencer = StreamSequencer::new(&config());
    sequencer.sequence(&meta(Some(10), None));
    let diagnostics = sequencer.sequence(&meta(Some(4), None));
    assert_eq!(kinds(&diagnostics), vec![Some("stream_gap")]);
    assert_eq!(diagnostics[0].get("dropped"), Some(&Value::from(0)));
    assert!(sequencer.sequence(&meta(Some(5), None)).is_empty());
}

#[test]
fn test_sequencer_restart_suppresses_gap() {
    let mut sequencer = StreamSequencer::new(&config());
    sequencer.sequence(&meta(Some(100), Some(1)));
    let diagnostics = sequencer.sequence(&meta(Some(0), Some(2)));
    assert_eq!(kinds(&diagnostics), vec![Some("stream_restart")]);
    assert_eq!(diagnostics[0].get("previous_pid"), Some(&Value::from(1)));
    assert_eq!(diagnostics[0].get("pid"), Some(&Value::from(2)));
    assert!(sequencer.sequence(&meta(Some(1), Some(2))).is_empty());
}

#[test]
fn test_sequencer_no_meta() {
    let mut sequencer = StreamSequencer::new(&config());
    assert!(sequencer.sequence(&PacketMeta::default()).is_empty());
    assert!(sequencer.sequence(&meta(Some(7), None)).is_empty());
    assert!(sequencer.sequence(&PacketMeta::default()).is_empty());
    assert!(sequencer.sequence(&meta(Some(8), None)).is_empty());
}

#[test]
fn test_ingest() {
    let mut sequencer = StreamSequencer::new(&config());
    let packet1 = encode_packet(&cipher(), &NONCE, &meta(Some(1), Some(9)), &fields(json!({"msg": "one"}))).unwrap();
    let packet3 = encode_packet(&cipher(), &NONCE, &meta(Some(3), Some(9)), &fields(json!({"msg": "three"}))).unwrap();
    let records = sequencer.ingest(&cipher(), &packet1, None);
    assert_eq!(kinds(&records), vec![None]);
    let records = sequencer.ingest(&cipher(), &packet3, None);
    assert_eq!(kinds(&records), vec![Some("stream_gap"), None]);
    assert_eq!(records[1].get("msg"), Some(&Value::from("three")));
    assert!(!records[1].is_virtual());
}

#[test]
fn test_ingest_bad_packet() {
    let mut sequencer = StreamSequencer::new(&config());
    let addr = "127.0.0.1:9".parse().unwrap();
    let records = sequencer.ingest(&cipher(), &[1, 2, 3], Some(addr));
    assert_eq!(kinds(&records), vec![Some("packet_error")]);
    assert_eq!(records[0].get("bytes"), Some(&Value::from(3)));
    assert_eq!(records[0].get("from"), Some(&Value::from("127.0.0.1:9")));
    assert_eq!(records[0].get("level"), Some(&Value::from(40)));
    assert_eq!(
        records[0].get("error"),
        Some(&Value::from(PacketError::TooShort(3).to_string()))
    );
}

fn start_ingestor() -> StreamIngestor {
    StreamIngestor::start(config(), SECRET, "127.0.0.1:0").unwrap()
}

/// Send every packet, in order, from one socket.
fn send(
    ingestor: &StreamIngestor,
    packets: &[&[u8]],
) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    for packet in packets.iter() {
        socket.send_to(packet, ingestor.local_addr()).unwrap();
    }
}

/// Wait until `count` records are queued.
fn wait_queued(
    ingestor: &StreamIngestor,
    count: usize,
) {
    let deadline = Instant::now() + WAIT;
    while ingestor.receiver().len() < count && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn packet_msg(
    counter: u64,
    msg: &str,
) -> Vec<u8> {
    encode_packet(&cipher(), &NONCE, &meta(Some(counter), Some(1)), &fields(json!({"msg": msg}))).unwrap()
}

#[test]
fn test_ingestor_receives() {
    let mut ingestor = start_ingestor();
    assert!(ingestor.is_running());
    send(&ingestor, &[packet_msg(1, "live").as_slice()]);
    let record = ingestor.recv_timeout(WAIT).unwrap();
    assert_eq!(record.get("msg"), Some(&Value::from("live")));
    send(&ingestor, &[&b"garbage packet that cannot be decrypted"[..]]);
    let record = ingestor.recv_timeout(WAIT).unwrap();
    assert_eq!(record.get("virtual_kind"), Some(&Value::from("packet_error")));
    ingestor.stop();
    assert!(!ingestor.is_running());
    ingestor.stop();
    assert!(!ingestor.is_running());
}

#[test]
fn test_ingestor_drain_into() {
    let ingestor = start_ingestor();
    let mut store = RawlogStore::new(config());
    assert_eq!(ingestor.drain_into(&mut store, None), None);
    send(&ingestor, &[packet_msg(1, "a").as_slice(), packet_msg(3, "c").as_slice()]);
    wait_queued(&ingestor, 3);
    let range = ingestor.drain_into(&mut store, None);
    assert_eq!(range, Some(0..3));
    assert_eq!(kinds(store.records()), vec![None, Some("stream_gap"), None]);
    assert!(ingestor.try_drain(10).is_empty());
}

#[test]
fn test_ingestor_try_drain_max() {
    let ingestor = start_ingestor();
    let packets: Vec<Vec<u8>> = (1..=3).map(|counter| packet_msg(counter, "m")).collect();
    let packets_: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
    send(&ingestor, &packets_);
    wait_queued(&ingestor, 3);
    assert_eq!(ingestor.try_drain(2).len(), 2);
    assert_eq!(ingestor.try_drain(2).len(), 1);
}

#[test]
fn test_ingestor_stop_on_drop() {
    let ingestor = start_ingestor();
    let addr = ingestor.local_addr();
    drop(ingestor);
    // the port is free again once the listener thread has exited
    UdpSocket::bind(addr).unwrap();
}

#[test]
fn test_ingestor_bind_error() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    assert!(StreamIngestor::start(config(), SECRET, addr).is_err());
}
