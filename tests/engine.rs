mod common;
use common::*;

use std::io::{self, Read, Write};

use delta_rpi::engine::{CancelToken, Engine, Mode, State};
use delta_rpi::fields::{FIELDS, PAYLOAD_SIZE};
use delta_rpi::fixture::canned_payload;
use delta_rpi::frame::{encode, RequestClass};
use delta_rpi::payload::Value;

fn poll_frame(address: u8) -> Vec<u8> {
    encode(RequestClass::Poll, address, 0x60, 0x01, &[]).unwrap()
}

fn answer(address: u8, data: &[u8]) -> Vec<u8> {
    encode(RequestClass::Accept, address, 0x60, 0x01, data).unwrap()
}

fn master(reads: Vec<Vec<u8>>) -> Engine<MockPort, RecordingSink> {
    Engine::new(
        MockPort::with_reads(reads),
        RecordingSink::default(),
        config(Mode::Master, 1),
        CancelToken::new(),
    )
    .unwrap()
}

fn slave(reads: Vec<Vec<u8>>) -> Engine<MockPort, RecordingSink> {
    Engine::new(
        MockPort::with_reads(reads),
        RecordingSink::default(),
        config(Mode::Slave, 1),
        CancelToken::new(),
    )
    .unwrap()
}

#[test]
fn master_decodes_reading() {
    let mut engine = master(vec![answer(1, &canned_payload().unwrap())]);
    engine.poll().unwrap();

    assert_eq!(engine.port().written, poll_frame(1));
    assert_eq!(engine.state(), State::Idle);

    let sink = engine.sink();
    assert!(sink.errors.is_empty());
    assert_eq!(sink.readings.len(), 1);

    let reading = &sink.readings[0];
    assert_eq!(reading.len(), FIELDS.len());
    assert_eq!(reading[10].key, Some("acv1"));
    assert_eq!(reading[10].value, Value::Float(241.5));
    assert_eq!(reading[10].unit, "V");
}

#[test]
fn master_reports_reject() {
    let reject = encode(RequestClass::Reject, 1, 0x60, 0x01, &[]).unwrap();
    let mut engine = master(vec![reject]);
    engine.poll().unwrap();

    let sink = engine.sink();
    assert!(sink.readings.is_empty());
    assert_eq!(sink.errors.len(), 1);
    assert!(sink.errors[0].contains("rejected"));
}

#[test]
fn master_ignores_other_traffic() {
    let mut bytes = answer(2, &canned_payload().unwrap());
    bytes.extend(poll_frame(1));

    let mut engine = master(vec![bytes]);
    engine.poll().unwrap();

    assert!(engine.sink().readings.is_empty());
    assert!(engine.sink().errors.is_empty());
}

#[test]
fn master_reports_unsupported_response() {
    let odd = encode(RequestClass::Accept, 1, 0x60, 0x02, &[0x00]).unwrap();
    let mut engine = master(vec![odd]);
    engine.poll().unwrap();

    let sink = engine.sink();
    assert!(sink.readings.is_empty());
    assert_eq!(sink.errors.len(), 1);
    assert!(sink.errors[0].starts_with("can't decode response cmd=0x60, cmdsub=0x02"));
}

#[test]
fn short_payload_is_reported_and_polling_continues() {
    let payload = canned_payload().unwrap();
    let mut engine = master(vec![
        answer(1, &payload[..PAYLOAD_SIZE - 1]),
        vec![],
        answer(1, &payload),
    ]);

    engine.poll().unwrap();
    assert!(engine.sink().readings.is_empty());
    assert_eq!(engine.sink().errors.len(), 1);
    assert!(engine.sink().errors[0].contains("162"));

    engine.poll().unwrap();
    assert_eq!(engine.sink().readings.len(), 1);
    assert_eq!(engine.sink().errors.len(), 1);
}

#[test]
fn master_resyncs_over_noise() {
    let payload = canned_payload().unwrap();
    let mut corrupted = answer(1, &payload);
    corrupted[20] ^= 0x40;

    let mut bytes = vec![0x00, 0x02, 0x99, 0xFF];
    bytes.extend(corrupted);
    bytes.extend(answer(1, &payload));
    bytes.extend([0x02, 0x06]);

    let mut engine = master(vec![bytes]);
    engine.poll().unwrap();

    let sink = engine.sink();
    assert_eq!(sink.readings.len(), 1);
    assert_eq!(sink.errors.len(), 1);
    assert!(sink.errors[0].starts_with("dropped frame: checksum mismatch at offset 4"));
}

#[test]
fn damaged_reply_reaches_the_sink() {
    let mut bytes = answer(1, &canned_payload().unwrap());
    bytes[20] ^= 0x40;

    let mut engine = master(vec![bytes]);
    engine.poll().unwrap();

    let sink = engine.sink();
    assert!(sink.readings.is_empty());
    assert_eq!(sink.errors.len(), 1);
    assert!(sink.errors[0].contains("checksum mismatch"));
}

#[test]
fn reply_split_across_reads_is_reassembled() {
    let bytes = answer(1, &canned_payload().unwrap());
    let mut engine = master(vec![bytes[..100].to_vec(), bytes[100..].to_vec()]);
    engine.poll().unwrap();

    assert_eq!(engine.sink().readings.len(), 1);
    assert!(engine.sink().errors.is_empty());
}

#[test]
fn slave_answers_poll_split_across_reads() {
    let poll = poll_frame(1);
    let mut engine = slave(vec![poll[..4].to_vec(), poll[4..].to_vec()]);
    engine.serve().unwrap();

    assert_eq!(engine.port().written, answer(1, &canned_payload().unwrap()));
}

#[test]
fn slave_reports_damaged_poll() {
    let mut poll = poll_frame(1);
    poll[8] = 0x00;

    let mut engine = slave(vec![poll]);
    engine.serve().unwrap();

    assert!(engine.port().written.is_empty());
    assert_eq!(engine.sink().errors.len(), 1);
    assert!(engine.sink().errors[0].contains("bad terminator 0x00"));
}

#[test]
fn response_spanning_full_reads_is_reassembled() {
    let mut bytes = vec![0xAAu8; 900];
    bytes.extend(answer(1, &canned_payload().unwrap()));
    assert!(bytes.len() > 1024);

    let mut engine = master(vec![bytes]);
    engine.poll().unwrap();

    assert_eq!(engine.sink().readings.len(), 1);
}

#[test]
fn slave_answers_poll() {
    let mut engine = slave(vec![poll_frame(1)]);
    engine.serve().unwrap();

    assert_eq!(engine.port().written, answer(1, &canned_payload().unwrap()));
    assert_eq!(engine.state(), State::Idle);
    assert!(engine.sink().errors.is_empty());
}

#[test]
fn slave_ignores_other_addresses_and_answers() {
    let mut bytes = poll_frame(2);
    bytes.extend(answer(1, &[0u8; PAYLOAD_SIZE]));

    let mut engine = slave(vec![bytes]);
    engine.serve().unwrap();

    assert!(engine.port().written.is_empty());
    assert!(engine.sink().errors.is_empty());
}

#[test]
fn slave_reports_unsupported_command() {
    let request = encode(RequestClass::Poll, 1, 0x61, 0x01, &[]).unwrap();
    let mut engine = slave(vec![request]);
    engine.serve().unwrap();

    assert!(engine.port().written.is_empty());
    assert_eq!(engine.sink().errors.len(), 1);
    assert!(engine.sink().errors[0].starts_with("unsupported request cmd=0x61"));
}

#[test]
fn slave_serves_custom_reply() {
    let mut payload = vec![0u8; PAYLOAD_SIZE];
    payload[55..57].copy_from_slice(&[0x09, 0x8A]);

    let mut engine = slave(vec![poll_frame(1)]).with_reply(payload.clone()).unwrap();
    engine.serve().unwrap();
    assert_eq!(engine.port().written, answer(1, &payload));

    assert!(slave(vec![]).with_reply(vec![0u8; 10]).is_err());
}

#[test]
fn master_and_slave_agree() {
    let mut inverter = slave(vec![poll_frame(1)]);
    inverter.serve().unwrap();

    let mut logger = master(vec![inverter.port().written.clone()]);
    logger.poll().unwrap();

    let reading = &logger.sink().readings[0];
    assert_eq!(reading[0].value, Value::Text("502N55E0100".to_string()));
    assert_eq!(reading[13].key, Some("freq1"));
    assert_eq!(reading[13].value, Value::Float(49.99));
    assert_eq!(reading[28].key, Some("time_total"));
    assert_eq!(reading[28].value, Value::Int(35128973));
}

#[test]
fn run_polls_until_cancelled() {
    let payload = canned_payload().unwrap();
    let token = CancelToken::new();
    let mut port = MockPort::with_reads(vec![
        answer(1, &payload),
        vec![],
        answer(1, &payload),
        vec![],
    ]);
    port.stop_when_empty = Some(token.clone());

    let mut engine = Engine::new(
        port,
        RecordingSink::default(),
        config(Mode::Master, 1),
        token,
    )
    .unwrap();
    engine.run().unwrap();

    assert_eq!(engine.sink().readings.len(), 2);
    assert_eq!(engine.port().written, poll_frame(1).repeat(3));
}

#[test]
fn run_does_nothing_once_cancelled() {
    let token = CancelToken::new();
    token.cancel();

    let mut engine = Engine::new(
        MockPort::default(),
        RecordingSink::default(),
        config(Mode::Slave, 1),
        token,
    )
    .unwrap();
    engine.run().unwrap();

    assert!(engine.port().written.is_empty());
}

struct BrokenPort;

impl Read for BrokenPort {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
    }
}

impl Write for BrokenPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn transport_failure_ends_the_loop() {
    let mut engine = Engine::new(
        BrokenPort,
        RecordingSink::default(),
        config(Mode::Master, 1),
        CancelToken::new(),
    )
    .unwrap();

    let err = engine.run().unwrap_err();
    assert!(format!("{:#}", err).contains("device unplugged"));
}
