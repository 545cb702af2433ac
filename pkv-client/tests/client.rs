use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use pkv_client::{Client, ClientConfig, ClientError, Datum};
use pkv_common::{codec, wire, OpCode, ReplyCode, ValueEncoding};

fn spawn_server(
    expected_commands: usize,
    handler: fn(usize, OpCode, Vec<u8>, &mut TcpStream),
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
        for idx in 0..expected_commands {
            let (op, payload) = read_request(&mut stream).expect("read request");
            handler(idx, op, payload, &mut stream);
        }
    });

    addr
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<(OpCode, Vec<u8>)> {
    let mut head = [0u8; 4];
    stream.read_exact(&mut head)?;
    let len = u32::from_le_bytes(head) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    if body.len() < 2 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "short request",
        ));
    }
    let raw = u16::from_le_bytes([body[0], body[1]]);
    let op = OpCode::from_u16(raw).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "unknown opcode")
    })?;
    Ok((op, body[2..].to_vec()))
}

fn write_frame(stream: &mut TcpStream, body: &[u8]) {
    let _ = stream.write_all(&(body.len() as u32).to_le_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn write_code(stream: &mut TcpStream, code: ReplyCode) {
    let mut body = Vec::new();
    wire::encode_code(code, &mut body);
    write_frame(stream, &body);
}

fn write_value(stream: &mut TcpStream, encoding: ValueEncoding, data: &[u8]) {
    let mut body = Vec::new();
    wire::encode_value(encoding, data, &mut body);
    write_frame(stream, &body);
}

fn client_with_addr(addr: String) -> Client {
    let config = ClientConfig {
        addr,
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
        connect_timeout: Some(Duration::from_secs(1)),
    };
    Client::with_config(config)
}

#[test]
fn client_set_get_roundtrip() {
    let addr = spawn_server(2, |idx, op, payload, stream| {
        if idx == 0 {
            assert_eq!(op, OpCode::Set);
            assert_eq!(payload, b"-1 key value");
            write_value(stream, ValueEncoding::Plain, b"value");
        } else {
            assert_eq!(op, OpCode::Get);
            assert_eq!(payload, b"key");
            write_value(stream, ValueEncoding::Plain, b"value");
        }
    });

    let client = client_with_addr(addr);
    let stored = client.set(-1, b"key", b"value").expect("set");
    assert_eq!(stored, Datum::Bytes(b"value".to_vec()));
    let value = client.get(b"key").expect("get");
    assert_eq!(value, Some(Datum::Bytes(b"value".to_vec())));
}

#[test]
fn client_decodes_numbers() {
    let addr = spawn_server(1, |_, op, payload, stream| {
        assert_eq!(op, OpCode::Inc);
        assert_eq!(payload, b"counter");
        write_value(stream, ValueEncoding::Number, &wire::number_bytes(5));
    });

    let client = client_with_addr(addr);
    assert_eq!(client.inc(b"counter").expect("inc"), 5);
}

#[test]
fn client_decompresses_transparently() {
    let addr = spawn_server(1, |_, op, _, stream| {
        assert_eq!(op, OpCode::Get);
        let raw = b"abcd".repeat(32);
        let mut scratch = Vec::new();
        let len = codec::compress_bounded(&raw, &mut scratch).expect("compressible");
        write_value(stream, ValueEncoding::Compressed, &scratch[..len]);
    });

    let client = client_with_addr(addr);
    let value = client.get(b"big").expect("get").expect("present");
    assert_eq!(value, Datum::Bytes(b"abcd".repeat(32)));
}

#[test]
fn client_maps_not_found_and_errors() {
    let addr = spawn_server(3, |idx, op, _, stream| match idx {
        0 => {
            assert_eq!(op, OpCode::Get);
            write_code(stream, ReplyCode::NotFound);
        }
        1 => {
            assert_eq!(op, OpCode::Del);
            write_code(stream, ReplyCode::Locked);
        }
        _ => {
            assert_eq!(op, OpCode::MDel);
            write_code(stream, ReplyCode::NotFound);
        }
    });

    let client = client_with_addr(addr);
    assert_eq!(client.get(b"missing").expect("get"), None);
    assert!(matches!(
        client.del(b"locked"),
        Err(ClientError::Server(ReplyCode::Locked))
    ));
    assert!(matches!(
        client.mdel(b"none:"),
        Err(ClientError::Server(ReplyCode::NotFound))
    ));
}

#[test]
fn client_reads_kv_sets() {
    let addr = spawn_server(1, |_, op, payload, stream| {
        assert_eq!(op, OpCode::MGet);
        assert_eq!(payload, b"user:");
        let pairs: [(&[u8], ValueEncoding, &[u8]); 2] = [
            (b"user:1", ValueEncoding::Plain, b"a"),
            (b"user:2", ValueEncoding::Number, &wire::number_bytes(9)),
        ];
        let mut body = Vec::new();
        wire::encode_kv_set(&pairs, &mut body);
        write_frame(stream, &body);
    });

    let client = client_with_addr(addr);
    let rows = client.mget(b"user:").expect("mget");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], (b"user:1".to_vec(), Datum::Bytes(b"a".to_vec())));
    assert_eq!(rows[1], (b"user:2".to_vec(), Datum::Number(9)));
}

#[test]
fn client_mlock_and_munlock_report_counts() {
    let addr = spawn_server(2, |idx, op, payload, stream| {
        if idx == 0 {
            assert_eq!(op, OpCode::MLock);
            assert_eq!(payload, b"tmp: 60");
            write_value(stream, ValueEncoding::Number, &wire::number_bytes(3));
        } else {
            assert_eq!(op, OpCode::MUnlock);
            assert_eq!(payload, b"tmp:");
            write_value(stream, ValueEncoding::Number, &wire::number_bytes(3));
        }
    });

    let client = client_with_addr(addr);
    assert_eq!(client.mlock(b"tmp:", 60).expect("mlock"), 3);
    assert_eq!(client.munlock(b"tmp:").expect("munlock"), 3);
}

#[test]
fn client_quit_sends_end() {
    let addr = spawn_server(1, |_, op, _, stream| {
        assert_eq!(op, OpCode::End);
        write_code(stream, ReplyCode::Ok);
    });

    let client = client_with_addr(addr);
    client.quit().expect("quit");
}
