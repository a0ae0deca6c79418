use std::time::Duration;

use federa_codec::{ObjectId, Value};
use federa_transport::{
    Connection, ConnectionEvent, Message, MemoryConnection, ObjectChange, ObjectChanges, Payload,
};

fn next(conn: &mut dyn Connection) -> ConnectionEvent {
    conn.wait_event(Duration::from_secs(5))
        .unwrap()
        .expect("event before timeout")
}

fn open_both(a: &mut dyn Connection, b: &mut dyn Connection) {
    a.open().unwrap();
    b.open().unwrap();
    assert_eq!(next(a), ConnectionEvent::Opened);
    assert_eq!(next(b), ConnectionEvent::Opened);
}

/// Many packets sharing names and ids keep both dictionaries in step.
fn exercise(a: &mut dyn Connection, b: &mut dyn Connection) {
    open_both(a, b);

    let ids: Vec<ObjectId> = (0..40u8).map(|i| ObjectId::from_bytes([i; 12])).collect();
    let batches: Vec<Payload> = ids
        .chunks(8)
        .map(|chunk| {
            Payload::Messages(
                chunk
                    .iter()
                    .map(|id| {
                        Message::ObjectChanges(
                            ObjectChanges::new("world", *id, "Unit", ObjectChange::Create)
                                .with_property("owner", ids[0])
                                .with_property("name", format!("unit-{id}"))
                                .with_property("pos", Value::Array(vec![1.5.into(), (-2.0).into()])),
                        )
                    })
                    .collect(),
            )
        })
        .collect();

    for batch in &batches {
        a.send_packet(batch).unwrap();
    }
    for batch in &batches {
        assert_eq!(next(b), ConnectionEvent::Packet(batch.clone()));
    }

    b.send_packet(&Payload::Heartbeat).unwrap();
    assert_eq!(next(a), ConnectionEvent::Packet(Payload::Heartbeat));
}

#[test]
fn memory_connection_pair() {
    let (mut a, mut b) = MemoryConnection::pair("a", "b");
    exercise(&mut a, &mut b);
}

#[cfg(unix)]
#[test]
fn unix_stream_connection_pair() {
    use federa_transport::StreamConnection;
    use std::os::unix::net::UnixStream;

    let (left, right) = UnixStream::pair().unwrap();
    let mut a = StreamConnection::unix(left).unwrap();
    let mut b = StreamConnection::unix(right).unwrap();
    exercise(&mut a, &mut b);
}

#[test]
fn tcp_stream_connection_pair() {
    use federa_transport::StreamConnection;
    use std::net::{TcpListener, TcpStream};

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();

    let mut a = StreamConnection::tcp(client).unwrap();
    let mut b = StreamConnection::tcp(server).unwrap();
    exercise(&mut a, &mut b);
}
