#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Many connections sharing one reactor, and many threads sharing one
//! connection: every message arrives exactly once, with no cross-talk.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use message_transport::{Connection, Listener, Message, Reactor, Region};

const TIMEOUT: Duration = Duration::from_secs(20);

#[test]
fn many_clients_exchange_without_crosstalk() {
    const CLIENTS: usize = 8;
    const MESSAGES_PER_CLIENT: usize = 25;

    let reactor = Reactor::new(8).unwrap();
    let server_region = Region::new(&reactor);

    // Server: echo every message back on its own connection.
    let listener = Listener::listen(
        &server_region,
        |connection| {
            let echo = connection.clone();
            connection
                .start(
                    move |message| {
                        let _ = echo.send(message);
                    },
                    || {},
                )
                .expect("server start");
        },
        0,
    )
    .unwrap();
    let port = listener.listening_port();

    let mut clients = Vec::new();
    let mut receivers = Vec::new();
    for client_id in 0..CLIENTS {
        // One region per client keeps their callback domains independent.
        let region = Region::new(&reactor);
        let client = Connection::connect(&region, port);
        let (message_tx, message_rx) = mpsc::channel::<Message>();
        client
            .start(
                move |message| {
                    let _ = message_tx.send(message);
                },
                || {},
            )
            .expect("client start");
        clients.push((client_id, client));
        receivers.push(message_rx);
    }

    // Payload carries the sender's identity so cross-talk is detectable.
    for (client_id, client) in &clients {
        for sequence in 0..MESSAGES_PER_CLIENT {
            let mut payload = vec![*client_id as u8];
            payload.extend_from_slice(&(sequence as u32).to_be_bytes());
            payload.extend_from_slice(&[*client_id as u8; 64]);
            client.send(payload).unwrap();
        }
    }

    for (client_id, receiver) in receivers.iter().enumerate() {
        let mut seen = HashSet::new();
        for _ in 0..MESSAGES_PER_CLIENT {
            let message = receiver.recv_timeout(TIMEOUT).expect("echoed message");
            assert_eq!(
                message[0] as usize, client_id,
                "echo reached the wrong client"
            );
            let mut sequence_bytes = [0u8; 4];
            sequence_bytes.copy_from_slice(&message[1..5]);
            let sequence = u32::from_be_bytes(sequence_bytes);
            assert!(
                seen.insert(sequence),
                "message {sequence} delivered more than once"
            );
        }
        assert!(
            receiver.try_recv().is_err(),
            "client {client_id} received extra traffic"
        );
    }

    reactor.stop();
}

#[test]
fn sends_from_many_threads_are_each_delivered_exactly_once() {
    const THREADS: usize = 8;
    const MESSAGES_PER_THREAD: usize = 50;

    let reactor = Reactor::new(4).unwrap();
    let region = Region::new(&reactor);

    let (accepted_tx, accepted_rx) = mpsc::channel();
    let listener = Listener::listen(
        &region,
        move |connection| {
            let _ = accepted_tx.send(connection);
        },
        0,
    )
    .unwrap();

    let client = Connection::connect(&region, listener.listening_port());
    client.start(|_message| {}, || {}).unwrap();

    let server_conn: Arc<Connection> = accepted_rx.recv_timeout(TIMEOUT).expect("accept");
    let (message_tx, message_rx) = mpsc::channel::<Message>();
    server_conn
        .start(
            move |message| {
                let _ = message_tx.send(message);
            },
            || {},
        )
        .unwrap();

    // Racing senders get a total order, not wall-clock order; the contract
    // is exactly-once delivery of every accepted send.
    let mut handles = Vec::new();
    for thread_id in 0..THREADS {
        let client = client.clone();
        handles.push(std::thread::spawn(move || {
            for sequence in 0..MESSAGES_PER_THREAD {
                let mut payload = vec![thread_id as u8];
                payload.extend_from_slice(&(sequence as u32).to_be_bytes());
                client.send(payload).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..THREADS * MESSAGES_PER_THREAD {
        let message = message_rx.recv_timeout(TIMEOUT).expect("message");
        let key = (message[0], {
            let mut sequence_bytes = [0u8; 4];
            sequence_bytes.copy_from_slice(&message[1..5]);
            u32::from_be_bytes(sequence_bytes)
        });
        assert!(seen.insert(key), "duplicate delivery of {key:?}");
    }
    assert_eq!(seen.len(), THREADS * MESSAGES_PER_THREAD);

    reactor.stop();
}

#[test]
fn per_thread_send_order_is_preserved_within_the_total_order() {
    const THREADS: usize = 4;
    const MESSAGES_PER_THREAD: usize = 100;

    let reactor = Reactor::new(4).unwrap();
    let region = Region::new(&reactor);

    let (accepted_tx, accepted_rx) = mpsc::channel();
    let listener = Listener::listen(
        &region,
        move |connection| {
            let _ = accepted_tx.send(connection);
        },
        0,
    )
    .unwrap();

    let client = Connection::connect(&region, listener.listening_port());
    client.start(|_message| {}, || {}).unwrap();

    let server_conn = accepted_rx.recv_timeout(TIMEOUT).expect("accept");
    let (message_tx, message_rx) = mpsc::channel::<Message>();
    server_conn
        .start(
            move |message| {
                let _ = message_tx.send(message);
            },
            || {},
        )
        .unwrap();

    let mut handles = Vec::new();
    for thread_id in 0..THREADS {
        let client = client.clone();
        handles.push(std::thread::spawn(move || {
            for sequence in 0..MESSAGES_PER_THREAD {
                let mut payload = vec![thread_id as u8];
                payload.extend_from_slice(&(sequence as u32).to_be_bytes());
                client.send(payload).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Interleaving across threads is unconstrained, but each thread's own
    // messages must arrive in the order it sent them.
    let mut last_seen = vec![None::<u32>; THREADS];
    for _ in 0..THREADS * MESSAGES_PER_THREAD {
        let message = message_rx.recv_timeout(TIMEOUT).expect("message");
        let thread_id = message[0] as usize;
        let mut sequence_bytes = [0u8; 4];
        sequence_bytes.copy_from_slice(&message[1..5]);
        let sequence = u32::from_be_bytes(sequence_bytes);
        if let Some(previous) = last_seen[thread_id] {
            assert!(
                sequence > previous,
                "thread {thread_id} messages reordered: {sequence} after {previous}"
            );
        }
        last_seen[thread_id] = Some(sequence);
    }

    reactor.stop();
}
