//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Session lifecycle, reaper and server tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use zard_codec::{Message, Protocol};
use zard_service::{
    Connection, Serializer, ServerConfig, ServiceError, Session, SessionHandler, SessionId,
    SessionReaper, SessionRegistry, SessionServer, SessionStatus, StreamTransport, Transport,
};

fn stream_session(id: u64) -> (Arc<Session<()>>, tokio::io::DuplexStream) {
    let (local, peer) = duplex(1024);
    let (reader, writer) = tokio::io::split(local);
    let connection = Connection::new(Handle::current())
        .with_protocol(Protocol::Line)
        .with_serializer(Serializer::owned(&Handle::current()));
    let transport = StreamTransport::new(connection, reader, writer);
    (Session::new(SessionId::new(id), transport), peer)
}

/// Records every event it sees
#[derive(Default)]
struct Recorder {
    accepted: AtomicUsize,
    messages: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl SessionHandler<()> for Recorder {
    fn on_accept(&self, _session: &Arc<Session<()>>) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(&self, session: &Arc<Session<()>>, message: &Message) {
        self.messages
            .lock()
            .unwrap()
            .push(message.contents_lossy().into_owned());
        session.send_reply(message.id(), message.contents().clone());
    }

    fn on_error(&self, _session: &Arc<Session<()>>, error: &ServiceError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_receive_error_disconnects_session() {
    let (session, mut peer) = stream_session(1);
    let recorder = Arc::new(Recorder::default());
    session.set_handler(recorder.clone());
    session.set_status(SessionStatus::Connected);
    session.receive().unwrap();

    peer.write_all(b"who\n").await.unwrap();
    let mut echo = [0u8; 4];
    timeout(Duration::from_secs(5), peer.read_exact(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo, b"who\n");

    drop(peer);
    wait_until(|| session.status() == SessionStatus::Disconnected).await;
    assert_eq!(*recorder.messages.lock().unwrap(), vec!["who".to_string()]);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_error_makes_session_reapable() {
    let (session, peer) = stream_session(1);
    let recorder = Arc::new(Recorder::default());
    session.set_handler(recorder.clone());
    session.set_status(SessionStatus::Connected);

    drop(peer);
    session.send("anyone there?");

    wait_until(|| session.status() == SessionStatus::Reapable).await;
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_error_is_reported_once() {
    let (session, peer) = stream_session(1);
    let recorder = Arc::new(Recorder::default());
    session.set_handler(recorder.clone());
    session.set_status(SessionStatus::Connected);
    session.receive().unwrap();

    drop(peer);
    session.send("first");
    session.send("second");

    // Both the failed writes and the aborted read have completed
    wait_until(|| session.status() == SessionStatus::Reapable).await;
    wait_until(|| !session.transport().receiver().is_receiving()).await;
    wait_until(|| session.transport().sender().queued() == 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_sweeps_on_interval() {
    let registry = Arc::new(SessionRegistry::new());
    let (live, _live_peer) = stream_session(1);
    let (dead, _dead_peer) = stream_session(2);
    registry.insert(live.clone());
    registry.insert(dead.clone());
    registry.login(&dead, "ghost").unwrap();

    let shutdown = CancellationToken::new();
    let reaper = SessionReaper::new(registry.clone(), Duration::from_secs(30))
        .start(&Handle::current(), shutdown.clone());

    dead.set_status(SessionStatus::Reapable);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(registry.len(), 2, "no sweep before the interval");

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(registry.ids(), vec![SessionId::new(1)]);
    assert!(registry.find_by_identity("ghost").is_none());

    shutdown.cancel();
    reaper.await.unwrap();
    assert!(registry.contains(live.id()));
}

#[tokio::test]
#[traced_test]
async fn test_server_greets_echoes_and_reaps() {
    let recorder = Arc::new(Recorder::default());
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_greeting("Zard\n1")
        .with_protocol(Protocol::Telnet)
        .with_reap_interval(Duration::from_millis(50));
    let server = SessionServer::<()>::bind(config, recorder.clone()).await.unwrap();
    server.start().unwrap();
    assert!(server.start().unwrap_err().is_busy());

    let mut client = TcpStream::connect(server.bind_address()).await.unwrap();
    let mut greeting = [0u8; 8];
    timeout(Duration::from_secs(5), client.read_exact(&mut greeting))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&greeting, b"Zard\n1\r\n");
    assert_eq!(recorder.accepted.load(Ordering::SeqCst), 1);

    client.write_all(b"hello\r\n").await.unwrap();
    let mut echo = [0u8; 7];
    timeout(Duration::from_secs(5), client.read_exact(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo, b"hello\r\n");
    assert_eq!(server.registry().len(), 1);

    drop(client);
    let registry = server.registry().clone();
    wait_until(|| registry.is_empty()).await;
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);

    server.shutdown();
    assert!(!server.is_running());
    assert!(server.shutdown_token().is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_accepts_many_sessions() {
    let recorder = Arc::new(Recorder::default());
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_protocol(Protocol::Line);
    let server = SessionServer::<()>::bind(config, recorder.clone()).await.unwrap();
    server.start().unwrap();
    let address = server.bind_address();

    let clients = futures::future::join_all((0..16).map(|index| async move {
        let mut client = TcpStream::connect(address).await.unwrap();
        let line = format!("client {}\n", index);
        client.write_all(line.as_bytes()).await.unwrap();
        let mut echo = vec![0u8; line.len()];
        client.read_exact(&mut echo).await.unwrap();
        assert_eq!(echo, line.as_bytes());
        client
    }))
    .await;

    assert_eq!(recorder.accepted.load(Ordering::SeqCst), 16);
    assert_eq!(server.registry().len(), 16);

    server.shutdown();
    drop(clients);
}

#[tokio::test]
async fn test_shutdown_closes_live_sessions() {
    let recorder = Arc::new(Recorder::default());
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_protocol(Protocol::Line);
    let server = SessionServer::<()>::bind(config, recorder.clone()).await.unwrap();
    let (tx, mut done) = mpsc::channel(1);
    {
        let server = server.clone();
        tokio::spawn(async move {
            let _ = tx.send(server.run().await).await;
        });
    }

    let mut client = TcpStream::connect(server.bind_address()).await.unwrap();
    wait_until(|| recorder.accepted.load(Ordering::SeqCst) == 1).await;

    server.shutdown();
    let result = timeout(Duration::from_secs(5), done.recv()).await.unwrap();
    assert!(matches!(result, Some(Ok(()))));

    // The session's pending read was cancelled, so the client sees EOF
    let mut buffer = [0u8; 4];
    let read = timeout(Duration::from_secs(5), client.read(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}
