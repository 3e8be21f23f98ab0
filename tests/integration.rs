use std::{fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::net::{tcp::{OwnedReadHalf, OwnedWriteHalf}, TcpStream};

use lineproto_rs::client::{run_client, session::receive_file, ClientOptions, ClientOutcome, FileReply, PromptHandle};
use lineproto_rs::codec::{FileHeader, FrameReader, FrameWriter};
use lineproto_rs::config::ServerConfig;
use lineproto_rs::server::{self, accept_connections, handler::run_session, ServerState};
use lineproto_rs::utils::ProtocolError;

async fn start_server(max_clients: usize, file_dir: &Path) -> (SocketAddr, Arc<ServerState>) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        max_clients,
        file_dir: file_dir.to_path_buf(),
        metrics_port: None,
    };
    let state = Arc::new(ServerState::new(config).unwrap());
    let listener = server::bind(&state).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(accept_connections(listener, state.clone()));
    (addr, state)
}

struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_raw(format!("{}\n", line).as_bytes()).await.unwrap();
    }

    async fn line(&mut self) -> Option<String> {
        self.reader.read_text_line().await.unwrap()
    }

    async fn ask(&mut self, line: &str) -> String {
        self.send(line).await;
        self.line().await.unwrap()
    }
}

async fn wait_for_active(state: &ServerState, expected: usize) {
    for _ in 0..100 {
        if state.registry.count_active() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("active sessions never reached {}", expected);
}

#[tokio::test]
async fn welcome_echo_and_goodbye() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(3, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.line().await.as_deref(), Some("Welcome Client01!"));
    assert_eq!(client.ask("hello server").await, "hello server ACK");

    client.send("").await;
    client.send("   ").await;
    assert_eq!(client.ask("still here").await, "still here ACK");

    assert_eq!(client.ask("EXIT").await, "Goodbye!");
    assert_eq!(client.line().await, None);

    wait_for_active(&state, 0).await;
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn status_lists_every_connection_ever_seen() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(3, dir.path()).await;

    let mut first = TestClient::connect(addr).await;
    first.line().await;
    assert_eq!(first.ask("exit").await, "Goodbye!");
    wait_for_active(&state, 0).await;

    let mut second = TestClient::connect(addr).await;
    assert_eq!(second.line().await.as_deref(), Some("Welcome Client02!"));
    let closed = second.ask("status").await;
    let active = second.line().await.unwrap();

    assert!(closed.starts_with("Client01: "));
    assert!(!closed.ends_with("Active"));
    assert!(active.starts_with("Client02: "));
    assert!(active.ends_with(" - Active"));
}

#[tokio::test]
async fn list_then_download_files() {
    let dir = tempfile::tempdir().unwrap();
    let big: Vec<u8> = (0..150_000u32).map(|i| (i * 7 % 256) as u8).collect();
    fs::write(dir.path().join("a.txt"), b"hello file").unwrap();
    fs::write(dir.path().join("b.bin"), &big).unwrap();
    fs::write(dir.path().join("empty.dat"), b"").unwrap();
    let (addr, _state) = start_server(3, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    client.line().await;

    assert_eq!(client.ask("list").await, "a.txt");
    assert_eq!(client.line().await.as_deref(), Some("b.bin"));
    assert_eq!(client.line().await.as_deref(), Some("empty.dat"));

    let header = FileHeader::parse(&client.ask("b.bin").await).unwrap();
    assert_eq!(header, FileHeader::new("b.bin", big.len() as u64));
    let payload = client.reader.read_exact(header.size as usize).await.unwrap();
    assert_eq!(payload, big);

    // Back in the normal state after a delivery.
    assert_eq!(client.ask("b.bin").await, "b.bin ACK");

    client.send("list").await;
    for _ in 0..3 {
        client.line().await;
    }
    let header = FileHeader::parse(&client.ask("empty.dat").await).unwrap();
    assert_eq!(header.size, 0);
    assert_eq!(client.ask("after").await, "after ACK");
}

#[tokio::test]
async fn missing_file_reply_then_echo() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _state) = start_server(3, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    client.line().await;
    assert_eq!(client.ask("list").await, "No files found in server repository.");
    assert_eq!(
        client.ask("ghost.txt").await,
        "File 'ghost.txt' does not exist on the server."
    );
    assert_eq!(client.ask("ghost.txt").await, "ghost.txt ACK");
}

#[tokio::test]
async fn traversal_is_reduced_to_base_name() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("server_files");
    fs::write(outer.path().join("secret"), b"do not serve").unwrap();
    let (addr, _state) = start_server(3, &root).await;
    fs::write(root.join("public.txt"), b"ok").unwrap();

    let mut client = TestClient::connect(addr).await;
    client.line().await;
    client.ask("list").await;
    assert_eq!(
        client.ask("../secret").await,
        "File '../secret' does not exist on the server."
    );

    client.ask("list").await;
    let header = FileHeader::parse(&client.ask("../server_files/public.txt").await).unwrap();
    assert_eq!(header, FileHeader::new("public.txt", 2));
}

#[tokio::test]
async fn full_server_rejects_without_registering() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(1, dir.path()).await;

    let mut first = TestClient::connect(addr).await;
    assert_eq!(first.line().await.as_deref(), Some("Welcome Client01!"));

    let mut refused = TestClient::connect(addr).await;
    assert_eq!(refused.line().await.as_deref(), Some("Server full, try again later."));
    assert_eq!(refused.line().await, None);
    assert_eq!(state.registry.len(), 1);

    assert_eq!(first.ask("exit").await, "Goodbye!");
    wait_for_active(&state, 0).await;

    let mut third = TestClient::connect(addr).await;
    assert_eq!(third.line().await.as_deref(), Some("Welcome Client02!"));
    assert_eq!(state.registry.len(), 2);
}

#[tokio::test]
async fn peer_close_marks_record_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(2, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    client.line().await;
    wait_for_active(&state, 1).await;
    drop(client);

    wait_for_active(&state, 0).await;
    let snapshot = state.registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].disconnected_at.is_some());
}

#[tokio::test]
async fn commands_after_exit_are_not_processed() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(3, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    client.line().await;
    client.writer.write_raw(b"exit\nhello\nstatus\n").await.unwrap();

    assert_eq!(client.line().await.as_deref(), Some("Goodbye!"));
    assert_eq!(client.line().await, None);
    wait_for_active(&state, 0).await;
    assert_eq!(state.metrics.commands_received.get(), 1);
}

#[tokio::test]
async fn unterminated_command_at_close_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(3, dir.path()).await;

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.line().await.as_deref(), Some("Welcome Client01!"));
    client.writer.write_raw(b"hello").await.unwrap();
    client.writer.shutdown().await.unwrap();

    assert_eq!(client.line().await, None);
    wait_for_active(&state, 0).await;
    assert_eq!(state.metrics.commands_received.get(), 0);
}

#[tokio::test]
async fn file_shrinking_mid_delivery_ends_the_session() {
    const ANNOUNCED: u64 = 1 << 20;
    const TRUNCATED: u64 = 8192;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    fs::write(&path, vec![0x5Au8; ANNOUNCED as usize]).unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        max_clients: 3,
        file_dir: dir.path().to_path_buf(),
        metrics_port: None,
    };
    let state = ServerState::new(config).unwrap();

    // A small pipe keeps the server blocked inside the first chunk until we read.
    let (client_side, server_side) = tokio::io::duplex(64);
    let session = tokio::spawn(async move {
        let (r, w) = tokio::io::split(server_side);
        let mut reader = FrameReader::new(r);
        let mut writer = FrameWriter::new(w);
        run_session(&mut reader, &mut writer, "Client01", &state).await
    });

    let (r, w) = tokio::io::split(client_side);
    let mut reader = FrameReader::new(r);
    let mut writer = FrameWriter::new(w);
    assert_eq!(reader.read_text_line().await.unwrap().as_deref(), Some("Welcome Client01!"));
    writer.write_raw(b"list\n").await.unwrap();
    assert_eq!(reader.read_text_line().await.unwrap().as_deref(), Some("big.bin"));
    writer.write_raw(b"big.bin\n").await.unwrap();

    let header = FileHeader::parse(&reader.read_text_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(header, FileHeader::new("big.bin", ANNOUNCED));
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(TRUNCATED)
        .unwrap();

    let mut received: Vec<u8> = Vec::new();
    while let Some(chunk) = reader.read_chunk().await.unwrap() {
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received.len() as u64, TRUNCATED);
    assert!(received.iter().all(|&b| b == 0x5A));

    match session.await.unwrap() {
        Err(ProtocolError::ShortPayload { expected, sent, .. }) => {
            assert_eq!(expected, ANNOUNCED);
            assert_eq!(sent, TRUNCATED);
        }
        other => panic!("unexpected session result: {:?}", other),
    }
}

#[tokio::test]
async fn labelled_download_saves_the_payload() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = FrameReader::new(&b"FILE notes.txt 5\nhello"[..]);

    let reply = receive_file(&mut reader, "notes.txt", dir.path(), "[client 2] ").await.unwrap();
    let expected = dir.path().join("notes.txt");
    assert_eq!(reply, FileReply::Saved { path: expected.clone(), bytes: 5 });
    assert_eq!(fs::read(expected).unwrap(), b"hello");
}

#[tokio::test]
async fn interactive_client_downloads_a_listed_file() {
    let server_dir = tempfile::tempdir().unwrap();
    let download_dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..20_000u32).map(|i| (i % 13) as u8).collect();
    fs::write(server_dir.path().join("report final.pdf"), &content).unwrap();
    let (addr, state) = start_server(3, server_dir.path()).await;

    let opts = ClientOptions {
        host: "127.0.0.1".into(),
        port: addr.port(),
        download_dir: download_dir.path().to_path_buf(),
    };
    let prompt = PromptHandle::scripted(
        ["hi", "", "list", "report final.pdf", "status", "exit"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    let outcome = run_client(&opts, prompt, "").await.unwrap();
    assert_eq!(outcome, ClientOutcome::Exited);
    assert_eq!(fs::read(download_dir.path().join("report final.pdf")).unwrap(), content);

    wait_for_active(&state, 0).await;
}

#[tokio::test]
async fn interactive_client_stops_when_input_closes() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_server(3, dir.path()).await;

    let opts = ClientOptions {
        host: "127.0.0.1".into(),
        port: addr.port(),
        download_dir: dir.path().to_path_buf(),
    };
    let outcome = run_client(&opts, PromptHandle::scripted(vec!["ping".into()]), "")
        .await
        .unwrap();
    assert_eq!(outcome, ClientOutcome::InputClosed);
    wait_for_active(&state, 0).await;
}

#[tokio::test]
async fn interactive_client_reports_refused_and_full() {
    let dir = tempfile::tempdir().unwrap();

    let port = {
        let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        sock.local_addr().unwrap().port()
    };
    let opts = ClientOptions {
        host: "127.0.0.1".into(),
        port,
        download_dir: dir.path().to_path_buf(),
    };
    let outcome = run_client(&opts, PromptHandle::scripted(Vec::new()), "").await.unwrap();
    assert_eq!(outcome, ClientOutcome::Refused);

    let (addr, _state) = start_server(1, dir.path()).await;
    let mut holder = TestClient::connect(addr).await;
    holder.line().await;

    let opts = ClientOptions { port: addr.port(), ..opts };
    let outcome = run_client(&opts, PromptHandle::scripted(Vec::new()), "").await.unwrap();
    assert_eq!(outcome, ClientOutcome::Rejected);
}
