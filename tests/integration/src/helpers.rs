//! Test helpers: fake witnesses, tagged store backends, and an in-process
//! proxy wired the same way `vigil-proxy` wires itself.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use vigil_proxy::{Locator, PrimaryView, Relay, WitnessEndpoint, Watcher};

pub const TIMEOUT: Duration = Duration::from_secs(3);
pub const POLL: Duration = Duration::from_millis(50);
pub const DIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// RESP reply naming `addr` as the primary.
pub fn primary_reply(addr: SocketAddr) -> Vec<u8> {
    let host = addr.ip().to_string();
    let port = addr.port().to_string();
    format!(
        "*2\r\n${}\r\n{host}\r\n${}\r\n{port}\r\n",
        host.len(),
        port.len()
    )
    .into_bytes()
}

/// An address nothing listens on: bound, then released.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A witness whose answer can be changed while it runs.
///
/// Acknowledges each `AUTH` line with `+OK` and answers the discovery
/// query with the current reply, then closes.
pub struct FakeWitness {
    pub addr: SocketAddr,
    reply: Arc<Mutex<Vec<u8>>>,
    queries: Arc<AtomicUsize>,
    auths: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeWitness {
    pub async fn start(reply: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reply = Arc::new(Mutex::new(reply));
        let queries = Arc::new(AtomicUsize::new(0));
        let auths = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let reply = Arc::clone(&reply);
            let queries = Arc::clone(&queries);
            let auths = Arc::clone(&auths);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let reply = Arc::clone(&reply);
                    let queries = Arc::clone(&queries);
                    let auths = Arc::clone(&auths);
                    tokio::spawn(serve_witness(stream, reply, queries, auths));
                }
            })
        };

        Self {
            addr,
            reply,
            queries,
            auths,
            task,
        }
    }

    /// Starts a witness reporting `primary`.
    pub async fn reporting(primary: SocketAddr) -> Self {
        Self::start(primary_reply(primary)).await
    }

    pub fn report(&self, primary: SocketAddr) {
        self.set_reply(primary_reply(primary));
    }

    pub fn set_reply(&self, reply: impl Into<Vec<u8>>) {
        *self.reply.lock().unwrap() = reply.into();
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// AUTH lines received so far, without the command name.
    pub fn auths(&self) -> Vec<String> {
        self.auths.lock().unwrap().clone()
    }

    pub fn endpoint(&self) -> WitnessEndpoint {
        self.addr.to_string().parse().unwrap()
    }
}

impl Drop for FakeWitness {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_witness(
    mut stream: TcpStream,
    reply: Arc<Mutex<Vec<u8>>>,
    queries: Arc<AtomicUsize>,
    auths: Arc<Mutex<Vec<String>>>,
) {
    let mut pending = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if let Some(pass) = line.strip_prefix("AUTH ") {
                auths.lock().unwrap().push(pass.to_string());
                if stream.write_all(b"+OK\r\n").await.is_err() {
                    return;
                }
            } else {
                queries.fetch_add(1, Ordering::SeqCst);
                let reply = reply.lock().unwrap().clone();
                let _ = stream.write_all(&reply).await;
                return;
            }
        }
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => pending.extend_from_slice(&buf[..n]),
        }
    }
}

/// A store node stand-in: echoes every read back prefixed with its tag.
pub struct Backend {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Backend {
    pub async fn start(tag: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        let n = match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let mut out = format!("{tag}:").into_bytes();
                        out.extend_from_slice(&buf[..n]);
                        if stream.write_all(&out).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        Self { addr, task }
    }

    /// Stops accepting. Established connections are left alone.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A proxy running in-process: watcher plus relay on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub view: PrimaryView,
    tasks: Vec<JoinHandle<()>>,
}

impl TestProxy {
    pub async fn start(witnesses: &[&FakeWitness]) -> Self {
        Self::start_with(witnesses, None).await
    }

    pub async fn start_with(witnesses: &[&FakeWitness], credential: Option<&str>) -> Self {
        let endpoints = witnesses.iter().map(|w| w.endpoint()).collect();
        let locator = Locator::new(
            endpoints,
            "mymaster",
            credential.map(str::to_string),
            DIAL_TIMEOUT,
        )
        .with_debug(true);
        let (watcher, view) = Watcher::new(locator, POLL, POLL * 2);

        let relay = Relay::bind("127.0.0.1:0".parse().unwrap(), view.clone(), DIAL_TIMEOUT)
            .await
            .unwrap();
        let addr = relay.local_addr().unwrap();

        let tasks = vec![tokio::spawn(watcher.run()), tokio::spawn(relay.run())];
        Self { addr, view, tasks }
    }

    /// Waits until the proxy has published `primary`.
    pub async fn wait_for_primary(&self, primary: SocketAddr) -> u64 {
        let mut view = self.view.clone();
        let snapshot = tokio::time::timeout(TIMEOUT, view.wait_for(|s| s.primary == Some(primary)))
            .await
            .unwrap_or_else(|_| panic!("proxy never switched to {primary}"))
            .expect("watcher is running");
        snapshot.generation
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A raw TCP client talking to a tagged backend through the proxy.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {addr}: {e}"));
        Self { stream }
    }

    /// Sends `msg` and returns whatever the backend answered.
    pub async fn send(&mut self, msg: &str) -> String {
        self.stream.write_all(msg.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; 1024];
        let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("reply in time")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    /// Asserts the proxy has closed this connection (EOF or reset).
    pub async fn assert_closed(&mut self) {
        let mut buf = [0u8; 64];
        let result = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("connection should be closed promptly");
        assert!(
            matches!(result, Ok(0) | Err(_)),
            "expected closed connection, got {result:?}"
        );
    }
}

/// Locates a workspace binary next to the test executable, if it was
/// built.
pub fn workspace_binary(name: &str) -> Option<PathBuf> {
    let mut path = std::env::current_exe().ok()?;
    // test binary is in target/<profile>/deps/
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(name);
    path.exists().then_some(path)
}
