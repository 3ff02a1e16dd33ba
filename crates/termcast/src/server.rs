//! WebSocket broadcast server
//!
//! Owns the listener, one task per client, and the shared VT model. The
//! producer drives [`Server::broadcast`]; every connected client receives
//! the rendered markup for each snapshot, in the order snapshots arrive.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use termcast_vt::{markup, Screen, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use termcast_ws::{frame, handshake, Opcode};

/// Housekeeping cadence for the accept loop
const TICK: Duration = Duration::from_secs(1);

/// Listen backlog
const BACKLOG: u32 = 1024;

/// Full-redraw markers: an erase-display anywhere in the snapshot
const CLEAR_MARKERS: [&[u8]; 3] = [b"\x1b[2J", b"\x1b[0J", b"\x1b[1J"];

/// Full-redraw markers: a home-cursor sequence opening the snapshot
const HOME_PREFIXES: [&[u8]; 3] = [b"\x1b[1;1", b"\x1b[0;0", b"\x1b[;"];

/// The shared VT model: the grid plus the producer-reported terminal size
struct VtModel {
    screen: Screen,
    term_width: u16,
    term_height: u16,
}

/// One connected consumer. The read half lives in the client's task; the
/// write half lives here so broadcasts can reach it. `closing` tells the
/// task to tear down when the broadcast path drops the client, so the
/// socket is closed by its own task rather than by the peer noticing.
struct Client {
    id: Uuid,
    writer: OwnedWriteHalf,
    connected: Arc<AtomicBool>,
    closing: Arc<Notify>,
}

/// State shared between the server handle and its tasks
struct Shared {
    vt: Mutex<VtModel>,
    clients: Mutex<Vec<Client>>,
    running: AtomicBool,
    should_stop: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

/// The broadcast server
pub struct Server {
    port: u16,
    shared: Arc<Shared>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server that will listen on `port` (0 picks an ephemeral
    /// port, useful in tests).
    pub fn new(port: u16) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            port,
            shared: Arc::new(Shared {
                vt: Mutex::new(VtModel {
                    screen: Screen::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
                    term_width: DEFAULT_WIDTH,
                    term_height: DEFAULT_HEIGHT,
                }),
                clients: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                should_stop: AtomicBool::new(false),
                shutdown_tx,
            }),
            local_addr: std::sync::Mutex::new(None),
            accept_task: std::sync::Mutex::new(None),
        }
    }

    /// Bind the listener and launch the accept loop. A second call while
    /// the server is running is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.should_stop.store(false, Ordering::SeqCst);
        self.shared.shutdown_tx.send_replace(false);

        let listener = match bind_listener(self.port) {
            Ok(listener) => listener,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e).context("failed to bind listener");
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e).context("listener has no address");
            }
        };
        *self.local_addr.lock().unwrap() = Some(addr);
        info!("listening on {addr}");

        let shared = self.shared.clone();
        let handle = tokio::spawn(accept_loop(listener, shared));
        *self.accept_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Shut down: close the listener and every client socket, and wait for
    /// all tasks to drain. Safe to call repeatedly and from any task.
    pub async fn stop(&self) {
        if self.shared.should_stop.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.shutdown_tx.send(true);
        let handle = self.accept_task.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("accept task failed: {e}");
            }
        }
        self.shared.clients.lock().await.clear();
        self.shared.running.store(false, Ordering::SeqCst);
        info!("server stopped");
    }

    /// Whether the accept loop is live.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Address the listener bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Number of clients that completed the handshake and are still
    /// connected.
    pub async fn client_count(&self) -> usize {
        self.shared
            .clients
            .lock()
            .await
            .iter()
            .filter(|c| c.connected.load(Ordering::SeqCst))
            .count()
    }

    /// Record the producer's terminal size; the grid adopts it on the next
    /// broadcast.
    pub async fn set_terminal_size(&self, width: u16, height: u16) {
        let mut vt = self.shared.vt.lock().await;
        vt.term_width = width;
        vt.term_height = height;
    }

    /// Current grid dimensions.
    pub async fn terminal_size(&self) -> (u16, u16) {
        let vt = self.shared.vt.lock().await;
        (vt.screen.width(), vt.screen.height())
    }

    /// Producer entry point: apply one terminal snapshot and fan the
    /// rendered markup out to every connected client.
    ///
    /// The VT lock is held through the fan-out, so concurrent calls
    /// serialize and every client observes snapshots in the same order.
    pub async fn broadcast(&self, ansi: &[u8]) {
        let mut vt = self.shared.vt.lock().await;
        if vt.screen.width() != vt.term_width || vt.screen.height() != vt.term_height {
            let (w, h) = (vt.term_width, vt.term_height);
            match vt.screen.resize(w, h) {
                Ok(()) => debug!("grid resized to {w}x{h}"),
                Err(e) => warn!("ignoring resize: {e}"),
            }
        }
        if is_full_redraw(ansi) {
            vt.screen.clear();
        }
        vt.screen.process(ansi);
        let payload = markup::render(&vt.screen);
        self.send_text(&payload).await;
    }

    /// Fan a pre-rendered payload out to every connected client as one text
    /// frame. Clients whose send fails are dropped; disconnected records
    /// are purged along the way.
    pub async fn send_text(&self, payload: &str) {
        if !self.is_running() {
            return;
        }
        let encoded = frame::encode_text(payload);
        let mut clients = self.shared.clients.lock().await;
        let mut i = 0;
        while i < clients.len() {
            if !clients[i].connected.load(Ordering::SeqCst) {
                clients.remove(i);
                continue;
            }
            match clients[i].writer.write_all(&encoded).await {
                Ok(()) => i += 1,
                Err(e) => {
                    let client = clients.remove(i);
                    client.connected.store(false, Ordering::SeqCst);
                    client.closing.notify_one();
                    debug!(id = %client.id, "dropping client after send error: {e}");
                }
            }
        }
    }
}

/// Detect a snapshot that repaints the whole screen: an erase-display
/// sequence anywhere, or a home-cursor sequence right at the start.
fn is_full_redraw(ansi: &[u8]) -> bool {
    CLEAR_MARKERS.iter().any(|m| contains(ansi, m))
        || HOME_PREFIXES.iter().any(|p| ansi.starts_with(p))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Bind the any-address listener, preferring IPv6 (dual-stack where the OS
/// allows it) and falling back to IPv4.
fn bind_listener(port: u16) -> Result<TcpListener> {
    match bind_v6(port) {
        Ok(listener) => Ok(listener),
        Err(e) => {
            debug!("IPv6 bind failed ({e}), falling back to IPv4");
            let socket = TcpSocket::new_v4()?;
            socket.set_reuseaddr(true)?;
            socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
            Ok(socket.listen(BACKLOG)?)
        }
    }
}

fn bind_v6(port: u16) -> std::io::Result<TcpListener> {
    let socket = TcpSocket::new_v6()?;
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))?;
    socket.listen(BACKLOG)
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut sessions = JoinSet::new();
    let mut tick = time::interval(TICK);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("client connected from {peer}");
                    sessions.spawn(client_session(stream, shared.clone()));
                }
                Err(e) => {
                    if shared.should_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("accept failed: {e}");
                }
            },
            _ = shutdown_rx.changed() => break,
            _ = tick.tick() => {
                cleanup_clients(&shared).await;
                while sessions.try_join_next().is_some() {}
            }
        }
    }
    drop(listener);
    while sessions.join_next().await.is_some() {}
    shared.running.store(false, Ordering::SeqCst);
    debug!("accept loop drained");
}

/// Purge records whose client is gone.
async fn cleanup_clients(shared: &Shared) {
    let mut clients = shared.clients.lock().await;
    clients.retain(|c| c.connected.load(Ordering::SeqCst));
}

/// One client from accept to teardown: handshake on the raw stream, then
/// register the write half and watch the read half for control frames.
async fn client_session(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut buf = vec![0u8; 4096];
    let n = match stream.read(&mut buf).await {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let key = match handshake::extract_key(&buf[..n]) {
        Ok(key) => key,
        Err(e) => {
            warn!("handshake rejected: {e}");
            return;
        }
    };
    if let Err(e) = stream.write_all(handshake::response(&key).as_bytes()).await {
        warn!("failed to send handshake response: {e}");
        return;
    }

    let (reader, writer) = stream.into_split();
    let id = Uuid::new_v4();
    let connected = Arc::new(AtomicBool::new(true));
    let closing = Arc::new(Notify::new());
    shared.clients.lock().await.push(Client {
        id,
        writer,
        connected: connected.clone(),
        closing: closing.clone(),
    });
    debug!(%id, "client registered");

    read_loop(reader, id, &closing, &shared).await;
    connected.store(false, Ordering::SeqCst);
    info!(%id, "client disconnected");
}

async fn read_loop(mut reader: OwnedReadHalf, id: Uuid, closing: &Notify, shared: &Shared) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut inbox = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(%id, "client closed the connection");
                    return;
                }
                Ok(n) => {
                    inbox.extend_from_slice(&chunk[..n]);
                    if handle_frames(&mut inbox, id, shared).await {
                        return;
                    }
                }
                Err(e) => {
                    debug!(%id, "read error: {e}");
                    return;
                }
            },
            _ = closing.notified() => {
                debug!(%id, "dropped by the broadcast path");
                return;
            }
            _ = shutdown_rx.changed() => return,
        }
    }
}

/// Drain complete frames from `inbox`. Returns true when the session should
/// end.
async fn handle_frames(inbox: &mut BytesMut, id: Uuid, shared: &Shared) -> bool {
    loop {
        match frame::decode(inbox) {
            Ok(Some(f)) => {
                if !f.fin {
                    debug!(%id, "fragmented frame, dropping client");
                    return true;
                }
                match f.opcode {
                    Opcode::Close => {
                        debug!(%id, "close frame received");
                        return true;
                    }
                    Opcode::Ping => {
                        send_to(shared, id, &frame::encode_pong(&f.payload)).await;
                    }
                    Opcode::Text => {
                        if let Ok(text) = std::str::from_utf8(&f.payload) {
                            debug!(%id, "client message: {text}");
                        }
                    }
                    _ => {}
                }
            }
            Ok(None) => return false,
            Err(e) => {
                warn!(%id, "frame decode failed: {e}");
                return true;
            }
        }
    }
}

/// Write `payload` to one client by id, marking it disconnected on failure.
async fn send_to(shared: &Shared, id: Uuid, payload: &[u8]) {
    let mut clients = shared.clients.lock().await;
    if let Some(client) = clients.iter_mut().find(|c| c.id == id) {
        if let Err(e) = client.writer.write_all(payload).await {
            debug!(%id, "pong write failed: {e}");
            client.connected.store(false, Ordering::SeqCst);
            client.closing.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_redraw_markers() {
        assert!(is_full_redraw(b"x\x1b[2Jy"));
        assert!(is_full_redraw(b"\x1b[0J"));
        assert!(is_full_redraw(b"text\x1b[1Jmore"));
        assert!(is_full_redraw(b"\x1b[1;1Hframe"));
        assert!(is_full_redraw(b"\x1b[0;0Hframe"));
        assert!(is_full_redraw(b"\x1b[;Hframe"));
    }

    #[test]
    fn test_incremental_snapshots_not_flagged() {
        assert!(!is_full_redraw(b"plain text"));
        assert!(!is_full_redraw(b"\x1b[31mred\x1b[0m"));
        // Home-cursor only counts at the very start
        assert!(!is_full_redraw(b"x\x1b[1;1H"));
        // Erase-line is not a full redraw
        assert!(!is_full_redraw(b"\x1b[2K"));
    }
}
