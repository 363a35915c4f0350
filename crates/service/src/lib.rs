use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub mod catalog;
mod gateway;
mod http;
mod lock_utils;

pub use gateway::{GatewayState, HealthTracker, ProxyOptions, DEFAULT_ERROR_THRESHOLD};

pub const DEFAULT_PORT: u16 = 8080;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub struct ServerHandle {
    pub addr: String,
    join: thread::JoinHandle<()>,
}

impl ServerHandle {
    pub fn join(self) {
        let _ = self.join.join();
    }
}

/// Builds the gateway (initial catalog load included) ready to serve.
pub fn bootstrap_gateway(options: ProxyOptions) -> Result<Arc<GatewayState>, String> {
    GatewayState::bootstrap(options).map(Arc::new)
}

/// Binds and serves on the calling thread until shutdown is requested.
/// Bind failures surface here so the caller can exit non-zero.
pub fn start_server(addr: &str, state: Arc<GatewayState>) -> io::Result<()> {
    let bound = http::server::bind(addr)?;
    catalog::cache::spawn_refresh_scheduler(Arc::clone(&state));
    http::server::run(bound, state);
    Ok(())
}

/// Binds and serves on a background thread, returning the resolved address;
/// used by the integration tests (bind to port 0, read the real port back).
pub fn start_background_server(addr: &str, state: Arc<GatewayState>) -> io::Result<ServerHandle> {
    let bound = http::server::bind(addr)?;
    let resolved_addr = bound.addr.clone();
    catalog::cache::spawn_refresh_scheduler(Arc::clone(&state));
    let join = http::server::run_detached(bound, state);
    Ok(ServerHandle {
        addr: resolved_addr,
        join,
    })
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub fn clear_shutdown_flag() {
    SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
}

/// Flags shutdown and wakes the listener. Best-effort wakeups for both
/// loopback families so whichever listener is active exits.
pub fn request_shutdown(addr: &str) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    let _ = send_shutdown_request(addr);
    let addr_trimmed = addr.trim();
    if let Some(port) = addr_trimmed.strip_prefix("localhost:") {
        let _ = send_shutdown_request(&format!("127.0.0.1:{port}"));
        let _ = send_shutdown_request(&format!("[::1]:{port}"));
    }
}

fn send_shutdown_request(addr: &str) -> io::Result<()> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Ok(());
    }
    let addr = addr.strip_prefix("http://").unwrap_or(addr);
    let addr = addr.split('/').next().unwrap_or(addr);
    let mut stream = TcpStream::connect(addr)?;
    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let request = format!("GET /__shutdown HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    Ok(())
}
