use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use tiny_http::{Request, Server};

use crate::gateway::GatewayState;

const HTTP_WORKER_FACTOR: usize = 4;
const HTTP_WORKER_MIN: usize = 8;
const HTTP_STREAM_WORKER_FACTOR: usize = 1;
const HTTP_STREAM_WORKER_MIN: usize = 2;
const HTTP_QUEUE_FACTOR: usize = 4;
const HTTP_QUEUE_MIN: usize = 32;
const HTTP_STREAM_QUEUE_FACTOR: usize = 2;
const HTTP_STREAM_QUEUE_MIN: usize = 16;
const ENV_HTTP_WORKER_FACTOR: &str = "FREESCAN_HTTP_WORKER_FACTOR";
const ENV_HTTP_WORKER_MIN: &str = "FREESCAN_HTTP_WORKER_MIN";
const ENV_HTTP_STREAM_WORKER_FACTOR: &str = "FREESCAN_HTTP_STREAM_WORKER_FACTOR";
const ENV_HTTP_STREAM_WORKER_MIN: &str = "FREESCAN_HTTP_STREAM_WORKER_MIN";
const ENV_HTTP_QUEUE_FACTOR: &str = "FREESCAN_HTTP_QUEUE_FACTOR";
const ENV_HTTP_QUEUE_MIN: &str = "FREESCAN_HTTP_QUEUE_MIN";
const ENV_HTTP_STREAM_QUEUE_FACTOR: &str = "FREESCAN_HTTP_STREAM_QUEUE_FACTOR";
const ENV_HTTP_STREAM_QUEUE_MIN: &str = "FREESCAN_HTTP_STREAM_QUEUE_MIN";

fn env_usize_or(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn http_worker_count() -> usize {
    // Failover requests can hold a worker through several upstream attempts
    // plus backoff; a fixed worker ceiling avoids unbounded thread spawn.
    let cpus = thread::available_parallelism().map(|value| value.get()).unwrap_or(4);
    let factor = env_usize_or(ENV_HTTP_WORKER_FACTOR, HTTP_WORKER_FACTOR).max(1);
    let min = env_usize_or(ENV_HTTP_WORKER_MIN, HTTP_WORKER_MIN).max(1);
    (cpus.saturating_mul(factor)).max(min)
}

fn http_stream_worker_count() -> usize {
    let cpus = thread::available_parallelism().map(|value| value.get()).unwrap_or(4);
    let factor = env_usize_or(ENV_HTTP_STREAM_WORKER_FACTOR, HTTP_STREAM_WORKER_FACTOR).max(1);
    let min = env_usize_or(ENV_HTTP_STREAM_WORKER_MIN, HTTP_STREAM_WORKER_MIN).max(1);
    (cpus.saturating_mul(factor)).max(min)
}

fn http_queue_size(worker_count: usize) -> usize {
    // Bounded queues put backpressure on the acceptor instead of piling
    // requests up in memory under peak load.
    let factor = env_usize_or(ENV_HTTP_QUEUE_FACTOR, HTTP_QUEUE_FACTOR).max(1);
    let min = env_usize_or(ENV_HTTP_QUEUE_MIN, HTTP_QUEUE_MIN).max(1);
    worker_count.saturating_mul(factor).max(min)
}

fn http_stream_queue_size(worker_count: usize) -> usize {
    let factor = env_usize_or(ENV_HTTP_STREAM_QUEUE_FACTOR, HTTP_STREAM_QUEUE_FACTOR).max(1);
    let min = env_usize_or(ENV_HTTP_STREAM_QUEUE_MIN, HTTP_STREAM_QUEUE_MIN).max(1);
    worker_count.saturating_mul(factor).max(min)
}

fn spawn_request_workers(worker_count: usize, rx: Receiver<Request>, state: Arc<GatewayState>) {
    for _ in 0..worker_count {
        let worker_rx = rx.clone();
        let worker_state = Arc::clone(&state);
        let _ = thread::spawn(move || {
            while let Ok(request) = worker_rx.recv() {
                crate::gateway::handle_gateway_request(request, &worker_state);
            }
        });
    }
}

fn request_accept_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Accept"))
        .map(|header| header.value.as_str().to_ascii_lowercase())
}

/// Long-lived SSE responses occupy their worker for the whole stream; they
/// get a separate pool so they cannot starve plain requests.
fn request_is_stream_like(request: &Request) -> bool {
    request_accept_header(request).is_some_and(|value| value.contains("text/event-stream"))
}

fn enqueue_request(
    request: Request,
    normal_tx: &Sender<Request>,
    stream_tx: &Sender<Request>,
) -> Result<(), ()> {
    if request_is_stream_like(&request) {
        match stream_tx.send(request) {
            Ok(()) => Ok(()),
            Err(err) => normal_tx.send(err.into_inner()).map_err(|_| ()),
        }
    } else {
        match normal_tx.send(request) {
            Ok(()) => Ok(()),
            Err(err) => stream_tx.send(err.into_inner()).map_err(|_| ()),
        }
    }
}

fn run_acceptor(server: Server, state: Arc<GatewayState>) {
    let worker_count = http_worker_count();
    let stream_worker_count = http_stream_worker_count();
    let (normal_tx, normal_rx) = bounded::<Request>(http_queue_size(worker_count));
    let (stream_tx, stream_rx) = bounded::<Request>(http_stream_queue_size(stream_worker_count));
    spawn_request_workers(worker_count, normal_rx, Arc::clone(&state));
    spawn_request_workers(stream_worker_count, stream_rx, state);

    for request in server.incoming_requests() {
        if crate::shutdown_requested() || request.url() == "/__shutdown" {
            let _ = request.respond(tiny_http::Response::from_string("shutdown"));
            break;
        }
        if enqueue_request(request, &normal_tx, &stream_tx).is_err() {
            break;
        }
    }
}

pub(crate) struct BoundServer {
    pub(crate) addr: String,
    server: Server,
}

pub(crate) fn bind(addr: &str) -> io::Result<BoundServer> {
    let server = Server::http(addr).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let addr = server
        .server_addr()
        .to_ip()
        .map(|address| address.to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "server addr missing"))?;
    Ok(BoundServer { addr, server })
}

/// Runs the accept loop on the calling thread until shutdown.
pub(crate) fn run(bound: BoundServer, state: Arc<GatewayState>) {
    run_acceptor(bound.server, state);
}

/// Runs the accept loop on a background thread; used by tests and embedders.
pub(crate) fn run_detached(bound: BoundServer, state: Arc<GatewayState>) -> thread::JoinHandle<()> {
    thread::spawn(move || run_acceptor(bound.server, state))
}
