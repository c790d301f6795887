//! Tests for the runtime endpoint search
//!
//! Sockets are real Unix sockets in a temporary directory. Most tests use a
//! recording dialer so the ordering rules can be checked without a CRI server;
//! the `grpc_dialer` tests dial for real.

use super::*;
use crate::context::CancelSignal;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn test_ctx() -> ExecContext {
    ExecContext::new(StructuredLogger::new("ns1", "pod1"), CancelSignal::never())
}

fn uri(path: &Path) -> String {
    format!("unix://{}", path.display())
}

/// Dialer that succeeds for every socket and records what it dialed
#[derive(Clone, Default)]
struct RecordingDialer {
    dialed: Arc<Mutex<Vec<String>>>,
    refuse: Vec<PathBuf>,
}

#[async_trait]
impl Dialer for RecordingDialer {
    type Connection = String;

    async fn dial(&self, endpoint: &str, socket: &Path) -> Result<String, InjectError> {
        self.dialed.lock().unwrap().push(endpoint.to_string());
        if self.refuse.iter().any(|p| p == socket) {
            return Err(InjectError::Connect {
                endpoint: endpoint.to_string(),
                source: "connection refused".into(),
            });
        }
        Ok(endpoint.to_string())
    }
}

/// Candidate URIs that can never be used
struct Unusable {
    _dir: TempDir,
    candidates: Vec<String>,
}

fn unusable_candidates() -> Unusable {
    let dir = TempDir::new().unwrap();
    let regular = dir.path().join("regular.sock");
    std::fs::write(&regular, b"stale").unwrap();
    let candidates = vec![
        String::new(),
        uri(&dir.path().join("missing.sock")),
        uri(&regular),
        "tcp://127.0.0.1:10010".to_string(),
        uri(dir.path()),
    ];
    Unusable {
        _dir: dir,
        candidates,
    }
}

#[tokio::test]
async fn test_single_socket_found_at_any_position() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("runtime.sock");
    let _listener = UnixListener::bind(&socket).unwrap();
    let good = uri(&socket);

    let bad = unusable_candidates();
    for position in 0..=bad.candidates.len() {
        let mut candidates = bad.candidates.clone();
        candidates.insert(position, good.clone());

        let dialer = RecordingDialer::default();
        let connector = Connector::new(dialer.clone());
        let conn = connector
            .connect(&test_ctx(), &RuntimeEndpoint::with_candidates(candidates))
            .await
            .unwrap();

        assert_eq!(conn, good, "position {}", position);
        assert_eq!(*dialer.dialed.lock().unwrap(), vec![good.clone()]);
    }
}

#[tokio::test]
async fn test_no_usable_candidate_is_runtime_not_found() {
    let bad = unusable_candidates();
    let dialer = RecordingDialer::default();
    let connector = Connector::new(dialer.clone());

    let res = connector
        .connect(&test_ctx(), &RuntimeEndpoint::with_candidates(bad.candidates.clone()))
        .await;

    assert!(matches!(res, Err(InjectError::RuntimeNotFound)));
    assert!(dialer.dialed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_refused_socket_falls_through_to_next() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("crio.sock");
    let second = dir.path().join("containerd.sock");
    let _l1 = UnixListener::bind(&first).unwrap();
    let _l2 = UnixListener::bind(&second).unwrap();

    let dialer = RecordingDialer {
        refuse: vec![first.clone()],
        ..Default::default()
    };
    let connector = Connector::new(dialer.clone());
    let conn = connector
        .connect(
            &test_ctx(),
            &RuntimeEndpoint::with_candidates([uri(&first), uri(&second)]),
        )
        .await
        .unwrap();

    assert_eq!(conn, uri(&second));
    assert_eq!(
        *dialer.dialed.lock().unwrap(),
        vec![uri(&first), uri(&second)]
    );
}

#[tokio::test]
async fn test_first_success_short_circuits() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.sock");
    let second = dir.path().join("b.sock");
    let _l1 = UnixListener::bind(&first).unwrap();
    let _l2 = UnixListener::bind(&second).unwrap();

    let dialer = RecordingDialer::default();
    let connector = Connector::new(dialer.clone());
    let conn = connector
        .connect(
            &test_ctx(),
            &RuntimeEndpoint::with_candidates([uri(&first), uri(&second)]),
        )
        .await
        .unwrap();

    assert_eq!(conn, uri(&first));
    assert_eq!(dialer.dialed.lock().unwrap().len(), 1);
}

/// Dialer that never completes
struct HangingDialer;

#[async_trait]
impl Dialer for HangingDialer {
    type Connection = ();

    async fn dial(&self, _endpoint: &str, _socket: &Path) -> Result<(), InjectError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_stops_the_search() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("runtime.sock");
    let _listener = UnixListener::bind(&socket).unwrap();

    let (handle, signal) = CancelSignal::new();
    let ctx = ExecContext::new(StructuredLogger::new("ns1", "pod1"), signal);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let res = Connector::new(HangingDialer)
        .connect(&ctx, &RuntimeEndpoint::with_candidates([uri(&socket)]))
        .await;

    assert!(matches!(res, Err(InjectError::Cancelled { stage: "connect" })));
}

mod grpc_dialer {
    use super::*;

    /// Accepts connections and keeps them open without speaking
    fn hold_connections(path: &Path) -> tokio::task::JoinHandle<()> {
        let listener = tokio::net::UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        })
    }

    #[tokio::test]
    async fn test_connects_to_third_candidate() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("containerd.sock");
        let server = hold_connections(&socket);

        let endpoint = RuntimeEndpoint::with_candidates(["", "", uri(&socket).as_str()]);
        let conn = Connector::new(GrpcDialer::new(Duration::from_secs(10)))
            .connect(&test_ctx(), &endpoint)
            .await
            .unwrap();

        assert_eq!(conn.endpoint(), uri(&socket));
        conn.close();
        server.abort();
    }

    #[tokio::test]
    async fn test_stale_socket_is_skipped() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("crio.sock");
        drop(UnixListener::bind(&stale).unwrap());
        let live = dir.path().join("containerd.sock");
        let server = hold_connections(&live);

        let endpoint = RuntimeEndpoint::with_candidates([uri(&stale), uri(&live)]);
        let conn = Connector::new(GrpcDialer::new(Duration::from_secs(10)))
            .connect(&test_ctx(), &endpoint)
            .await
            .unwrap();

        assert_eq!(conn.endpoint(), uri(&live));
        server.abort();
    }

    #[tokio::test]
    async fn test_socket_under_directory_needing_escapes() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("runtime dir%");
        std::fs::create_dir(&nested).unwrap();
        let socket = nested.join("containerd.sock");
        let server = hold_connections(&socket);

        let encoded = format!("unix://{}/runtime%20dir%25/containerd.sock", dir.path().display());
        let conn = Connector::new(GrpcDialer::new(Duration::from_secs(10)))
            .connect(&test_ctx(), &RuntimeEndpoint::with_candidates([encoded.as_str()]))
            .await
            .unwrap();

        assert_eq!(conn.endpoint(), encoded);
        server.abort();
    }

    #[tokio::test]
    async fn test_only_stale_sockets_is_runtime_not_found() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("crio.sock");
        drop(UnixListener::bind(&stale).unwrap());

        let res = Connector::new(GrpcDialer::new(Duration::from_secs(2)))
            .connect(&test_ctx(), &RuntimeEndpoint::with_candidates([uri(&stale)]))
            .await;

        assert!(matches!(res, Err(InjectError::RuntimeNotFound)));
    }
}
