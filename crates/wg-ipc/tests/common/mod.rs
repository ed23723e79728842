//! Common test utilities for the control-socket tests.
//!
//! Provides a fake userspace daemon serving canned responses on a UNIX
//! socket inside a temporary directory.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::thread::JoinHandle;

use tempfile::TempDir;
use wg_ipc::{IpcConfig, UserspaceTransport, WgApi};

/// A fake daemon answering one request per canned response.
///
/// Connections that close without sending anything (liveness probes) are
/// accepted and ignored.
pub struct FakeDaemon {
    handle: JoinHandle<Vec<String>>,
}

impl FakeDaemon {
    /// Listen on `<dir>/<name>.sock` and serve `responses` in order.
    pub fn spawn(dir: &Path, name: &str, responses: Vec<String>) -> Self {
        let listener = UnixListener::bind(dir.join(format!("{}.sock", name)))
            .expect("failed to bind control socket");

        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            let mut responses = responses.into_iter();
            let mut next = responses.next();

            while let Some(response) = next.take() {
                let (stream, _) = listener.accept().expect("accept failed");
                let request = read_request(&stream);
                if request.is_empty() {
                    next = Some(response);
                    continue;
                }
                (&stream)
                    .write_all(response.as_bytes())
                    .expect("failed to write response");
                requests.push(request);
                next = responses.next();
            }
            requests
        });

        Self { handle }
    }

    /// Wait for every response to be served and return the requests seen.
    pub fn join(self) -> Vec<String> {
        self.handle.join().expect("daemon thread panicked")
    }
}

/// Read one request, up to and including its blank line.
fn read_request(stream: &std::os::unix::net::UnixStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut request = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return request;
        }
        request.push_str(&line);
        if line == "\n" {
            return request;
        }
    }
}

/// A temporary socket directory.
pub fn socket_dir() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

/// Config pointing at `dir`.
pub fn config(dir: &TempDir) -> IpcConfig {
    IpcConfig::new().socket_dir(dir.path())
}

/// Userspace transport over `dir`.
pub fn transport(dir: &TempDir) -> UserspaceTransport {
    UserspaceTransport::with_config(&config(dir))
}

/// Dispatcher over `dir` with no kernel transport.
pub fn api(dir: &TempDir) -> WgApi {
    WgApi::with_config(&config(dir)).without_kernel()
}
