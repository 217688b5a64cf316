// src/fetch/mod.rs

pub mod announce;
pub mod http;

pub use announce::Announcer;
pub use http::{HttpFetcher, HttpSettings};

use crate::{family::FamilySpec, snapshot::Snapshot};

/// Why a snapshot could not be produced this cycle.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed snapshot: {0:#}")]
    Malformed(anyhow::Error),
}

impl FetchError {
    /// Short status shown on the `Download - Error - <status>` line.
    pub fn status_indicator(&self) -> String {
        match self {
            FetchError::Status(code) => code.to_string(),
            FetchError::Transport(e) if e.is_timeout() => "timeout".to_string(),
            FetchError::Transport(e) if e.is_connect() => "connect".to_string(),
            FetchError::Transport(e) => e
                .status()
                .map(|s| s.as_u16().to_string())
                .unwrap_or_else(|| "request".to_string()),
            FetchError::Malformed(_) => "malformed".to_string(),
        }
    }

    /// True when the download itself failed, as opposed to its content.
    pub fn is_download_failure(&self) -> bool {
        !matches!(self, FetchError::Malformed(_))
    }
}

/// Source of "last four weeks" snapshots.
pub trait Fetcher {
    fn fetch(&self, spec: &FamilySpec) -> Result<Snapshot, FetchError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, spec: &FamilySpec) -> Result<Snapshot, FetchError> {
        (**self).fetch(spec)
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! One-shot HTTP/1.1 server for exercising the real client.

    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    pub struct Recorded {
        pub request_line: String,
        pub body: String,
    }

    /// Serve each `(status, body)` to one connection, in order.
    pub fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        content_length = v.trim().parse().unwrap();
                    }
                }
                let mut req_body = vec![0u8; content_length];
                reader.read_exact(&mut req_body).unwrap();

                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {} Status\r\nContent-Type: text/csv; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
                stream.flush().unwrap();

                seen.push(Recorded {
                    request_line: request_line.trim_end().to_string(),
                    body: String::from_utf8(req_body).unwrap(),
                });
            }
            seen
        });

        (base, handle)
    }
}
