//! Lookups that reach outside the process: the instance metadata server and
//! the local hostname.

use reqwest::blocking::Client;

use crate::error::{Error, Result};

/// Base of the per-instance metadata tree on Compute Engine.
pub const METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/";

/// The environment a [`Config`](crate::Config) resolves its derived fields against.
pub trait Host: Send + Sync {
  /// Fetches `path` relative to the instance metadata root. Failures are
  /// logged and reported as `None`.
  fn metadata(&self, path: &str) -> Option<String>;

  fn hostname(&self) -> String;
}

/// Client for the Compute Engine metadata server.
#[derive(Debug, Clone)]
pub struct GceMetadata {
  base_url: String,
}

impl Default for GceMetadata {
  fn default() -> Self {
    Self {
      base_url: METADATA_URL.to_string(),
    }
  }
}

impl GceMetadata {
  pub fn new() -> Self {
    Self::default()
  }

  /// Points the client at another metadata root. `base_url` must end with `/`.
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
    }
  }

  /// Gets metadata relative to `computeMetadata/v1/instance/`.
  pub fn get_metadata(&self, path: &str) -> Option<String> {
    let url = format!("{}{}", self.base_url, path);
    match fetch(&url) {
      Ok(body) => Some(body),
      Err(e) => {
        tracing::warn!(url = %url, error = %e, "Error while getting metadata");
        None
      }
    }
  }
}

fn fetch(url: &str) -> Result<String> {
  // The metadata server is link-local; never route it through a proxy.
  let client = Client::builder()
    .no_proxy()
    .build()
    .map_err(|e| Error::Metadata(e.to_string()))?;
  client
    .get(url)
    .header("Metadata-Flavor", "Google")
    .send()
    .and_then(|resp| resp.error_for_status())
    .and_then(|resp| resp.text())
    .map_err(|e| Error::Metadata(e.to_string()))
}

/// The real machine: metadata from the GCE server, hostname from the OS.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
  metadata: GceMetadata,
}

impl SystemHost {
  pub fn new(metadata: GceMetadata) -> Self {
    Self { metadata }
  }
}

impl Host for SystemHost {
  fn metadata(&self, path: &str) -> Option<String> {
    self.metadata.get_metadata(path)
  }

  fn hostname(&self) -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{BufRead, BufReader, Write};
  use std::net::TcpListener;
  use std::thread;

  /// Serves a single canned HTTP response and hands back the request head.
  fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local listener");
    let addr = listener.local_addr().expect("listener address");
    let handle = thread::spawn(move || {
      let (mut stream, _) = listener.accept().expect("accept metadata request");
      let mut head = String::new();
      let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
      loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
          break;
        }
        head.push_str(&line);
      }
      let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      stream.write_all(response.as_bytes()).expect("write response");
      head
    });
    (format!("http://{}/instance/", addr), handle)
  }

  #[test]
  fn get_metadata_returns_body_and_sends_flavor_header() {
    let (base, server) = serve_once("200 OK", r#"["compute","http-server"]"#);
    let body = GceMetadata::with_base_url(base).get_metadata("tags");
    assert_eq!(body.as_deref(), Some(r#"["compute","http-server"]"#));

    let head = server.join().unwrap().to_lowercase();
    assert!(head.starts_with("get /instance/tags "), "unexpected request: {}", head);
    assert!(head.contains("metadata-flavor: google"));
  }

  #[test]
  fn get_metadata_error_status_is_absent() {
    let (base, server) = serve_once("404 Not Found", "not found");
    assert_eq!(GceMetadata::with_base_url(base).get_metadata("tags"), None);
    server.join().unwrap();
  }

  #[test]
  fn get_metadata_transport_failure_is_absent() {
    // Bind then drop, so nothing listens on the port.
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let client = GceMetadata::with_base_url(format!("http://{}/", addr));
    assert_eq!(client.get_metadata("tags"), None);
  }

  #[test]
  fn system_hostname_is_not_empty() {
    assert!(!SystemHost::default().hostname().is_empty());
  }
}
