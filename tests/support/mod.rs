#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

pub const CSV_PATH: &str = "/opendata/postalpoints.csv";

pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Minimal HTTP/1.1 server on a loopback port. One request per connection;
/// unknown paths get a 404. The accept loop lives until the test process
/// exits.
pub struct StubServer {
    pub base: String,
}

impl StubServer {
    pub fn start(routes: BTreeMap<String, Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let base = format!("http://{}", listener.local_addr().expect("addr"));

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) => break,
                        Ok(_) if header == "\r\n" || header == "\n" => break,
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }

                let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or(target);
                let (status, body) = match routes.get(path) {
                    Some(route) => (route.status, route.body.clone()),
                    None => (404, b"not found".to_vec()),
                };
                let head = format!(
                    "HTTP/1.1 {status} STUB\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        Self { base }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn csv_prefix(&self) -> String {
        self.url(CSV_PATH)
    }

    pub fn signed_csv_url(&self) -> String {
        format!(
            "{}?sv=2024-11-04&se=2099-01-01T00%3A00%3A00Z&sr=b&sp=r&sig=stub%3D",
            self.csv_prefix()
        )
    }
}

pub fn ok(body: impl Into<Vec<u8>>) -> Route {
    Route {
        status: 200,
        body: body.into(),
    }
}

pub fn failing(status: u16) -> Route {
    Route {
        status,
        body: b"upstream error".to_vec(),
    }
}

pub fn landing_page(signed_url: &str) -> Vec<u8> {
    format!(
        "<html><body><a class=\"download\" href=\"{}\">Download CSV</a></body></html>",
        signed_url.replace('&', "&amp;")
    )
    .into_bytes()
}

/// The binary with a hermetic environment rooted at `home`.
pub fn postalpoints(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("postalpoints");
    cmd.current_dir(home)
        .env("POSTALPOINTS_HOME", home)
        .env("POSTALPOINTS_TIMEZONE", "UTC")
        .env("NO_PROXY", "127.0.0.1,localhost")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .env_remove("POSTALPOINTS_LANDING_URL")
        .env_remove("POSTALPOINTS_FALLBACK_URL")
        .env_remove("POSTALPOINTS_STRATEGY")
        .env_remove("RUST_LOG");
    cmd
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
