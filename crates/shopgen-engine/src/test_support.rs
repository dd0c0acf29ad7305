use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client as HttpClient;
use shopgen_contracts::catalog::Product;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Serves the queued `(status, body)` responses, one connection each, then
/// stops. `finish` returns what the client sent.
pub struct MockServer {
    base_url: String,
    handle: JoinHandle<Result<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn start(responses: Vec<(u16, String)>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let mut recorded = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept()?;
                stream.set_read_timeout(Some(Duration::from_secs(10)))?;
                recorded.push(read_request(&mut stream)?);
                let reply = format!(
                    "HTTP/1.1 {status} MOCK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes())?;
                stream.flush()?;
            }
            Ok(recorded)
        });
        Ok(Self { base_url, handle })
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn finish(self) -> Result<Vec<RecordedRequest>> {
        self.handle
            .join()
            .map_err(|_| anyhow!("mock server thread panicked"))?
    }
}

fn read_request(stream: &mut TcpStream) -> Result<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Err(anyhow!("connection closed before headers"));
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().context("empty request")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

pub fn test_client() -> Result<HttpClient> {
    Ok(HttpClient::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()?)
}

/// Base URL of a local port with nothing listening on it.
pub fn closed_port_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

pub fn product(id: &str, name: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        age_group: "adults".to_string(),
        category: "tops".to_string(),
        price: 28.0,
        sizes: ["S", "M", "L", "XL"].map(String::from).to_vec(),
        colors: ["white", "midnight", "sage"].map(String::from).to_vec(),
        description: "Soft combed cotton.".to_string(),
        inventory: 12,
    }
}

pub fn sample_products() -> Vec<Product> {
    vec![
        product("tee-001", "Nimbus Cotton Tee"),
        product("hood-002", "Atlas Fleece Hoodie"),
        product("cap-005", "Drift Canvas Cap"),
    ]
}

pub fn tiny_png() -> Result<Vec<u8>> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn is_png(path: &Path) -> bool {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| image::guess_format(&bytes).ok())
        == Some(image::ImageFormat::Png)
}
