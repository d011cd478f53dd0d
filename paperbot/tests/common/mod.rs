//! Minimal HTTP stub: answers a fixed sequence of requests, one per connection.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl StubResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn rss(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/rss+xml",
            body: body.to_string(),
        }
    }
}

pub struct StubServer {
    pub base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl StubServer {
    pub fn start(responses: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                requests.push(read_request(&mut stream));
                let reason = match response.status {
                    200 => "OK",
                    400 => "Bad Request",
                    401 => "Unauthorized",
                    _ => "Error",
                };
                write!(
                    stream,
                    "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    reason,
                    response.content_type,
                    response.body.len(),
                    response.body
                )
                .expect("write response");
            }
            requests
        });
        Self { base_url, handle }
    }

    /// Waits until every scripted response has been served and returns the raw requests.
    pub fn requests(self) -> Vec<String> {
        self.handle.join().expect("stub server thread")
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub const SESSION_OK: &str =
    r#"{"accessJwt":"jwt-123","refreshJwt":"refresh-456","handle":"paperbot.test","did":"did:plc:paperbot"}"#;

pub fn record_ok(rkey: &str) -> String {
    format!(
        r#"{{"uri":"at://did:plc:paperbot/app.bsky.feed.post/{rkey}","cid":"bafyreib{rkey}"}}"#
    )
}

pub fn feed_with(items: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>cs.CL updates on arXiv.org</title>"#,
    );
    for (guid, title) in items {
        xml.push_str(&format!(
            "<item><title>{title}</title><link>https://arxiv.org/abs/{guid}</link>\
             <guid isPermaLink=\"false\">oai:arXiv.org:{guid}v1</guid>\
             <pubDate>Tue, 02 Jan 2024 00:00:00 -0500</pubDate></item>"
        ));
    }
    xml.push_str("</channel></rss>");
    xml
}
