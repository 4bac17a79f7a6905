use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// Minimal HTTP node on a local port. Each request is answered by `handler`
/// with a status code and a JSON body, and its head is recorded.
///
/// ## Example
///
/// ```ignore
/// let node = StubNode::start(|request| match request {
///     "GET /v2/status" => (200, r#"{"last-round": 100}"#.to_string()),
///     _ => (404, r#"{"message": "not found"}"#.to_string()),
/// });
/// let rpc = Rpc::new(node.url(), "token".to_string()).unwrap();
/// ```
pub struct StubNode {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubNode {
    pub fn start<F>(handler: F) -> StubNode
    where
        F: Fn(&str) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub node");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                answer(stream, &handler, &recorded);
            }
        });

        StubNode { url, requests }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Request heads received so far, request line first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose request line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|head| head.starts_with(prefix))
            .count()
    }
}

fn answer<F>(stream: TcpStream, handler: &F, recorded: &Mutex<Vec<String>>) -> Option<()>
where
    F: Fn(&str) -> (u16, String),
{
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut head = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        if line == "\r\n" {
            break;
        }
        let lower = line.to_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        head.push_str(&line);
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;

    let request_line = head.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let request = format!(
        "{} {}",
        parts.next().unwrap_or(""),
        parts.next().unwrap_or("")
    );
    recorded.lock().ok()?.push(head);
    let (status, body) = handler(&request);

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let mut stream = stream;
    stream.write_all(response.as_bytes()).ok()?;
    stream.flush().ok()
}
