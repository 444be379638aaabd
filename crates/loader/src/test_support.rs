use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::{Mutex, OnceLock, PoisonError},
    thread,
    time::Duration,
};

use courier_protocol::{EncodeError, Encoder, Record};
use crossbeam::channel::Receiver;
use log::{Level, LevelFilter, Log, Metadata, Record as LogRecord};

use crate::destination::{Destination, TransportError, WriteResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord(pub String);

impl Record for TestRecord {
    fn id(&self) -> &str {
        &self.0
    }
}

pub fn records(n: usize) -> Vec<TestRecord> {
    (0..n).map(|i| TestRecord(format!("r{i}"))).collect()
}

/// Encodes a record as its id bytes; fails for the listed ids.
#[derive(Default)]
pub struct IdEncoder {
    pub failing: HashSet<String>,
}

impl Encoder<TestRecord> for IdEncoder {
    fn encode(&self, record: &TestRecord) -> Result<Vec<u8>, EncodeError> {
        if self.failing.contains(&record.0) {
            return Err(EncodeError {
                id: record.0.clone(),
                reason: "unencodable".into(),
            });
        }
        Ok(record.0.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Status(u16),
    /// Transport failure for the first `n` attempts, then 200
    FailFirst(u32),
    AlwaysFail,
}

/// In-memory destination keyed by the last path segment of the url.
pub struct ScriptedDestination {
    behaviors: HashMap<String, Behavior>,
    fallback: Behavior,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedDestination {
    pub fn ok() -> Self {
        Self::with_fallback(Behavior::Status(200))
    }

    pub fn with_fallback(fallback: Behavior) -> Self {
        Self {
            behaviors: HashMap::new(),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(id.to_owned(), behavior);
        self
    }

    /// Every write so far, in call order.
    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|(url, _)| url).collect()
    }

    pub fn attempts(&self, url: &str) -> usize {
        self.calls().iter().filter(|(u, _)| u == url).count()
    }
}

impl Destination for ScriptedDestination {
    fn write(&self, url: &str, payload: &[u8]) -> Result<WriteResponse, TransportError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push((url.to_owned(), payload.to_vec()));
            calls.iter().filter(|(u, _)| u == url).count() as u32
        };

        let id = url.rsplit('/').next().unwrap_or_default();
        let fail = || TransportError::Connect {
            url: url.to_owned(),
            reason: "connection refused".into(),
        };

        match self.behaviors.get(id).copied().unwrap_or(self.fallback) {
            Behavior::Status(status) => Ok(WriteResponse::new(status, format!("status {status}"))),
            Behavior::FailFirst(n) if attempt <= n => Err(fail()),
            Behavior::FailFirst(_) => Ok(WriteResponse::new(200, "")),
            Behavior::AlwaysFail => Err(fail()),
        }
    }
}

/// Sleeps before answering 200.
pub struct SlowDestination(pub Duration);

impl Destination for SlowDestination {
    fn write(&self, _url: &str, _payload: &[u8]) -> Result<WriteResponse, TransportError> {
        thread::sleep(self.0);
        Ok(WriteResponse::new(200, ""))
    }
}

/// Blocks every write until the gate's sender is dropped.
pub struct GatedDestination(pub Receiver<()>);

impl Destination for GatedDestination {
    fn write(&self, _url: &str, _payload: &[u8]) -> Result<WriteResponse, TransportError> {
        let _ = self.0.recv();
        Ok(WriteResponse::new(200, ""))
    }
}

/// What the stub server saw for one request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Serve one connection per scripted `(status, body)` answer, in order, then stop.
pub fn serve_http(
    answers: Vec<(u16, &'static str)>,
) -> (String, thread::JoinHandle<Vec<CapturedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let addr = listener.local_addr().expect("stub server address");

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in answers {
            let (stream, _) = listener.accept().expect("accept connection");
            seen.push(answer_one(stream, status, body));
        }
        seen
    });

    (format!("http://{addr}"), handle)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn answer_one(mut stream: TcpStream, status: u16, body: &str) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).expect("read request");
        assert!(n > 0, "client closed the connection before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_owned();
    let path = request_line.next().unwrap_or_default().to_owned();

    let mut content_length = 0usize;
    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => {
                    content_length = value.trim().parse().expect("numeric content-length")
                }
                "content-type" => content_type = Some(value.trim().to_owned()),
                _ => {}
            }
        }
    }

    let mut request_body = buf[header_end..].to_vec();
    while request_body.len() < content_length {
        let n = stream.read(&mut chunk).expect("read request body");
        if n == 0 {
            break;
        }
        request_body.extend_from_slice(&chunk[..n]);
    }

    let response = format!(
        "HTTP/1.1 {status} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .expect("write response");
    let _ = stream.flush();

    CapturedRequest {
        method,
        path,
        content_type,
        body: request_body,
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps records logged on a thread while that thread is inside `capture_logs`.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        CAPTURING.with(Cell::get)
    }

    fn log(&self, record: &LogRecord) {
        if self.enabled(record.metadata()) {
            let line = record.args().to_string();
            CAPTURED.with(|captured| captured.borrow_mut().push((record.level(), line)));
        }
    }

    fn flush(&self) {}
}

static CAPTURE_LOGGER: CaptureLogger = CaptureLogger;
static CAPTURE_INSTALLED: OnceLock<()> = OnceLock::new();

/// Run `f` and return what it logged on the current thread, in order.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
    CAPTURE_INSTALLED.get_or_init(|| {
        log::set_logger(&CAPTURE_LOGGER).expect("no other logger in the test binary");
        log::set_max_level(LevelFilter::Trace);
    });

    CAPTURED.with(|captured| captured.borrow_mut().clear());
    CAPTURING.with(|on| on.set(true));
    let out = f();
    CAPTURING.with(|on| on.set(false));

    (out, CAPTURED.with(|captured| captured.take()))
}

/// Messages logged at exactly `level`.
pub fn at_level(logs: &[(Level, String)], level: Level) -> Vec<&str> {
    logs.iter()
        .filter(|(lvl, _)| *lvl == level)
        .map(|(_, msg)| msg.as_str())
        .collect()
}
