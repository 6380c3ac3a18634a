#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use cartlink_core::catalog::{CatalogEntry, CatalogKey, CatalogSource, LookupError};
use cartlink_core::descriptor::GameDescriptor;
use cartlink_core::save_type::SaveTypeCode;
use cartlink_reader::{CartReader, ReaderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub body: Vec<u8>,
}

/// Minimal HTTP/1.1 server answering canned responses by path.
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub fn start(routes: &[(&str, u16, &[u8])]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let routes: HashMap<String, (u16, Vec<u8>)> = routes
            .iter()
            .map(|(path, status, body)| (path.to_string(), (*status, body.to_vec())))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = serve(stream, &routes, &recorded);
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.target).collect()
    }
}

fn serve(
    stream: TcpStream,
    routes: &HashMap<String, (u16, Vec<u8>)>,
    recorded: &Mutex<Vec<Recorded>>,
) -> Option<()> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok()?;
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;

    let path = target.split('?').next().unwrap_or_default();
    let (status, payload) = routes
        .get(path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));
    // Logged before replying; tests read the log as soon as the client returns.
    recorded.lock().unwrap().push(Recorded {
        method,
        target: target.clone(),
        body,
    });

    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    stream.write_all(head.as_bytes()).ok()?;
    stream.write_all(&payload).ok()?;
    stream.flush().ok()
}

/// Address nothing is listening on.
pub fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{addr}")
}

pub fn descriptor() -> GameDescriptor {
    GameDescriptor {
        cart_id: "AXVE".into(),
        rom_name: "POKEMON RUBY".into(),
        checksum_16mb: "ee".into(),
        ..Default::default()
    }
}

/// Scripted reader recording every call.
pub struct FakeReader {
    pub descriptor: Option<GameDescriptor>,
    pub rom: Vec<u8>,
    pub save: Vec<u8>,
    pub verify_ok: bool,
    pub calls: RefCell<Vec<String>>,
}

impl FakeReader {
    pub fn new(descriptor: GameDescriptor, rom: Vec<u8>) -> Self {
        Self {
            descriptor: Some(descriptor),
            rom,
            save: vec![0xAB; 16],
            verify_ok: true,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        Self {
            descriptor: None,
            ..Self::new(GameDescriptor::default(), Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl CartReader for FakeReader {
    fn game_info(&self) -> Result<GameDescriptor, ReaderError> {
        self.record("game_info".into());
        self.descriptor
            .clone()
            .ok_or_else(|| ReaderError::Transport("connection refused".into()))
    }

    fn dump_rom(
        &self,
        is_gba: bool,
        cart_size: u64,
        save_code: SaveTypeCode,
    ) -> Result<Vec<u8>, ReaderError> {
        let ext = if is_gba { "gba" } else { "gb" };
        self.record(format!("dump_rom {ext} {cart_size} {save_code}"));
        Ok(self.rom.clone())
    }

    fn dump_save(&self, save_code: SaveTypeCode) -> Result<Vec<u8>, ReaderError> {
        self.record(format!("dump_save {save_code}"));
        Ok(self.save.clone())
    }

    fn upload_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        self.record(format!("upload_save {} {save_code}", data.len()));
        Ok(())
    }

    fn verify_save(&self, _data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        self.record(format!("verify_save {save_code}"));
        self.verify_result("verify_save_file")
    }

    fn upload_rom(&self, data: &[u8]) -> Result<(), ReaderError> {
        self.record(format!("upload_rom {}", data.len()));
        Ok(())
    }

    fn verify_rom(&self, _data: &[u8]) -> Result<(), ReaderError> {
        self.record("verify_rom".into());
        self.verify_result("verify_rom_file")
    }
}

impl FakeReader {
    fn verify_result(&self, endpoint: &'static str) -> Result<(), ReaderError> {
        if self.verify_ok {
            Ok(())
        } else {
            Err(ReaderError::Status {
                endpoint,
                status: 500,
            })
        }
    }
}

/// In-memory catalog with patch files.
#[derive(Default)]
pub struct MemCatalog {
    pub documents: HashMap<String, CatalogEntry>,
    pub patches: HashMap<String, Vec<u8>>,
}

impl MemCatalog {
    pub fn with_entry(mut self, key: CatalogKey, entry: CatalogEntry) -> Self {
        self.documents.insert(key.document_path(), entry);
        self
    }

    pub fn with_patch(mut self, reference: &str, data: Vec<u8>) -> Self {
        self.patches.insert(reference.to_string(), data);
        self
    }
}

impl CatalogSource for MemCatalog {
    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, LookupError> {
        self.documents
            .get(&key.document_path())
            .cloned()
            .map(Some)
            .ok_or(LookupError::Status(404))
    }

    fn fetch_patch(&self, reference: &str) -> Result<Vec<u8>, LookupError> {
        self.patches
            .get(reference)
            .cloned()
            .ok_or(LookupError::Status(404))
    }
}
