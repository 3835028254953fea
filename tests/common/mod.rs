//! Shared fixtures for integration tests: stub backend, model files, a tiny
//! HTTP model server, log capture

#![allow(dead_code)]

use fast_langdetect::{
    Error, LangDetectConfigBuilder, LangDetector, LanguageModel, ModelBackend, ModelSource,
    RawPrediction, Result,
};
use fast_langdetect::{LangDetectConfig, models::FULL_MODEL_NAME};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// File name of the lite model inside a [`Fixture`]
pub const LITE_FILE: &str = "lite.ftz";
/// File name of the custom model inside a [`Fixture`]
pub const CUSTOM_FILE: &str = "custom.bin";

// =============================================================================
// Stub backend
// =============================================================================

/// What the stub does when asked to load a given file
#[derive(Debug, Clone)]
pub enum Outcome {
    Predict(Vec<(&'static str, f32)>),
    OutOfMemory,
    PermissionDenied,
}

/// Backend that never parses files; behavior is keyed by file name
#[derive(Default)]
pub struct StubBackend {
    outcomes: Mutex<HashMap<String, Outcome>>,
    loads: Mutex<Vec<String>>,
    texts: Arc<Mutex<Vec<String>>>,
    load_delay: Option<Duration>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, file_name: &str, outcome: Outcome) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(file_name.to_string(), outcome);
        self
    }

    /// Sleep inside every load to widen race windows
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// File names passed to `load`, in call order
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn load_count(&self, file_name: &str) -> usize {
        self.loads().iter().filter(|n| *n == file_name).count()
    }

    /// Texts handed to loaded models, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl ModelBackend for StubBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn LanguageModel>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.loads.lock().unwrap().push(name.clone());
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or(Outcome::Predict(vec![("__label__en", 0.9)]));

        match outcome {
            Outcome::Predict(predictions) => Ok(Box::new(StubModel {
                predictions: predictions
                    .into_iter()
                    .map(|(label, p)| RawPrediction::new(label, p))
                    .collect(),
                texts: Arc::clone(&self.texts),
            })),
            Outcome::OutOfMemory => Err(Error::OutOfMemory {
                path: path.to_path_buf(),
                message: "memory allocation of 7516192768 bytes failed".to_string(),
            }),
            Outcome::PermissionDenied => Err(Error::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            }),
        }
    }
}

struct StubModel {
    predictions: Vec<RawPrediction>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl LanguageModel for StubModel {
    fn predict(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<RawPrediction>> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(self
            .predictions
            .iter()
            .filter(|p| p.probability >= threshold)
            .take(k)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Filesystem fixture
// =============================================================================

/// Temp directory with a cache dir, a lite model file and a custom model file
pub struct Fixture {
    pub dir: TempDir,
    pub cache_dir: PathBuf,
    pub lite: PathBuf,
    pub custom: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir(&cache_dir).unwrap();
        let lite = dir.path().join(LITE_FILE);
        std::fs::write(&lite, b"lite model").unwrap();
        let custom = dir.path().join(CUSTOM_FILE);
        std::fs::write(&custom, b"custom model").unwrap();
        Self {
            dir,
            cache_dir,
            lite,
            custom,
        }
    }

    /// Pretend the full model was downloaded earlier
    pub fn with_full_model(self) -> Self {
        std::fs::write(self.cache_dir.join(FULL_MODEL_NAME), b"full model").unwrap();
        self
    }

    /// Builder pointing at the fixture's cache dir, with verification off
    pub fn config(&self) -> LangDetectConfigBuilder {
        LangDetectConfig::builder()
            .cache_dir(&self.cache_dir)
            .disable_verify(true)
    }

    /// Model source using the fixture's lite file
    pub fn source(&self, config: LangDetectConfig) -> ModelSource {
        ModelSource::new(Arc::new(config)).with_lite_model(&self.lite)
    }

    pub fn detector(&self, config: LangDetectConfig, backend: &Arc<StubBackend>) -> LangDetector {
        LangDetector::with_source(
            self.source(config),
            Arc::clone(backend) as Arc<dyn ModelBackend>,
        )
    }
}

// =============================================================================
// Tiny fastText model
// =============================================================================

/// Softmax fastText model in the on-disk `.bin` layout
///
/// `input` holds `(words + bucket) x dim` floats, `output` `labels x dim`.
pub struct TinyModel<'a> {
    pub dim: usize,
    pub words: &'a [&'a str],
    pub labels: &'a [&'a str],
    pub word_ngrams: i32,
    pub bucket: usize,
    pub minn: i32,
    pub maxn: i32,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

impl TinyModel<'_> {
    pub fn write(&self, path: &Path) {
        fn i32s(buf: &mut Vec<u8>, vs: &[i32]) {
            for v in vs {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        fn matrix(buf: &mut Vec<u8>, rows: usize, cols: usize, data: &[f32]) {
            assert_eq!(data.len(), rows * cols);
            buf.push(0);
            buf.extend_from_slice(&(rows as i64).to_le_bytes());
            buf.extend_from_slice(&(cols as i64).to_le_bytes());
            for v in data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        let mut buf = Vec::new();
        // magic, version, then dim ws epoch minCount neg wordNgrams loss model bucket minn maxn lrUpdateRate
        i32s(
            &mut buf,
            &[
                793_712_314,
                12,
                self.dim as i32,
                5,
                5,
                1,
                5,
                self.word_ngrams,
                3,
                3,
                self.bucket as i32,
                self.minn,
                self.maxn,
                100,
            ],
        );
        buf.extend_from_slice(&1e-4f64.to_le_bytes());

        let size = self.words.len() + self.labels.len();
        i32s(
            &mut buf,
            &[size as i32, self.words.len() as i32, self.labels.len() as i32],
        );
        buf.extend_from_slice(&100i64.to_le_bytes());
        buf.extend_from_slice(&(-1i64).to_le_bytes());
        for (entries, kind) in [(self.words, 0u8), (self.labels, 1u8)] {
            for word in entries {
                buf.extend_from_slice(word.as_bytes());
                buf.push(0);
                buf.extend_from_slice(&10i64.to_le_bytes());
                buf.push(kind);
            }
        }

        matrix(&mut buf, self.words.len() + self.bucket, self.dim, &self.input);
        matrix(&mut buf, self.labels.len(), self.dim, &self.output);
        std::fs::write(path, buf).unwrap();
    }
}

/// Write a two-label softmax model: `hello` scores `en`, `bonjour` scores `fr`
pub fn write_tiny_model(path: &Path) {
    TinyModel {
        dim: 2,
        words: &["</s>", "hello", "bonjour"],
        labels: &["__label__en", "__label__fr"],
        word_ngrams: 1,
        bucket: 0,
        minn: 0,
        maxn: 0,
        input: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        output: vec![4.0, 0.0, 0.0, 4.0],
    }
    .write(path);
}

// =============================================================================
// Model server
// =============================================================================

/// Minimal HTTP/1.1 server answering one connection per scripted reply
pub struct ModelServer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<String>>,
}

impl ModelServer {
    /// Serve `replies` (status, body) in order, then stop
    pub fn start(replies: Vec<(u16, &'static [u8])>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut request_lines = Vec::new();
            for (status, body) in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(&stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                request_lines.push(request_line.trim_end().to_string());
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }

                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Error",
                };
                let mut writer = &stream;
                write!(
                    writer,
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    reason,
                    body.len()
                )
                .unwrap();
                writer.write_all(body).unwrap();
                writer.flush().unwrap();
            }
            request_lines
        });
        Self { addr, handle }
    }

    /// `http://host:port` of the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request lines received, once every reply has been served
    pub fn requests(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

// =============================================================================
// Log capture
// =============================================================================

/// In-memory sink for `tracing-subscriber` output
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a thread-local subscriber and return its output plus the logs
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}
