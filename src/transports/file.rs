//! File transport
//!
//! Route options:
//!
//! | Option | Meaning |
//! |---|---|
//! | `file_name` | template rendered against the process variables (required) |
//! | `separate` | append `master_ext` or `worker_ext` to the name by role |
//! | `master_ext` / `worker_ext` | suffixes, `.master` / `.worker` by default |
//! | `stream` | keep the file open; routes naming the same file share it |
//! | `reset_file` | truncate a separate streamed file when it is first opened |
//! | `mode` | octal permissions of a created file, `0644` by default (unix) |
//! | `lock` | hold an exclusive lock on the file around every write |
//!
//! Writes are queued to a worker thread per file, so `out` never waits on
//! the disk. The worker acknowledges each record once its batch is flushed.

use crate::core::{
    Ack, LoggerError, Record, Result, Role, RouteSpec, Transport, TransportContext,
    TransportFactory,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Records written per flush at most
const BATCH_SIZE: usize = 50;

/// Time a retiring writer gets to drain its queue
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MODE: u32 = 0o644;

/// Parsed route options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub file_name: String,
    pub mode: u32,
    pub stream: bool,
    pub separate: bool,
    pub reset_file: bool,
    pub master_ext: String,
    pub worker_ext: String,
    pub lock: bool,
}

impl FileOptions {
    pub fn from_spec(spec: &RouteSpec) -> Result<Self> {
        let file_name = spec
            .option_str("file_name")
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| LoggerError::config("file", "Option 'file_name' is required"))?;
        let mode = match spec.options.get("mode") {
            None => DEFAULT_MODE,
            Some(value) => parse_mode(value).ok_or_else(|| {
                LoggerError::config("file", format!("Option 'mode' is not an octal number: {}", value))
            })?,
        };
        Ok(Self {
            file_name: file_name.to_string(),
            mode,
            stream: spec.option_bool("stream").unwrap_or(false),
            separate: spec.option_bool("separate").unwrap_or(false),
            reset_file: spec.option_bool("reset_file").unwrap_or(false),
            master_ext: spec.option_str("master_ext").unwrap_or(".master").to_string(),
            worker_ext: spec.option_str("worker_ext").unwrap_or(".worker").to_string(),
            lock: spec.option_bool("lock").unwrap_or(false),
        })
    }

    /// File name template including the role suffix
    pub fn name_template(&self, role: Role) -> String {
        if !self.separate {
            return self.file_name.clone();
        }
        match role {
            Role::Master => format!("{}{}", self.file_name, self.master_ext),
            Role::Worker => format!("{}{}", self.file_name, self.worker_ext),
        }
    }
}

/// Octal digits given as a string (`"0640"`) or as a number (`640`)
fn parse_mode(value: &serde_json::Value) -> Option<u32> {
    let digits = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.as_u64()?.to_string(),
        _ => return None,
    };
    u32::from_str_radix(&digits, 8).ok()
}

fn open_options(mode: u32, truncate: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options
}

struct Job {
    text: String,
    ack: Ack,
}

/// Where a writer thread puts its batches
enum Sink {
    /// One handle kept open
    Stream(BufWriter<File>),
    /// Reopened in append mode for every batch
    Append { path: PathBuf, mode: u32 },
}

impl Sink {
    fn open(path: &Path, options: &FileOptions) -> Result<Self> {
        if !options.stream {
            return Ok(Sink::Append {
                path: path.to_path_buf(),
                mode: options.mode,
            });
        }
        let truncate = options.separate && options.reset_file;
        let file = open_options(options.mode, truncate)
            .open(path)
            .map_err(|e| {
                LoggerError::io_operation(
                    "opening log file",
                    format!("cannot open {}", path.display()),
                    e,
                )
            })?;
        Ok(Sink::Stream(BufWriter::new(file)))
    }

    fn write_batch(&mut self, batch: &[Job], lock: bool) -> std::io::Result<()> {
        match self {
            Sink::Stream(writer) => {
                if lock {
                    FileExt::lock_exclusive(writer.get_ref())?;
                }
                let result = write_jobs(writer, batch).and_then(|_| writer.flush());
                if lock {
                    FileExt::unlock(writer.get_ref())?;
                }
                result
            }
            Sink::Append { path, mode } => {
                let mut file = open_options(*mode, false).open(&*path)?;
                if lock {
                    FileExt::lock_exclusive(&file)?;
                }
                let result = write_jobs(&mut file, batch).and_then(|_| file.flush());
                if lock {
                    FileExt::unlock(&file)?;
                }
                result
            }
        }
    }
}

fn write_jobs<W: Write>(out: &mut W, batch: &[Job]) -> std::io::Result<()> {
    for job in batch {
        out.write_all(job.text.as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Worker thread owning one sink
struct Writer {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Writer {
    fn spawn(path: &Path, mut sink: Sink, lock: bool) -> Result<Self> {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("route-file:{}", path.display()))
            .spawn(move || {
                let mut batch = Vec::with_capacity(BATCH_SIZE);
                while let Ok(job) = receiver.recv() {
                    batch.push(job);
                    while batch.len() < BATCH_SIZE {
                        match receiver.try_recv() {
                            Ok(job) => batch.push(job),
                            Err(_) => break,
                        }
                    }
                    match sink.write_batch(&batch, lock) {
                        Ok(()) => batch.drain(..).for_each(|job| job.ack.ok()),
                        Err(e) => {
                            let message = e.to_string();
                            for job in batch.drain(..) {
                                let route = job.ack.route().to_string();
                                job.ack.fail(LoggerError::transport(route, message.clone()));
                            }
                        }
                    }
                }
            })
            .map_err(|e| LoggerError::io_operation("starting file writer", "cannot spawn thread", e))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn sender(&self) -> Result<Sender<Job>> {
        self.sender
            .clone()
            .ok_or_else(|| LoggerError::other("file writer has stopped"))
    }

    /// Stop accepting jobs and wait for the queue to drain
    ///
    /// Called from the writer thread itself (a completion callback), the
    /// queue drains after the callback returns, so nothing is awaited.
    fn close(mut self, timeout: Duration) -> bool {
        drop(self.sender.take());
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if handle.thread().id() == thread::current().id() {
            return true;
        }
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                if handle.join().is_err() {
                    eprintln!("[LOGGER ERROR] File writer thread panicked");
                    return false;
                }
                return true;
            }
            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] File writer did not finish within {:?}. \
                     Some records may be lost.",
                    timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

struct SharedWriter {
    writer: Writer,
    listeners: usize,
}

/// Streamed files open for an engine, by resolved path
#[derive(Default)]
pub struct FileHandles {
    open: Mutex<HashMap<PathBuf, SharedWriter>>,
}

impl FileHandles {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, path: &Path, options: &FileOptions) -> Result<Sender<Job>> {
        let mut open = self.open.lock();
        if let Some(shared) = open.get_mut(path) {
            shared.listeners += 1;
            return shared.writer.sender();
        }
        let writer = Writer::spawn(path, Sink::open(path, options)?, options.lock)?;
        let sender = writer.sender()?;
        open.insert(
            path.to_path_buf(),
            SharedWriter {
                writer,
                listeners: 1,
            },
        );
        Ok(sender)
    }

    fn release(&self, path: &Path) {
        let retired = {
            let mut open = self.open.lock();
            match open.get_mut(path) {
                Some(shared) if shared.listeners > 1 => {
                    shared.listeners -= 1;
                    None
                }
                Some(_) => open.remove(path),
                None => None,
            }
        };
        if let Some(shared) = retired {
            shared.writer.close(CLOSE_TIMEOUT);
        }
    }

    /// Number of files currently held open
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Routes sharing the file at `path`
    pub fn listeners(&self, path: &Path) -> usize {
        self.open.lock().get(path).map_or(0, |shared| shared.listeners)
    }
}

enum Owner {
    Shared(Arc<FileHandles>),
    Own(Mutex<Option<Writer>>),
}

pub struct FileTransport {
    path: PathBuf,
    sender: Mutex<Option<Sender<Job>>>,
    owner: Owner,
}

impl FileTransport {
    pub fn new(ctx: &TransportContext, spec: &RouteSpec, handles: &Arc<FileHandles>) -> Result<Self> {
        let options = FileOptions::from_spec(spec)?;
        let path = PathBuf::from(ctx.render(&options.name_template(ctx.role()))?);

        if options.stream {
            let sender = handles.acquire(&path, &options)?;
            Ok(Self {
                path,
                sender: Mutex::new(Some(sender)),
                owner: Owner::Shared(Arc::clone(handles)),
            })
        } else {
            let writer = Writer::spawn(&path, Sink::open(&path, &options)?, options.lock)?;
            Ok(Self {
                path,
                sender: Mutex::new(Some(writer.sender()?)),
                owner: Owner::Own(Mutex::new(Some(writer))),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for FileTransport {
    fn kind(&self) -> &str {
        "file"
    }

    fn out(&self, record: Record, ack: Ack) {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            ack.fail(LoggerError::transport(record.route, "file transport was released"));
            return;
        };
        let job = Job {
            text: record.text,
            ack,
        };
        if let Err(err) = sender.send(job) {
            let job = err.into_inner();
            let route = job.ack.route().to_string();
            job.ack.fail(LoggerError::transport(route, "file writer has stopped"));
        }
    }

    fn free(&self) {
        drop(self.sender.lock().take());
        match &self.owner {
            Owner::Shared(handles) => handles.release(&self.path),
            Owner::Own(writer) => {
                if let Some(writer) = writer.lock().take() {
                    writer.close(CLOSE_TIMEOUT);
                }
            }
        }
    }
}

pub fn factory() -> TransportFactory {
    let handles = Arc::new(FileHandles::new());
    Arc::new(
        move |ctx: &TransportContext,
              spec: &RouteSpec,
              _previous: Option<Arc<dyn Transport>>|
              -> Result<Arc<dyn Transport>> {
            Ok(Arc::new(FileTransport::new(ctx, spec, &handles)?))
        },
    )
}
