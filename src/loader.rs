//! Background loading of clips into viewer slots.
//!
//! A single worker thread pops load requests from a FIFO queue, reads and parses the source
//! and publishes the parsed [`Bvh`] (or the failure) to the requesting [`Slot`]. The queue and all
//! slot state transitions share one mutex, which is never held while reading or parsing. Slot
//! reads from the presentation side are lock-free.

use arc_swap::ArcSwapOption;
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{ParseError, Result};
use crate::parse::parse;
use crate::types::Bvh;

/////////////////////////////////////////////////////////////////////////////////////////////////

/// `Empty -> Queued -> Loading -> Loaded | Invalid`. `Loaded` and `Invalid` go back to `Queued`
/// when loaded again, a cancelled `Queued` slot goes back to `Empty`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty = 0,
    Queued = 1,
    Loading = 2,
    Loaded = 3,
    Invalid = 4,
}

impl SlotState {
    fn from_u8(value: u8) -> SlotState {
        match value {
            1 => SlotState::Queued,
            2 => SlotState::Loading,
            3 => SlotState::Loaded,
            4 => SlotState::Invalid,
            _ => SlotState::Empty,
        }
    }
}

/// Destination of a load. Shared between the presentation side and the loader as `Arc<Slot>`.
pub struct Slot {
    state: AtomicU8,
    result: ArcSwapOption<Bvh>,
}

impl Slot {
    pub fn new() -> Arc<Slot> {
        Arc::new(Slot {
            state: AtomicU8::new(SlotState::Empty as u8),
            result: ArcSwapOption::empty(),
        })
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The parsed clip, only while the slot is `Loaded`.
    pub fn result(&self) -> Option<Arc<Bvh>> {
        match self.state() {
            SlotState::Loaded => self.result.load_full(),
            _ => None,
        }
    }

    /// Queued or loading.
    pub fn is_pending(&self) -> bool {
        matches!(self.state(), SlotState::Queued | SlotState::Loading)
    }

    fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("state", &self.state()).finish()
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Where the bytes of a clip come from. Files on disk and in-memory buffers are provided;
/// directory listings and archive entries only need to implement this.
pub trait LoadSource: Send + 'static {
    fn read(&self) -> io::Result<Vec<u8>>;

    /// Name used in log messages.
    fn describe(&self) -> String;
}

impl LoadSource for PathBuf {
    fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self)
    }

    fn describe(&self) -> String {
        self.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct MemorySource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        MemorySource {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl LoadSource for MemorySource {
    fn read(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

pub(crate) struct LoadRequest {
    source: Box<dyn LoadSource>,
    slot: Arc<Slot>,
}

/////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// How long the worker sleeps when the queue is empty
    pub poll_interval: Duration,
    pub thread_name: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            poll_interval: Duration::from_millis(10),
            thread_name: "bvh-loader".to_string(),
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<LoadRequest>>,
    shutdown: AtomicBool,
    poll_interval: Duration,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<LoadRequest>> {
        // the lock is never held across user code, a poisoned queue is still consistent
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_next(&self) -> bool {
        let request = {
            let mut queue = self.lock_queue();
            let Some(request) = queue.pop_front() else {
                return false;
            };
            request.slot.set_state(SlotState::Loading);
            request
        };

        let name = request.source.describe();
        debug!("loading {name}");
        let outcome = run_pipeline(request.source.as_ref());

        let _queue = self.lock_queue();
        let slot = &request.slot;
        match outcome {
            Ok(bvh) => {
                debug!(
                    "loaded {name}: {} joints, {} frames",
                    bvh.skeleton.len(),
                    bvh.motion.frame_count
                );
                slot.result.store(Some(Arc::new(bvh)));
                slot.set_state(SlotState::Loaded);
            }
            Err(err) => {
                warn!("failed to load {name}: {err}");
                slot.result.store(None);
                slot.set_state(SlotState::Invalid);
            }
        }
        true
    }
}

/// Read and parse one source. A panic in the pipeline is reported as an I/O error so that one bad
/// file never takes the worker down.
fn run_pipeline(source: &dyn LoadSource) -> Result<Bvh> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        let bytes = source.read()?;
        parse(&bytes)
    })) {
        Ok(result) => result,
        Err(_) => {
            error!("parser panicked on {}", source.describe());
            Err(ParseError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "parser panicked",
            )))
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    info!("loader thread started");
    while !shared.shutdown.load(Ordering::Acquire) {
        if !shared.process_next() {
            thread::sleep(shared.poll_interval);
        }
    }
    info!("loader thread stopped");
}

/// FIFO load queue served by one background worker.
pub struct Loader {
    shared: Arc<Shared>,
    config: LoaderConfig,
    worker: Option<JoinHandle<()>>,
}

impl Loader {
    /// Create the queue without starting the worker; see [`start`](Self::start).
    pub fn new(config: LoaderConfig) -> Self {
        Loader {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                shutdown: AtomicBool::new(false),
                poll_interval: config.poll_interval,
            }),
            config,
            worker: None,
        }
    }

    /// Create the queue and start its worker thread.
    pub fn spawn(config: LoaderConfig) -> io::Result<Self> {
        let mut loader = Loader::new(config);
        loader.start()?;
        Ok(loader)
    }

    /// Start the worker thread. Does nothing if it is already running.
    pub fn start(&mut self) -> io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker_loop(shared))?;
        self.worker = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Queue a load of `source` into `slot`, which becomes `Queued` and loses any previous result.
    ///
    /// Queueing a slot that is already `Queued` or `Loading` is not prevented and only does
    /// redundant work; check [`Slot::is_pending`] first.
    pub fn enqueue(&self, source: impl LoadSource, slot: &Arc<Slot>) {
        let mut queue = self.shared.lock_queue();
        trace!("enqueue {} ({} pending)", source.describe(), queue.len());
        slot.result.store(None);
        slot.set_state(SlotState::Queued);
        queue.push_back(LoadRequest {
            source: Box::new(source),
            slot: Arc::clone(slot),
        });
    }

    /// Remove one queued request for `slot` and put the slot back to `Empty`.
    /// A load already in progress is not interrupted; returns whether a request was removed.
    pub fn cancel(&self, slot: &Arc<Slot>) -> bool {
        let mut queue = self.shared.lock_queue();
        let Some(position) = queue.iter().position(|request| Arc::ptr_eq(&request.slot, slot)) else {
            return false;
        };
        if let Some(request) = queue.remove(position) {
            trace!("cancel {}", request.source.describe());
        }
        slot.set_state(SlotState::Empty);
        true
    }

    /// Number of queued requests, not counting one in progress.
    pub fn pending(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Run the oldest queued request on the calling thread. Returns false if the queue was empty.
    pub fn process_next(&self) -> bool {
        self.shared.process_next()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("loader thread panicked");
            }
        }
        let dropped = self.shared.lock_queue().len();
        if dropped > 0 {
            debug!("dropping {dropped} queued loads");
        }
    }
}
