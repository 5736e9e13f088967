use crate::entities::object::SpawnKey;
use crate::persistence::store::{RespawnWrite, RespawnWrites, SpawnStore};
use crate::telemetry::logging;
use crate::world::time::{GameTime, IntervalTimer};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushConfig {
    /// Zero flushes at the end of every tick.
    pub interval_ms: u64,
}

impl FlushConfig {
    pub fn interval(self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Pending respawn writes for one map instance, last write per identity wins.
#[derive(Debug, Clone)]
pub struct RespawnJournal {
    pending: RespawnWrites,
    timer: IntervalTimer,
}

#[derive(Debug, Default)]
pub struct FlushReport {
    pub upserted: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.upserted == 0 && self.deleted == 0 && self.errors.is_empty()
    }
}

impl RespawnJournal {
    pub fn new(config: FlushConfig) -> Self {
        Self {
            pending: RespawnWrites::new(),
            timer: IntervalTimer::new(config.interval()),
        }
    }

    pub fn record_upsert(&mut self, key: SpawnKey, time: GameTime) {
        self.pending.insert(key, RespawnWrite::Upsert(time.0));
    }

    pub fn record_delete(&mut self, key: SpawnKey) {
        self.pending.insert(key, RespawnWrite::Delete);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advances the flush timer; true when the journal should be written out.
    pub fn due(&mut self, elapsed: Duration) -> bool {
        self.timer.update(elapsed);
        self.timer.consume()
    }

    pub fn take(&mut self) -> RespawnWrites {
        std::mem::take(&mut self.pending)
    }
}

/// Writes one batch. Failed writes are reported and dropped, never retried.
pub fn write_batch(
    store: &dyn SpawnStore,
    map_id: u32,
    instance_id: u32,
    writes: &RespawnWrites,
) -> FlushReport {
    let failed = store.write_respawns(map_id, instance_id, writes);
    let mut report = FlushReport::default();
    for (key, write) in writes {
        if failed.iter().any(|(failed_key, _)| failed_key == key) {
            continue;
        }
        match write {
            RespawnWrite::Upsert(_) => report.upserted += 1,
            RespawnWrite::Delete => report.deleted += 1,
        }
    }
    report.errors = failed
        .into_iter()
        .map(|(key, err)| format!("{}: {}", key, err))
        .collect();
    report
}

struct WriteJob {
    writes: RespawnWrites,
    reply: Option<Sender<FlushReport>>,
}

/// Background thread that owns respawn persistence for one map instance.
///
/// Jobs are applied in submission order, so a blocking flush also waits for every batch
/// submitted before it.
pub struct RespawnWriter {
    sender: Option<Sender<WriteJob>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RespawnWriter {
    pub fn spawn(map_id: u32, instance_id: u32, store: Arc<dyn SpawnStore>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || writer_loop(map_id, instance_id, store, receiver));
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queues the batch and returns at once.
    pub fn submit(&self, writes: RespawnWrites) -> Result<(), String> {
        self.send(WriteJob {
            writes,
            reply: None,
        })
    }

    /// Queues the batch and waits until it and everything before it is written.
    pub fn write_blocking(&self, writes: RespawnWrites) -> FlushReport {
        let (reply, done) = mpsc::channel();
        let sent = self.send(WriteJob {
            writes,
            reply: Some(reply),
        });
        let result = sent.and_then(|()| {
            done.recv()
                .map_err(|_| "respawn writer stopped before replying".to_string())
        });
        match result {
            Ok(report) => report,
            Err(err) => FlushReport {
                errors: vec![err],
                ..FlushReport::default()
            },
        }
    }

    fn send(&self, job: WriteJob) -> Result<(), String> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| "respawn writer closed".to_string())?;
        sender
            .send(job)
            .map_err(|_| "respawn writer stopped".to_string())
    }
}

impl Drop for RespawnWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                eprintln!("worldgrid: respawn writer thread panicked");
            }
        }
    }
}

fn writer_loop(
    map_id: u32,
    instance_id: u32,
    store: Arc<dyn SpawnStore>,
    receiver: Receiver<WriteJob>,
) {
    for job in receiver {
        let report = write_batch(store.as_ref(), map_id, instance_id, &job.writes);
        for err in &report.errors {
            eprintln!("worldgrid: map {}: respawn write dropped: {}", map_id, err);
            logging::log_error(map_id, &format!("respawn write dropped: {}", err));
        }
        if let Some(reply) = job.reply {
            let _ = reply.send(report);
        }
    }
}
