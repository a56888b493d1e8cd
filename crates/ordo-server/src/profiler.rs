//! Optional RPC timing capture.
//!
//! `ORDO_PROFILE=1` turns on a background flusher that appends per-second
//! per-opcode aggregates to a CSV under `./ordo_logs/`.
//! `ORDO_RPC_TIMING_LOG=<path>` appends one line per RPC to the named file.
//! Both default off; a disabled profiler costs the dispatch path nothing
//! (the handle is simply absent).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex as StdMutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ordo_types::OpCode;
use parking_lot::Mutex;
use tracing::{info, warn};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct OpAggregate {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
}

impl OpAggregate {
    fn observe(&mut self, us: u64) {
        self.count += 1;
        self.total_us += us;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
    }
}

#[derive(Debug)]
struct ProfilerInner {
    aggregates: Mutex<HashMap<OpCode, OpAggregate>>,
    timing_log: Option<Mutex<BufWriter<File>>>,
    stop: StdMutex<bool>,
    stop_cv: Condvar,
}

/// RPC timing recorder with an optional background CSV flusher.
#[derive(Debug)]
pub struct RpcProfiler {
    inner: Arc<ProfilerInner>,
    flusher: Option<JoinHandle<()>>,
}

impl RpcProfiler {
    /// Build a profiler from `ORDO_PROFILE` / `ORDO_RPC_TIMING_LOG`.
    /// `None` when neither is set, or when the output files cannot be opened
    /// (profiling failure must not stop the gateway).
    #[must_use]
    pub fn from_env() -> Option<Arc<Self>> {
        let aggregate = std::env::var("ORDO_PROFILE").is_ok_and(|v| v == "1");
        let timing_log = std::env::var_os("ORDO_RPC_TIMING_LOG").map(PathBuf::from);
        if !aggregate && timing_log.is_none() {
            return None;
        }
        let csv_dir = aggregate.then(|| PathBuf::from("./ordo_logs"));
        match Self::new(csv_dir, timing_log) {
            Ok(profiler) => Some(Arc::new(profiler)),
            Err(e) => {
                warn!(error = %e, "profiling disabled: could not open output files");
                None
            }
        }
    }

    /// Build a profiler with explicit outputs. `csv_dir` enables the
    /// per-second aggregate flusher; `timing_log` the per-RPC record file.
    pub fn new(csv_dir: Option<PathBuf>, timing_log: Option<PathBuf>) -> io::Result<Self> {
        let timing_log = match timing_log {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                info!(path = %path.display(), "per-rpc timing log enabled");
                Some(Mutex::new(BufWriter::new(file)))
            }
            None => None,
        };

        let inner = Arc::new(ProfilerInner {
            aggregates: Mutex::new(HashMap::new()),
            timing_log,
            stop: StdMutex::new(false),
            stop_cv: Condvar::new(),
        });

        let flusher = match csv_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                let path = dir.join(format!("rpc_profile_{}.csv", std::process::id()));
                let mut csv = BufWriter::new(
                    OpenOptions::new().create(true).append(true).open(&path)?,
                );
                writeln!(csv, "unix_seconds,opcode,count,min_us,avg_us,max_us")?;
                info!(path = %path.display(), "rpc profile aggregates enabled");
                let inner = Arc::clone(&inner);
                Some(std::thread::spawn(move || flush_loop(&inner, csv)))
            }
            None => None,
        };

        Ok(Self { inner, flusher })
    }

    /// Record one dispatched RPC.
    pub fn record(&self, opcode: OpCode, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.inner
            .aggregates
            .lock()
            .entry(opcode)
            .or_insert(OpAggregate {
                count: 0,
                total_us: 0,
                min_us: u64::MAX,
                max_us: 0,
            })
            .observe(us);

        if let Some(log) = &self.inner.timing_log {
            let mut log = log.lock();
            let _ = writeln!(log, "{},{opcode},{us}", unix_seconds());
        }
    }
}

impl Drop for RpcProfiler {
    fn drop(&mut self) {
        *self
            .inner
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.inner.stop_cv.notify_all();
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.join();
        }
        if let Some(log) = &self.inner.timing_log {
            let _ = log.lock().flush();
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn flush_loop(inner: &ProfilerInner, mut csv: BufWriter<File>) {
    let mut stopped = inner
        .stop
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    loop {
        let (guard, _timeout) = inner
            .stop_cv
            .wait_timeout(stopped, FLUSH_INTERVAL)
            .unwrap_or_else(PoisonError::into_inner);
        stopped = guard;

        let snapshot = std::mem::take(&mut *inner.aggregates.lock());
        if !snapshot.is_empty() {
            let now = unix_seconds();
            for (opcode, agg) in &snapshot {
                let avg = agg.total_us / agg.count.max(1);
                let _ = writeln!(
                    csv,
                    "{now},{opcode},{},{},{avg},{}",
                    agg.count, agg.min_us, agg.max_us
                );
            }
            let _ = csv.flush();
        }

        if *stopped {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ordo_types::OpCode;

    use super::RpcProfiler;

    #[test]
    fn writes_aggregates_and_timing_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let timing = dir.path().join("timings.log");
        let profiler = RpcProfiler::new(Some(dir.path().to_path_buf()), Some(timing.clone()))
            .expect("profiler");

        profiler.record(OpCode::Read, Duration::from_micros(120));
        profiler.record(OpCode::Read, Duration::from_micros(80));
        profiler.record(OpCode::Write, Duration::from_micros(40));
        drop(profiler); // final flush + join

        let timing_contents = std::fs::read_to_string(&timing).expect("timing log");
        assert_eq!(timing_contents.lines().count(), 3);
        assert!(timing_contents.lines().all(|l| l.contains("READ") || l.contains("WRITE")));

        let csv_path = std::fs::read_dir(dir.path())
            .expect("dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|x| x == "csv"))
            .expect("aggregate csv");
        let csv = std::fs::read_to_string(csv_path).expect("csv");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("unix_seconds,opcode,count,min_us,avg_us,max_us")
        );
        // Counts may land in one flush batch or several; sum per opcode.
        let count_for = |op: &str| -> u64 {
            lines
                .clone()
                .filter(|l| l.split(',').nth(1) == Some(op))
                .filter_map(|l| l.split(',').nth(2)?.parse::<u64>().ok())
                .sum()
        };
        assert_eq!(count_for("READ"), 2);
        assert_eq!(count_for("WRITE"), 1);
    }

    #[test]
    fn disabled_outputs_record_without_side_effects() {
        let profiler = RpcProfiler::new(None, None).expect("profiler");
        profiler.record(OpCode::Begin, Duration::from_micros(5));
        drop(profiler);
    }
}
