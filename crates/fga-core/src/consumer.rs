//! Consumer loop: a single, long-lived worker that drains the channel and
//! dispatches requests. The main loop itself stays a plain blocking loop on
//! its own OS thread, single-threaded for queue draining, while each
//! drained batch is handed off to the `tokio` runtime so RPC submission
//! never blocks the next drain. Grounded on `span_collector::async_bridge`'s
//! poll-then-spawn-then-reap shape, adapted from a `tokio::select!` poll
//! loop to a blocking latch wait since the drain side has no async runtime
//! of its own here.

use crate::host::{HostEnv, LatchId, LatchWait, LogLevel};
use crate::stats::Stats;
use fga_channel::Channel;
use fga_transport::Dispatcher;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::task::JoinSet;

/// Upper bound on slots drained per iteration.
const DRAIN_CAP: usize = 64;

/// How long the blocking wait blocks before re-checking the shutdown flag.
/// Not a polling interval in the "wasted wakeups" sense — `wait_and_drain`
/// still returns immediately on a real signal; this timeout only bounds how
/// long shutdown can take to notice the loop should stop.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(250);

pub struct ConsumerLoop {
    channel: Arc<Channel>,
    dispatcher: Arc<Dispatcher>,
    host: Arc<dyn HostEnv>,
    stats: Arc<Stats>,
    runtime: tokio::runtime::Handle,
    stopping: Arc<AtomicBool>,
    inflight: Arc<Mutex<JoinSet<()>>>,
    thread: Option<JoinHandle<()>>,
}

impl ConsumerLoop {
    /// Spawns the blocking drain loop on its own thread. `channel` must have
    /// been constructed with `host.latch_handle(LatchId::Consumer)` as its
    /// consumer latch so `host.set_latch(LatchId::Consumer)` actually wakes
    /// it (the host's reload/term signal plumbing would call that).
    pub fn spawn(
        channel: Arc<Channel>,
        dispatcher: Arc<Dispatcher>,
        host: Arc<dyn HostEnv>,
        stats: Arc<Stats>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let inflight = Arc::new(Mutex::new(JoinSet::new()));

        let thread = {
            let channel = Arc::clone(&channel);
            let dispatcher = Arc::clone(&dispatcher);
            let host = Arc::clone(&host);
            let stats = Arc::clone(&stats);
            let runtime = runtime.clone();
            let stopping = Arc::clone(&stopping);
            let inflight = Arc::clone(&inflight);
            std::thread::Builder::new()
                .name("fga-consumer".into())
                .spawn(move || {
                    host.log(LogLevel::Info, "consumer", "consumer loop starting");
                    loop {
                        if stopping.load(Ordering::Acquire) {
                            break;
                        }
                        let indices = channel.wait_and_drain(DRAIN_CAP, Some(SHUTDOWN_CHECK_INTERVAL));
                        if indices.is_empty() {
                            continue;
                        }

                        let mut batch = Vec::with_capacity(indices.len());
                        for idx in indices {
                            if let Some(request) = channel.slot(idx).begin_processing() {
                                batch.push((idx, request));
                            }
                            // `None`: the producer cancelled between enqueue and
                            // here, the slot was already reset. Nothing to do.
                        }
                        if batch.is_empty() {
                            continue;
                        }

                        // Registering the spawn synchronously, on this thread, is what
                        // makes `shutdown`'s later join-drain complete: if this were
                        // instead handed to `runtime.spawn` as a fire-and-forget async
                        // block, `shutdown` could race it — joining this thread, then
                        // draining `inflight` before the async block ever got scheduled
                        // to insert the task into the set.
                        let _guard = runtime.enter();
                        let mut set = inflight.lock();
                        set.spawn(dispatch_and_complete(
                            Arc::clone(&channel),
                            Arc::clone(&dispatcher),
                            Arc::clone(&host),
                            Arc::clone(&stats),
                            batch,
                        ));
                        // Reap anything already finished so the set doesn't grow
                        // unbounded across a long-running loop.
                        while let Some(Ok(())) | Some(Err(_)) = set.try_join_next() {}
                        drop(set);
                        drop(_guard);
                    }
                    host.log(LogLevel::Info, "consumer", "consumer loop stopped accepting new work");
                })
                .expect("failed to spawn consumer thread")
        };

        Self {
            channel,
            dispatcher,
            host,
            stats,
            runtime,
            stopping,
            inflight,
            thread: Some(thread),
        }
    }

    /// Stops accepting new work, waits for in-flight dispatches to finish,
    /// deregisters nothing further (the host owns the latch's lifetime),
    /// and joins the drain thread.
    pub fn shutdown(mut self) {
        self.stopping.store(true, Ordering::Release);
        // Wake the drain loop immediately rather than waiting out the next
        // shutdown-check timeout.
        self.host.set_latch(LatchId::Consumer);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // `thread.join()` above guarantees the drain loop has stopped
        // registering new spawns, so `inflight` is only ever touched here
        // from this point on, and holding the lock across the `block_on`
        // below is uncontended.
        let mut set = self.inflight.lock();
        self.runtime.block_on(async { while set.join_next().await.is_some() {} });
        self.host.log(LogLevel::Info, "consumer", "consumer loop drained and exited");
    }
}

async fn dispatch_and_complete(
    channel: Arc<Channel>,
    dispatcher: Arc<Dispatcher>,
    host: Arc<dyn HostEnv>,
    stats: Arc<Stats>,
    batch: Vec<(usize, fga_proto::RequestVariant)>,
) {
    let results = dispatcher.dispatch_batch(batch).await;
    for dispatched in results {
        let ok = dispatched.response.is_ok();
        if ok {
            stats.record_dispatched();
        } else {
            stats.record_failed();
        }
        let producer_id = channel.slot(dispatched.token).producer_id();
        if channel.slot(dispatched.token).complete(dispatched.response, ok) {
            host.set_latch(LatchId::Producer(producer_id));
        }
        // `complete` returning `false` means the producer cancelled and the
        // slot was already reset; the result is discarded rather than
        // written into a slot nobody is waiting on anymore.
    }
}

/// Whether the host should treat the consumer as having died, e.g. on a
/// consumer process restart while producers are still waiting. Not driven
/// by `ConsumerLoop` itself — a real supervisor would call `host.set_latch`
/// for every waiting producer with an error state after observing this.
pub fn is_postmaster_alive(outcome: LatchWait) -> bool {
    !matches!(outcome, LatchWait::PostmasterDied)
}
