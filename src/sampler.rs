use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::aggregator::StatusAggregator;
use crate::collectors::{CpuSource, HardwareSource, ProcessSource};
use crate::error::{AgentError, Result};
use crate::sinks::Sink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Running,
    StopRequested,
    Stopped,
}

struct LoopControl {
    state: Mutex<LoopState>,
    wakeup: Condvar,
    stopping: AtomicBool,
}

impl LoopControl {
    fn set(&self, state: LoopState) {
        *self.state.lock() = state;
        self.wakeup.notify_all();
    }

    /// Blocks for `interval` or until a stop is requested.
    /// Returns true if the loop should keep running.
    fn wait_next_tick(&self, interval: Duration) -> bool {
        let mut state = self.state.lock();
        self.wakeup
            .wait_while_for(&mut state, |state| *state == LoopState::Running, interval);
        *state == LoopState::Running
    }
}

/// Requests the sampling loop to stop. Cheap to clone and safe to call from
/// any thread, including a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<LoopControl>,
}

impl StopHandle {
    /// Only the first call has an effect; returns whether this call was it
    pub fn stop(&self) -> bool {
        if self.control.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }

        let mut state = self.control.state.lock();
        if matches!(*state, LoopState::Created | LoopState::Running) {
            *state = LoopState::StopRequested;
        }
        self.control.wakeup.notify_all();
        true
    }

    pub fn state(&self) -> LoopState {
        *self.control.state.lock()
    }

    /// Blocks until the worker has left the loop
    pub fn wait_stopped(&self) {
        let mut state = self.control.state.lock();
        self.control
            .wakeup
            .wait_while(&mut state, |state| *state != LoopState::Stopped);
    }
}

/// Drives the aggregator on a fixed interval and hands every snapshot to a
/// sink. The worker thread started by `start` owns the hardware source for
/// its whole life and shuts it down on exit.
pub struct SamplingLoop<H, P, C, S> {
    aggregator: StatusAggregator<H, P, C>,
    sink: S,
    interval: Duration,
    control: Arc<LoopControl>,
}

impl<H, P, C, S> SamplingLoop<H, P, C, S>
where
    H: HardwareSource + Send + 'static,
    P: ProcessSource + Send + 'static,
    C: CpuSource + Send + 'static,
    S: Sink + Send + 'static,
{
    pub fn new(aggregator: StatusAggregator<H, P, C>, sink: S, interval: Duration) -> Self {
        Self {
            aggregator,
            sink,
            interval,
            control: Arc::new(LoopControl {
                state: Mutex::new(LoopState::Created),
                wakeup: Condvar::new(),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn start(self) -> Result<RunningLoop> {
        {
            let mut state = self.control.state.lock();
            if *state != LoopState::Created {
                return Err(AgentError::loop_state(format!(
                    "cannot start a loop in state {:?}",
                    *state
                )));
            }
            *state = LoopState::Running;
        }

        let handle = self.stop_handle();
        let control = Arc::clone(&self.control);
        let spawned = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || self.run());

        match spawned {
            Ok(worker) => Ok(RunningLoop { handle, worker }),
            Err(e) => {
                control.set(LoopState::Stopped);
                Err(AgentError::Io(e))
            }
        }
    }

    /// Starts the loop and blocks until it has stopped. A stop requested
    /// before the loop started is a clean exit with no tick taken.
    pub fn run_until_stopped(self) -> Result<()> {
        let handle = self.stop_handle();
        match self.start() {
            Ok(running) => running.join(),
            Err(AgentError::Loop(_)) if handle.state() == LoopState::StopRequested => {
                log::info!("Stop requested before sampling started");
                handle.control.set(LoopState::Stopped);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn run(mut self) {
        log::info!("Sampling every {:?}", self.interval);
        let mut ticks: u64 = 0;

        loop {
            self.tick(ticks == 0);
            ticks += 1;

            if !self.control.wait_next_tick(self.interval) {
                break;
            }
        }

        self.aggregator.shutdown();
        self.control.set(LoopState::Stopped);
        log::info!("Sampling stopped after {} ticks", ticks);
    }

    /// One tick. Sink errors and panics are logged and never end the loop.
    fn tick(&mut self, first_tick: bool) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
            if first_tick {
                let info = self.aggregator.system_info();
                if let Err(e) = self.sink.emit_header(&info) {
                    log::error!("Failed to emit system info: {}", e);
                }
            }

            let snapshot = self.aggregator.sample_once();
            log::debug!(
                "Sampled {} devices, {} processes",
                snapshot.devices.len(),
                snapshot.processes.len()
            );
            self.sink.emit(&snapshot, first_tick)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to emit snapshot: {}", e),
            Err(payload) => log::error!("Sampling tick panicked: {}", panic_message(&*payload)),
        }
    }
}

/// A loop running on its worker thread
pub struct RunningLoop {
    handle: StopHandle,
    worker: JoinHandle<()>,
}

impl RunningLoop {
    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LoopState {
        self.handle.state()
    }

    /// Waits for the worker to finish
    pub fn join(self) -> Result<()> {
        self.worker
            .join()
            .map_err(|payload| {
                AgentError::loop_state(format!("worker panicked: {}", panic_message(&*payload)))
            })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
