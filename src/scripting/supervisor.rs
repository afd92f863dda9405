// src/scripting/supervisor.rs — Run a script job on a worker thread under a deadline
//
// Rhai has no preemption point the host can use from outside, so a timed
// call moves the whole runtime onto a worker thread and waits for it. If the
// deadline passes first the runtime is abandoned: the abort flag makes the
// worker stop at its next interpreter operation and the worker drops the
// runtime when it exits. The runtime is never handed back, so the owning
// engine must treat a timeout as the end of its life.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use rhai::Dynamic;

use crate::scripting::error::ScriptError;
use crate::scripting::runtime::Runtime;

pub enum Outcome {
    /// The job finished in time; the runtime comes back to the caller.
    Finished {
        runtime: Runtime,
        result: Result<Dynamic, ScriptError>,
    },
    /// The deadline passed. The runtime has been abandoned.
    TimedOut,
    /// The worker could not be started or died without reporting back.
    Lost(ScriptError),
}

pub fn run<F>(runtime: Runtime, timeout: Duration, label: &str, job: F) -> Outcome
where
    F: FnOnce(&mut Runtime) -> Result<Dynamic, ScriptError> + Send + 'static,
{
    let abort = runtime.abort_flag();
    let (tx, rx) = mpsc::sync_channel(1);

    let spawned = thread::Builder::new()
        .name(format!("script-{label}"))
        .spawn(move || {
            let mut runtime = runtime;
            let result = job(&mut runtime);
            // The receiver is gone after a timeout; the runtime is dropped here.
            let _ = tx.send((runtime, result));
        });

    if let Err(e) = spawned {
        return Outcome::Lost(ScriptError::Io(e));
    }

    match rx.recv_timeout(timeout) {
        Ok((runtime, result)) => Outcome::Finished { runtime, result },
        Err(RecvTimeoutError::Timeout) => {
            abort.store(true, Ordering::Relaxed);
            tracing::warn!(
                "Script call '{}' exceeded {:?}, abandoning its runtime",
                label,
                timeout
            );
            Outcome::TimedOut
        }
        Err(RecvTimeoutError::Disconnected) => Outcome::Lost(ScriptError::WorkerLost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::capabilities::test_support::context;
    use crate::scripting::runtime::RuntimeLimits;

    fn runtime() -> Runtime {
        Runtime::new(&context(), &RuntimeLimits::default())
    }

    #[test]
    fn test_finishes_in_time() {
        let outcome = run(runtime(), Duration::from_secs(5), "quick", |rt| {
            rt.eval("quick", "40 + 2")
        });
        match outcome {
            Outcome::Finished { result, .. } => assert_eq!(result.unwrap().as_int().unwrap(), 42),
            _ => panic!("expected the job to finish"),
        }
    }

    #[test]
    fn test_runtime_state_survives_a_finished_job() {
        let outcome = run(runtime(), Duration::from_secs(5), "define", |rt| {
            rt.eval("define", "fn answer() { 42 }")
        });
        let Outcome::Finished { mut runtime, .. } = outcome else {
            panic!("expected the job to finish");
        };
        let value = runtime.call_function("answer", vec![]).unwrap();
        assert_eq!(value.as_int().unwrap(), 42);
    }

    #[test]
    fn test_times_out_on_busy_loop() {
        let outcome = run(runtime(), Duration::from_millis(100), "spin", |rt| {
            rt.eval("spin", "loop { }")
        });
        assert!(matches!(outcome, Outcome::TimedOut));
    }

    #[test]
    fn test_panicking_job_is_lost() {
        let outcome = run(runtime(), Duration::from_secs(5), "panic", |_rt| {
            panic!("job panicked")
        });
        assert!(matches!(outcome, Outcome::Lost(ScriptError::WorkerLost)));
    }
}
