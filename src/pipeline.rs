use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver};
use log::{debug, info};
use rayon::prelude::*;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::dispatch::{Attempt, Dispatcher, Probe};
use crate::report::Reporter;

/// Shared stop flag checked by workers before each dispatch.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bounded pool dispatches in parallel; oracle checks follow arrival order.
    ///
    /// The catcher cannot say which variant fired, so a detection reported
    /// with one attempt may come from any variant already sent.
    Concurrent,
    /// Each probe is dispatched and checked before the next one leaves.
    Serial,
}

pub struct Pipeline {
    dispatcher: Dispatcher,
    workers: usize,
    mode: Mode,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher, workers: usize, mode: Mode) -> Self {
        Self {
            dispatcher,
            workers: workers.max(1),
            mode,
        }
    }

    pub fn run<W: Write, F: Write>(self, probes: Vec<Probe>, reporter: &mut Reporter<W, F>) -> Result<()> {
        info!(
            "Sending {} probes to {} ({:?}, {} workers)",
            probes.len(),
            self.dispatcher.base(),
            self.mode,
            self.workers
        );
        match self.mode {
            Mode::Serial => run_serial(&self.dispatcher, &probes, reporter),
            Mode::Concurrent => self.run_concurrent(probes, reporter),
        }
    }

    fn run_concurrent<W: Write, F: Write>(self, probes: Vec<Probe>, reporter: &mut Reporter<W, F>) -> Result<()> {
        let cancel = CancelToken::new();
        let (results, coordinator) = fan_out(self.dispatcher, probes, self.workers, cancel.clone())?;

        let mut outcome = Ok(());
        for attempt in results.iter() {
            if let Err(e) = reporter.report(&attempt) {
                cancel.cancel();
                outcome = Err(e);
                break;
            }
        }
        // Unblocks any worker still waiting to send.
        drop(results);

        coordinator
            .join()
            .map_err(|_| anyhow!("dispatch coordinator panicked"))?;
        outcome
    }
}

fn run_serial<W: Write, F: Write>(
    dispatcher: &Dispatcher,
    probes: &[Probe],
    reporter: &mut Reporter<W, F>,
) -> Result<()> {
    for probe in probes {
        match dispatcher.dispatch(probe) {
            Ok(attempt) => reporter.report(&attempt)?,
            Err(e) => debug!("Skipping {:?}: {:#}", probe.variant, e),
        }
    }
    Ok(())
}

/// Dispatches every probe on a pool of `workers` threads.
///
/// Attempts arrive on the returned channel in completion order. The channel
/// closes once the coordinator has seen the whole pool finish; join the handle
/// after draining it. Failed dispatches are logged and produce nothing.
pub fn fan_out(
    dispatcher: Dispatcher,
    probes: Vec<Probe>,
    workers: usize,
    cancel: CancelToken,
) -> Result<(Receiver<Attempt>, JoinHandle<()>)> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("dispatch-{}", i))
        .build()
        .context("failed to build dispatch pool")?;
    let (tx, rx) = bounded(workers);

    let coordinator = thread::Builder::new()
        .name("dispatch-coordinator".to_string())
        .spawn(move || {
            pool.install(|| {
                probes.into_par_iter().for_each_with(tx, |tx, probe| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    match dispatcher.dispatch(&probe) {
                        Ok(attempt) => {
                            if tx.send(attempt).is_err() {
                                cancel.cancel();
                            }
                        }
                        Err(e) => debug!("Skipping {:?}: {:#}", probe.variant, e),
                    }
                });
            });
            debug!("All dispatch workers finished");
        })
        .context("failed to spawn dispatch coordinator")?;

    Ok((rx, coordinator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Oracle;
    use crate::report::PlainFormatter;
    use mockito::{Matcher, Server};
    use std::collections::HashSet;
    use std::io;
    use std::time::Duration;
    use url::Url;

    struct Never;

    impl Oracle for Never {
        fn detected(&self) -> bool {
            false
        }
    }

    fn probes(n: usize) -> Vec<Probe> {
        (0..n)
            .map(|i| Probe::new(format!("X-Probe: {}", i), format!("tok{:07}", i)))
            .collect()
    }

    fn dispatcher(base: &str, proxy: Option<&str>) -> Dispatcher {
        Dispatcher::new(Url::parse(base).unwrap(), proxy, Duration::from_secs(5), false).unwrap()
    }

    fn reporter() -> Reporter<Vec<u8>, Vec<u8>> {
        Reporter::new(Box::new(PlainFormatter), Box::new(Never), Vec::new(), Vec::new())
    }

    #[test]
    fn collector_emits_every_attempt_exactly_once() {
        let mut server = Server::new();
        let _m = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .expect(25)
            .create();

        let (rx, coordinator) =
            fan_out(dispatcher(&server.url(), None), probes(25), 4, CancelToken::new()).unwrap();
        let headers: Vec<String> = rx.iter().map(|a| a.header).collect();
        coordinator.join().unwrap();

        assert_eq!(headers.len(), 25);
        let unique: HashSet<_> = headers.iter().collect();
        assert_eq!(unique.len(), 25);
    }

    #[test]
    fn cancelled_token_dispatches_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let (rx, coordinator) =
            fan_out(dispatcher("http://127.0.0.1:1/", None), probes(5), 2, cancel).unwrap();
        assert_eq!(rx.iter().count(), 0);
        coordinator.join().unwrap();
    }

    struct ClosedConsole;

    impl Write for ClosedConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "console closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reporting_failure_cancels_remaining_dispatches() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .expect_at_most(12)
            .create();

        let mut r = Reporter::new(Box::new(PlainFormatter), Box::new(Never), ClosedConsole, Vec::new());
        let result = Pipeline::new(dispatcher(&server.url(), None), 2, Mode::Concurrent)
            .run(probes(40), &mut r);

        assert!(result.is_err());
        assert_eq!(r.summary().attempts, 1);
        mock.assert();
    }

    #[test]
    fn reporting_failure_stops_serial_run() {
        let mut server = Server::new();
        let mock = server.mock("GET", Matcher::Any).with_status(200).expect(1).create();

        let mut r = Reporter::new(Box::new(PlainFormatter), Box::new(Never), ClosedConsole, Vec::new());
        let result = Pipeline::new(dispatcher(&server.url(), None), 2, Mode::Serial)
            .run(probes(5), &mut r);

        assert!(result.is_err());
        mock.assert();
    }

    #[test]
    fn invalid_proxy_skips_requests_without_failing_run() {
        let mut r = reporter();
        Pipeline::new(dispatcher("http://127.0.0.1:1/", Some("bad proxy:80")), 3, Mode::Concurrent)
            .run(probes(4), &mut r)
            .unwrap();
        assert_eq!(r.summary().attempts, 0);
    }

    #[test]
    fn serial_mode_reports_in_dispatch_order() {
        let mut server = Server::new();
        let _m = server.mock("GET", Matcher::Any).with_status(200).create();

        let mut r = reporter();
        Pipeline::new(dispatcher(&server.url(), None), 8, Mode::Serial)
            .run(probes(3), &mut r)
            .unwrap();

        let (summary, console, _) = r.finish().unwrap();
        assert_eq!(summary.attempts, 3);
        let console = String::from_utf8(console).unwrap();
        let order: Vec<&str> = console.lines().collect();
        assert!(order[0].contains("[X-Probe: 0]"));
        assert!(order[1].contains("[X-Probe: 1]"));
        assert!(order[2].contains("[X-Probe: 2]"));
    }

    #[test]
    fn concurrent_run_reports_all_attempts() {
        let mut server = Server::new();
        let _m = server.mock("GET", Matcher::Any).with_status(200).create();

        let mut r = reporter();
        Pipeline::new(dispatcher(&server.url(), None), 4, Mode::Concurrent)
            .run(probes(10), &mut r)
            .unwrap();
        assert_eq!(r.summary().attempts, 10);
    }
}
