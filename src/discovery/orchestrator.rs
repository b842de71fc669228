//! The bounded discovery orchestrator.
//!
//! # Overview
//!
//! [`DiscoveryOrchestrator`] runs one time-boxed discovery session. It
//! starts the scanner and arms four local tasks:
//!
//! - a fast drain tick that empties the backlog,
//! - a progress tick,
//! - a one-shot deadline at `started_at + max_duration`,
//! - forwarders for scanner events and operator interrupts.
//!
//! All tasks post [`Signal`]s to one channel. The orchestrator handles them
//! one at a time, so the session state needs no locking.
//!
//! # Termination
//!
//! Scanner completion, interrupts, the deadline and the periodic re-check
//! all end up in `check_and_terminate`:
//!
//! 1. An empty backlog ends the session.
//! 2. Otherwise an exhausted budget ends it with
//!    [`TerminationTrigger::DeadlineExceeded`].
//! 3. Otherwise a re-check is scheduled and the session is *settling*:
//!    the first drain tick that empties the backlog asks for another check
//!    straight away.
//!
//! Every path out of a running session disconnects the scanner.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::MissedTickBehavior;

use super::session::{DiscoverySession, SessionReport, SessionTimings, TerminationTrigger};
use super::timer::TimerSlot;
use super::{
    Backlog, DiscoveryError, Scanner, ScannerError, ScannerEvent, ScannerEvents, TerminateSignal,
};
use crate::progress::{DiscoveryProgress, NoProgress, ProgressSnapshot};
use crate::signal::InterruptListener;

/// Callbacks delivered to the orchestrator's loop.
#[derive(Debug)]
enum Signal {
    ScannerFinished,
    ScannerFailed(ScannerError),
    Interrupt,
    Deadline,
    Recheck,
    BacklogSettled,
    Terminate(TerminateSignal),
}

type Outcome = Result<SessionReport, DiscoveryError>;

/// Runs a single bounded discovery session.
///
/// Must be driven inside a `tokio::task::LocalSet`.
pub struct DiscoveryOrchestrator<S, B> {
    scanner: S,
    backlog: Rc<B>,
    timings: SessionTimings,
    label: String,
    progress: Rc<dyn DiscoveryProgress>,
    interrupts: InterruptListener,
}

impl<S, B> DiscoveryOrchestrator<S, B>
where
    S: Scanner,
    B: Backlog + 'static,
{
    /// Create an orchestrator for one session.
    #[must_use]
    pub fn new(scanner: S, backlog: Rc<B>, timings: SessionTimings) -> Self {
        Self {
            scanner,
            backlog,
            timings,
            label: "network".to_string(),
            progress: Rc::new(NoProgress),
            interrupts: InterruptListener::none(),
        }
    }

    /// Name shown by the progress reporter and in logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Attach a progress reporter.
    #[must_use]
    pub fn with_progress(mut self, progress: Rc<dyn DiscoveryProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Attach the interrupt source for this session.
    #[must_use]
    pub fn with_interrupts(mut self, interrupts: InterruptListener) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Run the session until it terminates.
    ///
    /// Deadline and interrupt are reported through
    /// [`SessionReport::trigger`], not as errors.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::InvalidTimings`] if the timings are inconsistent
    /// - [`DiscoveryError::Scanner`] if the scanner fails to start or fails
    ///   while producing
    /// - [`DiscoveryError::Terminate`] if draining raised a terminate signal
    ///
    /// # Panics
    ///
    /// Panics if not called inside a `tokio::task::LocalSet`.
    pub async fn run(self) -> Outcome {
        let Self {
            mut scanner,
            backlog,
            timings,
            label,
            progress,
            interrupts,
        } = self;

        timings.validate()?;

        log::info!(
            "Starting discovery on {} (budget {:?}, re-check every {:?})",
            label,
            timings.max_duration,
            timings.recheck_interval
        );
        progress.on_start(&label, timings.max_duration);
        let session = DiscoverySession::begin(timings);

        let events = match scanner.discover() {
            Ok(events) => events,
            Err(e) => {
                log::error!("Scanner failed to start: {}", e);
                scanner.disconnect();
                progress.on_finish(None);
                return Err(e.into());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = Control::new(session, scanner, backlog, progress, tx);
        control.arm_drain();
        control.arm_progress();
        control.arm_deadline();
        control.forward_events(events);
        control.forward_interrupts(interrupts);

        while let Some(signal) = rx.recv().await {
            if let Some(outcome) = control.handle(signal) {
                return outcome;
            }
        }

        // The control block holds a sender, so the channel cannot close first.
        control.shutdown(None);
        Err(ScannerError::Unavailable("session signal channel closed".into()).into())
    }
}

/// Mutable state of a running session. Owned by the orchestrator loop.
struct Control<S, B> {
    session: DiscoverySession,
    scanner: S,
    backlog: Rc<B>,
    progress: Rc<dyn DiscoveryProgress>,
    tx: UnboundedSender<Signal>,
    drained: Rc<Cell<usize>>,
    settling: Rc<Cell<bool>>,
    interrupted: bool,
    terminated: bool,
    drain_timer: TimerSlot,
    progress_timer: TimerSlot,
    deadline_timer: TimerSlot,
    recheck_timer: TimerSlot,
    event_forwarder: TimerSlot,
    interrupt_forwarder: TimerSlot,
}

impl<S, B> Control<S, B>
where
    S: Scanner,
    B: Backlog + 'static,
{
    fn new(
        session: DiscoverySession,
        scanner: S,
        backlog: Rc<B>,
        progress: Rc<dyn DiscoveryProgress>,
        tx: UnboundedSender<Signal>,
    ) -> Self {
        Self {
            session,
            scanner,
            backlog,
            progress,
            tx,
            drained: Rc::new(Cell::new(0)),
            settling: Rc::new(Cell::new(false)),
            interrupted: false,
            terminated: false,
            drain_timer: TimerSlot::new("drain"),
            progress_timer: TimerSlot::new("progress"),
            deadline_timer: TimerSlot::new("deadline"),
            recheck_timer: TimerSlot::new("recheck"),
            event_forwarder: TimerSlot::new("scanner events"),
            interrupt_forwarder: TimerSlot::new("interrupt"),
        }
    }

    fn arm_drain(&mut self) {
        let backlog = Rc::clone(&self.backlog);
        let drained = Rc::clone(&self.drained);
        let settling = Rc::clone(&self.settling);
        let tx = self.tx.clone();
        let period = self.session.timings().drain_interval;

        self.drain_timer.arm(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut processed = 0;
                loop {
                    match backlog.drain() {
                        Ok(true) => processed += 1,
                        Ok(false) => break,
                        Err(signal) => {
                            let _ = tx.send(Signal::Terminate(signal));
                            return;
                        }
                    }
                }
                if processed > 0 {
                    drained.set(drained.get() + processed);
                    log::trace!("Drained {} discovery results", processed);
                    if settling.get() && backlog.is_empty() {
                        let _ = tx.send(Signal::BacklogSettled);
                    }
                }
            }
        });
    }

    fn arm_progress(&mut self) {
        let progress = Rc::clone(&self.progress);
        let drained = Rc::clone(&self.drained);
        let session = self.session;
        let timings = *session.timings();

        self.progress_timer.arm(async move {
            let mut ticker = tokio::time::interval(timings.progress_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                progress.on_tick(&ProgressSnapshot {
                    elapsed: session.elapsed(),
                    max_duration: timings.max_duration,
                    drained: drained.get(),
                });
            }
        });
    }

    fn arm_deadline(&mut self) {
        let tx = self.tx.clone();
        let deadline = self.session.deadline();
        self.deadline_timer.arm(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(Signal::Deadline);
        });
    }

    fn arm_recheck(&mut self) {
        let tx = self.tx.clone();
        let delay = self.session.timings().recheck_interval;
        self.recheck_timer.arm(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::Recheck);
        });
    }

    fn forward_events(&mut self, mut events: ScannerEvents) {
        let tx = self.tx.clone();
        self.event_forwarder.arm(async move {
            while let Some(event) = events.recv().await {
                let signal = match event {
                    ScannerEvent::Finished => Signal::ScannerFinished,
                    ScannerEvent::Failed(e) => Signal::ScannerFailed(e),
                };
                if tx.send(signal).is_err() {
                    break;
                }
            }
        });
    }

    fn forward_interrupts(&mut self, mut interrupts: InterruptListener) {
        let tx = self.tx.clone();
        self.interrupt_forwarder.arm(async move {
            while interrupts.recv().await.is_some() {
                if tx.send(Signal::Interrupt).is_err() {
                    break;
                }
            }
        });
    }

    fn handle(&mut self, signal: Signal) -> Option<Outcome> {
        if self.terminated {
            log::debug!("Ignoring {:?} after termination", signal);
            return None;
        }

        match signal {
            Signal::ScannerFinished => {
                log::debug!("Scanner finished after {:?}", self.session.elapsed());
                self.scanner.disconnect();
                self.check_and_terminate()
            }
            Signal::Interrupt => {
                log::info!("Discovery interrupted, waiting for pending results");
                self.interrupted = true;
                self.scanner.disconnect();
                self.check_and_terminate()
            }
            Signal::Deadline => self.check_and_terminate(),
            Signal::Recheck => {
                self.recheck_timer.cancel();
                self.check_and_terminate()
            }
            Signal::BacklogSettled => {
                if self.settling.get() {
                    self.check_and_terminate()
                } else {
                    None
                }
            }
            Signal::ScannerFailed(e) => {
                log::error!("Scanner failed during discovery: {}", e);
                self.shutdown(None);
                Some(Err(e.into()))
            }
            Signal::Terminate(signal) => {
                log::error!("Discovery terminated: {}", signal);
                self.shutdown(None);
                Some(Err(DiscoveryError::Terminate(signal)))
            }
        }
    }

    fn check_and_terminate(&mut self) -> Option<Outcome> {
        if self.terminated {
            return None;
        }

        if self.backlog.is_empty() {
            let trigger = if self.interrupted {
                TerminationTrigger::ExternalInterrupt
            } else {
                TerminationTrigger::NaturalCompletion
            };
            return Some(Ok(self.terminate(trigger)));
        }

        if self.session.is_over_budget() {
            log::error!(
                "Discovery exceeded its time budget of {:?} and was terminated with results still pending",
                self.session.timings().max_duration
            );
            return Some(Ok(self.terminate(TerminationTrigger::DeadlineExceeded)));
        }

        self.settling.set(true);
        if !self.recheck_timer.is_armed() {
            self.arm_recheck();
        }
        None
    }

    fn terminate(&mut self, trigger: TerminationTrigger) -> SessionReport {
        self.shutdown(Some(trigger));
        let report = SessionReport {
            trigger,
            elapsed: self.session.elapsed(),
            drained: self.drained.get(),
        };
        log::info!(
            "Discovery {} after {:.1}s, {} results processed",
            trigger,
            report.elapsed.as_secs_f64(),
            report.drained
        );
        report
    }

    /// Stop every timer and the scanner. Returns `false` if already done.
    fn shutdown(&mut self, trigger: Option<TerminationTrigger>) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;

        // Stop production before anything else.
        self.scanner.disconnect();
        self.drain_timer.cancel();
        self.progress_timer.cancel();
        self.deadline_timer.cancel();
        self.recheck_timer.cancel();
        self.event_forwarder.cancel();
        self.interrupt_forwarder.cancel();
        self.progress.on_finish(trigger);
        true
    }
}
