//! Drives a [`PollingSession`] against a [`StatusSource`] and feeds the
//! reconciled state to a [`Presenter`].
//!
//! Everything runs on one task: timer ticks, start requests and stop
//! requests are handled one at a time, and the only suspension points are
//! the two remote calls. While a status fetch is outstanding only `Stop` and
//! shutdown are acted on immediately (they invalidate the fetch); other
//! commands wait for the fetch to settle.

use std::time::Duration;

use migration_monitor_api_client::TransportError;
use migration_monitor_api_types::RawStatusPayload;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::log::LogReconciler;
use crate::presenter::Presenter;
use crate::progress::{reconcile, ReconciledState};
use crate::session::{FetchToken, PollingSession};
use crate::source::StatusSource;

/// Default poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Rows from the bottom of the log view still treated as "at the bottom".
    pub scroll_tolerance: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            scroll_tolerance: 2,
        }
    }
}

/// User-initiated requests delivered to [`PollingController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    ClearLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The server launched a new migration.
    Started(String),
    /// The server already had one running; polling now observes it.
    AlreadyRunning(String),
    /// This controller was already polling; nothing was sent.
    AlreadyPolling,
}

/// Everything [`PollingController::run`] listens to besides the timer.
struct Inbox {
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    shutdown: watch::Receiver<bool>,
    shutdown_open: bool,
}

impl Inbox {
    /// Interpret a `changed()` result; a dropped sender disables the branch.
    fn shutdown_requested(&mut self, changed: std::result::Result<(), watch::error::RecvError>) -> bool {
        match changed {
            Ok(()) => *self.shutdown.borrow(),
            Err(_) => {
                self.shutdown_open = false;
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickEnd {
    Continue,
    Shutdown,
}

pub struct PollingController<S, P> {
    source: S,
    presenter: P,
    session: PollingSession,
    log: LogReconciler,
    last_state: Option<ReconciledState>,
    last_error: Option<MonitorError>,
}

impl<S: StatusSource, P: Presenter> PollingController<S, P> {
    pub fn new(source: S, presenter: P, config: &PollingConfig) -> Self {
        Self::with_session(
            source,
            presenter,
            PollingSession::new(config.interval),
            LogReconciler::new(config.scroll_tolerance),
        )
    }

    /// Build around an existing session, e.g. one handed back by
    /// [`PollingController::into_session`].
    pub fn with_session(source: S, presenter: P, session: PollingSession, log: LogReconciler) -> Self {
        Self {
            source,
            presenter,
            session,
            log,
            last_state: None,
            last_error: None,
        }
    }

    pub fn session(&self) -> &PollingSession {
        &self.session
    }

    pub fn into_session(self) -> PollingSession {
        self.session
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn log(&self) -> &LogReconciler {
        &self.log
    }

    pub fn last_state(&self) -> Option<&ReconciledState> {
        self.last_state.as_ref()
    }

    /// Last rendered state, or the error that ended observation: a transport
    /// failure, a rejected start, or a server-reported `error` phase.
    pub fn outcome(&self) -> Result<Option<&ReconciledState>> {
        match &self.last_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.last_state.as_ref()),
        }
    }

    /// User start request: `Stopped → Starting → Polling`, or back to
    /// `Stopped` with the error rendered. A no-op while already polling.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        let Some(token) = self.session.begin_start() else {
            debug!("start requested while polling, keeping the existing timer");
            return Ok(StartOutcome::AlreadyPolling);
        };

        self.last_error = None;
        self.present(ReconciledState::pending_start());
        info!("Requesting migration start");

        match self.source.request_start().await {
            Err(e) => {
                self.session.finish_start(token, false);
                warn!("Start request failed: {e}");
                self.present(ReconciledState::start_failed(&e));
                Err(self.fail(e.into()))
            }
            Ok(ack) if !ack.accepted() => {
                self.session.finish_start(token, false);
                warn!("Server rejected start: {}", ack.message);
                let state = ReconciledState::start_rejected(&ack.message);
                let err = MonitorError::StartRejected(state.display_message.clone());
                self.present(state);
                Err(self.fail(err))
            }
            Ok(ack) => {
                self.session.finish_start(token, true);
                if ack.already_running() {
                    info!("Migration already running on server, polling");
                    Ok(StartOutcome::AlreadyRunning(ack.message))
                } else {
                    info!("Migration started, polling every {:?}", self.session.period());
                    Ok(StartOutcome::Started(ack.message))
                }
            }
        }
    }

    /// Initial status check. Renders what the server reports and resumes
    /// polling when a migration is already active server-side.
    pub async fn observe(&mut self) -> Result<ReconciledState> {
        match self.source.fetch_status().await {
            Ok(payload) => {
                let state = self.apply_payload(&payload);
                if state.phase.is_active() {
                    if self.session.resume() {
                        info!(phase = %state.phase, "Server reports an active migration, resuming observation");
                    }
                } else if self.session.is_active() {
                    self.session.stop();
                }
                Ok(state)
            }
            Err(e) => {
                warn!("Initial status check failed: {e}");
                self.present(ReconciledState::unreachable(&e));
                Err(self.fail(e.into()))
            }
        }
    }

    /// Cancel the timer. A fetch still in flight will be discarded.
    pub fn stop(&mut self) {
        if self.session.is_active() {
            info!("Polling stopped");
        }
        self.session.stop();
    }

    /// Empty the rendered log until the next snapshot arrives.
    pub fn clear_log(&mut self) {
        self.log.clear();
        if let Some(state) = &self.last_state {
            self.presenter.render(state, &self.log.view());
        }
    }

    /// Poll until the session stops on its own, without taking commands.
    pub async fn poll_until_stopped(&mut self, shutdown: watch::Receiver<bool>) {
        let (_, commands) = mpsc::channel(1);
        self.run(commands, shutdown).await;
    }

    /// Event loop: timer ticks, user commands and shutdown. Returns on
    /// shutdown, or once polling has stopped and the command channel is
    /// closed.
    pub async fn run(&mut self, commands: mpsc::Receiver<Command>, shutdown: watch::Receiver<bool>) {
        let mut inbox = Inbox {
            commands,
            commands_open: true,
            shutdown,
            shutdown_open: true,
        };

        loop {
            if !inbox.commands_open && !self.session.is_active() {
                debug!("polling stopped and no further commands, leaving loop");
                break;
            }

            tokio::select! {
                token = self.session.next_tick() => {
                    if let Some(token) = token {
                        if self.poll_tick(token, &mut inbox).await == TickEnd::Shutdown {
                            break;
                        }
                    }
                }
                cmd = inbox.commands.recv(), if inbox.commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => inbox.commands_open = false,
                },
                changed = inbox.shutdown.changed(), if inbox.shutdown_open => {
                    if inbox.shutdown_requested(changed) {
                        info!("Shutdown requested");
                        self.stop();
                        break;
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start => {
                if let Err(e) = self.start().await {
                    debug!("start command failed: {e}");
                }
            }
            Command::Stop => self.stop(),
            Command::ClearLog => self.clear_log(),
        }
    }

    /// One fetch. `Stop` and shutdown cut it short; other commands run once
    /// it settles.
    async fn poll_tick(&mut self, token: FetchToken, inbox: &mut Inbox) -> TickEnd {
        debug!(generation = self.session.generation(), "poll tick");
        let mut deferred = Vec::new();

        let result = {
            let fetch = self.source.fetch_status();
            tokio::pin!(fetch);
            loop {
                tokio::select! {
                    biased;
                    result = &mut fetch => break Some(result),
                    changed = inbox.shutdown.changed(), if inbox.shutdown_open => {
                        if inbox.shutdown_requested(changed) {
                            info!("Shutdown requested while a status fetch was in flight");
                            self.session.stop();
                            break None;
                        }
                    }
                    cmd = inbox.commands.recv(), if inbox.commands_open => match cmd {
                        Some(Command::Stop) => {
                            info!("Polling stopped while a status fetch was in flight");
                            self.session.stop();
                        }
                        Some(other) => deferred.push(other),
                        None => inbox.commands_open = false,
                    },
                }
            }
        };

        let Some(result) = result else {
            return TickEnd::Shutdown;
        };
        self.apply_fetch(token, result);

        for cmd in deferred {
            self.handle_command(cmd).await;
        }
        TickEnd::Continue
    }

    fn apply_fetch(&mut self, token: FetchToken, result: std::result::Result<RawStatusPayload, TransportError>) {
        if !self.session.accept(token) {
            debug!("discarding status response from a cancelled poll");
            return;
        }

        match result {
            Ok(payload) => {
                let state = self.apply_payload(&payload);
                if state.is_terminal {
                    info!(phase = %state.phase, "Migration reached a terminal phase");
                    self.session.stop();
                } else if !state.phase.is_active() {
                    // The server lost or never had a migration.
                    info!(phase = %state.phase, "Server reports no active migration");
                    self.session.stop();
                } else {
                    self.presenter.render_activity_tick();
                }
            }
            Err(e) => {
                warn!("Status fetch failed, polling stopped: {e}");
                self.session.stop();
                self.present(ReconciledState::fetch_failed(&e));
                self.fail(e.into());
            }
        }
    }

    /// Reconcile, merge the log snapshot and render.
    fn apply_payload(&mut self, payload: &RawStatusPayload) -> ReconciledState {
        let state = reconcile(payload);
        let position = self.presenter.scroll_position();
        let view = self.log.merge(&payload.logs, position);
        self.presenter.render(&state, &view);

        self.last_error = state
            .is_error
            .then(|| MonitorError::ServerReported(state.display_message.clone()));
        self.last_state = Some(state.clone());
        state
    }

    /// Render a client-side state alongside the current log.
    fn present(&mut self, state: ReconciledState) {
        self.presenter.render(&state, &self.log.view());
        self.last_state = Some(state);
    }

    fn fail(&mut self, err: MonitorError) -> MonitorError {
        self.last_error = Some(err.clone());
        err
    }
}
