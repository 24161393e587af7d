//! Editing session runtime.
//!
//! A [`Session`] owns one document for the lifetime of an editing view. It
//! reacts to three kinds of wakeups, one at a time:
//!
//! - host events arriving through a [`SessionHandle`]
//! - completion of the single in-flight save
//! - the earlier of the scheduler's two deadlines
//!
//! All state lives in the session task; the handle only sends events and
//! reads the published [`SaveStatus`].

use crate::config::{ConflictPolicy, SessionConfig};
use crate::error::SessionError;
use crate::remote::RemoteStore;
use crate::sync::SyncClient;
use chrono::Utc;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use storysync_engine::{
    Conflict, ConflictReport, ConflictResolver, Document, DocumentStore, Error, FlushReason,
    RemoteMark, Resolution, ResolutionStrategy, SaveFinish, SaveOutcome, SaveRequest,
    SaveScheduler, SaveTicket, SaveTrigger, Timestamp, Version, WriterId,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A pure document transformation applied inside the session.
pub type Mutation = Box<dyn FnOnce(&Document) -> Document + Send>;

/// Save state shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Everything is persisted at the remote's mark.
    Saved { at: Timestamp, version: Version },
    /// Local edits not yet saved.
    Dirty,
    /// A save attempt is in flight.
    Saving,
    /// A save was rejected and waits for a resolution choice.
    ConflictPending {
        remote_version: Version,
        remote_writer: Option<WriterId>,
    },
    /// The last attempt failed; edits are kept and retried later.
    Failed { reason: String },
}

/// Events consumed by the session loop.
pub enum SessionEvent {
    Mutation {
        mutate: Mutation,
        reply: Option<oneshot::Sender<Result<Arc<Document>, Error>>>,
    },
    TabHidden,
    WindowBlurred,
    PageUnloading,
    SaveNow,
    Resolve {
        strategy: ResolutionStrategy,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Snapshot(oneshot::Sender<Arc<Document>>),
    PendingConflict(oneshot::Sender<Option<Conflict>>),
    Shutdown,
}

/// What is left when a session stops.
#[derive(Debug)]
pub struct SessionExit {
    /// Final local document.
    pub document: Option<Arc<Document>>,
    /// Whether local edits were left unsaved by this session.
    pub dirty: bool,
    /// Best-effort save started on unload. It is not cancelled with the
    /// session; await it if the host can afford to.
    pub detached: Option<JoinHandle<SaveOutcome>>,
}

struct InFlight {
    ticket: SaveTicket,
    trigger: SaveTrigger,
    handle: JoinHandle<SaveOutcome>,
}

enum Wake {
    Event(Option<SessionEvent>),
    Finished(SaveOutcome),
    Deadline,
}

/// Owns the document store and drives autosave.
pub struct Session<R: RemoteStore> {
    store: DocumentStore,
    scheduler: SaveScheduler,
    client: SyncClient<R>,
    resolver: ConflictResolver,
    policy: ConflictPolicy,
    conflict: Option<Conflict>,
    in_flight: Option<InFlight>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    status: watch::Sender<SaveStatus>,
    started: Instant,
}

impl<R: RemoteStore> Session<R> {
    /// Assemble a session from its parts. The store must hold a document.
    pub fn new(
        store: DocumentStore,
        scheduler: SaveScheduler,
        client: SyncClient<R>,
        resolver: ConflictResolver,
        policy: ConflictPolicy,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let initial = match store.last_known() {
            Some(mark) => SaveStatus::Saved {
                at: mark.timestamp,
                version: mark.version,
            },
            None => return Err(Error::NoDocumentLoaded.into()),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(initial);

        let session = Self {
            store,
            scheduler,
            client,
            resolver,
            policy,
            conflict: None,
            in_flight: None,
            events: events_rx,
            status: status_tx,
            started: Instant::now(),
        };
        let handle = SessionHandle {
            events: events_tx,
            status: status_rx,
        };
        Ok((session, handle))
    }

    /// Load `id` from the remote and build a session around it.
    pub async fn open(
        remote: Arc<R>,
        id: &str,
        config: &SessionConfig,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let client = SyncClient::new(remote, config.writer.clone());
        let document = client.load(id).await?;
        Self::new(
            DocumentStore::with_document(document),
            SaveScheduler::new(config.scheduler),
            client,
            ConflictResolver::new(config.scalar_policy),
            config.conflict_policy,
        )
    }

    /// Run until shutdown, unload, or every handle is dropped.
    pub async fn run(mut self) -> SessionExit {
        info!(writer = self.client.writer(), "session started");

        loop {
            let sleep_at = self.next_wakeup();
            let wake = tokio::select! {
                event = self.events.recv() => Wake::Event(event),
                outcome = join_in_flight(&mut self.in_flight) => Wake::Finished(outcome),
                _ = sleep_until_or_never(sleep_at) => Wake::Deadline,
            };

            match wake {
                Wake::Event(None) | Wake::Event(Some(SessionEvent::Shutdown)) => {
                    return self.shutdown().await;
                }
                Wake::Event(Some(SessionEvent::PageUnloading)) => return self.unload(),
                Wake::Event(Some(event)) => self.handle_event(event),
                Wake::Finished(outcome) => self.finish_save(outcome),
                Wake::Deadline => {
                    if let Some(trigger) = self.scheduler.poll(self.now_ms()) {
                        self.start_save(trigger);
                    }
                }
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Timers pause while a save is in flight or a conflict waits.
    fn next_wakeup(&self) -> Option<Instant> {
        if self.in_flight.is_some() || self.conflict.is_some() {
            return None;
        }
        self.scheduler
            .next_deadline()
            .map(|(_, at)| self.started + Duration::from_millis(at))
    }

    fn publish(&self, status: SaveStatus) {
        self.status.send_replace(status);
    }

    fn publish_settled(&self) {
        if self.conflict.is_some() {
            return;
        }
        if self.store.is_dirty() {
            self.publish(SaveStatus::Dirty);
        } else if let Some(mark) = self.store.last_known() {
            self.publish(SaveStatus::Saved {
                at: mark.timestamp,
                version: mark.version,
            });
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Mutation { mutate, reply } => {
                let result = self.store.apply_mutation(mutate);
                match &result {
                    Ok(_) => {
                        self.scheduler.on_mutation(self.now_ms());
                        if self.in_flight.is_none() {
                            self.publish_settled();
                        }
                    }
                    Err(e) => warn!(error = %e, "mutation rejected"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionEvent::TabHidden => self.flush(FlushReason::Hidden),
            SessionEvent::WindowBlurred => self.flush(FlushReason::Blurred),
            SessionEvent::SaveNow => self.flush(FlushReason::Manual),
            SessionEvent::Resolve { strategy, reply } => {
                let result = self.resolve(strategy);
                if let Err(e) = &result {
                    error!(error = %e, ?strategy, "resolution failed");
                }
                let _ = reply.send(result);
            }
            SessionEvent::Snapshot(reply) => {
                if let Ok(document) = self.store.snapshot() {
                    let _ = reply.send(document);
                }
            }
            SessionEvent::PendingConflict(reply) => {
                let _ = reply.send(self.conflict.clone());
            }
            SessionEvent::PageUnloading | SessionEvent::Shutdown => {}
        }
    }

    fn flush(&mut self, reason: FlushReason) {
        if self.conflict.is_some() {
            debug!(?reason, "flush deferred until the conflict is resolved");
            return;
        }
        if let Some(trigger) = self.scheduler.flush(reason, self.store.is_dirty()) {
            self.start_save(trigger);
        }
    }

    fn start_save(&mut self, trigger: SaveTrigger) {
        match self.store.begin_save() {
            Ok(Some(ticket)) => {
                debug!(?trigger, base_version = ticket.base().version, "starting save");
                let request = self.client.request(&ticket);
                let client = self.client.clone();
                let handle = tokio::spawn(async move { client.attempt_save(request).await });
                self.in_flight = Some(InFlight {
                    ticket,
                    trigger,
                    handle,
                });
                self.publish(SaveStatus::Saving);
            }
            Ok(None) => {
                self.scheduler
                    .on_save_finished(SaveFinish::Accepted, false, self.now_ms());
            }
            Err(e) => {
                error!(error = %e, ?trigger, "could not start save");
                self.scheduler.reset();
            }
        }
    }

    fn finish_save(&mut self, outcome: SaveOutcome) {
        let Some(InFlight { ticket, trigger, .. }) = self.in_flight.take() else {
            return;
        };

        let mut conflict = None;
        let finish = match outcome {
            SaveOutcome::Accepted(accepted) => {
                match self
                    .store
                    .mark_clean(ticket, accepted.timestamp, accepted.version)
                {
                    Ok(()) => {
                        debug!(?trigger, version = accepted.version, "save settled");
                        SaveFinish::Accepted
                    }
                    Err(e) => {
                        error!(error = %e, "remote acknowledged an invalid version");
                        self.publish(SaveStatus::Failed {
                            reason: e.to_string(),
                        });
                        SaveFinish::Failed
                    }
                }
            }
            SaveOutcome::Conflict(report) => {
                self.store.abandon_save(ticket);
                conflict = Some(report);
                SaveFinish::Conflict
            }
            SaveOutcome::Failed { reason } => {
                self.store.abandon_save(ticket);
                self.publish(SaveStatus::Failed { reason });
                SaveFinish::Failed
            }
        };

        let next = self
            .scheduler
            .on_save_finished(finish, self.store.is_dirty(), self.now_ms());

        if let Some(report) = conflict {
            self.on_conflict(report);
        } else if let Some(trigger) = next {
            self.start_save(trigger);
        } else if finish == SaveFinish::Accepted {
            self.publish_settled();
        }
    }

    fn on_conflict(&mut self, report: ConflictReport) {
        let local = match self.store.snapshot() {
            Ok(document) => (*document).clone(),
            Err(e) => {
                error!(error = %e, "conflict without a local document");
                return;
            }
        };
        let conflict = Conflict::new(local, report);

        match self.policy {
            ConflictPolicy::Auto(strategy) => {
                if let Err(e) = self.apply_resolution(conflict, strategy) {
                    error!(error = %e, ?strategy, "automatic resolution failed");
                }
            }
            ConflictPolicy::Interactive => {
                info!(
                    remote_version = conflict.remote_document.version,
                    "conflict waiting for a resolution"
                );
                self.publish(SaveStatus::ConflictPending {
                    remote_version: conflict.remote_document.version,
                    remote_writer: conflict.remote_writer.clone(),
                });
                self.conflict = Some(conflict);
            }
        }
    }

    fn resolve(&mut self, strategy: ResolutionStrategy) -> Result<(), Error> {
        let pending = self.conflict.take().ok_or(Error::NoConflictPending)?;
        // Edits made while the conflict was parked are part of the local side.
        let local = self.store.snapshot()?;
        let conflict = Conflict {
            local_document: (*local).clone(),
            ..pending
        };
        self.apply_resolution(conflict, strategy)
    }

    fn apply_resolution(
        &mut self,
        conflict: Conflict,
        strategy: ResolutionStrategy,
    ) -> Result<(), Error> {
        info!(
            ?strategy,
            remote_version = conflict.remote_document.version,
            "resolving conflict"
        );
        match self.resolver.resolve(&conflict, strategy, Utc::now()) {
            Resolution::Save { document, base } => {
                self.store.replace_resolved(document, base)?;
                if let Some(trigger) = self.scheduler.flush(FlushReason::Resolved, true) {
                    self.start_save(trigger);
                }
            }
            Resolution::Adopt { document } => {
                self.store.adopt_remote(document)?;
                self.scheduler.reset();
                self.publish_settled();
            }
        }
        Ok(())
    }

    /// Wait for in-flight work and flush once more before stopping.
    async fn shutdown(mut self) -> SessionExit {
        info!("session shutting down");
        let mut flushed = false;
        loop {
            if self.in_flight.is_none() {
                if flushed || self.conflict.is_some() {
                    break;
                }
                flushed = true;
                self.flush(FlushReason::Manual);
                if self.in_flight.is_none() {
                    break;
                }
            }
            let outcome = join_in_flight(&mut self.in_flight).await;
            self.finish_save(outcome);
        }

        if self.conflict.is_some() {
            warn!("session stopped with an unresolved conflict");
        }
        SessionExit {
            document: self.store.snapshot().ok(),
            dirty: self.store.is_dirty(),
            detached: None,
        }
    }

    /// Start a last save without waiting for it.
    fn unload(mut self) -> SessionExit {
        let strategy = match self.policy {
            ConflictPolicy::Auto(strategy) => strategy,
            ConflictPolicy::Interactive => ResolutionStrategy::Merge,
        };

        let detached = match self.in_flight.take() {
            Some(previous) => {
                let covered = previous.ticket.revision() == self.store.revision();
                if covered {
                    debug!("unload: in-flight save already covers every edit");
                }
                match self.store.snapshot() {
                    Ok(document) => Some(self.spawn_unload_save(
                        Some(previous.handle),
                        (*document).clone(),
                        previous.ticket.base(),
                        covered,
                        strategy,
                    )),
                    Err(e) => {
                        error!(error = %e, "unload: no document to save");
                        Some(previous.handle)
                    }
                }
            }
            None => {
                if let Some(pending) = self.conflict.take() {
                    if let Err(e) = self.resolve_parked(pending, strategy) {
                        error!(error = %e, "unload: could not resolve conflict");
                    }
                }
                match self.store.begin_save() {
                    Ok(Some(ticket)) => Some(self.spawn_unload_save(
                        None,
                        ticket.document().as_ref().clone(),
                        ticket.base(),
                        false,
                        strategy,
                    )),
                    Ok(None) => None,
                    Err(e) => {
                        error!(error = %e, "unload: could not start save");
                        None
                    }
                }
            }
        };

        info!(detached = detached.is_some(), "page unloading");
        SessionExit {
            document: self.store.snapshot().ok(),
            dirty: self.store.is_dirty(),
            detached,
        }
    }

    fn resolve_parked(&mut self, pending: Conflict, strategy: ResolutionStrategy) -> Result<(), Error> {
        let local = self.store.snapshot()?;
        let conflict = Conflict {
            local_document: (*local).clone(),
            ..pending
        };
        match self.resolver.resolve(&conflict, strategy, Utc::now()) {
            Resolution::Save { document, base } => self.store.replace_resolved(document, base),
            Resolution::Adopt { document } => self.store.adopt_remote(document),
        }
    }

    fn spawn_unload_save(
        &self,
        previous: Option<JoinHandle<SaveOutcome>>,
        document: Document,
        base: RemoteMark,
        covered: bool,
        strategy: ResolutionStrategy,
    ) -> JoinHandle<SaveOutcome> {
        tokio::spawn(save_on_unload(
            self.client.clone(),
            UnloadSave {
                previous,
                document,
                base,
                covered,
            },
            self.resolver,
            strategy,
        ))
    }
}

/// Resends allowed after the first unload attempt before giving up.
const UNLOAD_RESENDS: usize = 3;

/// Work handed to the detached unload task.
struct UnloadSave {
    /// Save still running when the page went away.
    previous: Option<JoinHandle<SaveOutcome>>,
    /// Latest local document.
    document: Document,
    /// Mark `document` is based on if `previous` tells us nothing newer.
    base: RemoteMark,
    /// `previous` already carries `document`.
    covered: bool,
}

/// Persist the last local document, settling conflicts on the way.
///
/// Waits for `previous` first and rebases on its result. A conflict is
/// resolved with `strategy` and resent; `KeepRemote` ends the task without
/// writing. Transport failures are not retried.
async fn save_on_unload<R: RemoteStore>(
    client: SyncClient<R>,
    save: UnloadSave,
    resolver: ConflictResolver,
    strategy: ResolutionStrategy,
) -> SaveOutcome {
    let UnloadSave {
        previous,
        mut document,
        mut base,
        mut covered,
    } = save;

    let mut outcome = match previous {
        Some(handle) => Some(settle(handle).await),
        None => None,
    };

    for attempt in 0.. {
        match outcome.take() {
            Some(SaveOutcome::Accepted(accepted)) if covered => {
                return SaveOutcome::Accepted(accepted);
            }
            Some(SaveOutcome::Accepted(accepted)) => base = RemoteMark::from(accepted),
            Some(SaveOutcome::Conflict(report)) => {
                let conflict = Conflict::new(document, report.clone());
                match resolver.resolve(&conflict, strategy, Utc::now()) {
                    Resolution::Save {
                        document: resolved,
                        base: remote,
                    } => {
                        info!(
                            ?strategy,
                            remote_version = remote.version,
                            "unload: resolved conflict, resending"
                        );
                        document = resolved;
                        base = remote;
                    }
                    Resolution::Adopt { .. } => return SaveOutcome::Conflict(report),
                }
            }
            Some(failed @ SaveOutcome::Failed { .. }) if covered => return failed,
            Some(SaveOutcome::Failed { .. }) | None => {}
        }

        if attempt > UNLOAD_RESENDS {
            break;
        }
        covered = true;
        let request = SaveRequest::new(document.clone(), base).with_writer(client.writer());
        outcome = Some(client.attempt_save(request).await);
    }

    warn!("unload: remote kept changing, giving up");
    SaveOutcome::Failed {
        reason: "remote kept changing during unload".into(),
    }
}

async fn settle(handle: JoinHandle<SaveOutcome>) -> SaveOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => SaveOutcome::Failed {
            reason: format!("save task failed: {e}"),
        },
    }
}

async fn join_in_flight(in_flight: &mut Option<InFlight>) -> SaveOutcome {
    match in_flight {
        Some(flight) => match (&mut flight.handle).await {
            Ok(outcome) => outcome,
            Err(e) => SaveOutcome::Failed {
                reason: format!("save task failed: {e}"),
            },
        },
        None => pending().await,
    }
}

async fn sleep_until_or_never(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

/// Cloneable handle for feeding host events into a running session.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<SaveStatus>,
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    /// Apply a mutation and wait for the resulting document.
    pub async fn mutate<F>(&self, mutate: F) -> Result<Arc<Document>, SessionError>
    where
        F: FnOnce(&Document) -> Document + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Mutation {
            mutate: Box::new(mutate),
            reply: Some(reply),
        })?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Apply a mutation without waiting.
    pub fn apply<F>(&self, mutate: F) -> Result<(), SessionError>
    where
        F: FnOnce(&Document) -> Document + Send + 'static,
    {
        self.send(SessionEvent::Mutation {
            mutate: Box::new(mutate),
            reply: None,
        })
    }

    pub fn tab_hidden(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::TabHidden)
    }

    pub fn window_blurred(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::WindowBlurred)
    }

    /// The page is going away; the session stops after starting a last save.
    pub fn page_unloading(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::PageUnloading)
    }

    pub fn save_now(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::SaveNow)
    }

    /// Resolve the parked conflict.
    ///
    /// Fails with [`Error::NoConflictPending`] when there is nothing to
    /// resolve.
    pub async fn resolve(&self, strategy: ResolutionStrategy) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Resolve { strategy, reply })?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Current local document.
    pub async fn document(&self) -> Result<Arc<Document>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Snapshot(reply))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// The conflict waiting for a choice, if any.
    pub async fn pending_conflict(&self) -> Result<Option<Conflict>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::PendingConflict(reply))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Finish in-flight work, flush, and stop.
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::Shutdown)
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }
}
