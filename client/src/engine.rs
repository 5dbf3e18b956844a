//! The sync engine: single owner of the local list, the echo filter and the
//! input buffer.
//!
//! Three event sources feed it:
//!
//! 1. user commands, sent through a [`SyncHandle`]
//! 2. store responses, delivered by the request tasks the engine spawns
//! 3. channel events, delivered by the [`NotificationListener`]
//!
//! They are multiplexed with `tokio::select!` on one task, and each message is
//! handled to completion before the next one is looked at. Nothing else
//! touches the state, so it needs no locking.
//!
//! The protocol itself lives in [`SyncState`], which does no I/O and can be
//! driven directly in tests.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CompletionFailurePolicy, Config, EchoMode};
use crate::echo::{Decision, EchoFilter};
use crate::error::{
    validate_task_text, ListError, RemoteError, Result, SyncError, ValidationError,
};
use crate::list::TaskList;
use crate::listener::{ChannelEvent, NotificationListener};
use crate::store::StoreClient;
use crate::types::{CompleteRequest, CreateRequest, Notification, TaskItem, View};

/// Capacity of the command queue between handles and the engine.
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the queue between the listener and the engine.
const NOTIFICATION_QUEUE_CAPACITY: usize = 256;

/// Receives user-facing messages: validation failures and store errors.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message);
    }
}

/// A create that passed validation and is waiting for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub text: String,
    pub token: Option<Uuid>,
}

impl PendingCreate {
    #[must_use]
    pub fn request(&self) -> CreateRequest {
        CreateRequest {
            title: self.text.clone(),
            client_token: self.token,
        }
    }
}

/// A completion that passed validation and is waiting for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingComplete {
    pub index: usize,
    /// Store id of the task, when known.
    pub id: Option<Uuid>,
    pub token: Option<Uuid>,
}

impl PendingComplete {
    #[must_use]
    pub fn request(&self) -> CompleteRequest {
        CompleteRequest {
            index: self.index,
            id: self.id,
            client_token: self.token,
        }
    }
}

/// The synchronization protocol without I/O.
#[derive(Debug, Clone)]
pub struct SyncState {
    list: TaskList,
    filter: EchoFilter,
    input: String,
    hydrated: bool,
}

impl SyncState {
    #[must_use]
    pub fn new(echo_mode: EchoMode) -> Self {
        Self {
            list: TaskList::new(),
            filter: EchoFilter::new(echo_mode),
            input: String::new(),
            hydrated: false,
        }
    }

    /// Validates `text` and prepares the create request.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::TooShort` if the trimmed text has 5
    /// characters or fewer. Nothing is changed in that case.
    pub fn begin_create(&mut self, text: &str) -> std::result::Result<PendingCreate, ValidationError> {
        validate_task_text(text)?;

        Ok(PendingCreate {
            text: text.to_string(),
            token: self.filter.issue_token(),
        })
    }

    /// Applies the store's answer to a create.
    ///
    /// On success the task is appended (unless its echo already was), the
    /// input buffer is cleared and the filter armed. `outcome` carries the id
    /// the store assigned, if it reports one. Returns the new index, or `None`
    /// when the echo had delivered the task first. A task whose id is already
    /// in the list was delivered by its echo, and the filter is not armed.
    ///
    /// # Errors
    ///
    /// Passes the store error through; nothing is changed.
    pub fn finish_create(
        &mut self,
        pending: PendingCreate,
        outcome: std::result::Result<Option<Uuid>, RemoteError>,
    ) -> std::result::Result<Option<usize>, RemoteError> {
        match outcome {
            Ok(id) => {
                self.input.clear();
                if let Some(index) = id.and_then(|id| self.list.position(id)) {
                    debug!(index, "Created task already applied from its echo");
                    self.filter.forget(pending.token);
                    return Ok(None);
                }
                if self.filter.on_local_success(pending.token) {
                    let item = TaskItem::new(pending.text).with_id(id);
                    Ok(Some(self.list.append(item)))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                self.filter.on_local_failure(pending.token);
                Err(e)
            }
        }
    }

    /// Checks that `index` addresses an incomplete task and prepares the
    /// completion request.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchTask` or `AlreadyCompleted`.
    pub fn begin_complete(
        &mut self,
        index: usize,
    ) -> std::result::Result<PendingComplete, ValidationError> {
        match self.list.get(index) {
            None => Err(ValidationError::NoSuchTask { index }),
            Some(item) if item.completed => Err(ValidationError::AlreadyCompleted { index }),
            Some(item) => Ok(PendingComplete {
                index,
                id: item.id,
                token: self.filter.issue_token(),
            }),
        }
    }

    /// Applies the store's answer to a completion.
    ///
    /// The task was incomplete when the request was sent, so finding it
    /// completed now means the echo got here first and the filter stays idle.
    ///
    /// # Errors
    ///
    /// Passes the store error through; nothing is changed.
    pub fn finish_complete(
        &mut self,
        pending: PendingComplete,
        outcome: std::result::Result<(), RemoteError>,
    ) -> std::result::Result<(), RemoteError> {
        match outcome {
            Ok(()) => {
                let index = self.list.resolve(pending.index, pending.id);
                if self.list.get(index).is_some_and(|task| task.completed) {
                    debug!(index, "Completion already applied from its echo");
                    self.filter.forget(pending.token);
                    return Ok(());
                }
                if self.filter.on_local_success(pending.token) {
                    if let Err(e) = self.list.mark_completed(index) {
                        // Only possible if a refresh shrank the list meanwhile.
                        warn!(error = %e, "Completed task is no longer in the local list");
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.filter.on_local_failure(pending.token);
                Err(e)
            }
        }
    }

    /// Runs a notification through the echo filter and applies it if needed.
    ///
    /// # Errors
    ///
    /// Returns `ListError::IndexOutOfRange` for a completion of a task this
    /// client does not have. The filter has still consumed the event.
    pub fn apply_notification(
        &mut self,
        notification: Notification,
    ) -> std::result::Result<Decision, ListError> {
        let decision = self.filter.observe(&notification);
        if decision == Decision::Suppress {
            return Ok(decision);
        }

        match notification {
            Notification::ItemCreated { item, .. } => {
                if let Some(index) = item.id.and_then(|id| self.list.position(id)) {
                    debug!(index, "Created task is already in the local list");
                    return Ok(Decision::Suppress);
                }
                self.list.append(item);
            }
            Notification::ItemCompleted { index, id, .. } => {
                let index = self.list.resolve(index, id);
                self.list.mark_completed(index)?;
            }
        }
        Ok(Decision::Apply)
    }

    /// Replaces local state with the store's list and returns the filter to
    /// idle.
    pub fn hydrate(&mut self, tasks: Vec<TaskItem>) {
        self.list.replace_all(tasks);
        self.filter.reset();
        self.input.clear();
        self.hydrated = true;
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn list(&self) -> &TaskList {
        &self.list
    }

    #[must_use]
    pub fn filter(&self) -> &EchoFilter {
        &self.filter
    }

    #[must_use]
    pub fn view(&self) -> View {
        View {
            tasks: self.list.snapshot(),
            input: self.input.clone(),
            awaiting_echo: self.filter.is_awaiting_echo(),
            hydrated: self.hydrated,
        }
    }
}

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(String),
    Complete(usize),
    SetInput(String),
    SubmitInput,
    Refresh,
}

/// Results coming back from spawned store requests.
#[derive(Debug)]
enum Resolution {
    Hydrated(std::result::Result<Vec<TaskItem>, RemoteError>),
    Created(PendingCreate, std::result::Result<Option<Uuid>, RemoteError>),
    Completed(PendingComplete, std::result::Result<(), RemoteError>),
}

/// Engine settings taken from [`Config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub echo_mode: EchoMode,
    pub completion_failure: CompletionFailurePolicy,
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            echo_mode: config.echo_mode,
            completion_failure: config.completion_failure,
        }
    }
}

/// Cloneable front door to a running engine.
///
/// Mutating methods return once the command is queued. Their outcome shows up
/// in the published [`View`] or through the [`Notifier`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<View>,
}

impl SyncHandle {
    /// Queues creation of a task with `text`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` if the engine has exited.
    pub async fn create_task(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Create(text.into())).await
    }

    /// Queues completion of the task at `index`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` if the engine has exited.
    pub async fn complete_task(&self, index: usize) -> Result<()> {
        self.send(Command::Complete(index)).await
    }

    /// Replaces the input buffer.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` if the engine has exited.
    pub async fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SetInput(text.into())).await
    }

    /// Creates a task from the input buffer.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` if the engine has exited.
    pub async fn submit_input(&self) -> Result<()> {
        self.send(Command::SubmitInput).await
    }

    /// Re-fetches the whole list from the store.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` if the engine has exited.
    pub async fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh).await
    }

    /// The ordered task list as last published.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TaskItem> {
        self.view.borrow().tasks.clone()
    }

    /// Everything the presentation layer renders.
    #[must_use]
    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    /// A receiver that is woken on every change.
    #[must_use]
    pub fn subscribe_view(&self) -> watch::Receiver<View> {
        self.view.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::EngineStopped)
    }
}

/// Owns the state and serializes every event that touches it.
pub struct SyncEngine {
    state: SyncState,
    store: StoreClient,
    notifier: Arc<dyn Notifier>,
    completion_failure: CompletionFailurePolicy,
    commands: mpsc::Receiver<Command>,
    resolutions_tx: mpsc::UnboundedSender<Resolution>,
    resolutions_rx: mpsc::UnboundedReceiver<Resolution>,
    view_tx: watch::Sender<View>,
}

impl SyncEngine {
    /// Creates an engine and the handle that drives it.
    #[must_use]
    pub fn new(
        store: StoreClient,
        options: EngineOptions,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, SyncHandle) {
        let state = SyncState::new(options.echo_mode);
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (resolutions_tx, resolutions_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(state.view());

        let engine = Self {
            state,
            store,
            notifier,
            completion_failure: options.completion_failure,
            commands,
            resolutions_tx,
            resolutions_rx,
            view_tx,
        };
        let handle = SyncHandle {
            commands: commands_tx,
            view: view_rx,
        };
        (engine, handle)
    }

    /// Hydrates from the store, then processes events until every
    /// [`SyncHandle`] has been dropped.
    pub async fn run(mut self, mut channel: mpsc::Receiver<ChannelEvent>) {
        info!(
            echo_mode = %self.state.filter().mode(),
            store = %self.store.base_url(),
            "Sync engine started"
        );
        self.spawn_hydrate();

        let mut listening = true;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All sync handles dropped");
                        break;
                    }
                },
                Some(resolution) = self.resolutions_rx.recv() => {
                    self.handle_resolution(resolution);
                }
                event = channel.recv(), if listening => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => {
                        warn!("Notification stream ended, remote changes will not be applied");
                        listening = false;
                    }
                },
            }
            self.publish();
        }

        info!("Sync engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create(text) => self.start_create(text),
            Command::SubmitInput => {
                let text = self.state.input().to_string();
                self.start_create(text);
            }
            Command::Complete(index) => self.start_complete(index),
            Command::SetInput(text) => self.state.set_input(text),
            Command::Refresh => self.spawn_hydrate(),
        }
    }

    fn start_create(&mut self, text: String) {
        let pending = match self.state.begin_create(&text) {
            Ok(pending) => pending,
            Err(e) => {
                debug!(error = %e, "Task text rejected");
                self.notifier.notify(&e.to_string());
                return;
            }
        };

        let store = self.store.clone();
        let tx = self.resolutions_tx.clone();
        tokio::spawn(async move {
            let outcome = store.create_item(&pending.request()).await;
            let _ = tx.send(Resolution::Created(pending, outcome));
        });
    }

    fn start_complete(&mut self, index: usize) {
        let pending = match self.state.begin_complete(index) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(index, error = %e, "Ignoring completion request");
                return;
            }
        };

        let store = self.store.clone();
        let tx = self.resolutions_tx.clone();
        tokio::spawn(async move {
            let outcome = store.complete_item(&pending.request()).await;
            let _ = tx.send(Resolution::Completed(pending, outcome));
        });
    }

    fn spawn_hydrate(&self) {
        let store = self.store.clone();
        let tx = self.resolutions_tx.clone();
        tokio::spawn(async move {
            let outcome = store.fetch_items().await;
            let _ = tx.send(Resolution::Hydrated(outcome));
        });
    }

    fn handle_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Hydrated(Ok(tasks)) => {
                info!(tasks = tasks.len(), "Local list hydrated");
                self.state.hydrate(tasks);
            }
            Resolution::Hydrated(Err(e)) => {
                warn!(error = %e, "Failed to fetch task list");
                self.notifier.notify(&e.to_string());
            }
            Resolution::Created(pending, outcome) => {
                match self.state.finish_create(pending, outcome) {
                    Ok(Some(index)) => debug!(index, "Task created"),
                    Ok(None) => debug!("Task created, already applied from its echo"),
                    Err(e) => self.notifier.notify(&e.to_string()),
                }
            }
            Resolution::Completed(pending, outcome) => {
                let index = pending.index;
                match self.state.finish_complete(pending, outcome) {
                    Ok(()) => debug!(index, "Task completed"),
                    Err(e) => match self.completion_failure {
                        CompletionFailurePolicy::Surface => self.notifier.notify(&e.to_string()),
                        CompletionFailurePolicy::Silent => {
                            debug!(index, error = %e, "Completion failure not surfaced");
                        }
                    },
                }
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Notification(notification) => self.handle_notification(notification),
            ChannelEvent::Subscribed => debug!("Notification channel ready"),
            ChannelEvent::Resubscribed => {
                info!("Notification channel restored, re-fetching task list");
                self.spawn_hydrate();
            }
        }
    }

    fn handle_notification(&mut self, notification: Notification) {
        let kind = notification.kind();
        match self.state.apply_notification(notification) {
            Ok(Decision::Apply) => debug!(?kind, "Applied remote change"),
            Ok(Decision::Suppress) => debug!(?kind, "Suppressed own echo"),
            Err(e) => warn!(?kind, error = %e, "Ignoring notification for unknown task"),
        }
    }

    fn publish(&self) {
        let next = self.state.view();
        self.view_tx.send_if_modified(|view| {
            if *view == next {
                false
            } else {
                *view = next;
                true
            }
        });
    }
}

/// A fully wired client: engine and listener running on their own tasks.
#[derive(Debug)]
pub struct RunningClient {
    pub handle: SyncHandle,
    pub engine: JoinHandle<()>,
    pub listener: JoinHandle<()>,
}

impl RunningClient {
    /// Drops the handle and waits for the engine and listener to exit.
    ///
    /// Other clones of the handle keep the engine alive.
    pub async fn shutdown(self) {
        drop(self.handle);
        if let Err(e) = self.engine.await {
            warn!(error = %e, "Sync engine task failed");
        }
        // The listener notices the dropped receiver on its next wakeup.
        self.listener.abort();
    }
}

/// Builds the store client, engine and listener from `config` and spawns them.
///
/// # Errors
///
/// Returns `SyncError::Remote` if the HTTP client cannot be built.
pub fn start(config: &Config, notifier: Arc<dyn Notifier>) -> Result<RunningClient> {
    let store = StoreClient::new(config.store_url.clone(), config.request_timeout)?;
    let (engine, handle) = SyncEngine::new(store, EngineOptions::from(config), notifier);

    let (events_tx, events_rx) = mpsc::channel(NOTIFICATION_QUEUE_CAPACITY);
    let listener = NotificationListener::new(config.notify_url.clone(), config.channel.clone())
        .spawn(events_tx);
    let engine = tokio::spawn(engine.run(events_rx));

    Ok(RunningClient {
        handle,
        engine,
        listener,
    })
}
