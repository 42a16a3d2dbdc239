// ── Engine ──
//
// Lifecycle for one telemetry session: opens the push channel, owns the
// `Session` on a single task, and publishes snapshots for the rendering
// side. Every mutation of dashboard and listener state happens on that
// task, one `Action` at a time.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use telewatch_api::{
    CatalogClient, ChannelState, ChannelStatus, FrameSink, InboundFrames, PushChannel, ReconnectConfig,
    TransportConfig,
};

use crate::cache::EntityCache;
use crate::config::EngineConfig;
use crate::dashboard::DashboardState;
use crate::error::CoreError;
use crate::live::LiveValueStore;
use crate::model::ModelId;
use crate::notification::Notification;
use crate::persistence::TokenSink;
use crate::session::{Action, Effects, Session};
use crate::stream::SnapshotStream;

const NOTIFICATION_CHANNEL_SIZE: usize = 64;

/// The transport half the engine talks to: where outbound frames go,
/// where inbound frames come from, and the channel's state.
pub struct PushLink {
    pub sink: Arc<dyn FrameSink>,
    pub frames: InboundFrames,
    pub state: watch::Receiver<ChannelStatus>,
}

impl PushLink {
    /// Link backed by a live [`PushChannel`].
    pub fn from_channel(channel: Arc<PushChannel>, frames: InboundFrames) -> Self {
        Self {
            state: channel.state_changes(),
            sink: channel,
            frames,
        }
    }
}

/// Handle to a running engine.
///
/// Cheaply cloneable via `Arc<EngineInner>`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    cache: Arc<EntityCache>,
    live: Arc<LiveValueStore>,
    dashboard: watch::Sender<Arc<DashboardState>>,
    listeners: watch::Sender<Arc<BTreeSet<ModelId>>>,
    channel_state: watch::Sender<ChannelState>,
    notifications: broadcast::Sender<Notification>,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: Mutex<Option<mpsc::UnboundedReceiver<Action>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    push: Mutex<Option<Arc<PushChannel>>>,
    catalog: Mutex<Option<Arc<CatalogClient>>>,
}

impl Engine {
    /// Create an engine. Nothing runs until [`connect`](Self::connect) or
    /// [`attach`](Self::attach).
    pub fn new(config: EngineConfig) -> Self {
        let (dashboard, _) = watch::channel(Arc::new(DashboardState::new()));
        let (listeners, _) = watch::channel(Arc::new(BTreeSet::new()));
        let (channel_state, _) = watch::channel(ChannelState::Connecting);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(EngineInner {
                config,
                cache: Arc::new(EntityCache::new()),
                live: Arc::new(LiveValueStore::new()),
                dashboard,
                listeners,
                channel_state,
                notifications,
                action_tx,
                action_rx: Mutex::new(Some(action_rx)),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                push: Mutex::new(None),
                catalog: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the push channel and the catalog client, then start the
    /// engine task.
    ///
    /// The channel connects in the background; the listener set is sent
    /// each time it reaches `Open`. When `token_sink` holds a view token,
    /// the dashboard is restored from it before anything else runs.
    pub async fn connect(&self, token_sink: Option<Arc<dyn TokenSink>>) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let transport = TransportConfig::from(config);

        let catalog = CatalogClient::new(config.catalog_url()?, &transport)?;
        *self.inner.catalog.lock().await = Some(Arc::new(catalog));

        let socket_url = config.socket_url()?;
        info!(url = %socket_url, "opening push channel");
        let (channel, frames) = PushChannel::connect(
            socket_url,
            ReconnectConfig::from(&config.reconnect),
            self.inner.cancel.child_token(),
            config.session.as_ref().map(|s| s.cookie_header()),
        );
        let channel = Arc::new(channel);
        *self.inner.push.lock().await = Some(Arc::clone(&channel));

        self.attach(PushLink::from_channel(channel, frames), token_sink)
            .await
    }

    /// Start the engine task on an existing link.
    pub async fn attach(
        &self,
        link: PushLink,
        token_sink: Option<Arc<dyn TokenSink>>,
    ) -> Result<(), CoreError> {
        let Some(actions) = self.inner.action_rx.lock().await.take() else {
            return Err(CoreError::Internal("engine already started".into()));
        };

        if let Some(sink) = &token_sink {
            match sink.read() {
                Ok(Some(token)) => {
                    debug!("restoring view from token sink");
                    self.dispatch(Action::ExternalToken(token))?;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "cannot read view token"),
            }
        }

        let session = Session::new(
            Arc::clone(&self.inner.cache),
            Arc::clone(&self.inner.live),
            self.inner.config.persist_debounce,
        );
        let handle = tokio::spawn(engine_task(
            Arc::clone(&self.inner),
            session,
            actions,
            link,
            token_sink,
        ));
        *self.inner.task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the engine: apply queued actions, flush a pending view write,
    /// then close the push channel.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        if let Some(channel) = self.inner.push.lock().await.take() {
            channel.shutdown();
        }
        debug!("engine stopped");
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Queue an action. Actions apply in dispatch order.
    pub fn dispatch(&self, action: Action) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::EngineStopped);
        }
        self.inner
            .action_tx
            .send(action)
            .map_err(|_| CoreError::EngineStopped)
    }

    /// Run a catalog query and merge the response into the entity cache.
    ///
    /// The merge happens on the engine task; watch
    /// [`EntityCache::subscribe`] to see it land.
    pub async fn fetch_catalog(&self, query: &str) -> Result<(), CoreError> {
        let client = self
            .inner
            .catalog
            .lock()
            .await
            .clone()
            .ok_or(CoreError::EngineStopped)?;
        let response = client.query(query).await?;
        self.dispatch(Action::CatalogResponse(response))
    }

    // ── State observation ────────────────────────────────────────────

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    pub fn live(&self) -> &Arc<LiveValueStore> {
        &self.inner.live
    }

    pub fn dashboard(&self) -> Arc<DashboardState> {
        self.inner.dashboard.borrow().clone()
    }

    pub fn subscribe_dashboard(&self) -> SnapshotStream<DashboardState> {
        SnapshotStream::new(self.inner.dashboard.subscribe())
    }

    pub fn listeners(&self) -> Arc<BTreeSet<ModelId>> {
        self.inner.listeners.borrow().clone()
    }

    pub fn subscribe_listeners(&self) -> SnapshotStream<BTreeSet<ModelId>> {
        SnapshotStream::new(self.inner.listeners.subscribe())
    }

    /// Subscribe to push-channel state changes.
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel_state.subscribe()
    }

    /// Subscribe to non-blocking notifications.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }
}

// ── Engine task ──────────────────────────────────────────────────────

async fn engine_task(
    inner: Arc<EngineInner>,
    mut session: Session,
    mut actions: mpsc::UnboundedReceiver<Action>,
    link: PushLink,
    token_sink: Option<Arc<dyn TokenSink>>,
) {
    let PushLink {
        sink,
        mut frames,
        mut state,
    } = link;
    let mut frames_open = true;
    let mut state_open = true;

    let initial = *state.borrow_and_update();
    let effects = session.apply(Action::Channel(initial), Instant::now());
    publish(&inner, &session, sink.as_ref(), effects);

    loop {
        let deadline = session.persistence_deadline();
        // Queued actions and a due view write go ahead of a frame backlog.
        let action = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            action = actions.recv() => match action {
                Some(action) => action,
                None => break,
            },
            () = wait_until(deadline) => {
                if let Some(token) = session.poll_persistence(Instant::now()) {
                    write_token(&inner, token_sink.as_deref(), &token);
                }
                continue;
            }
            changed = state.changed(), if state_open => match changed {
                Ok(()) => Action::Channel(*state.borrow_and_update()),
                Err(_) => {
                    debug!("push channel state closed");
                    state_open = false;
                    continue;
                }
            },
            frame = frames.recv(), if frames_open => match frame {
                Some(text) => Action::PushFrame(text),
                None => {
                    debug!("push frame stream closed");
                    frames_open = false;
                    continue;
                }
            },
        };

        let effects = session.apply(action, Instant::now());
        publish(&inner, &session, sink.as_ref(), effects);
    }

    // Drain what was dispatched before the stop.
    while let Ok(action) = actions.try_recv() {
        let effects = session.apply(action, Instant::now());
        publish(&inner, &session, sink.as_ref(), effects);
    }
    if let Some(token) = session.flush_persistence() {
        write_token(&inner, token_sink.as_deref(), &token);
    }
    debug!("engine task exiting");
}

/// Resolve at `deadline`, or never.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(inner: &EngineInner, session: &Session, sink: &dyn FrameSink, effects: Effects) {
    for frame in &effects.frames {
        if let Err(e) = sink.send_frame(frame) {
            // The next `Open` resends the whole listener set.
            debug!(error = %e, kind = ?frame.kind, "outbound frame not sent");
        }
    }
    if effects.dashboard_changed {
        inner
            .dashboard
            .send_replace(Arc::new(session.dashboard().clone()));
    }
    if effects.listeners_changed {
        inner
            .listeners
            .send_replace(Arc::new(session.listeners().clone()));
    }
    let channel = session.channel_state();
    inner.channel_state.send_if_modified(|current| {
        let changed = *current != channel;
        *current = channel;
        changed
    });
    for notification in effects.notifications {
        let _ = inner.notifications.send(notification);
    }
}

fn write_token(inner: &EngineInner, sink: Option<&dyn TokenSink>, token: &str) {
    let Some(sink) = sink else {
        return;
    };
    match sink.write(token) {
        Ok(()) => debug!(len = token.len(), "view token written"),
        Err(e) => {
            warn!(error = %e, "cannot write view token");
            let _ = inner.notifications.send(Notification::from(&e));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Mutex as StdMutex, PoisonError};
    use std::time::Duration;

    use super::*;
    use crate::dashboard::{DashboardAction, ViewState};
    use crate::model::{CardIndex, CardType, LayoutItem};
    use crate::notification::NotificationLevel;
    use crate::persistence::{self, MemoryTokenSink};
    use pretty_assertions::assert_eq;
    use telewatch_api::{OutboundFrame, SubscriptionKind};

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<OutboundFrame>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<OutboundFrame> {
            std::mem::take(&mut *self.frames.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: &OutboundFrame) -> Result<(), telewatch_api::Error> {
            self.frames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(frame.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: Engine,
        sink: Arc<RecordingSink>,
        tokens: Arc<MemoryTokenSink>,
        frames_tx: mpsc::UnboundedSender<String>,
        state_tx: watch::Sender<ChannelStatus>,
    }

    async fn harness(tokens: MemoryTokenSink) -> Harness {
        let engine = Engine::new(EngineConfig::new("http://localhost:10001".parse().unwrap()));
        let sink = Arc::new(RecordingSink::default());
        let tokens = Arc::new(tokens);
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelStatus::default());

        let link = PushLink {
            sink: Arc::clone(&sink) as Arc<dyn FrameSink>,
            frames,
            state,
        };
        engine
            .attach(link, Some(Arc::clone(&tokens) as Arc<dyn TokenSink>))
            .await
            .unwrap();
        Harness {
            engine,
            sink,
            tokens,
            frames_tx,
            state_tx,
        }
    }

    fn status(state: ChannelState, connection: u64) -> ChannelStatus {
        ChannelStatus::new(state, connection)
    }

    /// Let the engine task run until idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_produce_one_write_after_debounce() {
        let h = harness(MemoryTokenSink::new()).await;
        for _ in 0..10 {
            h.engine
                .dispatch(Action::Dashboard(DashboardAction::AddCard(CardType::List)))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.tokens.writes(), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(h.tokens.writes(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.tokens.writes(), 1);
        let view = persistence::decode(&h.tokens.current().unwrap()).unwrap();
        assert_eq!(view.layout.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_set_is_sent_on_every_open() {
        let h = harness(MemoryTokenSink::new()).await;
        h.engine
            .dispatch(Action::AddListener(ModelId::from("sys/tg/1/ampli")))
            .unwrap();
        settle().await;
        assert!(h.sink.take().is_empty());
        assert_eq!(h.engine.listeners().len(), 1);

        h.state_tx.send(status(ChannelState::Open, 1)).unwrap();
        settle().await;
        let frames = h.sink.take();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, SubscriptionKind::Subscribe);
        assert_eq!(*h.engine.channel_state().borrow(), ChannelState::Open);

        h.state_tx.send(status(ChannelState::Error, 1)).unwrap();
        settle().await;
        h.state_tx.send(status(ChannelState::Open, 2)).unwrap();
        settle().await;
        assert_eq!(h.sink.take(), frames);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_coalesced_by_the_watch_still_resubscribes() {
        let h = harness(MemoryTokenSink::new()).await;
        h.engine
            .dispatch(Action::AddListener(ModelId::from("d/a")))
            .unwrap();
        h.state_tx.send(status(ChannelState::Open, 1)).unwrap();
        settle().await;
        assert_eq!(h.sink.take().len(), 1);

        // Back to back: the engine only ever sees the last value.
        h.state_tx.send(status(ChannelState::Error, 1)).unwrap();
        h.state_tx.send(status(ChannelState::Connecting, 1)).unwrap();
        h.state_tx.send(status(ChannelState::Open, 2)).unwrap();
        settle().await;

        let frames = h.sink.take();
        assert_eq!(frames, vec![OutboundFrame::subscribe(vec!["d/a".into()])]);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_action_is_not_starved_by_frame_backlog() {
        let h = harness(MemoryTokenSink::new()).await;
        for n in 0..500 {
            h.frames_tx
                .send(format!(r#"{{"type":"CHANGE","data":{{"d/x":{{"value":{n}}}}}}}"#))
                .unwrap();
        }
        h.engine
            .dispatch(Action::Dashboard(DashboardAction::AddCard(CardType::List)))
            .unwrap();
        let mut dashboard = h.engine.subscribe_dashboard();

        let card = dashboard.changed().await.unwrap();
        assert_eq!(card.layout().len(), 1);
        // The frame that would have been applied last is still queued.
        let last = h.engine.live().value(&ModelId::from("d/x"));
        assert_ne!(last.map(|v| v.value), Some(serde_json::json!(499)));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_token_restores_dashboard_without_write_back() {
        let view = ViewState {
            layout: vec![LayoutItem::new_card(CardIndex::from_number(3), CardType::Trend)],
            content: [(CardIndex::from_number(3), vec![ModelId::from("d/x")])].into(),
            ..ViewState::default()
        };
        let token = persistence::encode(&view).unwrap();
        let h = harness(MemoryTokenSink::with_token(token)).await;
        h.state_tx.send(status(ChannelState::Open, 1)).unwrap();
        settle().await;

        let dashboard = h.engine.dashboard();
        assert_eq!(dashboard.content(&CardIndex::from_number(3)), [ModelId::from("d/x")]);
        assert_eq!(dashboard.next_index(), CardIndex::from_number(4));
        assert!(h.engine.listeners().contains(&ModelId::from("d/x")));
        assert_eq!(h.sink.take().len(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.tokens.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn own_token_read_back_is_ignored() {
        let h = harness(MemoryTokenSink::new()).await;
        h.engine
            .dispatch(Action::Dashboard(DashboardAction::AddCard(CardType::Trend)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.tokens.writes(), 1);

        let before = h.engine.dashboard();
        h.engine
            .dispatch(Action::ExternalToken(h.tokens.current().unwrap()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.tokens.writes(), 1);
        assert_eq!(h.engine.dashboard(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_notify_and_later_frames_apply() {
        let h = harness(MemoryTokenSink::new()).await;
        let mut notes = h.engine.notifications();

        h.frames_tx.send("garbage".into()).unwrap();
        h.frames_tx
            .send(r#"{"type":"CHANGE","data":{"d/x":{"value":3}}}"#.into())
            .unwrap();
        settle().await;

        let note = notes.recv().await.unwrap();
        assert_eq!(note.level, NotificationLevel::Warning);
        assert!(h.engine.live().value(&ModelId::from("d/x")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_write_and_rejects_dispatch() {
        let h = harness(MemoryTokenSink::new()).await;
        h.engine
            .dispatch(Action::Dashboard(DashboardAction::AddCard(CardType::List)))
            .unwrap();
        h.engine.shutdown().await;

        assert_eq!(h.tokens.writes(), 1);
        assert!(matches!(
            h.engine.dispatch(Action::AddListener(ModelId::from("d/x"))),
            Err(CoreError::EngineStopped)
        ));
    }

    #[tokio::test]
    async fn attach_twice_fails() {
        let h = harness(MemoryTokenSink::new()).await;
        let (_tx, frames) = mpsc::unbounded_channel();
        let (_state_tx, state) = watch::channel(ChannelStatus::default());
        let link = PushLink {
            sink: Arc::clone(&h.sink) as Arc<dyn FrameSink>,
            frames,
            state,
        };
        assert!(h.engine.attach(link, None).await.is_err());
        h.engine.shutdown().await;
    }
}
