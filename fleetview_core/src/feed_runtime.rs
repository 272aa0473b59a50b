//! Feed Runtime - keeps a live view connected to its feed.
//!
//! ```text
//!   ┌──────────┐  ok   ┌──────────────┐          ┌───────────────────────┐
//!   │ connect  │──────▶│ on_connected │─────────▶│ select:               │
//!   └──────────┘       └──────────────┘          │  operator command     │
//!        ▲  err                                  │  feed frame           │
//!        │                                       │  next debounce expiry │
//!        │                                       └───────────┬───────────┘
//!        │                                                   │ closed
//!        └──── idle until retry (timers, commands) ◀─────────┘
//! ```
//!
//! Retries are unbounded with a fixed delay and no backoff. Only
//! `EnvError::Shutdown` ends the loop. Debounce timers fire on their own
//! deadline whether or not frames keep arriving.
//!
//! # Usage
//!
//! ```ignore
//! let ctx = TokioContext::shared();
//! let mut view = LiveView::with_defaults(Arc::clone(&ctx), surface);
//! let (commands, rx) = tokio::sync::mpsc::channel(64);
//! let runtime = FeedRuntime::new(ctx, Arc::new(websocket), RuntimeConfig::default())
//!     .with_resolver(Arc::new(geocoder));
//! // UI side: commands.send(ViewCommand::Search { .. }).await
//! runtime.run_with_commands(&mut view, rx).await?;
//! ```

use crate::address::{AddressResolver, SearchAction};
use crate::config::RuntimeConfig;
use crate::live_view::{FrameOutcome, LiveView, RenderSurface, ViewCommand};
use fleetview_env::{EnvError, FeedTransport, FleetViewContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Counters for one runtime session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSummary {
    pub connection_attempts: u64,
    pub connections: u64,
    pub disconnects: u64,
    pub frames: u64,
    pub updates: u64,
    pub dropped: u64,
    pub commands: u64,
}

/// Drives a [`LiveView`] from a [`FeedTransport`].
pub struct FeedRuntime<Ctx, T>
where
    Ctx: FleetViewContext,
    T: FeedTransport,
{
    context: Arc<Ctx>,
    transport: Arc<T>,
    config: RuntimeConfig,
    resolver: Option<Arc<dyn AddressResolver>>,
}

impl<Ctx, T> FeedRuntime<Ctx, T>
where
    Ctx: FleetViewContext,
    T: FeedTransport,
{
    pub fn new(context: Arc<Ctx>, transport: Arc<T>, config: RuntimeConfig) -> Self {
        Self {
            context,
            transport,
            config,
            resolver: None,
        }
    }

    /// Geocoder used when a debounced address query settles.
    pub fn with_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runs until the transport shuts down or the attempt limit is reached.
    pub async fn run<R: RenderSurface>(
        &self,
        view: &mut LiveView<Ctx, R>,
    ) -> Result<RuntimeSummary, EnvError> {
        self.drive(view, None).await
    }

    /// Like [`Self::run`], applying operator commands as they arrive.
    ///
    /// Dropping every sender stops command intake; the feed keeps running.
    pub async fn run_with_commands<R: RenderSurface>(
        &self,
        view: &mut LiveView<Ctx, R>,
        commands: mpsc::Receiver<ViewCommand>,
    ) -> Result<RuntimeSummary, EnvError> {
        self.drive(view, Some(commands)).await
    }

    async fn drive<R: RenderSurface>(
        &self,
        view: &mut LiveView<Ctx, R>,
        mut commands: Option<mpsc::Receiver<ViewCommand>>,
    ) -> Result<RuntimeSummary, EnvError> {
        let mut summary = RuntimeSummary::default();
        info!(endpoint = %self.transport.endpoint(), "Feed runtime starting");

        loop {
            if let Some(max) = self.config.max_attempts {
                if summary.connection_attempts >= max {
                    info!(attempts = summary.connection_attempts, "Attempt limit reached");
                    return Ok(summary);
                }
            }

            summary.connection_attempts += 1;
            view.on_connecting();

            match self.transport.connect().await {
                Ok(connection) => {
                    summary.connections += 1;
                    view.on_connected(connection);

                    let reason = self.pump(view, &mut commands, &mut summary).await;
                    if reason.is_terminal() {
                        info!("Feed shut down");
                        return Ok(summary);
                    }
                    summary.disconnects += 1;
                    debug!(error = %reason, "Connection lost");
                    view.on_disconnected(self.config.retry_delay);
                }
                Err(e) if e.is_terminal() => return Ok(summary),
                Err(e) => {
                    warn!(error = %e, "Feed connection failed");
                    view.on_connection_error(&e.to_string());
                }
            }

            let retry_at = self.context.now() + self.config.retry_delay;
            self.idle_until(view, &mut commands, &mut summary, retry_at).await;
        }
    }

    /// Serves frames, commands and timers until the connection ends.
    async fn pump<R: RenderSurface>(
        &self,
        view: &mut LiveView<Ctx, R>,
        commands: &mut Option<mpsc::Receiver<ViewCommand>>,
        summary: &mut RuntimeSummary,
    ) -> EnvError {
        // Kept across iterations so a frame in flight is never lost
        let mut recv = self.transport.recv();
        loop {
            let wake = view.next_deadline();
            tokio::select! {
                biased;
                command = next_command(commands) => apply_command(view, commands, summary, command),
                received = &mut recv => match received {
                    Ok(frame) => {
                        summary.frames += 1;
                        match view.handle_frame(&frame) {
                            FrameOutcome::Updated { .. } => summary.updates += 1,
                            FrameOutcome::Dropped(_) => summary.dropped += 1,
                            FrameOutcome::Pending => {}
                        }
                        recv = self.transport.recv();
                    }
                    Err(e) => return e,
                },
                _ = sleep_until(self.context.as_ref(), wake) => {}
            }
            self.service_timers(view).await;
        }
    }

    /// Waits out the retry delay while timers and commands stay live.
    async fn idle_until<R: RenderSurface>(
        &self,
        view: &mut LiveView<Ctx, R>,
        commands: &mut Option<mpsc::Receiver<ViewCommand>>,
        summary: &mut RuntimeSummary,
        until: Duration,
    ) {
        while self.context.now() < until {
            let wake = view.next_deadline().map_or(until, |deadline| deadline.min(until));
            tokio::select! {
                biased;
                command = next_command(commands) => apply_command(view, commands, summary, command),
                _ = self.context.sleep_until(wake) => {}
            }
            self.service_timers(view).await;
        }
    }

    /// Fires due timers; a settled address query goes to the resolver.
    async fn service_timers<R: RenderSurface>(&self, view: &mut LiveView<Ctx, R>) {
        match view.tick().search {
            Some(SearchAction::Lookup(query)) => self.lookup(view, &query).await,
            Some(SearchAction::Clear) => view.show_address_suggestions(&[]),
            None => {}
        }
    }

    async fn lookup<R: RenderSurface>(&self, view: &mut LiveView<Ctx, R>, query: &str) {
        let Some(resolver) = self.resolver.as_deref() else {
            debug!(query, "No address resolver, lookup skipped");
            return;
        };
        let results = view.address_search().lookup(resolver, query).await;
        match results {
            Ok(results) => view.show_address_suggestions(&results),
            Err(e) => {
                warn!(error = %e, query, "Address lookup failed");
                view.show_address_suggestions(&[]);
            }
        }
    }
}

/// Next queued command; never resolves once intake is closed.
async fn next_command(commands: &mut Option<mpsc::Receiver<ViewCommand>>) -> Option<ViewCommand> {
    match commands.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn apply_command<Ctx: FleetViewContext, R: RenderSurface>(
    view: &mut LiveView<Ctx, R>,
    commands: &mut Option<mpsc::Receiver<ViewCommand>>,
    summary: &mut RuntimeSummary,
    command: Option<ViewCommand>,
) {
    match command {
        Some(command) => {
            summary.commands += 1;
            view.apply(command);
        }
        None => {
            debug!("Command channel closed");
            *commands = None;
        }
    }
}

/// Sleeps until `deadline`; never resolves without one.
async fn sleep_until<Ctx: FleetViewContext>(context: &Ctx, deadline: Option<Duration>) {
    match deadline {
        Some(deadline) => context.sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressError, AddressResult};
    use crate::live_view::RenderFrame;
    use fleetview_env::{ConnectionId, FeedFrame, TokioContext};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Scripted transport: each inner list is one connection's frames.
    struct ScriptedFeed {
        sessions: Mutex<VecDeque<Result<Vec<String>, EnvError>>>,
        current: Mutex<VecDeque<String>>,
        opened: AtomicU64,
    }

    impl ScriptedFeed {
        fn new(sessions: Vec<Result<Vec<String>, EnvError>>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                current: Mutex::new(VecDeque::new()),
                opened: AtomicU64::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl FeedTransport for ScriptedFeed {
        async fn connect(&self) -> Result<ConnectionId, EnvError> {
            let next = self.sessions.lock().unwrap().pop_front();
            match next {
                Some(Ok(frames)) => {
                    *self.current.lock().unwrap() = frames.into();
                    let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(ConnectionId::from_seed(n))
                }
                Some(Err(e)) => Err(e),
                None => Err(EnvError::Shutdown),
            }
        }

        async fn recv(&self) -> Result<FeedFrame, EnvError> {
            let next = self.current.lock().unwrap().pop_front();
            match next {
                Some(payload) => {
                    let n = self.opened.load(Ordering::SeqCst);
                    Ok(FeedFrame::new(ConnectionId::from_seed(n), payload, 0))
                }
                None => Err(EnvError::closed("end of session")),
            }
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    #[derive(Default)]
    struct CountingSurface {
        renders: usize,
    }

    impl RenderSurface for CountingSurface {
        fn render(&mut self, _frame: &RenderFrame) {
            self.renders += 1;
        }
    }

    fn legacy(ids: &[&str]) -> String {
        let records: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"ordem": id, "latitude": -22.9, "longitude": -43.2}))
            .collect();
        serde_json::Value::Array(records).to_string()
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig {
            retry_delay: Duration::from_millis(1),
            max_attempts: None,
        }
    }

    #[tokio::test]
    async fn test_runtime_reconnects_and_keeps_snapshot() {
        let ctx = TokioContext::shared();
        let feed = Arc::new(ScriptedFeed::new(vec![
            Ok(vec![legacy(&["a", "b"])]),
            Err(EnvError::connection_failed("refused")),
            Ok(vec![r#"{"batch":[],"batchNumber":2,"totalBatches":2}"#.to_string()]),
        ]));
        let mut view = LiveView::with_defaults(Arc::clone(&ctx), CountingSurface::default());
        let runtime = FeedRuntime::new(ctx, feed, fast_config());

        let summary = runtime.run(&mut view).await.unwrap();

        assert_eq!(summary.connection_attempts, 4);
        assert_eq!(summary.connections, 2);
        assert_eq!(summary.disconnects, 2);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(view.store().current().len(), 2);
        assert_eq!(view.surface().renders, 1);
    }

    #[tokio::test]
    async fn test_runtime_respects_attempt_limit() {
        let ctx = TokioContext::shared();
        let feed = Arc::new(ScriptedFeed::new(vec![
            Err(EnvError::connection_failed("down")),
            Err(EnvError::connection_failed("down")),
            Err(EnvError::connection_failed("down")),
        ]));
        let mut view = LiveView::with_defaults(Arc::clone(&ctx), CountingSurface::default());
        let config = RuntimeConfig {
            max_attempts: Some(2),
            ..fast_config()
        };

        let summary = FeedRuntime::new(ctx, feed, config).run(&mut view).await.unwrap();
        assert_eq!(summary.connection_attempts, 2);
        assert_eq!(summary.connections, 0);
        assert!(matches!(view.status(), crate::live_view::ConnectionStatus::Error { .. }));
    }

    /// One connection that goes silent after its frames, then closes.
    struct QuietFeed {
        frames: Mutex<VecDeque<String>>,
        quiet: Duration,
        opened: AtomicU64,
    }

    impl QuietFeed {
        fn new(frames: Vec<String>, quiet: Duration) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
                quiet,
                opened: AtomicU64::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl FeedTransport for QuietFeed {
        async fn connect(&self) -> Result<ConnectionId, EnvError> {
            match self.opened.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(ConnectionId::from_seed(1)),
                _ => Err(EnvError::Shutdown),
            }
        }

        async fn recv(&self) -> Result<FeedFrame, EnvError> {
            let next = self.frames.lock().unwrap().pop_front();
            match next {
                Some(payload) => Ok(FeedFrame::new(ConnectionId::from_seed(1), payload, 0)),
                None => {
                    tokio::time::sleep(self.quiet).await;
                    Err(EnvError::closed("quiet"))
                }
            }
        }

        fn endpoint(&self) -> String {
            "quiet".to_string()
        }
    }

    #[derive(Default)]
    struct TimedSurface {
        rendered_at: Vec<Instant>,
        redrawn_at: Vec<Instant>,
        suggestions: Vec<Vec<String>>,
    }

    impl RenderSurface for TimedSurface {
        fn render(&mut self, _frame: &RenderFrame) {
            self.rendered_at.push(Instant::now());
        }

        fn force_redraw(&mut self) {
            self.redrawn_at.push(Instant::now());
        }

        fn on_address_suggestions(&mut self, results: &[AddressResult]) {
            self.suggestions
                .push(results.iter().map(|r| r.label.clone()).collect());
        }
    }

    struct FixedResolver;

    #[async_trait::async_trait]
    impl AddressResolver for FixedResolver {
        async fn resolve(&self, query: &str) -> Result<Vec<AddressResult>, AddressError> {
            Ok(vec![AddressResult {
                lat: -23.56,
                lon: -46.65,
                label: format!("{query}, Bela Vista, São Paulo"),
            }])
        }
    }

    fn with_lines(records: &[(&str, &str)]) -> String {
        let records: Vec<_> = records
            .iter()
            .map(|(id, line)| {
                serde_json::json!({"ordem": id, "linha": line, "latitude": -22.9, "longitude": -43.2})
            })
            .collect();
        serde_json::Value::Array(records).to_string()
    }

    #[tokio::test]
    async fn test_redraw_fires_while_feed_is_quiet() {
        let ctx = TokioContext::shared();
        let feed = Arc::new(QuietFeed::new(
            vec![legacy(&["a", "b"])],
            Duration::from_millis(600),
        ));
        let mut view = LiveView::with_defaults(Arc::clone(&ctx), TimedSurface::default());
        let runtime = FeedRuntime::new(ctx, feed, fast_config());

        let summary = runtime.run(&mut view).await.unwrap();
        assert_eq!(summary.frames, 1);

        let surface = view.surface();
        assert_eq!(surface.rendered_at.len(), 1);
        assert_eq!(surface.redrawn_at.len(), 1);
        let delay = surface.redrawn_at[0].duration_since(surface.rendered_at[0]);
        assert!(delay >= Duration::from_millis(90), "redraw after {delay:?}");
        assert!(delay < Duration::from_millis(400), "redraw after {delay:?}");
    }

    #[tokio::test]
    async fn test_commands_reach_view_between_frames() {
        let ctx = TokioContext::shared();
        let feed = Arc::new(QuietFeed::new(
            vec![with_lines(&[("a", "101"), ("b", "101"), ("c", "202")])],
            Duration::from_millis(600),
        ));
        let mut view = LiveView::with_defaults(Arc::clone(&ctx), TimedSurface::default());
        let runtime = FeedRuntime::new(ctx, feed, fast_config()).with_resolver(Arc::new(FixedResolver));

        let (tx, rx) = mpsc::channel(8);
        tx.send(ViewCommand::Search {
            lines: "101".to_string(),
            ids: String::new(),
        })
        .await
        .unwrap();
        tx.send(ViewCommand::AddressInput("Avenida Paulista".to_string()))
            .await
            .unwrap();
        drop(tx);

        let summary = runtime.run_with_commands(&mut view, rx).await.unwrap();

        assert_eq!(summary.commands, 2);
        assert_eq!(summary.updates, 1);
        assert_eq!(view.store().current().len(), 3);
        assert_eq!(view.visible().len(), 2);
        assert_eq!(
            view.surface().suggestions,
            vec![vec!["Avenida Paulista, Bela Vista, São Paulo".to_string()]]
        );
    }
}
