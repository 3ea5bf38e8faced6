//! Application context: the hub, the shared state, and the message handler.

use std::env;
use std::ffi::OsStr;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use log::{debug, error, info};
use tokio::net::TcpListener;

use crate::api::{self, AppState, ServerOptions};
use crate::artifacts::ArtifactStore;
use crate::layout::{LayoutDefaults, LayoutState};
use crate::stream::{BroadcastHub, ChatEvent, ConnectionReplay, Message};

/// Environment variable an external launcher sets for apps it starts as
/// child processes. Non-empty and not `"0"` counts as set.
pub const CLI_ENV_VAR: &str = "CHATSTAGE_CLI";

static LAUNCHED_BY_CLI: AtomicBool = AtomicBool::new(false);

/// Mark this process as running under the `chatstage` launcher.
///
/// [`ChatApp::run`] then returns without starting a server because the
/// launcher serves the app itself.
pub fn mark_launched_by_cli() {
    LAUNCHED_BY_CLI.store(true, Ordering::Relaxed);
}

/// Whether the launcher flag is raised, in-process or through [`CLI_ENV_VAR`].
pub fn launched_by_cli() -> bool {
    LAUNCHED_BY_CLI.load(Ordering::Relaxed) || env_flag_set(env::var_os(CLI_ENV_VAR).as_deref())
}

/// Role used for messages sent by the application.
pub const AI_ROLE: &str = "ai";

/// Callback invoked for every inbound chat message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, app: &ChatApp, message: Message) -> Result<()>;
}

/// Adapter for async closures.
struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for AsyncFnHandler<F>
where
    F: Fn(ChatApp, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, app: &ChatApp, message: Message) -> Result<()> {
        (self.0)(app.clone(), message).await
    }
}

/// Adapter for synchronous closures.
struct SyncFnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for SyncFnHandler<F>
where
    F: Fn(&ChatApp, Message) -> Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, app: &ChatApp, message: Message) -> Result<()> {
        (self.0)(app, message)
    }
}

struct AppInner {
    hub: Arc<BroadcastHub>,
    layout: Arc<LayoutState>,
    artifacts: Arc<ArtifactStore>,
    replay: ConnectionReplay,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
}

/// A chat application.
///
/// Cheap to clone; all clones share the same hub, state and handler.
#[derive(Clone)]
pub struct ChatApp {
    inner: Arc<AppInner>,
}

impl ChatApp {
    /// Create an application with the default header.
    pub fn new() -> Self {
        Self::with_layout_defaults(LayoutDefaults::default())
    }

    pub fn with_layout_defaults(defaults: LayoutDefaults) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let layout = Arc::new(LayoutState::new(hub.clone(), defaults));
        let artifacts = Arc::new(ArtifactStore::new(hub.clone()));
        let replay = ConnectionReplay::new(layout.clone(), artifacts.clone());

        Self {
            inner: Arc::new(AppInner {
                hub,
                layout,
                artifacts,
                replay,
                handler: RwLock::new(None),
            }),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.inner.hub
    }

    pub fn layout(&self) -> &LayoutState {
        &self.inner.layout
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    pub fn replay(&self) -> &ConnectionReplay {
        &self.inner.replay
    }

    /// Register the message handler, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Register an async closure as the message handler.
    pub fn on_chat_message<F, Fut>(&self, f: F)
    where
        F: Fn(ChatApp, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.set_handler(Arc::new(AsyncFnHandler(f)));
    }

    /// Register a synchronous closure as the message handler.
    pub fn on_chat_message_sync<F>(&self, f: F)
    where
        F: Fn(&ChatApp, Message) -> Result<()> + Send + Sync + 'static,
    {
        self.set_handler(Arc::new(SyncFnHandler(f)));
    }

    pub fn has_handler(&self) -> bool {
        self.handler().is_some()
    }

    fn handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.inner
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pass an inbound message to the registered handler.
    ///
    /// Messages are dropped when no handler is registered. Handler errors are
    /// logged and not returned; inbound acceptance does not depend on them.
    pub async fn dispatch(&self, message: Message) {
        let Some(handler) = self.handler() else {
            debug!("No message handler registered, dropping message");
            return;
        };

        let role = message.role.clone();
        if let Err(e) = handler.handle(self, message).await {
            error!("Message handler failed for {} message: {:#}", role, e);
        }
    }

    /// Broadcast an event to every connected client.
    pub fn emit(&self, event: impl Into<ChatEvent>) -> usize {
        self.inner.hub.broadcast(event.into())
    }

    /// Broadcast a chat message.
    pub fn send(&self, message: Message) -> usize {
        self.emit(message)
    }

    /// Broadcast a text message with the given role.
    pub fn send_message(&self, content: impl Into<String>, role: impl Into<String>) -> usize {
        self.send(Message::new(role, content))
    }

    /// Broadcast an AI text message.
    pub fn reply(&self, content: impl Into<String>) -> usize {
        self.send_message(content, AI_ROLE)
    }

    /// Broadcast an AI "thought" message.
    pub fn think(&self, content: impl Into<String>) -> usize {
        self.send(Message::thought(AI_ROLE, content))
    }

    /// Build the HTTP router serving this application.
    pub fn router(&self, options: &ServerOptions) -> Router {
        api::create_router(AppState::new(self.clone()), options)
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        options: &ServerOptions,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener.local_addr().context("reading listener address")?;
        info!("Listening on http://{}", addr);

        axum::serve(listener, self.router(options))
            .with_graceful_shutdown(shutdown)
            .await
            .context("running server")
    }

    /// Bind `host:port` and serve until Ctrl+C.
    ///
    /// Returns immediately when launched by the `chatstage` CLI.
    pub async fn run(&self, host: &str, port: u16) -> Result<()> {
        if launched_by_cli() {
            info!("Running under the chatstage launcher, skipping embedded server start");
            return Ok(());
        }

        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid address {host}:{port}"))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding to {addr}"))?;

        self.serve(listener, &ServerOptions::default(), shutdown_signal())
            .await
    }
}

impl Default for ChatApp {
    fn default() -> Self {
        Self::new()
    }
}

fn env_flag_set(value: Option<&OsStr>) -> bool {
    value.is_some_and(|v| !v.is_empty() && v != "0")
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
