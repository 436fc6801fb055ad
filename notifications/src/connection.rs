//! One streaming session per registered subscription.
//!
//! A `Connection` owns its socket and two background loops: the receive loop
//! reads frames, hands them to the data feed handler and acknowledges them;
//! the monitor loop watches the socket and reconnects it when it breaks.
//! Both loops share the connection state without a common lock. A reconnect
//! may swap the socket while a receive is pending on the old one; that read
//! fails, is logged, and the loop picks up the new socket on its next turn.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::FutureExt;
use log::*;
use platform_api::tokens::{TokenClaim, TokenClaimWithToken, TokenProvider};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{redacted, with_token};
use crate::error::{invalid_state_error, Error};
use crate::handler::DataFeedHandler;
use crate::message::{extract, MessageObject};
use crate::sync::{with_timeout, BackgroundTask};
use crate::transport::{Frame, Socket, Transport, TransportState};

/// How long the receive loop idles while the socket is not open.
const IDLE_RECEIVE_DELAY: Duration = Duration::from_millis(1);

/// Everything a connection needs besides its handler.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Streaming endpoint without the token.
    pub consumer_url: Url,
    pub operation_timeout: Duration,
    pub monitor_interval: Duration,
    pub transport: Arc<dyn Transport>,
    pub tokens: Arc<TokenProvider>,
}

struct Session {
    tenant: String,
    claim: TokenClaim,
    token: String,
    /// `None` between discarding a broken socket and opening its replacement.
    socket: Option<Arc<dyn Socket>>,
}

struct Inner {
    context: ConnectionContext,
    handler: Arc<dyn DataFeedHandler>,
    session: RwLock<Option<Session>>,
    /// Held for the whole of a reopen so only one replacement socket is opened.
    reopening: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

pub struct Connection {
    inner: Arc<Inner>,
    loops: tokio::sync::Mutex<Vec<BackgroundTask>>,
}

impl Connection {
    /// `shutdown` aborts pending connects and stops the loops when cancelled.
    pub fn new(
        context: ConnectionContext,
        handler: Arc<dyn DataFeedHandler>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                handler,
                session: RwLock::new(None),
                reopening: tokio::sync::Mutex::new(()),
                cancel: shutdown.child_token(),
            }),
            loops: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Open the socket and start the receive and monitor loops.
    ///
    /// Does nothing when already connected. On failure the connection stays
    /// idle and the (transient) error is returned.
    pub async fn connect(&self, tenant: &str, token: TokenClaimWithToken) -> Result<(), Error> {
        let mut loops = self.loops.lock().await;
        let connected = self.inner.read_session().is_some();
        if connected {
            return Ok(());
        }

        let TokenClaimWithToken { claim, token } = token;
        let url = with_token(&self.inner.context.consumer_url, &token);
        info!(
            "Connecting subscription {} of tenant {tenant} to {}",
            claim.subscription,
            redacted(&url)
        );

        let socket = with_timeout(
            self.inner.context.operation_timeout,
            &self.inner.cancel,
            self.inner.context.transport.connect(&url),
        )
        .await?;

        let label = format!("{tenant}/{}", claim.subscription);
        *self.inner.write_session() = Some(Session {
            tenant: tenant.to_string(),
            claim,
            token,
            socket: Some(socket),
        });

        let inner = self.inner.clone();
        loops.push(BackgroundTask::looping(
            &format!("receive loop {label}"),
            &self.inner.cancel,
            move || {
                let inner = inner.clone();
                async move { inner.receive_once().await }
            },
        ));

        let inner = self.inner.clone();
        loops.push(BackgroundTask::periodic(
            &format!("monitor loop {label}"),
            self.inner.context.monitor_interval,
            &self.inner.cancel,
            move || {
                let inner = inner.clone();
                async move {
                    inner.monitor_once().await;
                    Ok(())
                }
            },
        ));

        info!("Connected subscription {label}");
        Ok(())
    }

    /// Re-open a broken socket, refreshing the token first if it expired.
    pub async fn reconnect(&self) -> Result<(), Error> {
        self.inner.reconnect().await
    }

    /// Stop both loops, close the socket if it is open and forget the session.
    ///
    /// Returns once the loops have exited.
    pub async fn disconnect(&self) {
        let mut loops = self.loops.lock().await;
        for task in loops.drain(..) {
            task.stop().await;
        }

        let session = self.inner.write_session().take();
        let Some(session) = session else {
            return;
        };

        if let Some(socket) = session.socket {
            if socket.state() == TransportState::Open {
                if let Err(e) = socket.close().await {
                    debug!("Closing subscription {} failed: {e}", session.claim.subscription);
                }
            }
        }
        info!(
            "Disconnected subscription {} of tenant {}",
            session.claim.subscription, session.tenant
        );
    }

    /// Write one text frame on the current socket.
    pub async fn send(&self, text: &str) -> Result<(), Error> {
        let socket = self
            .inner
            .socket()
            .ok_or_else(|| invalid_state_error("Connection has not been opened."))?;
        socket.send(text).await
    }

    pub fn state(&self) -> TransportState {
        self.inner.state()
    }

    /// The token the connection currently holds.
    pub fn token(&self) -> Option<String> {
        self.inner
            .read_session()
            .as_ref()
            .map(|session| session.token.clone())
    }
}

impl Inner {
    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.read_session()
            .as_ref()
            .and_then(|session| session.socket.clone())
    }

    fn state(&self) -> TransportState {
        match self.read_session().as_ref() {
            None => TransportState::Idle,
            Some(session) => session
                .socket
                .as_ref()
                .map_or(TransportState::Closed, |socket| socket.state()),
        }
    }

    fn label(&self) -> String {
        self.read_session().as_ref().map_or_else(
            || "<idle>".to_string(),
            |session| format!("{}/{}", session.tenant, session.claim.subscription),
        )
    }

    async fn reconnect(&self) -> Result<(), Error> {
        with_timeout(
            self.context.operation_timeout,
            &self.cancel,
            self.reconnect_exclusive(),
        )
        .await
    }

    async fn reconnect_exclusive(&self) -> Result<(), Error> {
        let _reopening = self.reopening.lock().await;

        let (tenant, claim, current) = {
            let session = self.read_session();
            let session = session
                .as_ref()
                .ok_or_else(|| invalid_state_error("Not connected."))?;
            (session.tenant.clone(), session.claim.clone(), session.token.clone())
        };

        if self.state() == TransportState::Open {
            return Ok(());
        }

        self.reopen(&tenant, &claim, current).await
    }

    async fn reopen(&self, tenant: &str, claim: &TokenClaim, current: String) -> Result<(), Error> {
        let token = self
            .context
            .tokens
            .get_token_if_expired(tenant, claim, &current)
            .await?
            .unwrap_or(current);

        {
            let mut session = self.write_session();
            let session = session
                .as_mut()
                .ok_or_else(|| invalid_state_error("Disconnected during reconnect."))?;
            session.token = token.clone();
            session.socket = None;
        }

        let url = with_token(&self.context.consumer_url, &token);
        debug!("Reconnecting to {}", redacted(&url));
        let socket = self.context.transport.connect(&url).await?;

        let stale = {
            let mut session = self.write_session();
            match session.as_mut() {
                Some(session) if session.token == token => {
                    session.socket = Some(socket);
                    None
                }
                _ => Some(socket),
            }
        };

        match stale {
            None => {
                info!("Reconnected subscription {}", claim.subscription);
                Ok(())
            }
            Some(socket) => {
                let _ = socket.close().await;
                Err(invalid_state_error("Disconnected during reconnect."))
            }
        }
    }

    /// One receive loop iteration.
    async fn receive_once(&self) -> Result<(), Error> {
        let socket = match self.socket() {
            Some(socket) if socket.state() == TransportState::Open => socket,
            _ => {
                tokio::time::sleep(IDLE_RECEIVE_DELAY).await;
                return Ok(());
            }
        };

        let text = match socket.receive().await? {
            Frame::Close => return Ok(()),
            Frame::Text(text) => text,
        };

        let data = extract(&text);
        let message = MessageObject::from(&data);

        match AssertUnwindSafe(self.handler.handle(&message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => socket.send(&data.acknowledgement).await,
            Ok(Err(e)) => {
                warn!(
                    "Handler of {} failed, message {} stays unacknowledged: {e}",
                    self.label(),
                    data.acknowledgement
                );
                Ok(())
            }
            Err(_) => {
                error!(
                    "Handler of {} panicked, message {} stays unacknowledged",
                    self.label(),
                    data.acknowledgement
                );
                Ok(())
            }
        }
    }

    /// One monitor loop iteration.
    async fn monitor_once(&self) {
        let state = self.state();
        debug!("{} is {:?}", self.label(), state);

        if matches!(state, TransportState::Aborted | TransportState::Closed) {
            if let Err(e) = self.reconnect().await {
                debug!(
                    "Reconnect of {} failed (transient: {}): {e}",
                    self.label(),
                    e.is_transient()
                );
            }
        }
    }
}
