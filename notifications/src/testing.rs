//! Hand-written doubles shared by the connection and orchestrator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use platform_api::api::{
    NotificationApi, SubscriptionCollection, SubscriptionRequest, SubscriptionResource,
    TokenRequest, TokenResponse, UnsubscribeResponse,
};
use platform_api::error::{api_error, not_found_error, ApiErrorKind};
use platform_api::tenants::TenantApiProvider;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{transport_error, Error, TransportErrorKind};
use crate::handler::{DataFeedHandler, HandlerError};
use crate::message::MessageObject;
use crate::transport::{Frame, Socket, Transport, TransportState};

#[derive(Serialize)]
struct Claims {
    exp: i64,
}

/// HS256 token expiring at `exp`.
pub fn token_expiring_at(exp: DateTime<Utc>) -> String {
    encode(
        &Header::default(),
        &Claims {
            exp: exp.timestamp(),
        },
        &EncodingKey::from_secret(b"platform-secret"),
    )
    .unwrap()
}

/// Scripted platform that records every call as `verb:argument`.
#[derive(Default)]
pub struct MockApi {
    pub existing: Mutex<Option<String>>,
    pub created_id: Mutex<Option<String>>,
    pub tokens: Mutex<Vec<String>>,
    pub fail_with_status: Mutex<Option<u16>>,
    pub calls: Mutex<Vec<String>>,
    pub token_requests: Mutex<Vec<TokenRequest>>,
    /// Socket whose state is sampled on every unsubscribe.
    pub watched: Mutex<Option<Arc<MockSocket>>>,
    open_at_unsubscribe: Mutex<Vec<bool>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, id: &str) -> Self {
        *self.existing.lock().unwrap() = Some(id.to_string());
        self
    }

    pub fn with_created(self, id: &str) -> Self {
        *self.created_id.lock().unwrap() = Some(id.to_string());
        self
    }

    /// Tokens handed out in order; the last one repeats.
    pub fn with_tokens(self, tokens: &[String]) -> Self {
        *self.tokens.lock().unwrap() = tokens.to_vec();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether the watched socket was still open at each unsubscribe.
    pub fn open_at_unsubscribe(&self) -> Vec<bool> {
        self.open_at_unsubscribe.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) -> Result<(), platform_api::Error> {
        self.calls.lock().unwrap().push(call);
        match *self.fail_with_status.lock().unwrap() {
            Some(404) => Err(not_found_error("missing")),
            Some(status) => Err(api_error(ApiErrorKind::Status(status), "failed")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationApi for MockApi {
    async fn find_subscriptions(&self, name: &str) -> Result<SubscriptionCollection, platform_api::Error> {
        self.record(format!("find:{name}"))?;
        let subscriptions = self
            .existing
            .lock()
            .unwrap()
            .clone()
            .map(|id| vec![SubscriptionResource { id: Some(id) }])
            .unwrap_or_default();
        Ok(SubscriptionCollection { subscriptions })
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionResource, platform_api::Error> {
        self.record(format!("create:{}", request.subscription))?;
        let id = self.created_id.lock().unwrap().clone();
        *self.existing.lock().unwrap() = id.clone();
        Ok(SubscriptionResource { id })
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), platform_api::Error> {
        self.record(format!("delete:{id}"))
    }

    async fn create_token(&self, request: &TokenRequest) -> Result<TokenResponse, platform_api::Error> {
        self.record(format!("token:{}", request.subscriber))?;
        self.token_requests.lock().unwrap().push(request.clone());
        let mut tokens = self.tokens.lock().unwrap();
        let token = if tokens.len() > 1 {
            Some(tokens.remove(0))
        } else {
            tokens.first().cloned()
        };
        Ok(TokenResponse { token })
    }

    async fn unsubscribe(&self, token: &str) -> Result<UnsubscribeResponse, platform_api::Error> {
        let watched = self.watched.lock().unwrap().clone();
        if let Some(socket) = watched {
            let open = !*socket.closed.lock().unwrap();
            self.open_at_unsubscribe.lock().unwrap().push(open);
        }
        self.record(format!("unsubscribe:{token}"))?;
        Ok(UnsubscribeResponse {
            result: Some("DONE".to_string()),
        })
    }
}

#[derive(Default)]
pub struct Tenants(pub HashMap<String, Arc<MockApi>>);

impl Tenants {
    pub fn with(tenant: &str, api: Arc<MockApi>) -> Self {
        Self(HashMap::from([(tenant.to_string(), api)]))
    }
}

impl TenantApiProvider for Tenants {
    fn api_for(&self, tenant: &str) -> Option<Arc<dyn NotificationApi>> {
        self.0
            .get(tenant)
            .map(|api| api.clone() as Arc<dyn NotificationApi>)
    }
}

/// Socket whose inbound frames are pushed by the test.
pub struct MockSocket {
    pub url: Url,
    state: AtomicU8,
    frames_tx: UnboundedSender<Frame>,
    frames_rx: tokio::sync::Mutex<UnboundedReceiver<Frame>>,
    dead: CancellationToken,
    pub sent: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl MockSocket {
    fn new(url: &Url) -> Self {
        let (frames_tx, frames_rx) = unbounded_channel();
        Self {
            url: url.clone(),
            state: AtomicU8::new(TransportState::Open as u8),
            frames_tx,
            frames_rx: tokio::sync::Mutex::new(frames_rx),
            dead: CancellationToken::new(),
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    pub fn push(&self, text: &str) {
        self.frames_tx.send(Frame::Text(text.to_string())).unwrap();
    }

    pub fn push_close(&self) {
        self.frames_tx.send(Frame::Close).unwrap();
    }

    /// Simulate a broken connection; pending receives fail.
    pub fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::SeqCst);
        if matches!(state, TransportState::Aborted | TransportState::Closed) {
            self.dead.cancel();
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    }
}

#[async_trait]
impl Socket for MockSocket {
    fn state(&self) -> TransportState {
        TransportState::from(self.state.load(Ordering::SeqCst))
    }

    async fn send(&self, text: &str) -> Result<(), Error> {
        if self.state() != TransportState::Open {
            return Err(transport_error(TransportErrorKind::Send, "socket is not open"));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn receive(&self) -> Result<Frame, Error> {
        let mut frames = self.frames_rx.lock().await;
        tokio::select! {
            _ = self.dead.cancelled() => Err(transport_error(TransportErrorKind::Receive, "socket died")),
            frame = frames.recv() => match frame {
                Some(Frame::Close) => {
                    self.set_state(TransportState::Closed);
                    Ok(Frame::Close)
                }
                Some(frame) => Ok(frame),
                None => Err(transport_error(TransportErrorKind::Closed, "no more frames")),
            },
        }
    }

    async fn close(&self) -> Result<(), Error> {
        *self.closed.lock().unwrap() = true;
        self.set_state(TransportState::Closed);
        Ok(())
    }
}

/// Transport handing out `MockSocket`s and remembering them.
#[derive(Default)]
pub struct MockTransport {
    pub sockets: Mutex<Vec<Arc<MockSocket>>>,
    pub refuse: Mutex<bool>,
    pub attempts: AtomicUsize,
    pub delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        let transport = Self::default();
        *transport.refuse.lock().unwrap() = true;
        transport
    }

    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sockets(&self) -> Vec<Arc<MockSocket>> {
        self.sockets.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<MockSocket> {
        self.sockets().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> Result<Arc<dyn Socket>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.refuse.lock().unwrap() {
            return Err(transport_error(
                TransportErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }

        let socket = Arc::new(MockSocket::new(url));
        self.sockets.lock().unwrap().push(socket.clone());
        Ok(socket)
    }
}

/// Handler that records messages; payloads `fail` and `panic` misbehave.
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<MessageObject>>,
}

impl RecordingHandler {
    pub fn received(&self) -> Vec<MessageObject> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataFeedHandler for RecordingHandler {
    async fn handle(&self, message: &MessageObject) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(message.clone());
        match message.message.as_str() {
            "fail" => Err("handler failed".into()),
            "panic" => panic!("handler panicked"),
            _ => Ok(()),
        }
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
