//! Shared fixtures for the session integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tether_core::{Clock, EventBus, MemoryStore, Role, SessionEvent, SessionRecord, SessionStore};
use tether_http::AuthClient;
use tether_http::client::{HttpRequest, HttpResponse, Transport, TransportError};
use tether_session::{LifecycleConfig, TokenLifecycle};

pub const BASE: &str = "http://tether.test";
pub const T0: i64 = 1_700_000_000;

/// Seconds clock driven by tokio time, so paused tests control it
#[derive(Debug)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    base: i64,
}

impl TokioClock {
    pub fn new(base: i64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> i64 {
        self.base + i64::try_from(self.origin.elapsed().as_secs()).unwrap()
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Respond { status: u16, body: Value },
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct Reply {
    outcome: Outcome,
    delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            outcome: Outcome::Respond { status, body },
            delay: Duration::ZERO,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn network_error() -> Self {
        Self {
            outcome: Outcome::Fail("connection refused".into()),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory transport answering from per-path scripts.
///
/// Replies for a path are consumed in order; the last one repeats.
/// Unscripted paths answer 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<HttpRequest> {
        self.calls()
            .into_iter()
            .filter(|request| request.url == format!("{BASE}{path}"))
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let path = url.strip_prefix(BASE)?;
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(&request.url);
        self.calls.lock().unwrap().push(request);

        let Some(reply) = reply else {
            return Ok(HttpResponse {
                status: 404,
                content_type: Some("application/json".into()),
                body: json!({"msg": "not found"}).to_string(),
            });
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        match reply.outcome {
            Outcome::Respond { status, body } => Ok(HttpResponse {
                status,
                content_type: Some("application/json".into()),
                body: body.to_string(),
            }),
            Outcome::Fail(message) => Err(TransportError::new(message)),
        }
    }
}

/// Every event published on a bus, in order
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Recorder {
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let sink = recorder.events.clone();
        bus.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));
        recorder
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &SessionEvent) -> bool {
        self.events().contains(event)
    }

    pub fn count(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

pub struct Harness {
    pub lifecycle: TokenLifecycle,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub recorder: Recorder,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let recorder = Recorder::attach(&events);
        let client = AuthClient::builder()
            .base_url(BASE)
            .store(store.clone())
            .transport(transport.clone())
            .events(events)
            .retries(0)
            .build()
            .unwrap();
        let lifecycle = TokenLifecycle::with_clock(
            client,
            LifecycleConfig::default(),
            Arc::new(TokioClock::new(T0)),
        );
        Self {
            lifecycle,
            store,
            transport,
            recorder,
        }
    }

    pub fn session(&self) -> SessionStore {
        SessionStore::new(self.store.clone())
    }

    /// Store a complete record expiring at `exp`
    pub fn seed(&self, exp: i64) -> SessionRecord {
        let record = SessionRecord {
            access_token: "access-0".into(),
            refresh_token: "refresh-0".into(),
            device_id: "device-1".into(),
            username: "ana".into(),
            role: Role::User,
            exp,
            jti: Some("jti-0".into()),
            last_refresh_at: None,
        };
        self.session().save(&record).unwrap();
        record
    }
}

/// Refresh response minting generation `n` of the tokens
pub fn token_set(n: u32, exp: i64) -> Value {
    json!({
        "access_token": format!("access-{n}"),
        "refresh_token": format!("refresh-{n}"),
        "device_id": "device-1",
        "username": "ana",
        "rol": "User",
        "exp": exp,
        "jti": format!("jti-{n}"),
    })
}
