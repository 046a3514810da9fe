//! Test doubles shared by the unit tests.

use crate::check::{Check, CheckError};
use crate::profile::EnvironmentProfile;
use crate::session::Session;
use crate::targets::TargetKind;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Profile with every endpoint set, overlaid with `vars`.
pub(crate) fn profile(vars: &[(&str, &str)]) -> EnvironmentProfile {
    let mut map: HashMap<String, String> = HashMap::from([
        ("YONDA_BASE_URL".to_string(), "http://edge.test".to_string()),
        ("YONDA_PROBE_BACKOFF_MS".to_string(), "1".to_string()),
    ]);
    for kind in TargetKind::DEPLOYMENT_ORDER {
        if let Some(var) = kind.endpoint_var() {
            map.insert(var.to_string(), format!("http://{}.test", kind.name()));
        }
    }
    for (key, value) in vars {
        map.insert(key.to_string(), value.to_string());
    }
    EnvironmentProfile::from_vars(&map).unwrap()
}

/// Transport that records requests and counts releases.
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    releases: AtomicUsize,
    delay: Duration,
    responder: Box<Responder>,
}

impl RecordingTransport {
    /// Answers every request with `200 {}`.
    pub(crate) fn ok() -> Self {
        Self::responding(|_| Ok(HttpResponse::new(200, "{}")))
    }

    /// Answers with `200 {}` after `delay`.
    pub(crate) fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok()
        }
    }

    pub(crate) fn responding(
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            delay: Duration::ZERO,
            responder: Box::new(responder),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    pub(crate) fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Check with a fixed result that counts its runs.
pub(crate) struct StaticCheck {
    name: String,
    failure: Option<String>,
    runs: AtomicUsize,
}

impl StaticCheck {
    pub(crate) fn passing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failure: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(name: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::passing(name)
        }
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Check for StaticCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _session: &Session) -> Result<(), CheckError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(CheckError::Assertion(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T: Check + ?Sized> Check for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        (**self).run(session).await
    }
}
