//! Capabilities supplied by the embedding host.

use crate::frame::Rotation;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of one permission round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResponse {
    Granted,
    Denied,
    /// Denied, and the host wants to explain why before asking again
    ShowRationale,
}

impl PermissionResponse {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionResponse::Granted)
    }
}

/// Asynchronous permission request primitive
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Ask the host for `permission`; resolves once the user has answered
    async fn request_permission(&self, permission: &str) -> PermissionResponse;
}

/// Current display rotation query
pub trait RotationProvider: Send + Sync {
    fn current_rotation(&self) -> Rotation;
}

impl<F> RotationProvider for F
where
    F: Fn() -> Rotation + Send + Sync,
{
    fn current_rotation(&self) -> Rotation {
        self()
    }
}

/// Rotation that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRotation(pub Rotation);

impl RotationProvider for FixedRotation {
    fn current_rotation(&self) -> Rotation {
        self.0
    }
}

/// Permission provider that replays a queue of answers.
///
/// Once the queue is drained every request gets `fallback`.
pub struct ScriptedPermission {
    responses: Mutex<VecDeque<PermissionResponse>>,
    fallback: PermissionResponse,
    delay: Duration,
    requests: Mutex<Vec<String>>,
}

impl ScriptedPermission {
    pub fn new(responses: Vec<PermissionResponse>, fallback: PermissionResponse) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `response`
    pub fn always(response: PermissionResponse) -> Self {
        Self::new(Vec::new(), response)
    }

    /// Wait `delay` before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl PermissionProvider for ScriptedPermission {
    async fn request_permission(&self, permission: &str) -> PermissionResponse {
        self.requests.lock().push(permission.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(self.fallback);
        debug!("Permission request for {} answered {:?}", permission, response);
        response
    }
}
