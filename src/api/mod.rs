//! Typed clients for the appliance's services.
//!
//! Everything except the transport itself goes through
//! [`SessionGuard::guarded_fetch`](crate::session::SessionGuard::guarded_fetch).

pub mod alerts;
pub mod config;
pub mod inference;
pub mod pull;
pub mod responses;
pub mod state;
pub mod transport;

use std::sync::Arc;

use crate::session::SessionGuard;

pub use alerts::{DeliveryOutcome, EmailPayload};
pub use pull::PullStatus;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};

/// Service clients bound to one operator session.
#[derive(Clone)]
pub struct ApiClient {
    guard: Arc<SessionGuard>,
}

impl ApiClient {
    pub fn new(guard: Arc<SessionGuard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }
}

/// First `limit` characters of a response body, for error text.
pub(crate) fn snippet(body: &str, limit: usize) -> String {
    body.trim().chars().take(limit).collect()
}
