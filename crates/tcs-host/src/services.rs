//! Service registry with async handlers
//!
//! Services are the only way the engine changes the outside world (HVAC mode,
//! fan mode, vent tilt, notifications), and the way the host reaches the
//! engine's own operations (pause, resume, recalculate, ...).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tcs_core::{Context, ServiceCall};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// What a handler answers: optional response data or an error
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// A registered handler, boxed so closures of any type share one map
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("no such service {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service failed: {0}")]
    CallFailed(String),

    #[error("bad service payload: {0}")]
    InvalidData(String),

    #[error("config entry not found: {0}")]
    EntryNotFound(String),
}

type ServiceKey = (String, String);

fn key(domain: &str, service: &str) -> ServiceKey {
    (domain.to_string(), service.to_string())
}

/// Handlers keyed by domain and service name
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: DashMap<ServiceKey, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `domain.service`; a later registration replaces the handler
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let (domain, service) = (domain.into(), service.into());
        debug!(domain = %domain, service = %service, "Registering service");
        let boxed: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.handlers.insert((domain, service), boxed);
    }

    #[instrument(skip(self, data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        // Clone the handler out so the map shard is not held across the await
        let Some(handler) = self.handlers.get(&key(domain, service)).map(|h| h.clone()) else {
            warn!(domain, service, "Service not registered");
            return Err(ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            });
        };
        debug!(domain, service, "Calling service");
        handler(ServiceCall::new(domain, service, data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.handlers.contains_key(&key(domain, service))
    }

    /// Service names registered under a domain, sorted
    pub fn domain_services(&self, domain: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .iter()
            .filter(|entry| entry.key().0 == domain)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop every service of a domain, returning how many were removed
    #[instrument(skip(self))]
    pub fn unregister_domain(&self, domain: &str) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|(d, _), _| d != domain);
        let removed = before - self.handlers.len();
        debug!(domain, removed, "Unregistered domain services");
        removed
    }
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;
