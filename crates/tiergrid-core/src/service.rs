//! The service capability and its pooled replica wrapper.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A unit of work dispatched to a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub body: String,
}

impl Request {
    pub fn new(id: u64, body: impl Into<String>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }
}

/// The result of processing a request, possibly across several tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Ids of the services that handled the request, in dispatch order.
    pub served_by: Vec<String>,
    pub body: String,
}

impl Response {
    pub fn new(service_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            served_by: vec![service_id.into()],
            body: body.into(),
        }
    }

    /// Compose this response with the next tier's response.
    pub fn chain(mut self, next: Response) -> Response {
        self.served_by.extend(next.served_by);
        self.body = format!("{} -> {}", self.body, next.body);
        self
    }
}

/// Anything that can process requests for a tier.
///
/// Implementations own what "processing" means (an HTTP handler, a row
/// insert, a sleep). Load accounting is done by [`Replica`], not here.
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique identity within a pool.
    fn id(&self) -> &str;

    /// Fixed cost of keeping this service running.
    fn cost(&self) -> f64;

    /// Process one request.
    async fn process(&self, request: &Request) -> anyhow::Result<Response>;

    /// Called once before the service joins a pool.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the service leaves a pool.
    async fn stop(&self) {}
}

/// Produces a fresh service for scale-up.
pub type ServiceFactory = Arc<dyn Fn() -> Arc<dyn Service> + Send + Sync>;

/// A pooled service plus its load counter.
///
/// `load` counts successfully processed requests and only ever grows.
pub struct Replica {
    service: Arc<dyn Service>,
    load: AtomicU64,
}

impl Replica {
    pub fn new(service: Arc<dyn Service>) -> Self {
        Self::with_load(service, 0)
    }

    /// Create a replica with a pre-existing load count.
    pub fn with_load(service: Arc<dyn Service>, load: u64) -> Self {
        Self {
            service,
            load: AtomicU64::new(load),
        }
    }

    pub fn id(&self) -> &str {
        self.service.id()
    }

    pub fn cost(&self) -> f64 {
        self.service.cost()
    }

    /// Requests processed successfully so far.
    pub fn load(&self) -> u64 {
        self.load.load(Ordering::Relaxed)
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Count one successfully processed request. Returns the new load.
    pub fn record_request(&self) -> u64 {
        self.load.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn process(&self, request: &Request) -> anyhow::Result<Response> {
        self.service.process(request).await
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.id())
            .field("cost", &self.cost())
            .field("load", &self.load())
            .finish()
    }
}
