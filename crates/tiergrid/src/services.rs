//! Simulated services.
//!
//! Stand-ins for real backends: a web server that answers after a random
//! delay, and a database that keeps an in-memory `requests` table. Nothing
//! here touches the network or disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use tiergrid_core::{Request, Response, Service, ServiceFactory, SimulationConfig};

pub const WEB_SERVER_COST: f64 = 10.0;
pub const DATABASE_COST: f64 = 20.0;

/// Latency and failure behaviour shared by every simulated service.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub failure_rate: f64,
}

impl Profile {
    pub fn from_config(sim: &SimulationConfig) -> Self {
        Self {
            min_latency: Duration::from_millis(sim.min_latency_ms),
            max_latency: Duration::from_millis(sim.max_latency_ms),
            failure_rate: sim.failure_rate,
        }
    }

    /// Pick this request's latency and whether it fails.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        (latency, rng.r#gen::<f64>() < self.failure_rate)
    }
}

/// Sequential `prefix-N` identities, unique per factory.
fn id_sequence(prefix: &'static str) -> impl Fn() -> String + Send + Sync {
    let next = AtomicU64::new(0);
    move || format!("{prefix}-{}", next.fetch_add(1, Ordering::Relaxed))
}

pub struct WebServer {
    id: String,
    profile: Profile,
}

impl WebServer {
    pub fn new(id: impl Into<String>, profile: Profile) -> Self {
        Self {
            id: id.into(),
            profile,
        }
    }

    pub fn factory(prefix: &'static str, profile: Profile) -> ServiceFactory {
        let next_id = id_sequence(prefix);
        Arc::new(move || Arc::new(WebServer::new(next_id(), profile)) as Arc<dyn Service>)
    }
}

#[async_trait]
impl Service for WebServer {
    fn id(&self) -> &str {
        &self.id
    }

    fn cost(&self) -> f64 {
        WEB_SERVER_COST
    }

    async fn process(&self, request: &Request) -> anyhow::Result<Response> {
        let (latency, fail) = self.profile.roll();
        tokio::time::sleep(latency).await;
        if fail {
            anyhow::bail!("web server {} dropped request {}", self.id, request.id);
        }
        Ok(Response::new(
            &self.id,
            format!("Processed by WebServer {}: {}", self.id, request.body),
        ))
    }

    async fn start(&self) -> anyhow::Result<()> {
        debug!(service_id = %self.id, "web server started");
        Ok(())
    }

    async fn stop(&self) {
        debug!(service_id = %self.id, "web server stopped");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    id: u64,
    request_data: String,
}

/// In-memory stand-in for a database replica.
///
/// Each request inserts a row and reads the newest one back. Rows live only
/// as long as the replica.
pub struct Database {
    id: String,
    profile: Profile,
    rows: Mutex<Vec<Row>>,
}

impl Database {
    pub fn new(id: impl Into<String>, profile: Profile) -> Self {
        Self {
            id: id.into(),
            profile,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn factory(prefix: &'static str, profile: Profile) -> ServiceFactory {
        let next_id = id_sequence(prefix);
        Arc::new(move || Arc::new(Database::new(next_id(), profile)) as Arc<dyn Service>)
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl Service for Database {
    fn id(&self) -> &str {
        &self.id
    }

    fn cost(&self) -> f64 {
        DATABASE_COST
    }

    async fn process(&self, request: &Request) -> anyhow::Result<Response> {
        let (latency, fail) = self.profile.roll();
        tokio::time::sleep(latency).await;
        if fail {
            anyhow::bail!("database {} rejected request {}", self.id, request.id);
        }

        let newest = {
            let mut rows = self.rows.lock().await;
            let id = rows.len() as u64 + 1;
            rows.push(Row {
                id,
                request_data: request.body.clone(),
            });
            rows.last().cloned()
        };

        let body = match newest {
            Some(row) => format!(
                "Database query processed by {}: ({}, {:?})",
                self.id, row.id, row.request_data
            ),
            None => anyhow::bail!("database {} lost its newest row", self.id),
        };
        Ok(Response::new(&self.id, body))
    }

    async fn stop(&self) {
        let dropped = {
            let mut rows = self.rows.lock().await;
            std::mem::take(&mut *rows).len()
        };
        debug!(service_id = %self.id, rows = dropped, "database stopped");
    }
}
