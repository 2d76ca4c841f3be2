use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::core::{AtomicU64, GenericCounter, GenericGauge};
use prometheus::{Encoder, Registry, TextEncoder};

use crate::try_info;
use crate::utils::Context;

type UInt64Gauge = GenericGauge<AtomicU64>;
type UInt64Counter = GenericCounter<AtomicU64>;

#[derive(Debug, Clone)]
pub struct PrometheusMonitoring {
    pub last_indexed_block_height: UInt64Gauge,
    pub bitcoind_chain_tip: UInt64Gauge,
    pub operations_found: UInt64Counter,
    pub operations_valid: UInt64Counter,
    pub reorgs_handled: UInt64Counter,
    pub registry: Registry,
}

impl PrometheusMonitoring {
    pub fn new() -> PrometheusMonitoring {
        let registry = Registry::new();
        let last_indexed_block_height = PrometheusMonitoring::create_gauge(
            &registry,
            "last_indexed_block_height",
            "Height of the most recently committed block.",
        );
        let bitcoind_chain_tip = PrometheusMonitoring::create_gauge(
            &registry,
            "bitcoind_chain_tip",
            "Chain tip reported by bitcoind.",
        );
        let operations_found = PrometheusMonitoring::create_counter(
            &registry,
            "operations_found_total",
            "Token operations recognized, valid or invalid.",
        );
        let operations_valid = PrometheusMonitoring::create_counter(
            &registry,
            "operations_valid_total",
            "Token operations accepted by consensus validation.",
        );
        let reorgs_handled = PrometheusMonitoring::create_counter(
            &registry,
            "reorgs_handled_total",
            "Chain reorganizations detected and rolled back.",
        );
        PrometheusMonitoring {
            last_indexed_block_height,
            bitcoind_chain_tip,
            operations_found,
            operations_valid,
            reorgs_handled,
            registry,
        }
    }

    fn create_gauge(registry: &Registry, name: &str, help: &str) -> UInt64Gauge {
        let gauge = UInt64Gauge::new(name, help).expect("unable to create prometheus gauge");
        registry
            .register(Box::new(gauge.clone()))
            .expect("unable to register prometheus gauge");
        gauge
    }

    fn create_counter(registry: &Registry, name: &str, help: &str) -> UInt64Counter {
        let counter = UInt64Counter::new(name, help).expect("unable to create prometheus counter");
        registry
            .register(Box::new(counter.clone()))
            .expect("unable to register prometheus counter");
        counter
    }

    pub fn initialize(&self, index_chain_tip: u64) {
        self.last_indexed_block_height.set(index_chain_tip);
    }

    pub fn block_indexed(&self, block_height: u64, operations_found: u64, operations_valid: u64) {
        self.last_indexed_block_height.set(block_height);
        self.operations_found.inc_by(operations_found);
        self.operations_valid.inc_by(operations_valid);
    }
}

impl Default for PrometheusMonitoring {
    fn default() -> Self {
        Self::new()
    }
}

async fn serve_metrics(
    _req: Request<Body>,
    registry: Registry,
) -> Result<Response<Body>, Infallible> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    let response = match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(_) => Response::new(Body::from(buffer)),
        Err(e) => Response::builder()
            .status(500)
            .body(Body::from(format!("unable to encode metrics: {e}")))
            .unwrap(),
    };
    Ok(response)
}

pub async fn start_serving_prometheus_metrics(
    port: u16,
    registry: Registry,
    ctx: Context,
) -> Result<(), String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| serve_metrics(req, registry.clone())))
        }
    });
    try_info!(ctx, "Prometheus metrics server listening on port {port}");
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| format!("prometheus metrics server error: {e}"))
}

#[cfg(test)]
mod test {
    use super::PrometheusMonitoring;

    #[test]
    fn block_metrics_accumulate() {
        let monitoring = PrometheusMonitoring::new();
        monitoring.initialize(799_999);
        monitoring.block_indexed(800_000, 5, 3);
        monitoring.block_indexed(800_001, 2, 2);
        assert_eq!(monitoring.last_indexed_block_height.get(), 800_001);
        assert_eq!(monitoring.operations_found.get(), 7);
        assert_eq!(monitoring.operations_valid.get(), 5);
    }
}
