use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub order_transitions_total: IntCounterVec,
    pub connected_drivers: IntGauge,
    pub hub_disconnects_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch cycles by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of candidate search and assignment in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order lifecycle transitions by transition and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let connected_drivers =
            IntGauge::new("connected_drivers", "Drivers with a live hub connection")
                .expect("valid connected_drivers metric");

        let hub_disconnects_total = IntCounterVec::new(
            Opts::new("hub_disconnects_total", "Hub-initiated disconnects by reason"),
            &["reason"],
        )
        .expect("valid hub_disconnects_total metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(connected_drivers.clone()))
            .expect("register connected_drivers");
        registry
            .register(Box::new(hub_disconnects_total.clone()))
            .expect("register hub_disconnects_total");

        Self {
            registry,
            dispatch_total,
            dispatch_latency_seconds,
            order_transitions_total,
            connected_drivers,
            hub_disconnects_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
