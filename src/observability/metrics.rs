use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub broadcasts_total: IntCounter,
    pub claims_total: IntCounterVec,
    pub recalls_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub broadcast_candidates: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let broadcasts_total = IntCounter::new(
            "delivery_broadcasts_total",
            "Total delivery assignments broadcasted to couriers",
        )
        .expect("valid delivery_broadcasts_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new(
                "assignment_claims_total",
                "Assignment claim attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid assignment_claims_total metric");

        let recalls_total = IntCounter::new(
            "assignment_recalls_total",
            "Broadcasts recalled before any courier accepted",
        )
        .expect("valid assignment_recalls_total metric");

        let deliveries_total = IntCounter::new(
            "deliveries_completed_total",
            "Deliveries confirmed via customer otp",
        )
        .expect("valid deliveries_completed_total metric");

        let broadcast_candidates = Histogram::with_opts(HistogramOpts::new(
            "broadcast_candidate_count",
            "Number of candidate couriers per broadcast",
        ))
        .expect("valid broadcast_candidate_count metric");

        registry
            .register(Box::new(broadcasts_total.clone()))
            .expect("register delivery_broadcasts_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register assignment_claims_total");
        registry
            .register(Box::new(recalls_total.clone()))
            .expect("register assignment_recalls_total");
        registry
            .register(Box::new(deliveries_total.clone()))
            .expect("register deliveries_completed_total");
        registry
            .register(Box::new(broadcast_candidates.clone()))
            .expect("register broadcast_candidate_count");

        Self {
            registry,
            broadcasts_total,
            claims_total,
            recalls_total,
            deliveries_total,
            broadcast_candidates,
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
