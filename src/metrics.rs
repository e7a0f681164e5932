//! Prometheus metrics for the round engine and connection layer.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct EngineMetrics {
    registry: Registry,
    pub rounds_total: IntCounter,
    pub bets_placed_total: IntCounter,
    pub cashouts_total: IntCounter,
    pub bets_lost_total: IntCounter,
    pub coins_wagered_total: IntCounter,
    pub coins_paid_out_total: IntCounter,
    pub connected_clients: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("valid metric name");
            registry
                .register(Box::new(c.clone()))
                .expect("metric registered once");
            c
        }

        let rounds_total = counter(&registry, "crashwave_rounds_total", "Finished rounds");
        let bets_placed_total =
            counter(&registry, "crashwave_bets_placed_total", "Accepted bets");
        let cashouts_total = counter(
            &registry,
            "crashwave_cashouts_total",
            "Successful cash-outs",
        );
        let bets_lost_total = counter(
            &registry,
            "crashwave_bets_lost_total",
            "Bets settled as lost",
        );
        let coins_wagered_total = counter(
            &registry,
            "crashwave_coins_wagered_total",
            "Total coins staked",
        );
        let coins_paid_out_total = counter(
            &registry,
            "crashwave_coins_paid_out_total",
            "Total coins paid out",
        );

        let connected_clients =
            IntGauge::new("crashwave_connected_clients", "Open WebSocket connections")
                .expect("valid metric name");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("metric registered once");

        Self {
            registry,
            rounds_total,
            bets_placed_total,
            cashouts_total,
            bets_lost_total,
            coins_wagered_total,
            coins_paid_out_total,
            connected_clients,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
