use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use lazy_static::lazy_static;
use prometheus_client::{encoding::text::encode, registry::Metric, registry::Registry};

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::with_prefix("trend"));
}

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers `metric` in the process wide registry and hands it back so it
/// can be stored in a static.
pub fn register_metric<N, H, M>(name: N, help: H, metric: M) -> M
where
    N: Into<String>,
    H: Into<String>,
    M: Metric + Clone,
{
    registry().register(name, help, metric.clone());
    metric
}

/// Renders every registered metric in the OpenMetrics text format.
pub fn openmetrics_string() -> anyhow::Result<String> {
    let mut ret = String::new();
    encode(&mut ret, &registry())
        .map(|_| ret)
        .context("failed to generate metrics")
}

#[cfg(test)]
mod test {
    use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

    use crate::{openmetrics_string, register_metric};

    #[test]
    fn test_register() {
        let c = register_metric("test_register_events", "help", Counter::<u64>::default());
        let enc1 = openmetrics_string().unwrap();
        assert!(enc1.contains("trend_test_register_events_total 0"), "{enc1}");
        c.inc();
        let enc2 = openmetrics_string().unwrap();
        assert!(enc2.contains("trend_test_register_events_total 1"), "{enc2}");
    }

    #[test]
    fn test_gauge_handle() {
        let g: Gauge = register_metric("test_gauge_handle", "help", Gauge::default());
        g.set(3);
        assert!(openmetrics_string().unwrap().contains("trend_test_gauge_handle 3"));
    }
}
