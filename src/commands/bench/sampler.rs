use std::time::Duration;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::model::SamplerSummary;
use crate::util::round_to;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
const STOP_WAIT: Duration = Duration::from_secs(2);
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub rss_mb: f64,
}

/// Background CPU/RSS sampler for the current process.
pub struct ResourceSampler {
    interval: Duration,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Vec<ResourceSample>>>,
    samples: Vec<ResourceSample>,
}

impl ResourceSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: None,
            handle: None,
            samples: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);
        self.handle = Some(tokio::spawn(sample_loop(self.interval, stop_rx)));
    }

    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(STOP_WAIT, &mut handle).await {
            Ok(Ok(samples)) => self.samples = samples,
            Ok(Err(err)) => warn!(error = %err, "resource sampler failed"),
            Err(_) => {
                handle.abort();
                warn!("resource sampler did not stop in time, samples discarded");
            }
        }
    }

    pub fn summary(&self) -> SamplerSummary {
        summarize(&self.samples)
    }
}

pub fn summarize(samples: &[ResourceSample]) -> SamplerSummary {
    if samples.is_empty() {
        return SamplerSummary::default();
    }

    let cpu_avg =
        samples.iter().map(|sample| sample.cpu_percent).sum::<f64>() / samples.len() as f64;
    let rss_peak = samples
        .iter()
        .map(|sample| sample.rss_mb)
        .fold(0.0_f64, f64::max);

    SamplerSummary {
        cpu_avg_percent: round_to(cpu_avg, 3),
        peak_rss_mb: round_to(rss_peak, 3),
        samples: samples.len(),
    }
}

async fn sample_loop(
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) -> Vec<ResourceSample> {
    let mut samples = Vec::new();
    let Ok(pid) = sysinfo::get_current_pid() else {
        warn!("current process id unavailable, resource sampling disabled");
        return samples;
    };

    let refresh_kind = ProcessRefreshKind::nothing().with_cpu().with_memory();
    let mut system = System::new();
    // CPU usage is a delta between refreshes, so prime once before the first tick.
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    refresh_kind,
                );
                if let Some(process) = system.process(pid) {
                    samples.push(ResourceSample {
                        cpu_percent: f64::from(process.cpu_usage()),
                        rss_mb: process.memory() as f64 / BYTES_PER_MB,
                    });
                }
            }
        }
    }

    samples
}
