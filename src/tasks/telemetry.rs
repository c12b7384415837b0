use embassy_time::{Duration, Instant, Ticker};

use crate::telemetry::{NotifySink, TelemetryService};

/// Call [`TelemetryService::tick`] every `period` and report throughput once
/// a second.
pub async fn run_telemetry<S: NotifySink, const N: usize>(
    mut service: TelemetryService<'_, S, N>,
    period: Duration,
) {
    info!("Telemetry started - tick every {}ms", period.as_millis());
    let mut ticker = Ticker::every(period);
    let mut last_report = Instant::now();

    loop {
        ticker.next().await;
        // Failures are counted in the stats; samples stay queued.
        let _ = service.tick().await;

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(1) {
            let stats = service.take_stats();
            if stats.packets_sent > 0 || stats.failed > 0 || stats.abandoned > 0 {
                info!(
                    "Telemetry: {} pkt/s, {} samples/s, {} failed, {} abandoned",
                    stats.packets_sent, stats.samples_sent, stats.failed, stats.abandoned
                );
            }
            last_report = now;
        }
    }
}
