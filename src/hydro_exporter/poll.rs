// hydro_exporter - Prometheus metrics exporter for IMGW hydrological station status
//
// Copyright 2024 hydro_exporter contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{HydroClient, StationStatus};
use crate::metrics::StationMetrics;
use chrono::{DateTime, Duration, Timelike, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;

/// Drives periodic fetches of station status and applies the results to the
/// metric series.
///
/// One `Poller` exists per process. `run` aligns fetch cycles to five minute
/// wall-clock boundaries; `fetch_cycle` performs a single batch fetch and may
/// also be called directly (the startup fetch does this). A cooperative lock
/// serializes cycles so their processing phases can never overlap, no matter
/// how a cycle was triggered.
#[derive(Debug)]
pub struct Poller {
    client: HydroClient,
    stations: Vec<String>,
    metrics: StationMetrics,
    fetch_lock: Mutex<()>,
}

impl Poller {
    pub fn new(client: HydroClient, stations: Vec<String>, metrics: StationMetrics) -> Self {
        Poller {
            client,
            stations,
            metrics,
            fetch_lock: Mutex::new(()),
        }
    }

    /// Run fetch cycles forever, aligned to five minute wall-clock boundaries.
    ///
    /// This never returns; it is expected to be spawned as a task and aborted
    /// at shutdown. Aborting between cycles is safe: the fetch lock is only
    /// held while a cycle is executing and is released when the task is
    /// dropped mid-cycle.
    pub async fn run(&self) {
        loop {
            let now = Utc::now();
            let next_run = next_fetch_time(now);
            // Negative wait means the clock jumped or the previous cycle
            // overran its slot; run immediately.
            let wait = (next_run - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tracing::info!(message = "next fetch scheduled", next_run = %next_run, wait_secs = wait.as_secs());

            tokio::time::sleep(wait).await;
            self.fetch_cycle().await;
        }
    }

    /// Fetch status for every configured station once and update the metrics.
    ///
    /// All requests are dispatched up front and awaited as one batch, so
    /// stations are fetched concurrently. Each station has an independent
    /// outcome: transport failures, unexpected HTTP statuses, and unusable
    /// payloads are logged and skipped without affecting the rest of the
    /// batch. The last-update timestamp advances once all stations have been
    /// attempted, regardless of how many of them failed.
    pub async fn fetch_cycle(&self) {
        let _guard = self.fetch_lock.lock().await;

        let requests = self.stations.iter().map(|id| self.client.station_status(id));
        let results = join_all(requests).await;

        for (station, result) in self.stations.iter().zip(results) {
            let data = match result {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(message = "failed to fetch station status", station = %station, error = %e);
                    continue;
                }
            };

            match StationStatus::from_value(&data) {
                Ok(status) => {
                    self.metrics.observe(&status);
                    tracing::info!(
                        message = "metrics updated",
                        station_id = %status.station_id,
                        station_name = %status.station_name,
                    );
                }
                Err(e) => {
                    tracing::error!(message = "unusable payload", station = %station, error = %e, payload = %data);
                }
            }
        }

        self.metrics.mark_updated(Utc::now());
    }
}

/// Compute the next five minute wall-clock boundary after `now`.
///
/// Seconds and sub-second components are zeroed, so a call at 09:42:17
/// yields 09:45:00 and a call exactly on a boundary yields the following
/// boundary.
pub fn next_fetch_time(now: DateTime<Utc>) -> DateTime<Utc> {
    let minute_start = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    minute_start + Duration::minutes(i64::from(5 - now.minute() % 5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_fetch_time_mid_interval() {
        let now = Utc.with_ymd_and_hms(2024, 5, 14, 9, 42, 17).unwrap();
        let next = next_fetch_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 14, 9, 45, 0).unwrap());
    }

    #[test]
    fn test_next_fetch_time_rolls_over_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 5, 14, 9, 58, 3).unwrap();
        let next = next_fetch_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 14, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fetch_time_on_a_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 5, 14, 9, 45, 0).unwrap();
        let next = next_fetch_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 14, 9, 50, 0).unwrap());
    }

    #[test]
    fn test_next_fetch_time_is_always_in_the_future() {
        let now = Utc.with_ymd_and_hms(2024, 5, 14, 23, 59, 59).unwrap();
        let next = next_fetch_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap());
        assert!(next > now);
    }
}
