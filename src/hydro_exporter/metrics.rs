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

use crate::client::StationStatus;
use chrono::{DateTime, Utc};
use prometheus::{Gauge, GaugeVec, Opts, Registry};

const LABEL_STATION_ID: &str = "station_id";
const LABEL_STATION_NAME: &str = "station_name";
const LABEL_STATE_CODE: &str = "state_code";

/// Holder for metrics that can be set from a `StationStatus`.
///
/// All metrics are created and registered upon call to `StationMetrics::new()`.
/// Each per-station metric is a gauge labeled with the triple
/// `(station_id, station_name, state_code)`. Setting a gauge overwrites the
/// previous value for that label triple; series are never removed, so a
/// station that stops reporting keeps exposing its last observed values.
#[derive(Debug)]
pub struct StationMetrics {
    current_state_value: GaugeVec,
    trend: GaugeVec,
    status: GaugeVec,
    alarm_value: GaugeVec,
    warning_value: GaugeVec,
    last_update: Gauge,
}

impl StationMetrics {
    /// Create a new `StationMetrics` and register each metric with the provided `Registry`.
    ///
    /// # Panics
    ///
    /// If any metric cannot be created or registered, this method will panic.
    pub fn new(reg: &Registry) -> Self {
        let labels = [LABEL_STATION_ID, LABEL_STATION_NAME, LABEL_STATE_CODE];

        let current_state_value = GaugeVec::new(
            Opts::new("current_state_value", "Current water state value"),
            &labels,
        )
        .unwrap();
        let trend = GaugeVec::new(Opts::new("trend", "Water state trend"), &labels).unwrap();
        let status = GaugeVec::new(Opts::new("status", "Station status"), &labels).unwrap();
        let alarm_value = GaugeVec::new(
            Opts::new("alarm_value", "Alarm threshold for the water state"),
            &labels,
        )
        .unwrap();
        let warning_value = GaugeVec::new(
            Opts::new("warning_value", "Warning threshold for the water state"),
            &labels,
        )
        .unwrap();
        let last_update = Gauge::new(
            "last_update_timestamp_seconds",
            "UTC time the last fetch cycle completed, as a unix timestamp",
        )
        .unwrap();

        reg.register(Box::new(current_state_value.clone())).unwrap();
        reg.register(Box::new(trend.clone())).unwrap();
        reg.register(Box::new(status.clone())).unwrap();
        reg.register(Box::new(alarm_value.clone())).unwrap();
        reg.register(Box::new(warning_value.clone())).unwrap();
        reg.register(Box::new(last_update.clone())).unwrap();

        Self {
            current_state_value,
            trend,
            status,
            alarm_value,
            warning_value,
            last_update,
        }
    }

    /// Set all per-station gauges from the provided station status.
    pub fn observe(&self, status: &StationStatus) {
        let labels = [
            status.station_id.as_str(),
            status.station_name.as_str(),
            status.state_code.as_str(),
        ];

        self.current_state_value
            .with_label_values(&labels)
            .set(status.current_value);
        self.trend.with_label_values(&labels).set(status.trend);
        self.status.with_label_values(&labels).set(status.status);
        self.alarm_value
            .with_label_values(&labels)
            .set(status.alarm_value);
        self.warning_value
            .with_label_values(&labels)
            .set(status.warning_value);
    }

    /// Record the completion time of a fetch cycle.
    pub fn mark_updated(&self, at: DateTime<Utc>) {
        self.last_update.set(at.timestamp_millis() as f64 / 1000.0);
    }
}
