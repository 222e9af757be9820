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

//! Prometheus metrics exporter for IMGW hydrological station status
//!
//! ## Features
//!
//! `hydro_exporter` fetches the current status of a configured set of [IMGW]
//! hydrological stations and emits the reported indicators as Prometheus
//! metrics. Stations are polled concurrently on five minute wall-clock
//! boundaries (`:00`, `:05`, `:10`, ...), with one extra fetch at startup so
//! metrics are available as soon as the endpoint is. Every per-station metric
//! carries the labels `station_id`, `station_name` and `state_code` as
//! reported by the API.
//!
//! * `current_state_value{station_id, station_name, state_code}` - Current water state value.
//! * `trend{station_id, station_name, state_code}` - Water state trend.
//! * `status{station_id, station_name, state_code}` - Station status.
//! * `alarm_value{station_id, station_name, state_code}` - Alarm threshold for the water state.
//! * `warning_value{station_id, station_name, state_code}` - Warning threshold for the water state.
//! * `last_update_timestamp_seconds` - UTC time the last fetch cycle completed.
//!
//! A station that fails to respond during a cycle keeps its last observed
//! values; the exporter never resets or removes a series because of an
//! upstream failure.
//!
//! [IMGW]: https://hydro.imgw.pl/
//!
//! ## Usage
//!
//! ### Picking stations
//!
//! Stations are identified by the numeric IDs used on <https://hydro.imgw.pl/>.
//! The ID of a station is visible in the URL of its detail page. Pass the IDs
//! to poll as a comma-separated list, either on the command line or through
//! the `STATION_ID` environment variable.
//!
//! ```text
//! STATION_ID=151160030,152210010 ./hydro_exporter
//! ```
//!
//! The exporter refuses to start without at least one station ID.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9782` at `/metrics`. Once
//! `hydro_exporter` is running, configure scrapes of it by your Prometheus
//! server. Add the host running `hydro_exporter` as a target under the
//! Prometheus `scrape_configs` section as described by the example below.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     15s
//!   evaluation_interval: 15s
//!   external_labels:
//!     monitor: 'my_prom'
//!
//! scrape_configs:
//! - job_name: hydro_exporter
//!   static_configs:
//!   - targets: ['example:9782']
//! ```
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod poll;
