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

use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Transport(reqwest::Error),
    Unexpected(StatusCode, Url),
    Payload(reqwest::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Payload(e) => write!(f, "malformed response body: {}", e),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Payload(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the IMGW hydrological station status API.
///
/// The API exposes a single endpoint that takes the station ID as an `id`
/// query parameter and returns a JSON document describing the station and
/// its current hydrological state.
#[derive(Debug)]
pub struct HydroClient {
    client: Client,
    endpoint: Url,
}

impl HydroClient {
    pub fn new(client: Client, endpoint: Url) -> Self {
        HydroClient { client, endpoint }
    }

    /// Fetch the raw status document for a single station.
    ///
    /// The body is parsed as JSON but deliberately not deserialized into a
    /// typed struct: the upstream payload shape is not guaranteed stable, so
    /// field extraction with per-field fallbacks happens in
    /// `StationStatus::from_value`.
    pub async fn station_status(&self, station_id: &str) -> Result<Value, ClientError> {
        tracing::debug!(message = "making station status request", endpoint = %self.endpoint, station_id = %station_id);

        let res = self
            .client
            .get(self.endpoint.clone())
            .query(&[("id", station_id)])
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(ClientError::Unexpected(status, res.url().clone()));
        }

        res.json::<Value>().await.map_err(ClientError::Payload)
    }
}

#[derive(Debug)]
pub enum PayloadError {
    Empty,
    MissingStatus,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "payload is empty or not an object"),
            Self::MissingStatus => write!(f, "payload has no usable 'status' block"),
        }
    }
}

impl error::Error for PayloadError {}

/// Indicators extracted from one station's status document.
///
/// Constructed fresh each fetch cycle and discarded once the corresponding
/// metric series have been updated.
#[derive(Debug, Clone, PartialEq)]
pub struct StationStatus {
    pub station_id: String,
    pub station_name: String,
    pub state_code: String,
    pub current_value: f64,
    pub trend: f64,
    pub status: f64,
    pub alarm_value: f64,
    pub warning_value: f64,
}

impl StationStatus {
    /// Extract station indicators from a parsed but untyped status document.
    ///
    /// A document without a top-level object, or without a non-empty `status`
    /// block, is rejected outright. Everything else is extracted with one
    /// documented fallback per field: "unknown" for identifier labels, zero
    /// for numeric values. Note that the IDs used for labels are the ones the
    /// API returned, which are not guaranteed to match the ID requested.
    pub fn from_value(data: &Value) -> Result<Self, PayloadError> {
        let fields = data
            .as_object()
            .filter(|o| !o.is_empty())
            .ok_or(PayloadError::Empty)?;
        let status = fields
            .get("status")
            .and_then(Value::as_object)
            .filter(|o| !o.is_empty())
            .ok_or(PayloadError::MissingStatus)?;

        Ok(StationStatus {
            station_id: label_or_unknown(fields.get("id")),
            station_name: label_or_unknown(status.get("description")),
            state_code: label_or_unknown(fields.get("stateCode")),
            current_value: status
                .get("currentState")
                .and_then(|s| s.get("value"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            trend: value_or_zero(status.get("trend")),
            status: value_or_zero(status.get("status")),
            alarm_value: value_or_zero(status.get("alarmValue")),
            warning_value: value_or_zero(status.get("warningValue")),
        })
    }
}

/// The API is inconsistent about whether IDs and codes are strings or
/// numbers, so accept both for label values.
fn label_or_unknown(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_owned(),
    }
}

fn value_or_zero(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}
