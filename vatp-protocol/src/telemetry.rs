//! Vehicle telemetry carried by `TELEMETRY_DATA` messages.
//!
//! The body is a list of `Name: value` lines:
//!
//! ```text
//! Speed: 12.00 km/h
//! Battery: 97.50%
//! Temperature: 24.10 C
//! Direction: NORTH
//! Moving: Yes
//! ```

use crate::message::{Response, ResponseStatus};
use serde::Serialize;
use std::fmt;

/// Battery charge band shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLevel {
    /// Below 20%.
    Low,
    /// Below 50%.
    Medium,
    Normal,
}

impl BatteryLevel {
    /// Classifies a charge percentage.
    pub fn from_percent(percent: f64) -> Self {
        if percent < 20.0 {
            BatteryLevel::Low
        } else if percent < 50.0 {
            BatteryLevel::Medium
        } else {
            BatteryLevel::Normal
        }
    }
}

/// One telemetry snapshot.
///
/// Parsing is per field: a field the server left out, or sent in a form
/// that does not parse, is `None` and the other fields are still read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub speed_kmh: Option<f64>,
    pub battery_percent: Option<f64>,
    pub temperature_c: Option<f64>,
    pub direction: Option<String>,
    pub moving: Option<bool>,
}

impl Telemetry {
    /// Reads the snapshot from a `TELEMETRY_DATA` response.
    ///
    /// Returns `None` for any other kind of response. Fields are taken from
    /// the body; when the body has none, header lines are tried instead.
    pub fn parse(response: &Response) -> Option<Self> {
        if response.status() != ResponseStatus::Telemetry {
            return None;
        }

        let mut telemetry = Self::from_lines(response.body());
        if telemetry.is_empty() {
            for (name, value) in response.headers() {
                telemetry.set(name, value);
            }
        }
        Some(telemetry)
    }

    /// Parses `Name: value` lines. Unknown names are ignored.
    pub fn from_lines(text: &str) -> Self {
        let mut telemetry = Self::default();
        for line in text.lines() {
            if let Some((name, value)) = line.split_once(':') {
                telemetry.set(name.trim(), value.trim());
            }
        }
        telemetry
    }

    /// Returns whether no field was recognised.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Charge band of the reported battery, if any.
    pub fn battery_level(&self) -> Option<BatteryLevel> {
        self.battery_percent.map(BatteryLevel::from_percent)
    }

    fn set(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            "speed" => self.speed_kmh = leading_number(value),
            "battery" => self.battery_percent = leading_number(value),
            "temperature" => self.temperature_c = leading_number(value),
            "direction" => {
                self.direction = Some(value.trim())
                    .filter(|dir| !dir.is_empty())
                    .map(str::to_string)
            }
            "moving" => self.moving = yes_no(value),
            _ => {}
        }
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = |value: Option<f64>, unit: &str| match value {
            Some(value) => format!("{value:.2}{unit}"),
            None => "--".to_string(),
        };
        let moving = match self.moving {
            Some(true) => "Yes",
            Some(false) => "No",
            None => "--",
        };

        write!(
            f,
            "Speed: {} | Battery: {} | Temperature: {} | Direction: {} | Moving: {}",
            number(self.speed_kmh, " km/h"),
            number(self.battery_percent, "%"),
            number(self.temperature_c, " C"),
            self.direction.as_deref().unwrap_or("--"),
            moving
        )
    }
}

/// Reads the number in front of a unit: `12.00 km/h`, `97.50%`, `24.10 C`.
fn leading_number(value: &str) -> Option<f64> {
    let number = value.split_whitespace().next()?.trim_end_matches('%');
    number.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn yes_no(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry_response(data: &str) -> Response {
        Response::parse(&format!(
            "VATP/1.0 TELEMETRY_DATA {}\r\n\r\n{}",
            data.len(),
            data
        ))
    }

    #[test]
    fn test_parse_full_body() {
        let response = telemetry_response(
            "Speed: 12.00 km/h\r\nBattery: 97.50%\r\nTemperature: 24.10 C\r\nDirection: NORTH\r\nMoving: Yes",
        );

        let telemetry = Telemetry::parse(&response).unwrap();
        assert_eq!(telemetry.speed_kmh, Some(12.0));
        assert_eq!(telemetry.battery_percent, Some(97.5));
        assert_eq!(telemetry.temperature_c, Some(24.1));
        assert_eq!(telemetry.direction.as_deref(), Some("NORTH"));
        assert_eq!(telemetry.moving, Some(true));
        assert_eq!(telemetry.battery_level(), Some(BatteryLevel::Normal));
    }

    #[test]
    fn test_missing_field_is_none() {
        let response =
            telemetry_response("Speed: 0.00 km/h\r\nBattery: 15.00%\r\nDirection: WEST\r\nMoving: No");

        let telemetry = Telemetry::parse(&response).unwrap();
        assert_eq!(telemetry.temperature_c, None);
        assert_eq!(telemetry.speed_kmh, Some(0.0));
        assert_eq!(telemetry.moving, Some(false));
        assert_eq!(telemetry.battery_level(), Some(BatteryLevel::Low));
        assert!(telemetry.to_string().contains("Temperature: --"));
    }

    #[test]
    fn test_non_numeric_battery() {
        let response = telemetry_response("Speed: 30.00 km/h\r\nBattery: charging%\r\nMoving: maybe");

        let telemetry = Telemetry::parse(&response).unwrap();
        assert_eq!(telemetry.battery_percent, None);
        assert_eq!(telemetry.battery_level(), None);
        assert_eq!(telemetry.moving, None);
        assert_eq!(telemetry.speed_kmh, Some(30.0));
    }

    #[test]
    fn test_other_responses_are_not_telemetry() {
        let response = Response::parse("VATP/1.0 RESPONSE_OK 16\r\n\r\nSpeed: 1.00 km/h");
        assert!(Telemetry::parse(&response).is_none());
        assert!(Telemetry::parse(&Response::parse("T1")).is_none());
    }

    #[test]
    fn test_fields_as_headers() {
        let response =
            Response::parse("VATP/1.0 TELEMETRY_DATA 0\r\nSpeed: 5.00 km/h\r\nMoving: Yes\r\n\r\n");

        let telemetry = Telemetry::parse(&response).unwrap();
        assert_eq!(telemetry.speed_kmh, Some(5.0));
        assert_eq!(telemetry.moving, Some(true));
    }

    #[test]
    fn test_battery_levels() {
        assert_eq!(BatteryLevel::from_percent(19.9), BatteryLevel::Low);
        assert_eq!(BatteryLevel::from_percent(20.0), BatteryLevel::Medium);
        assert_eq!(BatteryLevel::from_percent(50.0), BatteryLevel::Normal);
    }

    #[test]
    fn test_display() {
        let telemetry = Telemetry::from_lines("Speed: 12 km/h\nDirection: EAST\nMoving: yes");
        assert_eq!(
            telemetry.to_string(),
            "Speed: 12.00 km/h | Battery: -- | Temperature: -- | Direction: EAST | Moving: Yes"
        );
    }

    #[test]
    fn test_json() {
        let telemetry = Telemetry::from_lines("Speed: 12.00 km/h\nMoving: No");
        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["speed_kmh"], 12.0);
        assert_eq!(json["moving"], false);
        assert!(json["battery_percent"].is_null());
    }
}
