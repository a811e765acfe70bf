//! Session exporter: recorded routes as JSON or GPX.
//!
//! JSON keeps the full tracker view of the run; GPX is for loading the route
//! into mapping applications.

use crate::error::SimResult;
use crate::runner::ScenarioResult;

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use stride_core::Position;

/// Complete export of one recorded session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Simulated duration in seconds
    pub duration_sec: f64,

    /// Final results
    pub passed: bool,
    pub distance_m: f64,
    pub expected_m: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Stored route vertices
    pub route: Vec<Position>,
}

impl SessionExport {
    /// Creates an export from a finished scenario.
    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            duration_sec: result.final_time_secs,
            passed: result.passed,
            distance_m: result.distance_m,
            expected_m: result.expected_m,
            failure_reason: result.failure_reason.clone(),
            route: result.route.clone(),
        }
    }

    /// Renders the route as a GPX 1.1 document with one track segment.
    pub fn to_gpx(&self) -> String {
        let name = format!("stride {} (seed {})", self.scenario, self.seed);

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"stride-sim\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n");
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <name>{}</name>\n", name));
        xml.push_str(&format!("    <desc>{:.1} m in {:.0} s</desc>\n", self.distance_m, self.duration_sec));
        xml.push_str("  </metadata>\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", name));
        xml.push_str("    <trkseg>\n");

        for point in &self.route {
            xml.push_str(&format!("      <trkpt lat=\"{}\" lon=\"{}\">\n", point.latitude, point.longitude));
            if let Some(time) = DateTime::from_timestamp_millis(point.timestamp) {
                xml.push_str(&format!(
                    "        <time>{}</time>\n",
                    time.to_rfc3339_opts(SecondsFormat::Millis, true)
                ));
            }
            xml.push_str("      </trkpt>\n");
        }

        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");

        xml
    }

    /// Writes to a file: GPX when the path ends in `.gpx`, JSON otherwise.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let path = path.as_ref();
        let is_gpx = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("gpx"));

        let body = if is_gpx {
            self.to_gpx()
        } else {
            serde_json::to_string_pretty(self)?
        };

        let mut file = File::create(path)?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }
}
