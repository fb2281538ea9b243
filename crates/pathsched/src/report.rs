use scheduler::RenderWork;
use serde::Serialize;

/// Line of the `--json` output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Work(WorkRecord),
    Session(SessionSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkRecord {
    pub session: u32,
    pub iteration: u32,
    pub resolution_divider: u32,
    pub resolution: u32,
    pub start_sample: u32,
    pub num_samples: u32,
    pub adaptive_filter: bool,
    pub denoise: bool,
    pub update_display: bool,
    pub path_trace_time: Option<f64>,
    pub denoise_time: Option<f64>,
    pub display_time: Option<f64>,
    /// Virtual time once the work was performed.
    pub clock: f64,
}

impl WorkRecord {
    pub fn new(session: u32, iteration: u32, work: &RenderWork, resolution: u32) -> Self {
        Self {
            session,
            iteration,
            resolution_divider: work.resolution_divider,
            resolution,
            start_sample: work.path_trace.start_sample,
            num_samples: work.path_trace.num_samples,
            adaptive_filter: work.path_trace.adaptive_filter,
            denoise: work.denoise,
            update_display: work.update_display,
            path_trace_time: None,
            denoise_time: None,
            display_time: None,
            clock: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session: u32,
    pub iterations: u32,
    pub rendered_samples: u32,
    /// Divider navigation started with, learned from the previous session.
    pub start_resolution_divider: Option<u32>,
    pub converged: bool,
    pub elapsed: f64,
}

impl Record {
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_tagged() {
        let work = RenderWork::default();
        let record = Record::Work(WorkRecord::new(1, 3, &work, 512));
        let value: serde_json::Value =
            serde_json::from_str(&record.to_json_line().unwrap()).unwrap();
        assert_eq!(value["kind"], "work");
        assert_eq!(value["session"], 1);
        assert_eq!(value["resolution"], 512);
        assert!(value["denoise_time"].is_null());

        let summary = Record::Session(SessionSummary {
            session: 0,
            iterations: 4,
            rendered_samples: 16,
            start_resolution_divider: Some(8),
            converged: false,
            elapsed: 0.5,
        });
        let value: serde_json::Value =
            serde_json::from_str(&summary.to_json_line().unwrap()).unwrap();
        assert_eq!(value["kind"], "session");
        assert_eq!(value["start_resolution_divider"], 8);
    }
}
