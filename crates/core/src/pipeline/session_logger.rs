use std::collections::HashMap;
use std::time::Instant;

use crate::status::domain::pipeline_status::PipelineStatus;

/// Cross-cutting logger for session events.
///
/// Lets each host observe per-stage timings and status transitions without
/// the session knowing where the output goes.
pub trait SessionLogger: Send {
    /// Record how long a named stage took for one tick.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a change of the displayed status.
    fn status_changed(&mut self, from: PipelineStatus, to: PipelineStatus);

    /// Log a human-readable message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn status_changed(&mut self, _from: PipelineStatus, _to: PipelineStatus) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger that keeps per-stage timings and the status history,
/// and reports them at the end of the session.
pub struct StdoutSessionLogger {
    timings: HashMap<String, Vec<f64>>,
    transitions: Vec<(PipelineStatus, PipelineStatus)>,
    start_time: Instant,
    messages: Vec<String>,
}

impl StdoutSessionLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            transitions: Vec::new(),
            start_time: Instant::now(),
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.transitions.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Session summary ({:.1}s, {} status changes):",
            elapsed_ms / 1000.0,
            self.transitions.len()
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  over {} ticks",
                durations.len()
            ));
        }

        if let Some(ticks) = self.timings.get("detect") {
            if elapsed_ms > 0.0 {
                let rate = ticks.len() as f64 / (elapsed_ms / 1000.0);
                lines.push(format!("  Detection rate: {rate:.1} ticks/s"));
            }
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn transitions(&self) -> &[(PipelineStatus, PipelineStatus)] {
        &self.transitions
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn status_changed(&mut self, from: PipelineStatus, to: PipelineStatus) {
        self.transitions.push((from, to));
        log::info!("Status: {from:?} -> {to:?}");
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullSessionLogger;
        logger.timing("detect", 5.0);
        logger.status_changed(PipelineStatus::NoFace, PipelineStatus::Ready);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutSessionLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("render").unwrap(), &[5.0]);
        assert!(logger.timings_for("encode").is_none());
    }

    #[test]
    fn test_transitions_are_kept_in_order() {
        let mut logger = StdoutSessionLogger::new();
        logger.status_changed(PipelineStatus::Initializing, PipelineStatus::NoFace);
        logger.status_changed(PipelineStatus::NoFace, PipelineStatus::Ready);
        assert_eq!(
            logger.transitions(),
            &[
                (PipelineStatus::Initializing, PipelineStatus::NoFace),
                (PipelineStatus::NoFace, PipelineStatus::Ready),
            ]
        );
    }

    #[test]
    fn test_summary_mentions_stages_and_changes() {
        let mut logger = StdoutSessionLogger::new();
        logger.timing("detect", 12.0);
        logger.timing("render", 2.0);
        logger.status_changed(PipelineStatus::NoFace, PipelineStatus::TooFar);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("render"));
        assert!(summary.contains("1 status changes"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutSessionLogger::new().summary_string().is_none());
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = StdoutSessionLogger::new();
        logger.info("camera ready");
        assert_eq!(logger.messages, vec!["camera ready".to_string()]);
    }
}
