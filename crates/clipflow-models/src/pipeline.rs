//! Parameters of a "start processing" request.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::SessionId;

/// Look-back window used when selecting source clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::All => "all",
        }
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "all" => Ok(TimeWindow::All),
            other => Err(format!("unknown time window: {}", other)),
        }
    }
}

/// Job parameters sent with the start request.
///
/// `source` is either a channel name (clip mode) or a VOD URL (`vod = true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PipelineParams {
    /// Channel name or VOD URL
    #[validate(length(min = 1, message = "source must not be empty"))]
    pub source: String,

    /// Clip look-back window
    #[serde(default)]
    pub time_window: TimeWindow,

    /// Treat `source` as a VOD URL
    #[serde(default)]
    pub vod: bool,

    /// Maximum clips to produce
    #[serde(default = "default_max_clips")]
    #[validate(range(min = 1, max = 50))]
    pub max_clips: u32,

    /// Segment length in seconds (VOD mode)
    #[serde(default = "default_segment_duration")]
    #[validate(range(min = 5, max = 600))]
    pub segment_duration: u32,

    /// Burn subtitles into the output
    #[serde(default)]
    pub include_subtitles: bool,

    /// Skip source clips below this view count
    #[serde(default)]
    pub min_views: u64,
}

fn default_max_clips() -> u32 {
    5
}

fn default_segment_duration() -> u32 {
    30
}

impl PipelineParams {
    /// Create params for a source with default settings.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            time_window: TimeWindow::default(),
            vod: false,
            max_clips: default_max_clips(),
            segment_duration: default_segment_duration(),
            include_subtitles: false,
            min_views: 0,
        }
    }

    /// Form fields for the start request.
    pub fn to_form(&self, session_id: &SessionId) -> Vec<(&'static str, String)> {
        vec![
            ("source", self.source.clone()),
            ("time_window", self.time_window.as_str().to_string()),
            ("vod", self.vod.to_string()),
            ("max_clips", self.max_clips.to_string()),
            ("segment_duration", self.segment_duration.to_string()),
            ("session_id", session_id.to_string()),
            ("include_subtitles", self.include_subtitles.to_string()),
            ("min_views", self.min_views.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server() {
        let params = PipelineParams::new("shroud");
        assert_eq!(params.time_window, TimeWindow::Week);
        assert_eq!(params.max_clips, 5);
        assert_eq!(params.segment_duration, 30);
        assert!(!params.vod);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut params = PipelineParams::new("");
        assert!(params.validate().is_err());

        params.source = "shroud".into();
        params.max_clips = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_form_fields() {
        let mut params = PipelineParams::new("https://twitch.tv/videos/1");
        params.vod = true;
        params.max_clips = 3;

        let form = params.to_form(&SessionId::from("abc"));
        assert!(form.contains(&("session_id", "abc".to_string())));
        assert!(form.contains(&("vod", "true".to_string())));
        assert!(form.contains(&("max_clips", "3".to_string())));
        assert_eq!(form.len(), 8);
    }

    #[test]
    fn test_time_window_parse() {
        assert_eq!("Month".parse::<TimeWindow>().unwrap(), TimeWindow::Month);
        assert!("fortnight".parse::<TimeWindow>().is_err());
    }
}
