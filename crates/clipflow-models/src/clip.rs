//! Clip results produced by a processing job.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::SessionId;

/// Identity of a clip result: the owning session and the video filename.
///
/// Equivalent to comparing derived video URLs.
pub type ClipKey<'a> = (&'a str, &'a str);

/// One artifact produced by the server.
///
/// `video` and `thumbnail` are server-relative filenames; full URLs are
/// derived with [`crate::OutputUrls`] and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClipResult {
    /// Final video filename
    pub video: String,
    /// Thumbnail image filename
    #[serde(default)]
    pub thumbnail: String,
    /// Full transcript text
    #[serde(default)]
    pub transcript: String,
    /// Short labels
    #[serde(default, deserialize_with = "deserialize_string_list")]
    #[schemars(with = "Vec<String>")]
    pub tags: Vec<String>,
    /// Caption text
    #[serde(default)]
    pub description: String,
    /// Hashtags, normalized to a list
    #[serde(default, deserialize_with = "deserialize_string_list")]
    #[schemars(with = "Vec<String>")]
    pub hashtags: Vec<String>,
    /// Back-reference to the producing session
    #[serde(default = "empty_session_id")]
    pub session_id: SessionId,
    /// Source view count
    #[serde(default, deserialize_with = "deserialize_view_count")]
    #[schemars(with = "u64")]
    pub view_count: u64,
}

fn empty_session_id() -> SessionId {
    SessionId::from_string(String::new())
}

impl ClipResult {
    /// Create a bare result for a video filename.
    pub fn new(session_id: impl Into<SessionId>, video: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            thumbnail: String::new(),
            transcript: String::new(),
            tags: Vec::new(),
            description: String::new(),
            hashtags: Vec::new(),
            session_id: session_id.into(),
            view_count: 0,
        }
    }

    /// Dedup key of this result.
    pub fn key(&self) -> ClipKey<'_> {
        (self.session_id.as_str(), self.video.as_str())
    }

    /// Fill in the session back-reference when the server omitted it.
    pub fn with_default_session(mut self, session_id: &SessionId) -> Self {
        if self.session_id.as_str().is_empty() {
            self.session_id = session_id.clone();
        }
        self
    }
}

/// Accepts a list of strings, a single delimited string, or null.
///
/// Strings are split on whitespace and commas, so both `"#a #b"` and
/// `"a, b"` yield two entries.
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        Text(String),
        List(Vec<String>),
    }

    let value = Option::<StringOrList>::deserialize(deserializer)?;
    Ok(match value {
        None => Vec::new(),
        Some(StringOrList::Text(text)) => split_labels(&text),
        Some(StringOrList::List(items)) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

fn split_labels(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts a non-negative integer, a float, or null (treated as 0).
fn deserialize_view_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hashtags_from_delimited_string() {
        let clip: ClipResult = serde_json::from_value(json!({
            "video": "a_final.mp4",
            "hashtags": "#fyp #gaming  #clips",
        }))
        .unwrap();

        assert_eq!(clip.hashtags, vec!["#fyp", "#gaming", "#clips"]);
    }

    #[test]
    fn test_hashtags_from_list() {
        let clip: ClipResult = serde_json::from_value(json!({
            "video": "a_final.mp4",
            "hashtags": ["#fyp", " #gaming "],
            "tags": "funny, epic",
        }))
        .unwrap();

        assert_eq!(clip.hashtags, vec!["#fyp", "#gaming"]);
        assert_eq!(clip.tags, vec!["funny", "epic"]);
    }

    #[test]
    fn test_missing_fields_default() {
        let clip: ClipResult = serde_json::from_value(json!({
            "video": "a_final.mp4",
            "hashtags": null,
            "view_count": null,
        }))
        .unwrap();

        assert!(clip.hashtags.is_empty());
        assert!(clip.tags.is_empty());
        assert_eq!(clip.view_count, 0);
        assert!(clip.session_id.as_str().is_empty());
    }

    #[test]
    fn test_round_trip_normalizes_hashtags() {
        let wire = json!({
            "video": "a_final.mp4",
            "thumbnail": "a_thumbnail.jpg",
            "transcript": "hello there",
            "tags": ["#fyp"],
            "description": "Big play",
            "hashtags": "#fyp #twitch",
            "session_id": "abc",
            "view_count": 1200,
        });

        let clip: ClipResult = serde_json::from_value(wire).unwrap();
        let encoded = serde_json::to_value(&clip).unwrap();
        assert_eq!(encoded["hashtags"], json!(["#fyp", "#twitch"]));

        let decoded: ClipResult = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, clip);
        assert_eq!(decoded.view_count, 1200);
    }

    #[test]
    fn test_key_and_default_session() {
        let clip = ClipResult::new("", "a.mp4").with_default_session(&SessionId::from("abc"));
        assert_eq!(clip.key(), ("abc", "a.mp4"));

        let clip = ClipResult::new("other", "a.mp4").with_default_session(&SessionId::from("abc"));
        assert_eq!(clip.key(), ("other", "a.mp4"));
    }
}
