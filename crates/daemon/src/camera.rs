//! Camera records and the payloads that create or edit them.

use serde::{Deserialize, Serialize};

/// Store-assigned camera identifier
pub type CameraId = i64;

/// A stored camera definition.
///
/// A worker takes a clone of this record when it starts; later edits only
/// reach the capture process on the next (re)start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraRecord {
    pub id: CameraId,
    pub name: String,
    pub url: String,
    pub output_dir: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub restream: Option<String>,
}

/// Entry of the `list` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraSummary {
    pub id: CameraId,
    pub name: String,
    pub url: String,
}

impl From<&CameraRecord> for CameraSummary {
    fn from(record: &CameraRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            url: record.url.clone(),
        }
    }
}

/// Payload of `addCamera`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewCamera {
    pub name: String,
    pub url: String,
    pub output_dir: String,
    #[serde(default)]
    pub restream: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl NewCamera {
    /// Reject empty mandatory fields and stream locators without a scheme.
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        require_non_empty("url", &self.url)?;
        require_non_empty("output_dir", &self.output_dir)?;
        validate_locator(&self.url)
    }

    /// Normalise optional fields: blank strings become `None`.
    pub fn normalized(mut self) -> Self {
        self.restream = non_blank(self.restream);
        self.username = non_blank(self.username);
        self.password = non_blank(self.password);
        self
    }
}

/// Payload of `updateCamera`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraUpdate {
    pub id: CameraId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub restream: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl CameraUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.output_dir.is_none()
            && self.restream.is_none()
            && self.username.is_none()
            && self.password.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        if let Some(url) = &self.url {
            require_non_empty("url", url)?;
            validate_locator(url)?;
        }
        if let Some(output_dir) = &self.output_dir {
            require_non_empty("output_dir", output_dir)?;
        }
        Ok(())
    }

    /// Produce the record as it looks after this update.
    pub fn apply_to(&self, current: &CameraRecord) -> CameraRecord {
        CameraRecord {
            id: current.id,
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            url: self.url.clone().unwrap_or_else(|| current.url.clone()),
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| current.output_dir.clone()),
            username: merge_optional(&self.username, &current.username),
            password: merge_optional(&self.password, &current.password),
            restream: merge_optional(&self.restream, &current.restream),
        }
    }
}

/// `Some("")` clears an optional field, `None` keeps it.
fn merge_optional(update: &Option<String>, current: &Option<String>) -> Option<String> {
    match update {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value.clone()),
        None => current.clone(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} must not be empty", field))
    } else {
        Ok(())
    }
}

fn validate_locator(url: &str) -> Result<(), String> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| format!("invalid stream url '{}': {}", url, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CameraRecord {
        CameraRecord {
            id: 7,
            name: "porch".to_string(),
            url: "rtsp://10.0.0.7/stream1".to_string(),
            output_dir: "/srv/nvr/porch".to_string(),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            restream: None,
        }
    }

    #[test]
    fn test_payload_with_nulls_parses() {
        let payload = r#"{
            "name": "Camera1",
            "url": "rtsp://example.com/stream",
            "output_dir": "/tmp/output",
            "restream": null,
            "username": null,
            "password": null
        }"#;
        let cam: NewCamera = serde_json::from_str(payload).unwrap();
        assert_eq!(cam.name, "Camera1");
        assert!(cam.restream.is_none());
        assert!(cam.validate().is_ok());
    }

    #[test]
    fn test_payload_optional_fields_may_be_absent() {
        let payload = r#"{"name":"a","url":"rtsp://h/s","output_dir":"/x"}"#;
        let cam: NewCamera = serde_json::from_str(payload).unwrap();
        assert!(cam.username.is_none() && cam.password.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_and_schemeless() {
        let mut cam = NewCamera {
            name: " ".to_string(),
            url: "rtsp://h/s".to_string(),
            output_dir: "/x".to_string(),
            restream: None,
            username: None,
            password: None,
        };
        assert!(cam.validate().is_err());

        cam.name = "a".to_string();
        cam.url = "not a url".to_string();
        assert!(cam.validate().is_err());
    }

    #[test]
    fn test_normalized_drops_blank_optionals() {
        let cam = NewCamera {
            name: "a".to_string(),
            url: "rtsp://h/s".to_string(),
            output_dir: "/x".to_string(),
            restream: Some(String::new()),
            username: Some("  ".to_string()),
            password: Some("pw".to_string()),
        }
        .normalized();
        assert_eq!(cam.restream, None);
        assert_eq!(cam.username, None);
        assert_eq!(cam.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let update = CameraUpdate {
            id: 7,
            name: Some("front porch".to_string()),
            restream: Some("rtsp://relay/porch".to_string()),
            username: Some(String::new()),
            ..Default::default()
        };
        let updated = update.apply_to(&record());

        assert_eq!(updated.name, "front porch");
        assert_eq!(updated.url, "rtsp://10.0.0.7/stream1");
        assert_eq!(updated.restream.as_deref(), Some("rtsp://relay/porch"));
        assert_eq!(updated.username, None);
        assert_eq!(updated.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_summary_from_record() {
        let summary = CameraSummary::from(&record());
        assert_eq!(summary.id, 7);
        assert_eq!(summary.name, "porch");
        assert_eq!(summary.url, "rtsp://10.0.0.7/stream1");
    }
}
