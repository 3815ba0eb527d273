//! Control protocol for the NVR daemon
//!
//! One request per line, `command` or `command|payload`, and exactly one
//! response line back. Read-only commands answer with plain text or a JSON
//! document; mutating commands answer with a [`Response`] object.

use crate::camera::CameraId;
use crate::service::{NvrService, ServiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply to a command the daemon does not recognise
pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const SERVICE_STARTED: &str = "Service started.";
pub const SERVICE_STOPPED: &str = "Service stopped.";

/// A parsed control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Start,
    Stop,
    Config,
    Status,
    AddCamera(String),
    UpdateCamera(String),
    RemoveCamera(CameraId),
    StartCamera(CameraId),
    StopCamera(CameraId),
    SetConfig(String),
}

/// Error type for command parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command")]
    Unknown(String),

    #[error("{0} requires a payload")]
    MissingPayload(&'static str),

    #[error("Invalid camera id for {command}: {value}")]
    InvalidId { command: &'static str, value: String },
}

impl Command {
    /// Parse one request line. Surrounding whitespace, including the line
    /// terminator, is ignored; command names are case-sensitive.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (name, payload) = match line.split_once('|') {
            Some((name, payload)) => (name, Some(payload.trim()).filter(|p| !p.is_empty())),
            None => (line, None),
        };

        let command = match name {
            "list" => Command::List,
            "start" => Command::Start,
            "stop" => Command::Stop,
            "config" => Command::Config,
            "status" => Command::Status,
            "addCamera" => Command::AddCamera(required("addCamera", payload)?.to_string()),
            "updateCamera" => Command::UpdateCamera(required("updateCamera", payload)?.to_string()),
            "setConfig" => Command::SetConfig(required("setConfig", payload)?.to_string()),
            "removeCamera" => Command::RemoveCamera(camera_id("removeCamera", payload)?),
            "startCamera" => Command::StartCamera(camera_id("startCamera", payload)?),
            "stopCamera" => Command::StopCamera(camera_id("stopCamera", payload)?),
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn required<'a>(command: &'static str, payload: Option<&'a str>) -> Result<&'a str, ParseError> {
    payload.ok_or(ParseError::MissingPayload(command))
}

fn camera_id(command: &'static str, payload: Option<&str>) -> Result<CameraId, ParseError> {
    let value = required(command, payload)?;
    value.parse().map_err(|_| ParseError::InvalidId {
        command,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Result object for mutating commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: String,
    pub id: Option<CameraId>,
}

impl Response {
    pub fn success(message: impl Into<String>, id: Option<CameraId>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            id,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            message: message.into(),
            id: None,
        }
    }

    /// Failure describing `err` in the context of `action`.
    fn error(action: &str, err: &ServiceError) -> Self {
        match err {
            ServiceError::InvalidJson(_) => Self::failure(err.to_string()),
            _ => Self::failure(format!("Error {}: {}", action, err)),
        }
    }

    pub fn to_line(&self) -> String {
        to_json(self)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode response");
        r#"{"status":"failure","message":"Error encoding response","id":null}"#.to_string()
    })
}

/// Parse and execute one request line, returning the response line without
/// its terminator.
pub async fn handle_line(service: &NvrService, line: &str) -> String {
    match Command::parse(line) {
        Ok(command) => execute(service, command).await,
        Err(ParseError::Unknown(_)) => UNKNOWN_COMMAND.to_string(),
        Err(e) => Response::failure(e.to_string()).to_line(),
    }
}

/// Run a parsed command against the service.
pub async fn execute(service: &NvrService, command: Command) -> String {
    match command {
        Command::List => match service.list_cameras().await {
            Ok(cameras) => to_json(&cameras),
            Err(e) => Response::error("listing cameras", &e).to_line(),
        },
        Command::Start => match service.start_all().await {
            Ok(_) => SERVICE_STARTED.to_string(),
            Err(e) => Response::error("starting service", &e).to_line(),
        },
        Command::Stop => {
            service.stop_all().await;
            SERVICE_STOPPED.to_string()
        }
        Command::Config => to_json(&service.current_config().await),
        Command::Status => to_json(&service.status().await),
        Command::AddCamera(payload) => match service.add_camera(&payload).await {
            Ok(id) => Response::success("Camera created successfully", Some(id)),
            Err(e) => Response::error("adding camera", &e),
        }
        .to_line(),
        Command::UpdateCamera(payload) => match service.update_camera(&payload).await {
            Ok(id) => Response::success("Camera updated successfully", Some(id)),
            Err(e) => Response::error("updating camera", &e),
        }
        .to_line(),
        Command::RemoveCamera(id) => match service.remove_camera(id).await {
            Ok(()) => Response::success("Camera removed successfully", Some(id)),
            Err(e) => Response::error("removing camera", &e),
        }
        .to_line(),
        Command::StartCamera(id) => match service.start_camera(id).await {
            Ok(()) => Response::success("Camera started", Some(id)),
            Err(e) => Response::error("starting camera", &e),
        }
        .to_line(),
        Command::StopCamera(id) => {
            let message = if service.stop_worker(id).await {
                "Camera stopped"
            } else {
                "Camera was not running"
            };
            Response::success(message, Some(id)).to_line()
        }
        Command::SetConfig(payload) => match service.set_config(&payload).await {
            Ok(_) => Response::success("Config updated successfully", None),
            Err(e) => Response::error("updating config", &e),
        }
        .to_line(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSummary;
    use crate::capture::process::fake::Behavior;
    use crate::config::RecordingConfig;
    use crate::service::tests::{payload, service_with, VALID_PAYLOAD};
    use proptest::prelude::*;

    fn response(line: &str) -> Response {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_parse_plain_commands() {
        assert_eq!(Command::parse("list"), Ok(Command::List));
        assert_eq!(Command::parse("start\n"), Ok(Command::Start));
        assert_eq!(Command::parse("  stop \r\n"), Ok(Command::Stop));
        assert_eq!(Command::parse("config"), Ok(Command::Config));
        assert_eq!(Command::parse("status"), Ok(Command::Status));
    }

    #[test]
    fn test_parse_payload_commands() {
        assert_eq!(
            Command::parse(r#"addCamera|{"name":"a|b"}"#),
            Ok(Command::AddCamera(r#"{"name":"a|b"}"#.to_string()))
        );
        assert_eq!(Command::parse("removeCamera|7"), Ok(Command::RemoveCamera(7)));
        assert_eq!(Command::parse("startCamera| 3 "), Ok(Command::StartCamera(3)));
        assert_eq!(Command::parse("stopCamera|3"), Ok(Command::StopCamera(3)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("addCamera"),
            Err(ParseError::MissingPayload("addCamera"))
        );
        assert_eq!(
            Command::parse("setConfig|  "),
            Err(ParseError::MissingPayload("setConfig"))
        );
        assert!(matches!(
            Command::parse("removeCamera|abc"),
            Err(ParseError::InvalidId { command: "removeCamera", .. })
        ));
        assert!(matches!(Command::parse("LIST"), Err(ParseError::Unknown(_))));
        assert!(matches!(Command::parse(""), Err(ParseError::Unknown(_))));
    }

    #[test]
    fn test_response_shape() {
        let line = Response::success("ok", Some(4)).to_line();
        assert_eq!(line, r#"{"status":"success","message":"ok","id":4}"#);
        let line = Response::failure("nope").to_line();
        assert_eq!(line, r#"{"status":"failure","message":"nope","id":null}"#);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_unrecognised_names_are_unknown(name in "[a-zA-Z]{1,12}") {
            let known = [
                "list", "start", "stop", "config", "status", "addCamera", "updateCamera",
                "setConfig", "removeCamera", "startCamera", "stopCamera",
            ];
            prop_assume!(!known.contains(&name.as_str()));
            prop_assert!(matches!(Command::parse(&name), Err(ParseError::Unknown(_))));
            let with_payload = format!("{}|x", name);
            prop_assert!(matches!(Command::parse(&with_payload), Err(ParseError::Unknown(_))));
        }
    }

    #[tokio::test]
    async fn test_add_camera_then_list() {
        let (service, _) = service_with(Behavior::RunUntilKilled).await;

        let line = handle_line(&service, &format!("addCamera|{}", payload(1))).await;
        let added = response(&line);
        assert_eq!(added.status, ResponseStatus::Success);
        assert_eq!(added.message, "Camera created successfully");
        let id = added.id.unwrap();

        let listed: Vec<CameraSummary> =
            serde_json::from_str(&handle_line(&service, "list").await).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].name, "cam1");
        assert_eq!(listed[0].url, "rtsp://10.0.0.1/live");
    }

    #[tokio::test]
    async fn test_add_camera_failures() {
        let (service, _) = service_with(Behavior::RunUntilKilled).await;
        handle_line(&service, &format!("addCamera|{}", VALID_PAYLOAD.replace('\n', " "))).await;

        let invalid = response(&handle_line(&service, "addCamera|invalid json").await);
        assert_eq!(invalid.status, ResponseStatus::Failure);
        assert!(invalid.message.starts_with("Invalid JSON"));
        assert_eq!(invalid.id, None);

        let line = format!("addCamera|{}", VALID_PAYLOAD.replace('\n', " "));
        let duplicate = response(&handle_line(&service, &line).await);
        assert_eq!(duplicate.status, ResponseStatus::Failure);
        assert!(duplicate.message.starts_with("Error adding camera"));

        let missing = response(&handle_line(&service, "addCamera").await);
        assert_eq!(missing.status, ResponseStatus::Failure);
        assert_eq!(service.store().camera_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_stop_and_unknown() {
        let (service, launcher) = service_with(Behavior::RunUntilKilled).await;
        handle_line(&service, &format!("addCamera|{}", payload(1))).await;

        assert_eq!(handle_line(&service, "start").await, SERVICE_STARTED);
        assert_eq!(service.registry().len().await, 1);
        assert_eq!(handle_line(&service, "stop").await, SERVICE_STOPPED);
        assert!(service.registry().is_empty().await);
        assert_eq!(launcher.stats.live(), 0);

        assert_eq!(handle_line(&service, "reboot").await, UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn test_config_and_set_config() {
        let (service, _) = service_with(Behavior::RunUntilKilled).await;
        let current: RecordingConfig =
            serde_json::from_str(&handle_line(&service, "config").await).unwrap();
        assert_eq!(current, RecordingConfig::default());

        let ok = response(&handle_line(&service, r#"setConfig|{"segment_time":120}"#).await);
        assert_eq!(ok.status, ResponseStatus::Success);
        let bad = response(&handle_line(&service, r#"setConfig|{"segment_time":0}"#).await);
        assert_eq!(bad.status, ResponseStatus::Failure);

        let current: RecordingConfig =
            serde_json::from_str(&handle_line(&service, "config").await).unwrap();
        assert_eq!(current.segment_time, 120);
    }

    #[tokio::test]
    async fn test_per_camera_commands() {
        let (service, _) = service_with(Behavior::RunUntilKilled).await;
        let id = response(&handle_line(&service, &format!("addCamera|{}", payload(2))).await)
            .id
            .unwrap();

        let started = response(&handle_line(&service, &format!("startCamera|{}", id)).await);
        assert_eq!(started.status, ResponseStatus::Success);
        let again = response(&handle_line(&service, &format!("startCamera|{}", id)).await);
        assert_eq!(again.status, ResponseStatus::Failure);

        let status: Vec<serde_json::Value> =
            serde_json::from_str(&handle_line(&service, "status").await).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0]["camera_id"], id);

        let stopped = response(&handle_line(&service, &format!("stopCamera|{}", id)).await);
        assert_eq!(stopped.message, "Camera stopped");
        let idle = response(&handle_line(&service, &format!("stopCamera|{}", id)).await);
        assert_eq!(idle.message, "Camera was not running");

        let update = format!(r#"updateCamera|{{"id":{},"name":"renamed"}}"#, id);
        assert_eq!(
            response(&handle_line(&service, &update).await).status,
            ResponseStatus::Success
        );

        let removed = response(&handle_line(&service, &format!("removeCamera|{}", id)).await);
        assert_eq!(removed.status, ResponseStatus::Success);
        let gone = response(&handle_line(&service, &format!("removeCamera|{}", id)).await);
        assert_eq!(gone.status, ResponseStatus::Failure);
    }
}
