//! NVR control client
//!
//! Sends one control-protocol line to the daemon at 127.0.0.1:9000 (or
//! `--addr`) and prints the one-line response.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_ADDR: &str = "127.0.0.1:9000";
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "nvrctl")]
#[command(author, version, about = "Control client for the NVR daemon", long_about = None)]
struct Cli {
    /// Daemon control address
    #[arg(long, default_value = DEFAULT_ADDR, env = "NVR_LISTEN_ADDR")]
    addr: String,

    /// Print JSON responses on one line instead of pretty-printed
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Cmd {
    /// List stored cameras
    List,
    /// Start recording every stored camera
    Start,
    /// Stop every active worker
    Stop,
    /// Show the recording config
    Config,
    /// Show per-worker state
    Status,
    /// Add a camera
    AddCamera(NewCameraArgs),
    /// Change fields of an existing camera
    UpdateCamera(UpdateCameraArgs),
    /// Stop and delete a camera
    RemoveCamera { id: i64 },
    /// Start recording one camera
    StartCamera { id: i64 },
    /// Stop recording one camera
    StopCamera { id: i64 },
    /// Change the recording config; applies to workers started afterwards
    SetConfig(SetConfigArgs),
}

#[derive(Args, Debug, PartialEq, Serialize)]
struct NewCameraArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    url: String,
    #[arg(long)]
    output_dir: String,
    #[arg(long)]
    restream: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug, PartialEq, Serialize)]
struct UpdateCameraArgs {
    id: i64,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<String>,
    /// Empty string clears the restream target
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    restream: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

#[derive(Args, Debug, PartialEq, Serialize)]
struct SetConfigArgs {
    /// Segment length in seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    segment_time: Option<u64>,
    /// Base restart delay in seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_interval: Option<u64>,
    /// Upper bound of the restart delay in seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    max_backoff: Option<u64>,
}

impl Cmd {
    /// The protocol line for this command, without terminator.
    fn to_line(&self) -> serde_json::Result<String> {
        let line = match self {
            Cmd::List => "list".to_string(),
            Cmd::Start => "start".to_string(),
            Cmd::Stop => "stop".to_string(),
            Cmd::Config => "config".to_string(),
            Cmd::Status => "status".to_string(),
            Cmd::AddCamera(args) => format!("addCamera|{}", serde_json::to_string(args)?),
            Cmd::UpdateCamera(args) => format!("updateCamera|{}", serde_json::to_string(args)?),
            Cmd::RemoveCamera { id } => format!("removeCamera|{}", id),
            Cmd::StartCamera { id } => format!("startCamera|{}", id),
            Cmd::StopCamera { id } => format!("stopCamera|{}", id),
            Cmd::SetConfig(args) => format!("setConfig|{}", serde_json::to_string(args)?),
        };
        Ok(line)
    }
}

/// Send `line` and wait for the single response line.
async fn send(addr: &str, line: &str) -> std::io::Result<String> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut response = String::new();
    let read = tokio::time::timeout(
        RESPONSE_TIMEOUT,
        BufReader::new(reader).read_line(&mut response),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no response from daemon"))??;
    if read == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "daemon closed the connection",
        ));
    }
    Ok(response.trim_end().to_string())
}

/// Pretty-print JSON responses; plain-text ones pass through.
fn render(response: &str, raw: bool) -> String {
    if raw {
        return response.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(response) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.to_string()),
        Err(_) => response.to_string(),
    }
}

/// Whether the response is a failure object.
fn is_failure(response: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(response)
        .ok()
        .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(|s| s == "failure"))
        .unwrap_or(false)
        || response == "Unknown command"
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let line = match cli.command.to_line() {
        Ok(line) => line,
        Err(e) => {
            eprintln!("Failed to encode request: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match send(&cli.addr, &line).await {
        Ok(response) => {
            println!("{}", render(&response, cli.raw));
            if is_failure(&response) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Failed to reach daemon at {}: {}", cli.addr, e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::net::TcpListener;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nvrctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_plain_commands() {
        assert_eq!(parse(&["list"]).command.to_line().unwrap(), "list");
        assert_eq!(parse(&["start"]).command.to_line().unwrap(), "start");
        assert_eq!(parse(&["status"]).command.to_line().unwrap(), "status");
        assert_eq!(parse(&["stop-camera", "4"]).command.to_line().unwrap(), "stopCamera|4");
    }

    #[test]
    fn test_add_camera_payload() {
        let cli = parse(&[
            "add-camera",
            "--name",
            "front",
            "--url",
            "rtsp://10.0.0.2/live",
            "--output-dir",
            "/srv/front",
        ]);
        let line = cli.command.to_line().unwrap();
        let (cmd, payload) = line.split_once('|').unwrap();
        assert_eq!(cmd, "addCamera");
        let json: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(json["name"], "front");
        assert_eq!(json["output_dir"], "/srv/front");
        assert!(json["restream"].is_null());
    }

    #[test]
    fn test_partial_payloads_omit_unset_fields() {
        let line = parse(&["update-camera", "3", "--name", "back"])
            .command
            .to_line()
            .unwrap();
        assert_eq!(line, r#"updateCamera|{"id":3,"name":"back"}"#);

        let line = parse(&["set-config", "--max-backoff", "120"])
            .command
            .to_line()
            .unwrap();
        assert_eq!(line, r#"setConfig|{"max_backoff":120}"#);
    }

    #[test]
    fn test_render_and_failure_detection() {
        assert_eq!(render("Service started.", false), "Service started.");
        assert!(render(r#"{"a":1}"#, false).contains('\n'));
        assert_eq!(render(r#"{"a":1}"#, true), r#"{"a":1}"#);

        assert!(is_failure(r#"{"status":"failure","message":"x","id":null}"#));
        assert!(!is_failure(r#"{"status":"success","message":"x","id":1}"#));
        assert!(is_failure("Unknown command"));
        assert!(!is_failure("[]"));
    }

    #[tokio::test]
    async fn test_send_reads_one_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            let reply = format!("echo:{}", line);
            writer.write_all(reply.as_bytes()).await.unwrap();
        });

        assert_eq!(send(&addr, "list").await.unwrap(), "echo:list");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_requests_are_single_lines(
            name in "[ -~]{1,20}",
            url in "[ -~]{1,30}",
            id in any::<i64>(),
        ) {
            let add = Cmd::AddCamera(NewCameraArgs {
                name: format!("{}\n", name),
                url,
                output_dir: "/tmp/x".to_string(),
                restream: None,
                username: None,
                password: None,
            });
            prop_assert!(!add.to_line().unwrap().contains('\n'));
            let remove = Cmd::RemoveCamera { id }.to_line().unwrap();
            prop_assert!(!remove.contains('\n'));
        }
    }
}
