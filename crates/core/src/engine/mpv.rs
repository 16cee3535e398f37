//! Engine backed by `mpv` processes controlled over their JSON IPC socket.
//!
//! Each handle owns one `mpv` process. mpv windows cannot be blended, so
//! opacity is approximated through the `brightness` property (a fully
//! transparent video is black). Players start minimised; a player is raised
//! on top when it starts playing and minimised again once it has faded out,
//! so the stacking order follows playback rather than the slot.

use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};

use serde_json::{json, Value};

use crate::{render::RenderParams, EngineError};

use super::{EngineStatus, PlaybackEngine, PlaybackHandle};

const IPC_TIMEOUT: Duration = Duration::from_millis(250);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_POLL: Duration = Duration::from_millis(50);
// Bounded so a slow demuxer costs a few ticks at most.
const DURATION_RETRIES: u32 = 4;
const DURATION_POLL: Duration = Duration::from_millis(20);
const QUIT_GRACE_POLLS: u32 = 10;
const PROPERTY_UNAVAILABLE: &str = "property unavailable";

/// Spawns one `mpv` per handle.
#[derive(Debug, Clone)]
pub struct MpvEngine {
    binary: PathBuf,
    socket_dir: PathBuf,
    extra_args: Vec<String>,
    spawned: u64,
}

impl MpvEngine {
    pub fn new(binary: impl Into<PathBuf>, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_dir: socket_dir.into(),
            extra_args: Vec::new(),
            spawned: 0,
        }
    }

    /// Extra command line arguments passed to every player.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn player_args(&self, socket: &Path, params: &RenderParams) -> Vec<String> {
        let mut args: Vec<String> = [
            "--pause",
            "--keep-open=yes",
            "--idle=yes",
            "--no-border",
            "--no-osc",
            "--no-input-default-bindings",
            "--really-quiet",
            "--window-minimized=yes",
            "--volume=0",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push(format!("--geometry={}", params.window_spec()));
        args.push(format!("--brightness={}", brightness(params.initial_alpha)));
        args.push(format!("--input-ipc-server={}", socket.display()));
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl PlaybackEngine for MpvEngine {
    type Handle = MpvHandle;

    fn open(&mut self, path: &Path, params: &RenderParams) -> Result<MpvHandle, EngineError> {
        self.spawned += 1;
        let socket = self.socket_dir.join(format!(
            "showloop-{}-{}-{}.sock",
            std::process::id(),
            params.layer,
            self.spawned
        ));
        let _ = std::fs::remove_file(&socket);

        let mut command = Command::new(&self.binary);
        command
            .args(self.player_args(&socket, params))
            .arg("--")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command.spawn()?;
        let stream = match connect(&socket, &mut child) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(&socket);
                return Err(err);
            }
        };
        tracing::debug!(video = %path.display(), socket = %socket.display(), "mpv player started");
        MpvHandle::new(child, stream, socket)
    }
}

fn connect(socket: &Path, child: &mut Child) -> Result<UnixStream, EngineError> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        if let Ok(stream) = UnixStream::connect(socket) {
            return Ok(stream);
        }
        if let Some(status) = child.try_wait()? {
            return Err(EngineError::Unavailable(format!("mpv exited early ({status})")));
        }
        if Instant::now() >= deadline {
            return Err(EngineError::Timeout(STARTUP_TIMEOUT));
        }
        std::thread::sleep(STARTUP_POLL);
    }
}

/// Maps the 0..=255 alpha range onto mpv's -100..=0 brightness.
fn brightness(alpha: u8) -> i64 {
    (f64::from(alpha) / 255.0 * 100.0).round() as i64 - 100
}

fn map_io(err: std::io::Error) -> EngineError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => EngineError::Timeout(IPC_TIMEOUT),
        _ => EngineError::Io(err),
    }
}

/// Interprets one IPC line. `None` means the line belongs to another request
/// or is an asynchronous event.
fn parse_reply(line: &str, request_id: u64, command: &str) -> Option<Result<Value, EngineError>> {
    let reply: Value = match serde_json::from_str(line) {
        Ok(reply) => reply,
        Err(err) => return Some(Err(EngineError::Protocol(err.to_string()))),
    };
    if reply.get("request_id").and_then(Value::as_u64) != Some(request_id) {
        return None;
    }
    let outcome = match reply.get("error").and_then(Value::as_str) {
        Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
        Some(reason) => Err(EngineError::Rejected {
            command: command.to_string(),
            reason: reason.to_string(),
        }),
        None => Err(EngineError::Protocol(format!("reply to `{command}` carries no status"))),
    };
    Some(outcome)
}

fn is_unavailable(err: &EngineError) -> bool {
    matches!(err, EngineError::Rejected { reason, .. } if reason == PROPERTY_UNAVAILABLE)
}

/// A running `mpv` process.
#[derive(Debug)]
pub struct MpvHandle {
    child: Child,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
    socket: PathBuf,
    next_request: u64,
    /// The window is shown and kept above the others.
    raised: bool,
    closed: bool,
}

impl MpvHandle {
    fn new(child: Child, stream: UnixStream, socket: PathBuf) -> Result<Self, EngineError> {
        stream.set_read_timeout(Some(IPC_TIMEOUT))?;
        stream.set_write_timeout(Some(IPC_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            child,
            writer: stream,
            reader,
            socket,
            next_request: 0,
            raised: false,
            closed: false,
        })
    }

    fn request(&mut self, command: Value) -> Result<Value, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        self.next_request += 1;
        let request_id = self.next_request;
        let label = command.to_string();

        let mut line = json!({ "command": command, "request_id": request_id }).to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).map_err(map_io)?;

        let deadline = Instant::now() + IPC_TIMEOUT;
        loop {
            let mut reply = String::new();
            let read = self.reader.read_line(&mut reply).map_err(map_io)?;
            if read == 0 {
                return Err(EngineError::Unavailable("mpv closed the ipc socket".into()));
            }
            if let Some(outcome) = parse_reply(&reply, request_id, &label) {
                return outcome;
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout(IPC_TIMEOUT));
            }
        }
    }

    fn get_property(&mut self, name: &str) -> Result<Value, EngineError> {
        self.request(json!(["get_property", name]))
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.request(json!(["set_property", name, value])).map(|_| ())
    }

    fn get_f64(&mut self, name: &str) -> Result<f64, EngineError> {
        let value = self.get_property(name)?;
        value
            .as_f64()
            .ok_or_else(|| EngineError::Protocol(format!("`{name}` is not a number: {value}")))
    }

    fn get_flag(&mut self, name: &str) -> Result<bool, EngineError> {
        match self.get_property(name) {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(err) if is_unavailable(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn raise(&mut self) -> Result<(), EngineError> {
        if self.raised {
            return Ok(());
        }
        self.set_property("window-minimized", json!(false))?;
        self.set_property("ontop", json!(true))?;
        self.raised = true;
        Ok(())
    }

    fn lower(&mut self) -> Result<(), EngineError> {
        if !self.raised {
            return Ok(());
        }
        self.set_property("ontop", json!(false))?;
        self.set_property("window-minimized", json!(true))?;
        self.raised = false;
        Ok(())
    }

    fn reap(&mut self) {
        for _ in 0..QUIT_GRACE_POLLS {
            if matches!(self.child.try_wait(), Ok(Some(_))) {
                let _ = std::fs::remove_file(&self.socket);
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.socket);
    }
}

impl PlaybackHandle for MpvHandle {
    fn play(&mut self) -> Result<(), EngineError> {
        self.raise()?;
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.set_property("pause", json!(true))
    }

    fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        self.request(json!(["seek", seconds, "absolute"])).map(|_| ())
    }

    fn set_alpha(&mut self, alpha: u8) -> Result<(), EngineError> {
        self.set_property("brightness", json!(brightness(alpha)))?;
        if alpha == 0 {
            self.lower()?;
        }
        Ok(())
    }

    fn set_volume(&mut self, level: f64) -> Result<(), EngineError> {
        self.set_property("volume", json!(level.clamp(0.0, 1.0) * 100.0))
    }

    fn duration(&mut self) -> Result<f64, EngineError> {
        // The demuxer needs a moment after loading before it knows the length.
        let mut attempts = 0;
        loop {
            match self.get_f64("duration") {
                Err(err) if is_unavailable(&err) && attempts < DURATION_RETRIES => {
                    attempts += 1;
                    std::thread::sleep(DURATION_POLL);
                }
                outcome => return outcome,
            }
        }
    }

    fn position(&mut self) -> Result<f64, EngineError> {
        match self.get_f64("time-pos") {
            Err(err) if is_unavailable(&err) => Ok(0.0),
            outcome => outcome,
        }
    }

    fn status(&mut self) -> Result<EngineStatus, EngineError> {
        if self.get_flag("eof-reached")? || self.get_flag("idle-active")? {
            return Ok(EngineStatus::Stopped);
        }
        if self.get_flag("pause")? {
            Ok(EngineStatus::Paused)
        } else {
            Ok(EngineStatus::Playing)
        }
    }

    fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        self.set_property("pause", json!(true))?;
        let file = path.to_string_lossy();
        self.request(json!(["loadfile", file, "replace"])).map(|_| ())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.request(json!(["stop"])).map(|_| ())
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        let outcome = self.request(json!(["quit"])).map(|_| ());
        self.closed = true;
        self.reap();
        // mpv may drop the socket before answering `quit`.
        match outcome {
            Err(EngineError::Unavailable(_)) | Err(EngineError::Timeout(_)) => Ok(()),
            other => other,
        }
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
            let _ = std::fs::remove_file(&self.socket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_maps_onto_brightness() {
        assert_eq!(brightness(0), -100);
        assert_eq!(brightness(255), 0);
        assert_eq!(brightness(128), -50);
    }

    #[test]
    fn replies_are_matched_by_request_id() {
        let event = r#"{"event":"playback-restart"}"#;
        assert!(parse_reply(event, 3, "seek").is_none());

        let other = r#"{"data":1.0,"request_id":2,"error":"success"}"#;
        assert!(parse_reply(other, 3, "seek").is_none());

        let ours = r#"{"data":12.5,"request_id":3,"error":"success"}"#;
        let value = parse_reply(ours, 3, "get_property").unwrap().unwrap();
        assert_eq!(value.as_f64(), Some(12.5));
    }

    #[test]
    fn failed_replies_carry_the_reason() {
        let line = r#"{"request_id":4,"error":"property unavailable"}"#;
        let err = parse_reply(line, 4, "get_property").unwrap().unwrap_err();
        assert!(is_unavailable(&err));
        assert!(format!("{err}").contains("get_property"));

        let garbage = parse_reply("not json", 4, "get_property").unwrap();
        assert!(matches!(garbage, Err(EngineError::Protocol(_))));
    }

    #[test]
    fn players_start_minimised_and_not_on_top() {
        let engine = MpvEngine::new("mpv", "/tmp").with_args(vec!["--hwdec=auto".into()]);
        let params = RenderParams::new(52, crate::config::Geometry::default());
        let args = engine.player_args(Path::new("/tmp/showloop.sock"), &params);

        assert!(args.iter().any(|arg| arg == "--window-minimized=yes"));
        assert!(args.iter().any(|arg| arg == "--brightness=-100"));
        assert!(!args.iter().any(|arg| arg.starts_with("--ontop")));
        assert_eq!(args.last().map(String::as_str), Some("--hwdec=auto"));
    }

    /// Handle talking to an in-process responder instead of a real mpv.
    fn scripted_handle(
        respond: impl Fn(&Value) -> Value + Send + 'static,
    ) -> (MpvHandle, std::thread::JoinHandle<Vec<Value>>) {
        let (client, server) = UnixStream::pair().unwrap();
        let responder = std::thread::spawn(move || {
            let mut writer = server.try_clone().unwrap();
            let mut seen = Vec::new();
            for line in BufReader::new(server).lines() {
                let Ok(line) = line else { break };
                let request: Value = serde_json::from_str(&line).unwrap();
                let mut reply = respond(&request["command"]);
                reply["request_id"] = request["request_id"].clone();
                seen.push(request["command"].clone());
                if writeln!(writer, "{reply}").is_err() {
                    break;
                }
            }
            seen
        });
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let socket = std::env::temp_dir().join("showloop-scripted.sock");
        (MpvHandle::new(child, client, socket).unwrap(), responder)
    }

    fn success(_: &Value) -> Value {
        json!({ "error": "success", "data": null })
    }

    #[test]
    fn window_is_raised_on_play_and_lowered_after_fade_out() {
        let (mut handle, responder) = scripted_handle(success);

        handle.set_alpha(0).unwrap();
        handle.play().unwrap();
        handle.set_alpha(128).unwrap();
        handle.set_alpha(0).unwrap();
        drop(handle);

        let commands = responder.join().unwrap();
        assert_eq!(
            commands,
            vec![
                json!(["set_property", "brightness", -100]),
                json!(["set_property", "window-minimized", false]),
                json!(["set_property", "ontop", true]),
                json!(["set_property", "pause", false]),
                json!(["set_property", "brightness", -50]),
                json!(["set_property", "brightness", -100]),
                json!(["set_property", "ontop", false]),
                json!(["set_property", "window-minimized", true]),
            ]
        );
    }

    #[test]
    fn unknown_duration_gives_up_quickly() {
        let (mut handle, responder) =
            scripted_handle(|_| json!({ "error": "property unavailable" }));

        let started = Instant::now();
        let err = handle.duration().unwrap_err();
        let waited = started.elapsed();
        drop(handle);

        assert!(is_unavailable(&err));
        assert!(waited < Duration::from_millis(500));
        assert_eq!(responder.join().unwrap().len(), DURATION_RETRIES as usize + 1);
    }

    #[test]
    fn missing_binary_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MpvEngine::new(dir.path().join("no-such-mpv"), dir.path());
        let params = RenderParams::new(52, crate::config::Geometry::default());
        let err = engine.open(Path::new("a.mp4"), &params).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
