//! Tracking backend that drives an external detector/tracker command.
//!
//! The command is invoked as `<cmd> probe|detect|track [options]`:
//! - `probe --video V` prints one JSON object with `fps` (fractions are
//!   truncated), `frame_count`, `width` and `height`;
//! - `detect --video V --model M --frame N` prints a JSON array of objects;
//! - `track --video V --model M --tracker-config P --conf C` prints one JSON
//!   line per frame, `{"objects": [...]}`.
//!
//! Objects are `{class_id, bbox: [x1, y1, x2, y2], confidence, track_id?}`.

use super::{FrameStream, TrackRequest, TrackedObject, TrackingBackend, VideoProperties};
use crate::error::{EvalError, Result};
use crate::run_artifacts::{format_float, Detection};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

/// Thread-count variables set on every child process.
pub fn thread_env(thread_count: usize) -> [(&'static str, String); 4] {
    let n = thread_count.max(1).to_string();
    [
        ("OMP_NUM_THREADS", n.clone()),
        ("MKL_NUM_THREADS", n.clone()),
        ("NUMEXPR_MAX_THREADS", n.clone()),
        ("PYTORCH_NUM_THREADS", n),
    ]
}

#[derive(Debug)]
pub struct SubprocessBackend {
    program: String,
    args: Vec<String>,
    thread_count: usize,
}

impl SubprocessBackend {
    /// `command_line` is split on whitespace, e.g. `python3 spike/track_bridge.py`.
    /// Quotes are not interpreted.
    pub fn new(command_line: &str, thread_count: usize) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| EvalError::invalid_argument("tracker command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            thread_count: thread_count.max(1),
        })
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(subcommand);
        for (key, value) in thread_env(self.thread_count) {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run_json<T: DeserializeOwned>(&self, mut cmd: Command, what: &str) -> Result<T> {
        let output = cmd.output().map_err(|e| {
            EvalError::upstream(format!("failed to spawn {} for {}: {}", self.program, what, e))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvalError::upstream(format!(
                "{} exited with {}: {}",
                what,
                output.status,
                tail(stderr.lines())
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| EvalError::upstream(format!("malformed {} output: {}", what, e)))
    }
}

impl TrackingBackend for SubprocessBackend {
    fn probe(&mut self, video_path: &Path) -> Result<VideoProperties> {
        let mut cmd = self.command("probe");
        cmd.arg("--video").arg(video_path);
        self.run_json(cmd, "probe")
    }

    fn detect_players(
        &mut self,
        video_path: &Path,
        model_name: &str,
        frame_index: usize,
    ) -> Result<Vec<Detection>> {
        let mut cmd = self.command("detect");
        cmd.arg("--video")
            .arg(video_path)
            .arg("--model")
            .arg(model_name)
            .arg("--frame")
            .arg(frame_index.to_string());
        let objects: Vec<TrackedObject> = self.run_json(cmd, "detect")?;
        Ok(objects
            .into_iter()
            .filter(|o| o.is_person())
            .map(|o| Detection {
                bbox: o.bbox,
                confidence: o.confidence,
            })
            .collect())
    }

    fn track<'a>(&'a mut self, request: &TrackRequest<'_>) -> Result<FrameStream<'a>> {
        let mut cmd = self.command("track");
        cmd.arg("--video")
            .arg(request.video_path)
            .arg("--model")
            .arg(request.model_name)
            .arg("--tracker-config")
            .arg(request.tracker_config)
            .arg("--conf")
            .arg(format_float(request.conf_threshold))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            EvalError::upstream(format!("failed to spawn {} for track: {}", self.program, e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EvalError::upstream("tracker stdout not captured"))?;
        let stderr = child.stderr.take().map(|stderr| {
            // Keeps the last lines only
            std::thread::spawn(move || {
                let mut kept = VecDeque::with_capacity(STDERR_TAIL_LINES);
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    if kept.len() == STDERR_TAIL_LINES {
                        kept.pop_front();
                    }
                    kept.push_back(line);
                }
                kept.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        Ok(Box::new(TrackStream {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            line_no: 0,
            done: false,
        }))
    }
}

#[derive(Deserialize)]
struct FrameLine {
    objects: Vec<TrackedObject>,
}

struct TrackStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    line_no: usize,
    done: bool,
}

impl TrackStream {
    fn finish(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| EvalError::upstream(format!("failed waiting for tracker: {}", e)))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(EvalError::upstream(format!(
                "tracker exited with {} after {} lines: {}",
                status, self.line_no, stderr
            )))
        }
    }
}

impl Iterator for TrackStream {
    type Item = Result<Vec<TrackedObject>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return match serde_json::from_str::<FrameLine>(&line) {
                        Ok(frame) => Some(Ok(frame.objects)),
                        Err(e) => {
                            self.done = true;
                            Some(Err(EvalError::upstream(format!(
                                "malformed frame line {}: {}",
                                self.line_no, e
                            ))))
                        }
                    };
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(EvalError::upstream(format!(
                        "failed reading tracker output: {}",
                        e
                    ))));
                }
                None => {
                    self.done = true;
                    return self.finish().err().map(Err);
                }
            }
        }
    }
}

impl Drop for TrackStream {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

fn tail<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
