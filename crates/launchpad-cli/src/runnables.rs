//! Runnables shipped with the worker binary.
//!
//! - `test`: sleeps briefly and returns a fixed string
//! - `audio`: transcodes `src` into `dest.mp3` and `dest.ogg` with ffmpeg
//! - manifest: command runnables described in a JSON file

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use launchpad_core::domain::{Params, RegistryError, RunnableError};
use launchpad_core::ports::{Runnable, RunnableSource};
use launchpad_core::typed::{Handler, Task, TypedRunnable};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::process::Command;

pub struct TestRunnable;

#[async_trait]
impl Runnable for TestRunnable {
    fn name(&self) -> &str {
        "test"
    }

    async fn run(&self, _params: Params) -> Result<Value, RunnableError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(json!("This is a test result"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTask {
    pub src: String,
    pub dest: String,
}

impl Task for AudioTask {
    const TYPE: &'static str = "audio";
}

/// Runs one ffmpeg invocation per output format, concurrently.
pub struct AudioHandler {
    ffmpeg: PathBuf,
}

impl AudioHandler {
    pub const FORMATS: [&'static str; 2] = ["mp3", "ogg"];

    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn transcode(&self, src: &str, dest: &str, format: &str) -> Result<Value, RunnableError> {
        let dest = format!("{dest}.{format}");
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-i", src, &dest])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RunnableError::new(format!("failed to spawn {}: {e}", self.ffmpeg.display())))?;
        if !output.status.success() {
            return Err(RunnableError::new(format!(
                "{} {format} exited with {}: {}",
                self.ffmpeg.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(json!({ "format": format, "dest": dest }))
    }
}

impl Default for AudioHandler {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Handler<AudioTask> for AudioHandler {
    async fn handle(&self, task: AudioTask) -> Result<Value, RunnableError> {
        let [first, second] = Self::FORMATS;
        let (a, b) = tokio::try_join!(
            self.transcode(&task.src, &task.dest, first),
            self.transcode(&task.src, &task.dest, second),
        )?;
        Ok(json!([a, b]))
    }
}

/// The runnables compiled into the binary.
pub struct BuiltinRunnables;

impl RunnableSource for BuiltinRunnables {
    fn source_name(&self) -> &str {
        "builtin"
    }

    fn load(&self) -> Result<Vec<Arc<dyn Runnable>>, RegistryError> {
        Ok(vec![
            Arc::new(TestRunnable),
            Arc::new(TypedRunnable::<AudioTask, _>::new(AudioHandler::default())),
        ])
    }
}

/// One entry of a runnables manifest.
///
/// ```json
/// [{"name": "thumbnail", "program": "convert", "args": ["{src}", "-resize", "64x64", "{dest}"]}]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Runs an external program with `{param}` placeholders filled from the task params.
pub struct CommandRunnable {
    spec: CommandSpec,
}

impl CommandRunnable {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

fn render_arg(template: &str, params: &Params) -> Result<String, RunnableError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let field = &after[..end];
        match params.get(field) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => return Err(RunnableError::new(format!("missing param: {field}"))),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[async_trait]
impl Runnable for CommandRunnable {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn run(&self, params: Params) -> Result<Value, RunnableError> {
        let args = self
            .spec
            .args
            .iter()
            .map(|a| render_arg(a, &params))
            .collect::<Result<Vec<_>, _>>()?;
        let output = Command::new(&self.spec.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RunnableError::new(format!("failed to spawn {}: {e}", self.spec.program)))?;
        if !output.status.success() {
            return Err(RunnableError::new(format!(
                "{} exited with {}: {}",
                self.spec.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
        }))
    }
}

/// Loads [`CommandRunnable`]s from a JSON manifest on disk.
pub struct ManifestRunnables {
    path: PathBuf,
    name: String,
}

impl ManifestRunnables {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name }
    }

    fn load_error(&self, message: String) -> RegistryError {
        RegistryError::Load {
            source_name: self.name.clone(),
            message,
        }
    }
}

impl RunnableSource for ManifestRunnables {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Arc<dyn Runnable>>, RegistryError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.load_error(e.to_string()))?;
        let specs: Vec<CommandSpec> =
            serde_json::from_str(&raw).map_err(|e| self.load_error(e.to_string()))?;
        Ok(specs
            .into_iter()
            .map(|spec| Arc::new(CommandRunnable::new(spec)) as Arc<dyn Runnable>)
            .collect())
    }
}

/// `builtin` selects the compiled-in runnables, anything else is a manifest path.
pub fn source_for(spec: &str) -> Box<dyn RunnableSource> {
    match spec {
        "builtin" => Box::new(BuiltinRunnables),
        path => Box::new(ManifestRunnables::new(path)),
    }
}
