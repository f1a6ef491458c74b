use crate::config::schema::LifecycleConfig;
use crate::error::BackendError;
use crate::models::backend::{BackendLoader, ChatHandler, ChatRequest, ChatResponse, ModelBackend};
use crate::models::catalog::{ImageBackendFamily, RemoteSource};
use hf_hub::api::sync::Api;
use regex::Regex;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Loads models into a `llama-server` (llama.cpp) child process
///
/// Model files are resolved through the Hugging Face Hub cache. Each loaded
/// backend owns one server process; dropping the backend kills it.
///
/// Loader and backend methods block. They must run on a blocking thread of a
/// tokio runtime, which is how `ModelLifecycleManager` calls them.
#[derive(Debug, Clone)]
pub struct LlamaServerLoader {
    binary: String,
    startup_timeout: Duration,
}

impl LlamaServerLoader {
    #[must_use]
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            binary: config.server_binary.clone(),
            startup_timeout: config.startup_timeout(),
        }
    }

    /// Download (or find in cache) the file `source` points at
    fn resolve(source: &RemoteSource) -> Result<PathBuf, BackendError> {
        let hub_error = |reason: String| BackendError::Hub {
            repo: source.repo_id.clone(),
            file: source.filename.clone(),
            reason,
        };

        let api = Api::new()
            .map_err(|e| hub_error(format!("Failed to initialize HuggingFace API: {e}")))?;
        let repo = api.model(source.repo_id.clone());

        let filename = if is_glob(&source.filename) {
            let pattern = glob_to_regex(&source.filename)
                .map_err(|e| hub_error(format!("Invalid file pattern: {e}")))?;
            let info = repo
                .info()
                .map_err(|e| hub_error(format!("Failed to list repo files: {e}")))?;
            info.siblings
                .into_iter()
                .map(|s| s.rfilename)
                .find(|name| pattern.is_match(name))
                .ok_or_else(|| hub_error("no file matches pattern".to_string()))?
        } else {
            source.filename.clone()
        };

        tracing::info!("Resolving {filename} from {}", source.repo_id);
        repo.get(&filename)
            .map_err(|e| hub_error(format!("Failed to download {filename}: {e}")))
    }

    fn spawn(
        &self,
        model: &Path,
        projector: Option<&Path>,
        n_ctx: u32,
    ) -> Result<Arc<dyn ModelBackend>, BackendError> {
        if !model.exists() {
            return Err(BackendError::MissingWeights(model.display().to_string()));
        }

        let binary = which::which(&self.binary).map_err(|_| {
            BackendError::Process(format!(
                "{} binary not found in PATH. Install llama.cpp or set lifecycle.server_binary",
                self.binary
            ))
        })?;

        let runtime = Handle::try_current()
            .map_err(|e| BackendError::Process(format!("No tokio runtime available: {e}")))?;

        let port = free_port()?;
        let mut command = Command::new(binary);
        command
            .arg("--model")
            .arg(model)
            .arg("--ctx-size")
            .arg(n_ctx.to_string())
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(projector) = projector {
            command.arg("--mmproj").arg(projector);
        }

        let child = command
            .spawn()
            .map_err(|e| BackendError::Process(format!("Failed to spawn {}: {e}", self.binary)))?;

        tracing::debug!("Started {} (pid {}) on port {port}", self.binary, child.id());

        let backend = LlamaServerBackend {
            child: Mutex::new(child),
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{port}"),
            runtime,
            supports_images: projector.is_some(),
        };
        backend.wait_until_ready(self.startup_timeout)?;

        Ok(Arc::new(backend))
    }
}

impl BackendLoader for LlamaServerLoader {
    fn load_text(
        &self,
        source: &RemoteSource,
        n_ctx: u32,
    ) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let model = Self::resolve(source)?;
        self.spawn(&model, None, n_ctx)
    }

    fn load_chat_handler(
        &self,
        family: ImageBackendFamily,
        projector: &RemoteSource,
    ) -> Result<ChatHandler, BackendError> {
        let projector = Self::resolve(projector)?;
        tracing::debug!("Using {} projector {}", family.name(), projector.display());
        Ok(ChatHandler { family, projector })
    }

    fn load_image(
        &self,
        source: &RemoteSource,
        handler: ChatHandler,
        n_ctx: u32,
    ) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let model = Self::resolve(source)?;
        self.spawn(&model, Some(&handler.projector), n_ctx)
    }

    fn load_local(&self, path: &Path, n_ctx: u32) -> Result<Arc<dyn ModelBackend>, BackendError> {
        self.spawn(path, None, n_ctx)
    }
}

/// One running `llama-server` process
pub struct LlamaServerBackend {
    child: Mutex<Child>,
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
    supports_images: bool,
}

impl std::fmt::Debug for LlamaServerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaServerBackend")
            .field("client", &"Client { ... }")
            .field("base_url", &self.base_url)
            .field("supports_images", &self.supports_images)
            .finish_non_exhaustive()
    }
}

impl LlamaServerBackend {
    fn wait_until_ready(&self, timeout: Duration) -> Result<(), BackendError> {
        let started = Instant::now();
        let url = format!("{}/health", self.base_url);

        loop {
            if let Some(status) = self.exit_status()? {
                return Err(BackendError::Process(format!(
                    "llama-server exited during startup ({status})"
                )));
            }

            let healthy = self.runtime.block_on(async {
                self.client
                    .get(&url)
                    .timeout(Duration::from_secs(2))
                    .send()
                    .await
                    .is_ok_and(|r| r.status().is_success())
            });
            if healthy {
                tracing::debug!("llama-server ready after {:?}", started.elapsed());
                return Ok(());
            }

            if started.elapsed() >= timeout {
                return Err(BackendError::Process(format!(
                    "llama-server not ready after {}s",
                    timeout.as_secs()
                )));
            }
            std::thread::sleep(HEALTH_POLL_INTERVAL);
        }
    }

    fn exit_status(&self) -> Result<Option<std::process::ExitStatus>, BackendError> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| BackendError::Process("process handle poisoned".to_string()))?;
        Ok(child.try_wait()?)
    }
}

impl ModelBackend for LlamaServerBackend {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        if request.has_image() && !self.supports_images {
            return Err(BackendError::UnsupportedInput(
                "model was loaded without a vision projector".to_string(),
            ));
        }

        if let Some(status) = self.exit_status()? {
            return Err(BackendError::Process(format!("llama-server exited ({status})")));
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        self.runtime.block_on(async {
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, BackendError>(response.json::<ChatResponse>().await?)
        })
    }
}

impl Drop for LlamaServerBackend {
    fn drop(&mut self) {
        let child = match self.child.get_mut() {
            Ok(child) => child,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = child.kill() {
            tracing::debug!("llama-server already stopped: {e}");
        }
        let _ = child.wait();
    }
}

fn free_port() -> Result<u16, BackendError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn is_glob(filename: &str) -> bool {
    filename.contains(['*', '?', '['])
}

/// Convert an fnmatch-style pattern to an anchored regex.
///
/// Handles `*`, `?` and `[...]` classes (`[!...]` negates). An unclosed `[`
/// is a literal.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let chars: Vec<char> = glob.chars().collect();
    let mut result = String::from("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => result.push_str(".*"),
            '?' => result.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    let mut body = &chars[i + 1..end];
                    result.push('[');
                    if body.first() == Some(&'!') {
                        result.push('^');
                        body = &body[1..];
                    }
                    for &ch in body {
                        if matches!(ch, '\\' | '[' | ']' | '&' | '~' | '^') {
                            result.push('\\');
                        }
                        result.push(ch);
                    }
                    result.push(']');
                    i = end;
                }
                None => result.push_str(r"\["),
            },
            ch => result.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    result.push('$');
    Regex::new(&result)
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // A leading ']' is part of the class
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}
