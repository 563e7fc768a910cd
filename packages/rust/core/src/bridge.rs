//! Proposal generators backed by a subprocess bridge or by recorded responses.
//!
//! The bridge is any program speaking JSON lines on stdin/stdout: it emits
//! `{"type":"ready"}` on startup, answers each `generate` request with a
//! `result` (carrying the provider's response body) or an `error`, and exits
//! on `shutdown`. The provider HTTP client and its credentials live there.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use redraft_shared::{GeneratorConfig, RedraftError, Result};

use crate::suggest::{ProposalGenerator, ProviderResponse};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage<'a> {
    Generate {
        id: String,
        model: &'a str,
        prompt: &'a str,
    },
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result {
        id: String,
        result: ProviderResponse,
    },
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Bridge generator
// ---------------------------------------------------------------------------

/// [`ProposalGenerator`] talking to a spawned bridge subprocess.
pub struct BridgeGenerator {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    model: String,
    request_counter: u64,
}

impl BridgeGenerator {
    /// Spawn the bridge and wait for its ready message.
    pub fn spawn(config: &GeneratorConfig) -> Result<Self> {
        info!(cmd = %config.bridge_cmd, args = ?config.bridge_args, "spawning generator bridge");

        let mut command = Command::new(&config.bridge_cmd);
        command
            .args(&config.bridge_args)
            .env("REDRAFT_MODEL", &config.model)
            .env("REDRAFT_API_KEY_ENV", &config.api_key_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RedraftError::Generator(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                config.bridge_cmd
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RedraftError::Generator("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RedraftError::Generator("failed to capture bridge stdout".into()))?;

        let mut bridge = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            model: config.model.clone(),
            request_counter: 0,
        };
        bridge.wait_for_ready()?;
        Ok(bridge)
    }

    fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| RedraftError::Generator(format!("bridge read error: {e}")))?;
        if line.is_empty() {
            return Err(RedraftError::Generator(
                "bridge closed stdout unexpectedly".into(),
            ));
        }
        serde_json::from_str(line.trim()).map_err(|e| {
            let preview: String = line.chars().take(200).collect();
            RedraftError::Generator(format!("invalid bridge message: {e} (got: {preview})"))
        })
    }

    fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message()? {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            other => Err(RedraftError::Generator(format!(
                "expected ready message, got: {other:?}"
            ))),
        }
    }

    fn send(&mut self, message: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| RedraftError::Generator(format!("failed to serialize request: {e}")))?;
        writeln!(self.stdin, "{json}")
            .and_then(|()| self.stdin.flush())
            .map_err(|e| RedraftError::Generator(format!("failed to write to bridge stdin: {e}")))
    }

    /// Send shutdown and wait for the bridge to exit.
    pub fn shutdown(mut self) {
        if let Err(e) = self.send(&RequestMessage::Shutdown) {
            warn!(error = %e, "failed to send shutdown to bridge");
        }
        match self.child.wait() {
            Ok(status) => info!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }
}

impl ProposalGenerator for BridgeGenerator {
    fn generate(&mut self, prompt: &str) -> Result<ProviderResponse> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);
        let model = self.model.clone();
        self.send(&RequestMessage::Generate {
            id: id.clone(),
            model: &model,
            prompt,
        })?;
        debug!(%id, "generate request sent");

        match self.read_message()? {
            ResponseMessage::Result {
                id: response_id,
                result,
            } => {
                if response_id != id {
                    warn!(expected = %id, got = %response_id, "bridge answered a different request id");
                }
                Ok(result)
            }
            ResponseMessage::Error { error, .. } => Err(RedraftError::Generator(error)),
            ResponseMessage::Ready => Err(RedraftError::Generator(
                "unexpected ready message during generation".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Replay generator
// ---------------------------------------------------------------------------

/// [`ProposalGenerator`] returning recorded provider responses in order.
#[derive(Debug, Default)]
pub struct ReplayGenerator {
    responses: VecDeque<ProviderResponse>,
    prompts: Vec<String>,
}

impl ReplayGenerator {
    pub fn new(responses: impl IntoIterator<Item = ProviderResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Load a recorded response file: one provider response, or an array of them.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedraftError::io(path, e))?;
        let responses = match serde_json::from_str::<Vec<ProviderResponse>>(&raw) {
            Ok(many) => many,
            Err(_) => vec![serde_json::from_str::<ProviderResponse>(&raw).map_err(|e| {
                RedraftError::parse(format!(
                    "{} is not a provider response: {e}",
                    path.display()
                ))
            })?],
        };
        Ok(Self::new(responses))
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl ProposalGenerator for ReplayGenerator {
    fn generate(&mut self, prompt: &str) -> Result<ProviderResponse> {
        self.prompts.push(prompt.to_string());
        self.responses
            .pop_front()
            .ok_or_else(|| RedraftError::Generator("no recorded response left".into()))
    }
}
