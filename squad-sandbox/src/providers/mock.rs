//! In-memory sandbox provider for tests and offline runs.

use crate::provider::{
    CreateRequest, OutputSink, ProviderError, RunOptions, SandboxProvider, SandboxSession,
};
use async_trait::async_trait;
use squad_core::OutputStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Remote state of a mock sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSandboxState {
    Running,
    Paused,
    Killed,
}

/// Scripted outcome for commands starting with a given prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    Exit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    Fail(String),
}

/// Provider call recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create(HashMap<String, String>),
    Connect(String),
    Attach(String),
    Run { sandbox_id: String, command: String },
    Pause(String),
    Kill(String),
}

#[derive(Debug, Default)]
struct MockShared {
    sandboxes: Mutex<HashMap<String, MockSandboxState>>,
    commands: Mutex<Vec<(String, MockCommand)>>,
    calls: Mutex<Vec<MockCall>>,
    next_id: AtomicU64,
    fail_create: AtomicBool,
    fail_connect: AtomicBool,
    fail_kill: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockShared {
    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    fn state(&self, sandbox_id: &str) -> Option<MockSandboxState> {
        lock(&self.sandboxes).get(sandbox_id).copied()
    }

    fn set_state(&self, sandbox_id: &str, state: MockSandboxState) {
        lock(&self.sandboxes).insert(sandbox_id.to_string(), state);
    }

    fn script_for(&self, command: &str) -> Option<MockCommand> {
        lock(&self.commands)
            .iter()
            .rev()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, outcome)| outcome.clone())
    }
}

/// Mock provider. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockSandboxProvider {
    shared: Arc<MockShared>,
}

impl MockSandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for commands starting with `prefix`. Later
    /// scripts take precedence.
    pub fn with_command(self, prefix: impl Into<String>, outcome: MockCommand) -> Self {
        lock(&self.shared.commands).push((prefix.into(), outcome));
        self
    }

    pub fn fail_create(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_kill(&self, fail: bool) {
        self.shared.fail_kill.store(fail, Ordering::SeqCst);
    }

    /// Remote state of a sandbox, as the provider sees it.
    pub fn state(&self, sandbox_id: &str) -> Option<MockSandboxState> {
        self.shared.state(sandbox_id)
    }

    /// Simulate the provider losing a sandbox.
    pub fn forget(&self, sandbox_id: &str) {
        lock(&self.shared.sandboxes).remove(sandbox_id);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.shared.calls).clone()
    }

    /// Number of sandboxes ever created.
    pub fn created_count(&self) -> u64 {
        self.shared.next_id.load(Ordering::SeqCst)
    }

    fn session(&self, sandbox_id: &str) -> Arc<dyn SandboxSession> {
        Arc::new(MockSession {
            sandbox_id: sandbox_id.to_string(),
            shared: Arc::clone(&self.shared),
        })
    }
}

#[async_trait]
impl SandboxProvider for MockSandboxProvider {
    async fn create(&self, request: &CreateRequest) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        self.shared.record(MockCall::Create(request.metadata.clone()));
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("quota exceeded".to_string()));
        }
        let n = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let sandbox_id = format!("mock-sbx-{}", n);
        self.shared.set_state(&sandbox_id, MockSandboxState::Running);
        Ok(self.session(&sandbox_id))
    }

    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        self.shared.record(MockCall::Connect(sandbox_id.to_string()));
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("connect refused".to_string()));
        }
        match self.shared.state(sandbox_id) {
            Some(MockSandboxState::Running | MockSandboxState::Paused) => {
                self.shared.set_state(sandbox_id, MockSandboxState::Running);
                Ok(self.session(sandbox_id))
            }
            _ => Err(ProviderError::NotFound(sandbox_id.to_string())),
        }
    }

    async fn attach(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        self.shared.record(MockCall::Attach(sandbox_id.to_string()));
        match self.shared.state(sandbox_id) {
            Some(MockSandboxState::Running | MockSandboxState::Paused) => Ok(self.session(sandbox_id)),
            _ => Err(ProviderError::NotFound(sandbox_id.to_string())),
        }
    }
}

struct MockSession {
    sandbox_id: String,
    shared: Arc<MockShared>,
}

#[async_trait]
impl SandboxSession for MockSession {
    fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    async fn run(
        &self,
        command: &str,
        _options: &RunOptions,
        sink: &dyn OutputSink,
    ) -> Result<i32, ProviderError> {
        self.shared.record(MockCall::Run {
            sandbox_id: self.sandbox_id.clone(),
            command: command.to_string(),
        });
        match self.shared.state(&self.sandbox_id) {
            Some(MockSandboxState::Running) => {}
            Some(MockSandboxState::Paused) => {
                return Err(ProviderError::Request("sandbox is paused".to_string()))
            }
            _ => return Err(ProviderError::NotFound(self.sandbox_id.clone())),
        }

        let script = self.shared.script_for(command).unwrap_or_else(|| {
            let stdout = command
                .strip_prefix("echo ")
                .map(|rest| format!("{}\n", rest))
                .unwrap_or_default();
            MockCommand::Exit {
                exit_code: 0,
                stdout,
                stderr: String::new(),
            }
        });

        match script {
            MockCommand::Exit {
                exit_code,
                stdout,
                stderr,
            } => {
                for line in stdout.split_inclusive('\n') {
                    sink.on_output(OutputStream::Stdout, line);
                }
                for line in stderr.split_inclusive('\n') {
                    sink.on_output(OutputStream::Stderr, line);
                }
                Ok(exit_code)
            }
            MockCommand::Timeout => Err(ProviderError::Timeout),
            MockCommand::Fail(message) => Err(ProviderError::Request(message)),
        }
    }

    async fn pause(&self) -> Result<(), ProviderError> {
        self.shared.record(MockCall::Pause(self.sandbox_id.clone()));
        match self.shared.state(&self.sandbox_id) {
            Some(MockSandboxState::Running | MockSandboxState::Paused) => {
                self.shared
                    .set_state(&self.sandbox_id, MockSandboxState::Paused);
                Ok(())
            }
            _ => Err(ProviderError::NotFound(self.sandbox_id.clone())),
        }
    }

    async fn kill(&self) -> Result<(), ProviderError> {
        self.shared.record(MockCall::Kill(self.sandbox_id.clone()));
        if self.shared.fail_kill.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("sandbox already gone".to_string()));
        }
        self.shared
            .set_state(&self.sandbox_id, MockSandboxState::Killed);
        Ok(())
    }
}
