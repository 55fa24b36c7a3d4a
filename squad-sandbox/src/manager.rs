//! Sandbox lifecycle manager.
//!
//! Owns the agent id -> live session map and mirrors every transition into
//! the `sandbox_tracking` collection. The map is a dispatch cache; the
//! tracking records are what survive a restart (see [`SandboxManager::reconcile`]).
//!
//! Per agent: `(absent) -> active <-> paused -> killed`. The persisted status
//! passes through `resuming` while a reconnect is in flight.

use crate::provider::{CreateRequest, OutputSink, ProviderError, RunOptions, SandboxProvider, SandboxSession};
use chrono::Utc;
use squad_core::{
    AgentId, AgentRole, OutputStream, SandboxCosts, SandboxDefaults, SandboxError,
    SandboxLifecycle, SandboxMetadata, SandboxResources, SandboxState, SandboxTracking,
    Specialization, SquadResult, Timestamp, TrackingStatus,
};
use squad_events::{EventBus, SandboxEventKind, SquadEvent};
use squad_storage::{Collection, Filter, FindOptions, SortKey, Update};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

// ============================================================================
// TYPES
// ============================================================================

/// Request to create a sandbox for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub agent_id: AgentId,
    pub agent_type: AgentRole,
    pub specialization: Option<Specialization>,
    pub timeout_ms: Option<i64>,
    pub cpu_count: Option<i32>,
    pub memory_mb: Option<i32>,
}

impl SandboxConfig {
    pub fn new(agent_id: AgentId, agent_type: AgentRole) -> Self {
        Self {
            agent_id,
            agent_type,
            specialization: None,
            timeout_ms: None,
            cpu_count: None,
            memory_mb: None,
        }
    }

    pub fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specialization = Some(specialization);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Callback receiving streamed output chunks.
pub type OutputCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for [`SandboxManager::execute`].
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub on_stdout: Option<OutputCallback>,
    pub on_stderr: Option<OutputCallback>,
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// `exit_code != 0`
    pub error: bool,
}

/// A live sandbox bound to one agent.
#[derive(Clone)]
pub struct SandboxInstance {
    pub sandbox_id: String,
    pub agent_id: AgentId,
    pub session: Arc<dyn SandboxSession>,
    pub status: SandboxState,
    pub agent_type: AgentRole,
    pub specialization: Specialization,
    pub resources: SandboxResources,
    pub created_at: Timestamp,
    pub last_heartbeat: Timestamp,
}

impl fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("sandbox_id", &self.sandbox_id)
            .field("agent_id", &self.agent_id)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("last_heartbeat", &self.last_heartbeat)
            .finish_non_exhaustive()
    }
}

/// Result of [`SandboxManager::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub restored: usize,
    pub tombstoned: usize,
}

// ============================================================================
// OUTPUT COLLECTION
// ============================================================================

/// Accumulates output while forwarding it to caller callbacks and the bus.
struct CollectingSink<'a> {
    agent_id: AgentId,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    options: &'a ExecuteOptions,
    events: &'a EventBus,
}

impl<'a> CollectingSink<'a> {
    fn new(agent_id: AgentId, options: &'a ExecuteOptions, events: &'a EventBus) -> Self {
        Self {
            agent_id,
            stdout: Mutex::new(String::new()),
            stderr: Mutex::new(String::new()),
            options,
            events,
        }
    }

    fn into_buffers(self) -> (String, String) {
        (
            self.stdout.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.stderr.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl OutputSink for CollectingSink<'_> {
    fn on_output(&self, stream: OutputStream, chunk: &str) {
        let (buffer, callback) = match stream {
            OutputStream::Stdout => (&self.stdout, &self.options.on_stdout),
            OutputStream::Stderr => (&self.stderr, &self.options.on_stderr),
        };
        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(chunk);
        if let Some(callback) = callback {
            callback(chunk);
        }
        self.events
            .publish(SquadEvent::agent_output(self.agent_id, stream, chunk));
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Sandbox lifecycle manager. Construct one and share it by `Arc`.
pub struct SandboxManager {
    provider: Arc<dyn SandboxProvider>,
    tracking: Collection<SandboxTracking>,
    events: EventBus,
    defaults: SandboxDefaults,
    instances: RwLock<HashMap<AgentId, SandboxInstance>>,
}

impl fmt::Debug for SandboxManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxManager")
            .field("instances", &self.read().len())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl SandboxManager {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        tracking: Collection<SandboxTracking>,
        events: EventBus,
    ) -> Self {
        Self {
            provider,
            tracking,
            events,
            defaults: SandboxDefaults::default(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: SandboxDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AgentId, SandboxInstance>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<AgentId, SandboxInstance>> {
        self.instances.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn require(&self, agent_id: AgentId) -> SquadResult<SandboxInstance> {
        self.get(agent_id)
            .ok_or_else(|| SandboxError::NotFound { agent_id }.into())
    }

    fn costs(&self, instance: &SandboxInstance, now: Timestamp) -> SandboxCosts {
        let runtime_seconds = (now - instance.created_at).num_seconds().max(0);
        SandboxCosts {
            estimated_cost: runtime_seconds as f64
                * instance.resources.cpu_count as f64
                * self.defaults.cost_per_cpu_second,
            runtime_seconds,
        }
    }

    /// Persist a transition as a partial update so earlier lifecycle
    /// timestamps are kept.
    async fn persist(
        &self,
        instance: &SandboxInstance,
        status: TrackingStatus,
        stamp: Option<&str>,
    ) -> SquadResult<()> {
        let now = Utc::now();
        let mut update = Update::new()
            .set("status", status)
            .set("lifecycle.last_heartbeat", now)
            .set("costs", self.costs(instance, now));
        if let Some(field) = stamp {
            update = update.set(format!("lifecycle.{}", field), now);
        }
        self.tracking
            .update_by_key(&instance.sandbox_id, &update)
            .await?;
        debug!(sandbox_id = %instance.sandbox_id, status = %status, "Synced sandbox tracking");
        Ok(())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Allocate a sandbox for an agent and persist its tracking record.
    pub async fn create(&self, config: SandboxConfig) -> SquadResult<SandboxInstance> {
        if let Some(existing) = self.get(config.agent_id) {
            return Err(SandboxError::AlreadyExists {
                agent_id: config.agent_id,
                sandbox_id: existing.sandbox_id,
            }
            .into());
        }

        let defaults = self.defaults.resources;
        let resources = SandboxResources {
            cpu_count: config.cpu_count.unwrap_or(defaults.cpu_count),
            memory_mb: config.memory_mb.unwrap_or(defaults.memory_mb),
            timeout_ms: config.timeout_ms.unwrap_or(defaults.timeout_ms),
        };
        let specialization = config.specialization.unwrap_or_default();

        let mut metadata = HashMap::new();
        metadata.insert("agentId".to_string(), config.agent_id.to_string());
        metadata.insert("agentType".to_string(), config.agent_type.to_string());
        metadata.insert("specialization".to_string(), specialization.to_string());
        let request = CreateRequest {
            timeout_ms: resources.timeout_ms,
            cpu_count: resources.cpu_count,
            memory_mb: resources.memory_mb,
            metadata,
        };

        // Reject bad resource shapes before touching the provider.
        let now = Utc::now();
        let mut record = SandboxTracking {
            sandbox_id: "pending".to_string(),
            agent_id: config.agent_id,
            task_id: None,
            status: TrackingStatus::Active,
            metadata: SandboxMetadata {
                agent_type: config.agent_type,
                specialization,
            },
            lifecycle: SandboxLifecycle {
                created_at: now,
                paused_at: None,
                resumed_at: None,
                killed_at: None,
                last_heartbeat: now,
            },
            resources,
            costs: SandboxCosts::default(),
        };
        record.validate()?;

        let session = self.provider.create(&request).await.map_err(|e| {
            SandboxError::CreationFailed {
                reason: format!(
                    "Failed to create sandbox for agent {}: {}",
                    config.agent_id, e
                ),
            }
        })?;
        record.sandbox_id = session.sandbox_id().to_string();

        if let Err(e) = self.tracking.upsert_record(&record).await {
            if let Err(kill_err) = session.kill().await {
                warn!(sandbox_id = %record.sandbox_id, error = %kill_err, "Failed to release sandbox after tracking error");
            }
            return Err(e);
        }

        let instance = SandboxInstance {
            sandbox_id: record.sandbox_id.clone(),
            agent_id: config.agent_id,
            session,
            status: SandboxState::Active,
            agent_type: config.agent_type,
            specialization,
            resources,
            created_at: now,
            last_heartbeat: now,
        };
        self.write().insert(config.agent_id, instance.clone());

        info!(
            agent_id = %config.agent_id,
            sandbox_id = %instance.sandbox_id,
            "Sandbox created"
        );
        self.events.publish(SquadEvent::sandbox(
            instance.sandbox_id.clone(),
            instance.agent_id,
            SandboxEventKind::Created,
        ));
        Ok(instance)
    }

    /// Run a command in the agent's sandbox.
    pub async fn execute(
        &self,
        agent_id: AgentId,
        command: &str,
        options: ExecuteOptions,
    ) -> SquadResult<CommandResult> {
        let instance = self.require(agent_id)?;
        let run_options = RunOptions {
            cwd: options.cwd.clone(),
            env: options.env.clone(),
            timeout_ms: options.timeout_ms,
        };

        let sink = CollectingSink::new(agent_id, &options, &self.events);
        let outcome = instance.session.run(command, &run_options, &sink).await;
        let (stdout, stderr) = sink.into_buffers();

        match outcome {
            Ok(exit_code) => {
                if let Some(live) = self.write().get_mut(&agent_id) {
                    live.last_heartbeat = Utc::now();
                }
                debug!(agent_id = %agent_id, exit_code = exit_code, "Command finished");
                Ok(CommandResult {
                    exit_code,
                    stdout,
                    stderr,
                    error: exit_code != 0,
                })
            }
            Err(ProviderError::Timeout) => Err(SandboxError::CommandTimeout {
                sandbox_id: instance.sandbox_id,
                command: command.to_string(),
            }
            .into()),
            Err(e) => Err(SandboxError::CommandFailed {
                sandbox_id: instance.sandbox_id,
                command: command.to_string(),
                exit_code: 1,
                stderr: if stderr.is_empty() {
                    e.to_string()
                } else {
                    stderr
                },
            }
            .into()),
        }
    }

    /// Hibernate the agent's sandbox.
    pub async fn pause(&self, agent_id: AgentId) -> SquadResult<()> {
        let instance = self.require(agent_id)?;
        instance
            .session
            .pause()
            .await
            .map_err(|e| SandboxError::Provider {
                sandbox_id: instance.sandbox_id.clone(),
                message: e.to_string(),
            })?;

        if let Some(live) = self.write().get_mut(&agent_id) {
            live.status = SandboxState::Paused;
        }
        self.persist(&instance, TrackingStatus::Paused, Some("paused_at"))
            .await?;

        info!(agent_id = %agent_id, sandbox_id = %instance.sandbox_id, "Sandbox paused");
        self.events.publish(SquadEvent::sandbox(
            instance.sandbox_id,
            agent_id,
            SandboxEventKind::Paused,
        ));
        Ok(())
    }

    /// Reconnect to the agent's original sandbox session.
    pub async fn resume(&self, agent_id: AgentId) -> SquadResult<()> {
        let instance = self.require(agent_id)?;
        self.persist(&instance, TrackingStatus::Resuming, None).await?;

        let session = match self.provider.connect(&instance.sandbox_id).await {
            Ok(session) => session,
            Err(e) => {
                let restore = TrackingStatus::from(instance.status);
                self.persist(&instance, restore, None).await?;
                return Err(SandboxError::Provider {
                    sandbox_id: instance.sandbox_id,
                    message: e.to_string(),
                }
                .into());
            }
        };

        {
            let mut instances = self.write();
            if let Some(live) = instances.get_mut(&agent_id) {
                live.session = session;
                live.status = SandboxState::Active;
                live.last_heartbeat = Utc::now();
            }
        }
        self.persist(&instance, TrackingStatus::Active, Some("resumed_at"))
            .await?;

        info!(agent_id = %agent_id, sandbox_id = %instance.sandbox_id, "Sandbox resumed");
        self.events.publish(SquadEvent::sandbox(
            instance.sandbox_id,
            agent_id,
            SandboxEventKind::Resumed,
        ));
        Ok(())
    }

    /// Destroy the agent's sandbox. Unknown agents are a no-op; provider and
    /// tracking failures are logged, not returned.
    pub async fn kill(&self, agent_id: AgentId) -> SquadResult<()> {
        let removed = self.write().remove(&agent_id);
        let Some(mut instance) = removed else {
            debug!(agent_id = %agent_id, "Kill for unknown sandbox ignored");
            return Ok(());
        };

        if let Err(e) = instance.session.kill().await {
            warn!(
                agent_id = %agent_id,
                sandbox_id = %instance.sandbox_id,
                error = %e,
                "Ignoring provider error during kill"
            );
        }

        instance.status = SandboxState::Killed;
        if let Err(e) = self
            .persist(&instance, TrackingStatus::Killed, Some("killed_at"))
            .await
        {
            warn!(
                agent_id = %agent_id,
                sandbox_id = %instance.sandbox_id,
                error = %e,
                "Failed to tombstone sandbox tracking record"
            );
        }

        info!(agent_id = %agent_id, sandbox_id = %instance.sandbox_id, "Sandbox killed");
        self.events.publish(SquadEvent::sandbox(
            instance.sandbox_id,
            agent_id,
            SandboxEventKind::Killed,
        ));
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, agent_id: AgentId) -> Option<SandboxInstance> {
        self.read().get(&agent_id).cloned()
    }

    pub fn list(&self) -> Vec<SandboxInstance> {
        let mut instances: Vec<_> = self.read().values().cloned().collect();
        instances.sort_by_key(|i| i.created_at);
        instances
    }

    pub fn is_running(&self, agent_id: AgentId) -> bool {
        self.read()
            .get(&agent_id)
            .is_some_and(|i| i.status != SandboxState::Killed)
    }

    /// Live instance owning `sandbox_id`.
    pub fn find_by_sandbox_id(&self, sandbox_id: &str) -> Option<SandboxInstance> {
        self.read()
            .values()
            .find(|i| i.sandbox_id == sandbox_id)
            .cloned()
    }

    /// Persisted tracking record for `sandbox_id`.
    pub async fn tracking(&self, sandbox_id: &str) -> SquadResult<Option<SandboxTracking>> {
        self.tracking.get(sandbox_id).await
    }

    /// All tracking records, newest first.
    pub async fn list_tracking(&self) -> SquadResult<Vec<SandboxTracking>> {
        self.tracking
            .find_many(
                &Filter::new(),
                &FindOptions::new().sort(SortKey::desc("lifecycle.created_at")),
            )
            .await
    }

    // ========================================================================
    // RECONCILIATION
    // ========================================================================

    /// Rebuild the in-memory map from tracking records after a process
    /// restart. Sandboxes the provider no longer knows are tombstoned.
    pub async fn reconcile(&self) -> SquadResult<ReconcileReport> {
        let records = self
            .tracking
            .find_many(
                &Filter::new().is_in(
                    "status",
                    [
                        TrackingStatus::Active,
                        TrackingStatus::Paused,
                        TrackingStatus::Resuming,
                    ],
                ),
                &FindOptions::new().sort(SortKey::asc("lifecycle.created_at")),
            )
            .await?;

        let mut report = ReconcileReport::default();
        for record in records {
            if self.read().contains_key(&record.agent_id) {
                continue;
            }
            match self.provider.attach(&record.sandbox_id).await {
                Ok(session) => {
                    // An interrupted resume leaves the session hibernated.
                    let status = if record.status == TrackingStatus::Active {
                        SandboxState::Active
                    } else {
                        SandboxState::Paused
                    };
                    let instance = SandboxInstance {
                        sandbox_id: record.sandbox_id.clone(),
                        agent_id: record.agent_id,
                        session,
                        status,
                        agent_type: record.metadata.agent_type,
                        specialization: record.metadata.specialization,
                        resources: record.resources,
                        created_at: record.lifecycle.created_at,
                        last_heartbeat: Utc::now(),
                    };
                    if record.status == TrackingStatus::Resuming {
                        self.persist(&instance, TrackingStatus::Paused, None).await?;
                    }
                    self.write().insert(record.agent_id, instance);
                    report.restored += 1;
                }
                Err(e) => {
                    warn!(sandbox_id = %record.sandbox_id, error = %e, "Sandbox unreachable, tombstoning");
                    let now = Utc::now();
                    self.tracking
                        .update_by_key(
                            &record.sandbox_id,
                            &Update::new()
                                .set("status", TrackingStatus::Killed)
                                .set("lifecycle.killed_at", now),
                        )
                        .await?;
                    report.tombstoned += 1;
                }
            }
        }
        info!(
            restored = report.restored,
            tombstoned = report.tombstoned,
            "Sandbox map reconciled"
        );
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
