//! The partition engine.
//!
//! Commands are read from the log one at a time. Each one is all or
//! nothing: if processing ends in a defect the state journal is rolled
//! back, the key generator is restored, nothing the command wrote is
//! committed, and a PROCESSING_ERROR rejection is appended instead.

use crate::behavior::{BpmnBehaviors, Services, SideEffects};
use crate::command::CommandRequest;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::intent::Intent;
use crate::log::{KeyGenerator, MemoryLog, RecordBatch, RecordLog, RecordWriter};
use crate::metrics::EngineMetrics;
use crate::model::ProcessRegistry;
use crate::processing::{self, scheduled};
use crate::record::{Record, RecordValue, RejectionType};
use crate::state::EngineState;
use crate::types::{Key, Position, Timestamp};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// What [`Engine::execute`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Deployed { definition_key: Key },
    Submitted { position: Position },
}

pub struct Engine<L: RecordLog = MemoryLog> {
    config: EngineConfig,
    services: Services,
    registry: ProcessRegistry,
    state: EngineState,
    keys: KeyGenerator,
    log: L,
    metrics: EngineMetrics,
    scratch: Vec<u8>,
    exporter: Option<mpsc::UnboundedSender<Record>>,
}

impl Engine<MemoryLog> {
    pub fn new(config: EngineConfig, services: Services) -> Self {
        Self::with_log(config, services, MemoryLog::new())
    }
}

impl<L: RecordLog> Engine<L> {
    pub fn with_log(config: EngineConfig, services: Services, log: L) -> Self {
        let keys = KeyGenerator::new(config.partition_id);
        Self {
            config,
            services,
            registry: ProcessRegistry::new(),
            state: EngineState::new(),
            keys,
            log,
            metrics: EngineMetrics::default(),
            scratch: Vec::new(),
            exporter: None,
        }
    }

    /// Every committed record is also sent to `exporter`.
    pub fn with_exporter(mut self, exporter: mpsc::UnboundedSender<Record>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.services.clock.current_time_millis()
    }

    // ── Input ──

    /// Deploys a process and opens its message start event subscriptions.
    pub fn deploy_yaml(&mut self, source: &str) -> anyhow::Result<Key> {
        let definition_key = self.registry.deploy_yaml(source)?;
        self.run_step(|b| b.open_start_event_subscriptions(definition_key))?;
        Ok(definition_key)
    }

    /// Appends a new command to the log. It is processed by the next call
    /// to [`Engine::step`] or [`Engine::process_pending`].
    pub fn submit(&mut self, intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Position {
        let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
        batch.append_new_command(intent.into(), value.into());
        let records = batch.into_records();
        self.commit(records)
    }

    /// Appends a command that targets the entity with `key`.
    pub fn submit_for(&mut self, key: Key, intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Position {
        let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
        batch.append_follow_up_command(key, intent.into(), value.into());
        let records = batch.into_records();
        self.commit(records)
    }

    pub fn execute(&mut self, request: CommandRequest) -> anyhow::Result<CommandOutcome> {
        match request {
            CommandRequest::Deploy(yaml) => {
                let definition_key = self.deploy_yaml(&yaml)?;
                Ok(CommandOutcome::Deployed { definition_key })
            }
            CommandRequest::Submit { key: Some(key), intent, value } => Ok(CommandOutcome::Submitted {
                position: self.submit_for(key, intent, value),
            }),
            CommandRequest::Submit { key: None, intent, value } => Ok(CommandOutcome::Submitted {
                position: self.submit(intent, value),
            }),
        }
    }

    // ── Processing ──

    /// Processes the next command of the log, if any.
    pub fn step(&mut self) -> Option<Position> {
        let command = self.log.next_command()?;
        let position = command.position;
        self.process(command);
        Some(position)
    }

    /// Processes commands until the log has none left. Returns how many
    /// were processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while self.step().is_some() {
            processed += 1;
        }
        processed
    }

    /// Processes at most `limit` commands.
    pub fn process_batch(&mut self, limit: usize) -> usize {
        let mut processed = 0;
        while processed < limit && self.step().is_some() {
            processed += 1;
        }
        processed
    }

    /// Runs the periodic sweeps once. Returns how many commands they wrote.
    pub fn run_scheduled_tasks(&mut self) -> usize {
        self.run_sweep(|b| {
            scheduled::expire_messages(b)
                + scheduled::resend_pending_correlations(b)
                + scheduled::resend_pending_subscription_commands(b)
        })
    }

    fn process(&mut self, command: Record) {
        let keys_checkpoint = self.keys.clone();
        let mut effects = SideEffects::default();
        let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
        let result = {
            let mut behaviors = BpmnBehaviors::new(
                &mut self.state,
                &mut batch,
                &self.registry,
                &self.services,
                &self.config,
                &mut effects,
                &mut self.scratch,
            );
            processing::process_command(&mut behaviors, &command)
        };
        let records = batch.into_records();

        match result {
            Ok(()) => {
                self.state.commit();
                self.commit(records);
                self.apply_effects(effects);
            }
            Err(defect) => {
                self.state.rollback();
                self.keys = keys_checkpoint;
                self.scratch.clear();
                tracing::error!(
                    position = command.position,
                    intent = ?command.intent,
                    key = ?command.key,
                    error = %defect,
                    "command processing failed, state restored"
                );
                let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
                batch.append_rejection(&command, RejectionType::ProcessingError, defect.to_string());
                let records = batch.into_records();
                self.commit(records);
            }
        }
    }

    /// Runs `step` outside of any command and commits what it wrote.
    fn run_step(&mut self, step: impl FnOnce(&mut BpmnBehaviors<'_>) -> EngineResult<()>) -> EngineResult<()> {
        let keys_checkpoint = self.keys.clone();
        let mut effects = SideEffects::default();
        let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
        let result = {
            let mut behaviors = BpmnBehaviors::new(
                &mut self.state,
                &mut batch,
                &self.registry,
                &self.services,
                &self.config,
                &mut effects,
                &mut self.scratch,
            );
            step(&mut behaviors)
        };
        let records = batch.into_records();
        match result {
            Ok(()) => {
                self.state.commit();
                self.commit(records);
                self.apply_effects(effects);
                Ok(())
            }
            Err(err) => {
                self.state.rollback();
                self.keys = keys_checkpoint;
                Err(err)
            }
        }
    }

    fn run_sweep(&mut self, sweep: impl FnOnce(&mut BpmnBehaviors<'_>) -> usize) -> usize {
        let mut effects = SideEffects::default();
        let mut batch = RecordBatch::new(&mut self.keys, self.log.last_position());
        let written = {
            let mut behaviors = BpmnBehaviors::new(
                &mut self.state,
                &mut batch,
                &self.registry,
                &self.services,
                &self.config,
                &mut effects,
                &mut self.scratch,
            );
            sweep(&mut behaviors)
        };
        let records = batch.into_records();
        self.state.commit();
        self.commit(records);
        written
    }

    fn commit(&mut self, records: Vec<Record>) -> Position {
        let first = self.log.last_position();
        let last = self.log.append(records);
        let exporter_closed = match &self.exporter {
            Some(exporter) => self
                .log
                .records()
                .iter()
                .skip(first as usize)
                .any(|record| exporter.send(record.clone()).is_err()),
            None => false,
        };
        if exporter_closed {
            tracing::debug!("record exporter closed");
            self.exporter = None;
        }
        last
    }

    fn apply_effects(&mut self, effects: SideEffects) {
        for (element_type, action) in effects.metrics {
            self.metrics.increment(element_type, action);
        }
        let job_types: BTreeSet<String> = effects.jobs_available.into_iter().collect();
        for job_type in job_types {
            self.services.notifier.notify_work_available(&job_type);
        }
    }

    // ── Run loop ──

    /// Serves requests until the channel closes. Pending commands are
    /// processed after every request, in chunks of `max_commands_per_step`
    /// so the sweeps keep running under load.
    pub async fn run(&mut self, mut requests: mpsc::Receiver<CommandRequest>) {
        let mut ttl_check = interval(Duration::from_millis(self.config.message.ttl_check_interval_ms.max(1)));
        ttl_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval(Duration::from_millis(self.config.subscription.sweep_interval_ms.max(1)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let chunk = self.config.processing.max_commands_per_step;

        tracing::info!(partition_id = self.config.partition_id, "engine started");
        loop {
            tokio::select! {
                request = requests.recv() => {
                    match request {
                        Some(request) => {
                            if let Err(err) = self.execute(request) {
                                tracing::warn!(error = %err, "request refused");
                            }
                        }
                        None => break,
                    }
                }
                _ = ttl_check.tick() => {
                    self.run_sweep(scheduled::expire_messages);
                }
                _ = sweep.tick() => {
                    self.run_sweep(|b| {
                        scheduled::resend_pending_correlations(b)
                            + scheduled::resend_pending_subscription_commands(b)
                    });
                }
            }
            while self.process_batch(chunk) == chunk {
                tokio::task::yield_now().await;
            }
        }
        self.process_pending();
        tracing::info!(records = self.log.last_position(), "engine stopped");
    }
}
