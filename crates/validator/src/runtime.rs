// Path: crates/validator/src/runtime.rs

//! The per-validator runtime loop.
//!
//! Single-threaded cooperative scheduling: one transition is processed to
//! completion (machine apply, atomic diff+cursor commit, action enqueue)
//! before the next is popped. The submitter is pumped on every block tick.
//! The watcher runs as a background task feeding a bounded FIFO.

use anyhow::{anyhow, Result};
use sigil_api::chain::{ActionEncoder, ChainRpc, LogCodec};
use sigil_api::storage::{StateStore, ValidatorStorage};
use sigil_machine::Machine;
use sigil_submitter::Submitter;
use sigil_types::config::ValidatorConfig;
use sigil_types::error::ErrorCode;
use sigil_types::event::Transition;
use sigil_watcher::Watcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Depth of the watcher → machine FIFO.
const TRANSITION_QUEUE_DEPTH: usize = 1024;

/// The assembled validator daemon.
pub struct Validator<S, R, C, E> {
    config: ValidatorConfig,
    storage: Arc<S>,
    machine: Arc<Machine<S>>,
    watcher: Arc<Watcher<R, C>>,
    submitter: Arc<Submitter<S, R, E>>,
    shutdown: Arc<watch::Sender<bool>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl<S, R, C, E> Validator<S, R, C, E>
where
    S: ValidatorStorage + 'static,
    R: ChainRpc + 'static,
    C: LogCodec + 'static,
    E: ActionEncoder + 'static,
{
    /// Wires the validator from its parts.
    pub fn new(
        config: ValidatorConfig,
        storage: Arc<S>,
        rpc: Arc<R>,
        codec: Arc<C>,
        encoder: Arc<E>,
    ) -> Self {
        let machine = Arc::new(Machine::new(config.clone(), storage.clone()));
        let watcher = Arc::new(Watcher::new(config.watcher.clone(), rpc.clone(), codec));
        let submitter = Arc::new(Submitter::new(
            config.submitter.clone(),
            storage.clone(),
            rpc,
            encoder,
        ));
        let (shutdown, _) = watch::channel(false);
        Validator {
            config,
            storage,
            machine,
            watcher,
            submitter,
            shutdown: Arc::new(shutdown),
            task_handles: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts the watcher and the main loop as background tasks.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("validator already running"));
        }
        info!(target: "validator", chain_id = self.config.chain_id, "validator starting");

        let (transition_tx, transition_rx) =
            mpsc::channel::<Transition>(TRANSITION_QUEUE_DEPTH);

        let last_indexed = self
            .storage
            .last_indexed_block(self.config.chain_id)
            .await
            .map_err(|e| anyhow!("reading cursor: {e}"))?;

        let watcher = self.watcher.clone();
        let watcher_shutdown = self.shutdown.subscribe();
        let watcher_handle = tokio::spawn(async move {
            if let Err(failure) =
                watcher.run(last_indexed, transition_tx, watcher_shutdown).await
            {
                sigil_telemetry::error_metrics().inc_error("watcher", failure.code());
                error!(target: "watcher", %failure, "watcher stopped");
            }
        });

        let loop_handle = tokio::spawn(Self::run_main_loop(
            self.config.clone(),
            self.storage.clone(),
            self.machine.clone(),
            self.submitter.clone(),
            transition_rx,
            self.shutdown.subscribe(),
        ));

        let mut handles = self.task_handles.lock().await;
        handles.push(watcher_handle);
        handles.push(loop_handle);
        Ok(())
    }

    /// Signals shutdown and joins the background tasks. The in-flight
    /// transition and the in-flight send complete first.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!(target: "validator", "validator stopping");
        self.shutdown.send(true).ok();

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle.await.map_err(|e| anyhow!("task panicked: {e}"))?;
        }
        Ok(())
    }

    async fn run_main_loop(
        config: ValidatorConfig,
        storage: Arc<S>,
        machine: Arc<Machine<S>>,
        submitter: Arc<Submitter<S, R, E>>,
        mut transitions: mpsc::Receiver<Transition>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let transition = tokio::select! {
                biased;
                received = transitions.recv() => match received {
                    Some(transition) => transition,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if let Err(failure) =
                Self::process_transition(&config, &storage, &machine, &submitter, &transition)
                    .await
            {
                sigil_telemetry::error_metrics().inc_error("machine", "TRANSITION_FAILED");
                error!(target: "validator", %failure, "fatal: transition processing failed");
                break;
            }
        }
        info!(target: "validator", "main loop stopped");
    }

    /// One full turn of the loop: apply, commit atomically, enqueue, pump.
    ///
    /// The cursor commit precedes the enqueue: a crash in between can only
    /// drop actions (the protocol timeouts re-issue them), never enqueue
    /// them twice. A transactional backend folds the outbox rows into the
    /// same write and closes even that window.
    async fn process_transition(
        config: &ValidatorConfig,
        storage: &Arc<S>,
        machine: &Arc<Machine<S>>,
        submitter: &Arc<Submitter<S, R, E>>,
        transition: &Transition,
    ) -> Result<()> {
        let applied = machine.apply(transition).await?;
        sigil_telemetry::machine_metrics().inc_transitions_applied();

        storage
            .commit_transition(config.chain_id, transition.block(), applied.diff)
            .await
            .map_err(|e| anyhow!("committing transition: {e}"))?;
        sigil_telemetry::watcher_metrics().set_last_indexed_block(transition.block());

        let had_actions = !applied.actions.is_empty();
        for action in applied.actions {
            sigil_telemetry::machine_metrics().inc_actions_emitted(action.name());
            submitter.enqueue(action).await?;
        }

        // The submitter runs on every block tick and after fresh enqueues.
        if had_actions || matches!(transition, Transition::BlockTick { .. }) {
            submitter.pump(transition.block()).await?;
        }
        Ok(())
    }
}
