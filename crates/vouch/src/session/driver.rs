//! Background task that owns a [`SessionMachine`].
//!
//! Commands from the host, the sampling timer, the recording watchdog, and
//! job completions are all funnelled through one `select!` loop, so the
//! machine sees exactly one of them at a time. Snapshots are published on
//! a watch channel after every event.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use vouch_common::{SessionSnapshot, SessionStatus};

use super::machine::{InitJob, InitOutcome, ProcessJob, ProcessOutcome, SessionMachine, TickOutcome};

/// Host-initiated actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Begin,
    Cancel,
    Retry,
    Resubmit,
}

/// Reply to a [`SessionCommand`]
#[derive(Debug, Clone, Serialize)]
pub struct CommandAck {
    /// False if the command was not valid in the session's status
    pub accepted: bool,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("session driver has stopped")]
    Stopped,
}

struct Envelope {
    command: SessionCommand,
    reply: oneshot::Sender<CommandAck>,
}

/// Cloneable handle to a running driver
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<CommandAck, DriverError> {
        let (reply, ack) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| DriverError::Stopped)?;
        ack.await.map_err(|_| DriverError::Stopped)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

/// Run `machine` on its own task until shutdown or every handle is dropped
pub fn spawn_session_driver(
    machine: SessionMachine,
    shutdown: broadcast::Receiver<()>,
) -> SessionHandle {
    let (commands, rx) = mpsc::channel(16);
    let (snapshots_tx, snapshots) = watch::channel(machine.snapshot());

    tokio::spawn(run(machine, rx, snapshots_tx, shutdown));

    SessionHandle {
        commands,
        snapshots,
    }
}

enum Job {
    Init(InitJob),
    Process(ProcessJob),
}

enum Event {
    Shutdown,
    Command(Option<Envelope>),
    InitDone(InitOutcome),
    ProcessDone(ProcessOutcome),
    Watchdog,
    Ticked(TickOutcome),
}

async fn run(
    mut machine: SessionMachine,
    mut commands: mpsc::Receiver<Envelope>,
    snapshots: watch::Sender<SessionSnapshot>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = machine.sample_interval();
    let mut job: Option<Job> = None;
    let mut next_tick = Instant::now();

    tracing::debug!("Session driver started");

    loop {
        let deadline = machine.recording_deadline();
        let has_job = job.is_some();
        let sampling = !has_job && machine.is_sampling();

        let event = tokio::select! {
            biased;

            _ = shutdown.recv() => Event::Shutdown,
            envelope = commands.recv() => Event::Command(envelope),
            done = wait_job(&mut job), if has_job => done,
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Event::Watchdog,
            outcome = paced_tick(&mut machine, next_tick), if sampling => Event::Ticked(outcome),
        };

        match event {
            Event::Shutdown => {
                tracing::info!("Session driver shutting down");
                drop(job.take());
                machine.cancel();
                if let Some(discard) = machine.discard_job() {
                    discard.await;
                }
                snapshots.send_replace(machine.snapshot());
                break;
            }
            Event::Command(None) => {
                tracing::debug!("All session handles dropped");
                drop(job.take());
                machine.cancel();
                if let Some(discard) = machine.discard_job() {
                    discard.await;
                }
                break;
            }
            Event::Command(Some(envelope)) => {
                let accepted = apply_command(&mut machine, &mut job, envelope.command);
                if accepted && machine.is_sampling() {
                    next_tick = Instant::now();
                }
                let ack = CommandAck {
                    accepted,
                    snapshot: machine.snapshot(),
                };
                let _ = envelope.reply.send(ack);
            }
            Event::InitDone(outcome) => {
                job = None;
                machine.finish_init(outcome);
                next_tick = Instant::now();
            }
            Event::ProcessDone(outcome) => {
                job = None;
                machine.finish_processing(outcome);
            }
            Event::Watchdog => {
                machine.expire_watchdog();
            }
            Event::Ticked(outcome) => {
                next_tick = Instant::now() + interval;
                if outcome == TickOutcome::Failed {
                    tracing::debug!("Sampling stopped after device failure");
                }
            }
        }

        // Cleanup of abandoned evidence must not hold up the next session
        if let Some(discard) = machine.discard_job() {
            tokio::spawn(discard);
        }

        if job.is_none() && machine.status() == &SessionStatus::Processing {
            job = machine.processing_job().map(Job::Process);
        }

        snapshots.send_replace(machine.snapshot());
    }
}

fn apply_command(machine: &mut SessionMachine, job: &mut Option<Job>, command: SessionCommand) -> bool {
    tracing::debug!(command = ?command, status = machine.status().name(), "Session command");

    match command {
        SessionCommand::Start => match machine.start() {
            Some(init) => {
                *job = Some(Job::Init(init));
                true
            }
            None => false,
        },
        SessionCommand::Begin => machine.begin(),
        SessionCommand::Cancel => {
            let cancelled = machine.cancel();
            if cancelled {
                // Dropping an in-flight job releases whatever it acquired
                *job = None;
            }
            cancelled
        }
        SessionCommand::Retry => match machine.retry() {
            Some(init) => {
                *job = Some(Job::Init(init));
                true
            }
            None => false,
        },
        SessionCommand::Resubmit => machine.resubmit(),
    }
}

async fn wait_job(job: &mut Option<Job>) -> Event {
    match job {
        Some(Job::Init(init)) => Event::InitDone(init.await),
        Some(Job::Process(process)) => Event::ProcessDone(process.await),
        None => std::future::pending().await,
    }
}

async fn paced_tick(machine: &mut SessionMachine, at: Instant) -> TickOutcome {
    sleep_until(at).await;
    machine.tick().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::evidence::MemoryEvidenceStore;
    use crate::session::Collaborators;
    use crate::testing::{ScriptedCamera, ScriptedDetector, ScriptedSubmitter, eyes, neutral, smiling};
    use std::sync::Arc;
    use std::time::Duration;
    use vouch_common::Gesture;

    struct Harness {
        handle: SessionHandle,
        camera: ScriptedCamera,
        detector: Arc<ScriptedDetector>,
        store: Arc<MemoryEvidenceStore>,
        shutdown: broadcast::Sender<()>,
    }

    fn harness() -> Harness {
        harness_with(ScriptedSubmitter::new())
    }

    fn harness_with(submitter: ScriptedSubmitter) -> Harness {
        let mut config = AppConfig::default();
        config.session.sample_interval_ms = 1;
        config.session.init_backoff_ms = 5;
        config.store.delete_after_ack = false;
        config.challenges.sequence = Some(vec![Gesture::Blink { repeat_count: 2 }, Gesture::Smile]);

        let camera = ScriptedCamera::new();
        let detector = Arc::new(ScriptedDetector::new());
        let store = Arc::new(MemoryEvidenceStore::new());
        let machine = SessionMachine::new(
            &config,
            Collaborators {
                camera: Arc::new(camera.clone()),
                detector: detector.clone(),
                store: store.clone(),
                submitter: Arc::new(submitter),
            },
        );
        let (shutdown, rx) = broadcast::channel(1);
        Harness {
            handle: spawn_session_driver(machine, rx),
            camera,
            detector,
            store,
            shutdown,
        }
    }

    async fn wait_for(handle: &SessionHandle, predicate: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let mut rx = handle.subscribe();
        let wait = async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if predicate(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.expect("snapshot never matched")
    }

    #[tokio::test]
    async fn test_full_session_through_driver() {
        let h = harness();
        h.detector.push(neutral());

        let ack = h.handle.send(SessionCommand::Start).await.unwrap();
        assert!(ack.accepted);
        wait_for(&h.handle, |s| s.status == SessionStatus::Detecting && s.face_present).await;

        assert!(h.handle.send(SessionCommand::Begin).await.unwrap().accepted);
        h.detector
            .push_all([eyes(0.1), eyes(0.3), eyes(0.1), eyes(0.3), smiling(0.11)]);

        let done = wait_for(&h.handle, |s| s.status.is_terminal()).await;
        assert_eq!(done.status, SessionStatus::Success);
        assert!(done.challenges.iter().all(|c| c.state.completed));
        assert_eq!(h.store.writes(), 1);
        assert!(!h.camera.is_open());
    }

    #[tokio::test]
    async fn test_commands_out_of_order_are_refused() {
        let h = harness();

        let ack = h.handle.send(SessionCommand::Begin).await.unwrap();
        assert!(!ack.accepted);
        assert_eq!(ack.snapshot.status, SessionStatus::Intro);

        assert!(!h.handle.send(SessionCommand::Resubmit).await.unwrap().accepted);
        assert!(!h.handle.send(SessionCommand::Retry).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_cancel_while_detecting_releases_camera() {
        let h = harness();
        h.detector.push(neutral());
        h.handle.send(SessionCommand::Start).await.unwrap();
        let detecting = wait_for(&h.handle, |s| s.status == SessionStatus::Detecting).await;

        let ack = h.handle.send(SessionCommand::Cancel).await.unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.snapshot.status, SessionStatus::Intro);
        assert_ne!(ack.snapshot.session_id, detecting.session_id);
        assert!(!h.camera.is_open());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_session() {
        let h = harness();
        h.detector.push(neutral());
        h.handle.send(SessionCommand::Start).await.unwrap();
        wait_for(&h.handle, |s| s.status == SessionStatus::Detecting).await;

        h.shutdown.send(()).unwrap();
        wait_for(&h.handle, |s| s.status == SessionStatus::Intro).await;
        assert!(!h.camera.is_open());
    }

    #[tokio::test]
    async fn test_cancel_while_processing_discards_evidence() {
        let h = harness_with(ScriptedSubmitter::slow(Duration::from_secs(5)));
        h.detector.push(neutral());
        h.handle.send(SessionCommand::Start).await.unwrap();
        wait_for(&h.handle, |s| s.status == SessionStatus::Detecting && s.face_present).await;

        assert!(h.handle.send(SessionCommand::Begin).await.unwrap().accepted);
        h.detector
            .push_all([eyes(0.1), eyes(0.3), eyes(0.1), eyes(0.3), smiling(0.11)]);
        wait_for(&h.handle, |s| s.status == SessionStatus::Processing).await;

        // Wait for the artifact to land before cancelling
        let stored = async {
            while h.store.writes() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), stored).await.expect("artifact stored");

        let ack = h.handle.send(SessionCommand::Cancel).await.unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.snapshot.status, SessionStatus::Intro);

        let discarded = async {
            while !h.store.is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), discarded).await.expect("artifact discarded");
        assert_eq!(h.store.writes(), 1);
    }
}
