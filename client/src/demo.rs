//! Deterministic replay of the scripted demo run.
//!
//! Timed playback runs on a spawned task that sleeps between frames. Every
//! frame is applied under the playback lock after checking the generation
//! counter; [`DemoReplay::reset`] bumps the counter under the same lock, so a
//! frame scheduled before a reset can never land after it.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::task::JoinHandle;

use caseflow_core::cases::{CaseRecord, RunStatus};
use caseflow_core::demo::{DemoAction, DemoScript};
use caseflow_core::run::RunState;

use crate::archive::{ArchiveError, CaseArchive};

/// Accepted playback pace multipliers. Values outside are clamped.
pub const SPEED_RANGE: RangeInclusive<f64> = 0.01..=100.0;

#[derive(Debug, Default)]
struct Playback {
    state: RunState,
    generation: u64,
    archive_error: Option<String>,
}

pub struct DemoReplay {
    script: Arc<DemoScript>,
    archive: Arc<CaseArchive>,
    speed: f64,
    playback: Arc<Mutex<Playback>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock_playback(playback: &Mutex<Playback>) -> MutexGuard<'_, Playback> {
    playback.lock().unwrap_or_else(|e| e.into_inner())
}

impl DemoReplay {
    pub fn new(archive: Arc<CaseArchive>, script: DemoScript) -> Self {
        Self {
            script: Arc::new(script),
            archive,
            speed: 1.0,
            playback: Arc::new(Mutex::new(Playback::default())),
            task: Mutex::new(None),
        }
    }

    /// Multiplier on playback pace; 2.0 plays twice as fast. Clamped to
    /// [`SPEED_RANGE`]; non-finite values keep the scripted pace.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() {
            speed.clamp(*SPEED_RANGE.start(), *SPEED_RANGE.end())
        } else {
            1.0
        };
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn case_id(&self) -> &str {
        &self.script.case_id
    }

    pub fn state(&self) -> RunState {
        lock_playback(&self.playback).state.clone()
    }

    /// Last archive write failure during playback, if any.
    pub fn archive_error(&self) -> Option<String> {
        lock_playback(&self.playback).archive_error.clone()
    }

    /// Stop playback and clear all demo state. A replay cut short is
    /// archived as failed so its record does not stay running.
    pub fn reset(&self) {
        {
            let mut playback = lock_playback(&self.playback);
            playback.generation += 1;
            let interrupted = playback.state.status == RunStatus::Running;
            if let Some(case_id) = playback.state.case_id.take().filter(|_| interrupted) {
                match self.archive.update_status(&case_id, RunStatus::Failed) {
                    Ok(_) => tracing::info!(case_id = %case_id, "Demo playback interrupted"),
                    Err(e) => tracing::warn!(
                        case_id = %case_id,
                        error = %e,
                        "Interrupted demo not marked failed"
                    ),
                }
            }
            playback.state = RunState::default();
            playback.archive_error = None;
        }
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }

    /// Reset, then enter the running state and archive the demo case record.
    fn begin(&self) -> u64 {
        self.reset();

        let mut playback = lock_playback(&self.playback);
        let mut state = RunState::started(&self.script.query, Some(self.script.case_id.clone()));
        state.agents = self.script.agents.clone();
        playback.state = state;

        let record = CaseRecord {
            id: self.script.case_id.clone(),
            created_at: Utc::now(),
            query: self.script.query.clone(),
            status: RunStatus::Running,
        };
        let written = self
            .archive
            .upsert_record(&record)
            .and_then(|()| self.archive.save_events(&record.id, &[]));
        if let Err(e) = written {
            note_archive_error(&mut playback, &record.id, e);
        }
        playback.generation
    }

    /// Start timed playback on a background task and return the demo case id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_demo(&self) -> String {
        let generation = self.begin();
        let script = self.script.clone();
        let archive = self.archive.clone();
        let playback = self.playback.clone();
        let speed = self.speed;

        let task = tokio::spawn(async move {
            for frame in &script.frames {
                tokio::time::sleep(frame.delay.div_f64(speed)).await;
                if !apply_frame(&playback, &archive, &script.case_id, generation, &frame.action) {
                    tracing::debug!(case_id = %script.case_id, "Demo playback superseded");
                    return;
                }
            }
            tracing::info!(case_id = %script.case_id, "Demo playback finished");
        });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        tracing::info!(case_id = %self.script.case_id, speed, "Demo playback started");
        self.script.case_id.clone()
    }

    /// Apply every frame immediately and return the demo case id.
    pub fn load_demo_instant(&self) -> String {
        let generation = self.begin();
        for frame in &self.script.frames {
            if !apply_frame(
                &self.playback,
                &self.archive,
                &self.script.case_id,
                generation,
                &frame.action,
            ) {
                break;
            }
        }
        self.script.case_id.clone()
    }
}

impl Drop for DemoReplay {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

fn note_archive_error(playback: &mut Playback, case_id: &str, error: ArchiveError) {
    tracing::warn!(case_id, error = %error, "Demo archive write failed");
    playback.archive_error = Some(error.to_string());
}

/// Apply one frame if `generation` is still current. Returns `false` when the
/// playback has been superseded by a reset.
fn apply_frame(
    playback: &Mutex<Playback>,
    archive: &CaseArchive,
    case_id: &str,
    generation: u64,
    action: &DemoAction,
) -> bool {
    let mut playback = lock_playback(playback);
    if playback.generation != generation {
        return false;
    }

    let state = &mut playback.state;
    let written = match action {
        DemoAction::AgentStatus { agent, status } => {
            state.set_agent_status(agent, *status);
            Ok(())
        }
        DemoAction::Activity(event) => {
            state.activities.push(event.clone());
            archive.append_event(case_id, event)
        }
        DemoAction::Debate(message) => {
            state.debate.push(message.clone());
            Ok(())
        }
        DemoAction::Typing(agent) => {
            state.typing = agent.clone();
            Ok(())
        }
        DemoAction::Complete(result) => {
            state.result = Some(result.clone());
            state.status = RunStatus::Completed;
            state.typing = None;
            archive
                .save_result(case_id, result)
                .and_then(|()| archive.update_status(case_id, RunStatus::Completed))
                .map(|_| ())
        }
    };

    if let Err(e) = written {
        note_archive_error(&mut playback, case_id, e);
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use caseflow_core::run::AgentStatus;

    use super::*;
    use crate::store::MemoryStore;

    fn replay() -> (Arc<CaseArchive>, DemoReplay) {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let replay = DemoReplay::new(archive.clone(), DemoScript::standard());
        (archive, replay)
    }

    #[test]
    fn instant_load_completes_and_archives() {
        let (archive, demo) = replay();
        let script = DemoScript::standard();

        let case_id = demo.load_demo_instant();
        assert_eq!(case_id, script.case_id);

        let state = demo.state();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.activities, script.events());
        assert_eq!(state.result.as_ref(), script.final_result());
        assert!(state.typing.is_none());
        assert!(state.agents.iter().all(|a| a.status == AgentStatus::Done));

        assert_eq!(archive.get_events(&case_id).expect("read"), script.events());
        assert_eq!(archive.get_result(&case_id).expect("read").as_ref(), script.final_result());
        assert_eq!(
            archive.get_record(&case_id).expect("read").map(|r| r.status),
            Some(RunStatus::Completed)
        );
        assert!(demo.archive_error().is_none());
    }

    #[test]
    fn repeated_loads_do_not_duplicate_events() {
        let (archive, demo) = replay();
        let case_id = demo.load_demo_instant();
        demo.load_demo_instant();
        assert_eq!(
            archive.get_events(&case_id).expect("read").len(),
            DemoScript::standard().events().len()
        );
        assert_eq!(archive.list().expect("list").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_playback_matches_instant_load() {
        let (timed_archive, timed) = replay();
        let (instant_archive, instant) = replay();
        let total = DemoScript::standard().total_duration();

        let case_id = timed.start_demo();
        assert_eq!(timed.state().status, RunStatus::Running);
        assert!(timed.state().result.is_none());

        tokio::time::sleep(total / 2).await;
        let midway = timed.state();
        assert_eq!(midway.status, RunStatus::Running);
        assert!(!midway.activities.is_empty());

        tokio::time::sleep(total / 2 + Duration::from_millis(50)).await;
        instant.load_demo_instant();

        assert_eq!(timed.state(), instant.state());
        assert_eq!(
            timed_archive.get_events(&case_id).expect("read"),
            instant_archive.get_events(&case_id).expect("read")
        );
        assert_eq!(
            timed_archive.get_result(&case_id).expect("read"),
            instant_archive.get_result(&case_id).expect("read")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_playback_discards_later_frames() {
        let (archive, demo) = replay();
        let total = DemoScript::standard().total_duration();

        let case_id = demo.start_demo();
        tokio::time::sleep(total / 3).await;
        demo.reset();
        assert_eq!(demo.state(), RunState::default());
        let events_at_reset = archive.get_events(&case_id).expect("read").len();

        tokio::time::sleep(total).await;
        assert_eq!(demo.state(), RunState::default());
        assert_eq!(archive.get_events(&case_id).expect("read").len(), events_at_reset);
        assert!(archive.get_result(&case_id).expect("read").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_playback_marks_archived_record_failed() {
        let (archive, demo) = replay();
        let total = DemoScript::standard().total_duration();

        let case_id = demo.start_demo();
        tokio::time::sleep(total / 3).await;
        demo.reset();
        tokio::time::sleep(total).await;

        assert_eq!(
            archive.get_record(&case_id).expect("read").map(|r| r.status),
            Some(RunStatus::Failed)
        );
        let analytics = archive.analytics().expect("analytics");
        assert_eq!(analytics.by_status.get(&RunStatus::Running), None);
        assert_eq!(analytics.by_status.get(&RunStatus::Failed), Some(&1));
    }

    #[test]
    fn reset_after_completion_keeps_record_completed() {
        let (archive, demo) = replay();
        let case_id = demo.load_demo_instant();
        demo.reset();
        assert_eq!(
            archive.get_record(&case_id).expect("read").map(|r| r.status),
            Some(RunStatus::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn speed_multiplier_shortens_playback() {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let demo = DemoReplay::new(archive, DemoScript::standard()).with_speed(4.0);
        let total = DemoScript::standard().total_duration();

        demo.start_demo();
        tokio::time::sleep(total / 4 + Duration::from_millis(50)).await;
        assert_eq!(demo.state().status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_speeds_are_clamped_and_playback_still_finishes() {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let slow = DemoReplay::new(archive.clone(), DemoScript::standard()).with_speed(1e-300);
        assert_eq!(slow.speed(), *SPEED_RANGE.start());
        let fast = DemoReplay::new(archive, DemoScript::standard()).with_speed(1e300);
        assert_eq!(fast.speed(), *SPEED_RANGE.end());
        let unset = DemoReplay::new(replay().0, DemoScript::standard()).with_speed(f64::NAN);
        assert_eq!(unset.speed(), 1.0);

        let total = DemoScript::standard().total_duration();
        slow.start_demo();
        tokio::time::sleep(total.mul_f64(100.0) + Duration::from_millis(50)).await;
        assert_eq!(slow.state().status, RunStatus::Completed);
    }

    #[test]
    fn archive_failure_is_recorded_but_playback_completes() {
        let store = Arc::new(MemoryStore::with_quota(0));
        let archive = Arc::new(CaseArchive::new(store));
        let demo = DemoReplay::new(archive, DemoScript::standard());

        demo.load_demo_instant();
        assert_eq!(demo.state().status, RunStatus::Completed);
        assert!(demo.archive_error().is_some());
    }
}
