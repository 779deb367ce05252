//! Single read surface over the live run and the demo replay.
//!
//! Exactly one producer is active at a time. The active producer is held in
//! one lock, and [`RunStateMerger::view`] reads only that producer's state
//! while holding it, so no view ever combines fields from both.

use std::sync::{Mutex, MutexGuard};

use caseflow_core::run::RunView;

use crate::demo::DemoReplay;
use crate::live::{LiveRun, RunError};
use crate::transport::RunTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveProducer {
    #[default]
    Live,
    Demo,
}

pub struct RunStateMerger<T> {
    live: LiveRun<T>,
    demo: DemoReplay,
    active: Mutex<ActiveProducer>,
}

impl<T: RunTransport> RunStateMerger<T> {
    pub fn new(live: LiveRun<T>, demo: DemoReplay) -> Self {
        Self {
            live,
            demo,
            active: Mutex::new(ActiveProducer::Live),
        }
    }

    fn active(&self) -> MutexGuard<'_, ActiveProducer> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> RunView {
        let active = self.active();
        match *active {
            ActiveProducer::Live => RunView::project(&self.live.state(), false),
            ActiveProducer::Demo => RunView::project(&self.demo.state(), true),
        }
    }

    pub fn is_demo_mode(&self) -> bool {
        *self.active() == ActiveProducer::Demo
    }

    /// Archive write failure reported by the active producer, if any.
    pub fn archive_error(&self) -> Option<String> {
        match *self.active() {
            ActiveProducer::Live => self.live.archive_error(),
            ActiveProducer::Demo => self.demo.archive_error(),
        }
    }

    /// Clear both producers, then return to live mode.
    pub fn reset(&self) {
        let mut active = self.active();
        self.live.reset();
        self.demo.reset();
        *active = ActiveProducer::Live;
    }

    /// Start timed demo playback. Must be called from within a Tokio runtime.
    pub fn start_demo(&self) -> String {
        let mut active = self.active();
        self.live.reset();
        self.demo.reset();
        *active = ActiveProducer::Demo;
        self.demo.start_demo()
    }

    pub fn load_demo_instant(&self) -> String {
        let mut active = self.active();
        self.live.reset();
        self.demo.reset();
        *active = ActiveProducer::Demo;
        self.demo.load_demo_instant()
    }

    /// Start a live run. Always handled by the live driver, whichever
    /// producer the view currently shows.
    pub async fn analyze(&self, query: &str) -> Result<String, RunError> {
        self.live.analyze(query).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use caseflow_core::cases::RunStatus;
    use caseflow_core::demo::DemoScript;

    use super::*;
    use crate::archive::CaseArchive;
    use crate::live::tests::FakeBackend;
    use crate::store::MemoryStore;

    fn merger(backend: FakeBackend) -> RunStateMerger<FakeBackend> {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        RunStateMerger::new(
            LiveRun::new(Arc::new(backend), archive.clone()),
            DemoReplay::new(archive, DemoScript::standard()),
        )
    }

    #[test]
    fn starts_idle_in_live_mode() {
        let merger = merger(FakeBackend::default());
        let view = merger.view();
        assert_eq!(view.status, RunStatus::Idle);
        assert!(!view.is_demo_mode);
        assert!(!merger.is_demo_mode());
    }

    #[test]
    fn instant_demo_switches_view_to_demo() {
        let merger = merger(FakeBackend::default());
        let case_id = merger.load_demo_instant();

        let view = merger.view();
        assert!(view.is_demo_mode);
        assert!(view.is_complete);
        assert_eq!(view.case_id.as_deref(), Some(case_id.as_str()));
        assert_eq!(view.steps.len(), 4);
        assert_eq!(view.documents.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_demo_clears_and_stays_clear() {
        let merger = merger(FakeBackend::default());
        merger.start_demo();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(merger.view().is_running);

        merger.reset();
        let cleared = merger.view();
        assert!(!cleared.is_demo_mode);
        assert_eq!(cleared.status, RunStatus::Idle);
        assert!(cleared.activities.is_empty());

        // Frames that were scheduled before the reset never show up.
        tokio::time::sleep(DemoScript::standard().total_duration()).await;
        let later = merger.view();
        assert_eq!(later, cleared);
        assert!(!merger.is_demo_mode());
    }

    #[tokio::test]
    async fn live_failure_is_not_mixed_into_demo_view() {
        let merger = merger(FakeBackend {
            fail: true,
            gate: None,
        });
        assert!(merger.analyze("open a café").await.is_err());
        assert!(merger.view().has_error);

        merger.load_demo_instant();
        let view = merger.view();
        assert!(view.is_demo_mode);
        assert!(!view.has_error);
        assert!(view.is_complete);

        merger.reset();
        let view = merger.view();
        assert!(!view.has_error);
        assert!(!view.is_complete);
    }

    #[tokio::test]
    async fn analyze_is_delegated_to_live_even_in_demo_mode() {
        let merger = merger(FakeBackend::default());
        merger.load_demo_instant();

        let case_id = merger.analyze("open a bakery").await.expect("live run succeeds");
        assert_eq!(case_id, "live-1");
        // The view keeps showing the demo until the caller resets.
        assert!(merger.is_demo_mode());
        assert_eq!(merger.view().query.as_deref(), Some(DemoScript::standard().query.as_str()));

        merger.reset();
        assert_eq!(merger.view().status, RunStatus::Idle);
    }
}
