use std::sync::Arc;

use crate::directory::DirectoryStore;
use crate::knowledge::KnowledgeBase;
use crate::pipeline::{ChatResponder, GroundedResponder, RunPipeline, ScriptedPipeline};

/// Handles shared by every request. Built once in `main` and torn down with
/// the process; handlers never create their own.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<DirectoryStore>,
    pub pipeline: Arc<dyn RunPipeline>,
    pub responder: Arc<dyn ChatResponder>,
    pub knowledge: Arc<KnowledgeBase>,
}

impl AppState {
    /// State wired with the scripted pipeline and the built-in catalog.
    pub fn standalone() -> Self {
        Self {
            directory: Arc::new(DirectoryStore::new()),
            pipeline: Arc::new(ScriptedPipeline),
            responder: Arc::new(GroundedResponder),
            knowledge: Arc::new(KnowledgeBase::builtin()),
        }
    }
}
