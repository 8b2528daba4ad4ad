//! Shared state handed to the HTTP handlers.

use std::sync::Arc;

use page_driver::PageDriver;

use crate::config::ChatDefaults;
use crate::generation::GenerationTracker;
use crate::orchestrator::OrchestratorSettings;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<GenerationTracker>,
    pub driver: Arc<dyn PageDriver>,
    pub defaults: ChatDefaults,
    pub orchestrator: OrchestratorSettings,
}

impl AppState {
    pub fn new(
        tracker: Arc<GenerationTracker>,
        driver: Arc<dyn PageDriver>,
        defaults: ChatDefaults,
        orchestrator: OrchestratorSettings,
    ) -> Self {
        Self {
            tracker,
            driver,
            defaults,
            orchestrator,
        }
    }
}
