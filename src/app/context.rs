use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::app::error::Result;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::FetchScheduler;
use crate::fetcher::PageFetcher;
use crate::session::Session;

/// Per-run state handed to every component instead of process globals:
/// a cooperative stop flag plus the logging switch. Cancellation is
/// checked before each new unit of work starts; work already in flight
/// finishes and its results are still delivered.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
    pub log_enabled: bool,
}

impl RunContext {
    pub fn new(log_enabled: bool) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            log_enabled,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct AppContext {
    pub config: Config,
    pub fetcher: Arc<dyn PageFetcher>,
    pub scheduler: FetchScheduler,
    pub run: RunContext,
}

impl AppContext {
    pub fn new(config: Config, session: Session, run: RunContext) -> Result<Self> {
        let workers = config.workers.max(1);
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&config, &session)?);
        let scheduler = FetchScheduler::new(workers);

        Ok(Self {
            config,
            fetcher,
            scheduler,
            run,
        })
    }

    /// Replace the fetcher, keeping the rest of the wiring. Used by tests
    /// and by callers that need a differently-seeded session.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }
}
