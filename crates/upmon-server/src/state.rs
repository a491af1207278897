use std::sync::Arc;

use chrono::{DateTime, Utc};
use upmon_engine::stats::DurationStatsEngine;
use upmon_storage::UnitRepository;

use crate::dispatch::EventDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn UnitRepository>,
    pub stats: Arc<DurationStatsEngine>,
    pub dispatcher: Arc<EventDispatcher>,
    pub start_time: DateTime<Utc>,
}
