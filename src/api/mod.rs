// API module - HTTP endpoints

pub mod codes;
pub mod identity;

use std::sync::Arc;

use crate::config::Config;
use crate::services::code_generator::RandomSource;
use crate::store::CodeStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CodeStore>,
    pub rng: Arc<dyn RandomSource>,
    pub config: Config,
}
