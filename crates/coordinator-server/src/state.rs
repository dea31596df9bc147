//! Shared handler state: a reference to the one `Coordinator` and the
//! loaded `Config`, per §4.10 ("no coordinator state of its own").

use std::sync::Arc;

use coordinator_engine::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}
