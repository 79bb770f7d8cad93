use std::sync::Arc;

use quorum_db::Database;
use quorum_gateway::Dispatcher;
use quorum_types::models::WeightingMode;
use quorum_voting::VotingError;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub weighting: WeightingMode,
    pub legal_basis: String,
}

impl AppStateInner {
    /// Run a blocking database call off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, VotingError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ApiError(VotingError::Storage(e.into())))?
            .map_err(ApiError)
    }
}
