//! Per-user history of sanitized analysis snapshots.

use crate::{
    clock::Clock,
    content::page_size,
    error::{Error, ErrorKind},
    models::{self, AnalysisSnapshot, ANALYSIS_RESULTS, USERS},
    platform::{ensure_available, Direction, DocPath, DocumentStore, Query},
    sanitize::sanitize_analysis,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct AnalysisFacade<D> {
    store: Arc<D>,
    clock: Arc<dyn Clock>,
}

impl<D: DocumentStore> AnalysisFacade<D> {
    pub fn new(store: Arc<D>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn collection(uid: &str) -> Result<String, Error> {
        if uid.is_empty() {
            return Err(Error::Precondition(ErrorKind::NotAuthenticated));
        }
        Ok(DocPath::new(USERS, uid).child(ANALYSIS_RESULTS))
    }

    /// Sanitize `raw` and store it under `uid`; returns the new id. The user's
    /// `analysisCount` is bumped best-effort.
    ///
    /// # Errors
    /// `PayloadTooLarge` when the snapshot cannot be bounded, or the
    /// translated platform error.
    #[instrument(skip(self, raw))]
    pub async fn save_analysis_result(&self, uid: &str, raw: &Value) -> Result<String, Error> {
        ensure_available(self.store.is_available())?;
        let collection = Self::collection(uid)?;
        let snapshot = sanitize_analysis(raw, self.clock.now())?;
        if snapshot.truncated {
            debug!(
                "analysis snapshot truncated: {} of {} findings kept",
                snapshot.findings.len(),
                snapshot.original_finding_count
            );
        }
        let id = self
            .store
            .add(&collection, models::encode(&snapshot)?)
            .await?;
        if let Err(err) = self
            .store
            .increment(&DocPath::new(USERS, uid), "analysisCount", 1)
            .await
        {
            warn!("Failed to bump analysis count for {uid}: {err}");
        }
        Ok(id)
    }

    /// Snapshots of `uid`, newest first.
    ///
    /// # Errors
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn get_analysis_results(&self, uid: &str, limit: usize) -> Result<Vec<AnalysisSnapshot>, Error> {
        ensure_available(self.store.is_available())?;
        let query = Query::new(Self::collection(uid)?)
            .order_by("createdAt", Direction::Descending)
            .limit(page_size(limit));
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(models::decode)
            .collect()
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn get_analysis_result(&self, uid: &str, id: &str) -> Result<AnalysisSnapshot, Error> {
        ensure_available(self.store.is_available())?;
        let document = self
            .store
            .get(&DocPath::new(Self::collection(uid)?, id))
            .await?
            .ok_or(Error::Precondition(ErrorKind::NotFound))?;
        models::decode(document)
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete_analysis_result(&self, uid: &str, id: &str) -> Result<(), Error> {
        ensure_available(self.store.is_available())?;
        let path = DocPath::new(Self::collection(uid)?, id);
        if self.store.get(&path).await?.is_none() {
            return Err(Error::Precondition(ErrorKind::NotFound));
        }
        self.store.delete(&path).await?;
        Ok(())
    }
}
