//! Posts, comments and notices.
//!
//! Every mutation re-reads what it gates on: the target document for
//! ownership checks, the actor's profile for role checks.

pub mod comments;
pub mod notices;
pub mod posts;

use crate::{
    clock::Clock,
    error::{Error, ErrorKind},
    models::{self, Record},
    platform::{ensure_available, DocPath, DocumentStore},
};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const TITLE_MAX_CHARS: usize = 200;
pub const CONTENT_MAX_CHARS: usize = 20_000;
pub const COMMENT_MAX_CHARS: usize = 2_000;
pub const MAX_TAGS: usize = 10;

pub struct ContentFacade<D> {
    store: Arc<D>,
    clock: Arc<dyn Clock>,
}

impl<D: DocumentStore> ContentFacade<D> {
    pub fn new(store: Arc<D>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        ensure_available(self.store.is_available())
    }

    async fn fetch<T: Record>(&self, path: &DocPath) -> Result<T, Error> {
        let document = self
            .store
            .get(path)
            .await?
            .ok_or(Error::Precondition(ErrorKind::NotFound))?;
        models::decode(document)
    }

    /// Counter adjustment whose failure only gets logged.
    async fn bump(&self, path: &DocPath, field: &str, delta: i64) -> bool {
        match self.store.increment(path, field, delta).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to adjust {field} on {path}: {err}");
                false
            }
        }
    }
}

/// Clamp a requested page size; `0` means the default.
pub(crate) fn page_size(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    }
}

/// Trimmed, non-empty text of at most `max_chars` characters.
pub(crate) fn required_text(text: &str, max_chars: usize) -> Result<String, Error> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > max_chars {
        return Err(Error::Precondition(ErrorKind::InvalidArgument));
    }
    Ok(text.to_string())
}

/// Trim, drop empties and duplicates, keep at most [`MAX_TAGS`].
pub(crate) fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|known| known == tag) {
            cleaned.push(tag.to_string());
        }
        if cleaned.len() == MAX_TAGS {
            break;
        }
    }
    cleaned
}
