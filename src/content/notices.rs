use super::{page_size, required_text, ContentFacade, CONTENT_MAX_CHARS, TITLE_MAX_CHARS};
use crate::{
    error::Error,
    models::{self, format_timestamp, NewNotice, Notice, NoticeUpdate, Role, NOTICES},
    platform::{Direction, DocPath, DocumentStore, Query},
    users::require_role,
};
use serde_json::Value;
use tracing::{info, instrument};

impl<D: DocumentStore> ContentFacade<D> {
    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin, `InvalidArgument` for blank fields.
    #[instrument(skip(self, notice))]
    pub async fn create_notice(&self, actor: &str, notice: NewNotice) -> Result<Notice, Error> {
        self.ensure_ready()?;
        let author = require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let now = self.clock.now();
        let mut created = Notice {
            id: String::new(),
            title: required_text(&notice.title, TITLE_MAX_CHARS)?,
            content: required_text(&notice.content, CONTENT_MAX_CHARS)?,
            category: required_text(&notice.category, TITLE_MAX_CHARS)?,
            priority: notice.priority,
            is_pinned: notice.is_pinned,
            expires_at: notice.expires_at,
            author_id: author.uid,
            author_name: author.display_name,
            created_at: now,
            updated_at: now,
            views: 0,
            is_published: notice.is_published,
        };
        created.id = self.store.add(NOTICES, models::encode(&created)?).await?;
        info!("notice {} created by {}", created.id, actor);
        Ok(created)
    }

    /// Published, unexpired notices: pinned first, then newest first.
    ///
    /// Ordering and filtering run in the query; only expiry is checked here,
    /// so a page may hold fewer than `limit` notices.
    ///
    /// # Errors
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn get_notices(&self, limit: usize, category: Option<&str>) -> Result<Vec<Notice>, Error> {
        self.ensure_ready()?;
        let mut query = Query::new(NOTICES).where_eq("isPublished", true);
        if let Some(category) = category.filter(|category| !category.is_empty()) {
            query = query.where_eq("category", category);
        }
        let query = query
            .order_by("isPinned", Direction::Descending)
            .order_by("createdAt", Direction::Descending)
            .limit(page_size(limit));
        let now = self.clock.now();
        let notices = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .map(models::decode::<Notice>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notices
            .into_iter()
            .filter(|notice| !notice.is_expired(now))
            .collect())
    }

    /// Read a notice and count the view.
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn get_notice(&self, id: &str) -> Result<Notice, Error> {
        self.ensure_ready()?;
        let path = DocPath::new(NOTICES, id);
        let mut notice: Notice = self.fetch(&path).await?;
        if self.bump(&path, "views", 1).await {
            notice.views += 1;
        }
        Ok(notice)
    }

    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin, `NotFound` for an unknown id.
    #[instrument(skip(self, update))]
    pub async fn update_notice(&self, actor: &str, id: &str, update: NoticeUpdate) -> Result<Notice, Error> {
        self.ensure_ready()?;
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let path = DocPath::new(NOTICES, id);
        let _: Notice = self.fetch(&path).await?;

        let update = NoticeUpdate {
            title: update
                .title
                .map(|title| required_text(&title, TITLE_MAX_CHARS))
                .transpose()?,
            content: update
                .content
                .map(|content| required_text(&content, CONTENT_MAX_CHARS))
                .transpose()?,
            category: update
                .category
                .map(|category| required_text(&category, TITLE_MAX_CHARS))
                .transpose()?,
            ..update
        };
        let mut fields = update.to_fields()?;
        fields.insert(
            "updatedAt".to_string(),
            Value::from(format_timestamp(&self.clock.now())),
        );
        self.store.update(&path, fields).await?;
        self.fetch(&path).await
    }

    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin, `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete_notice(&self, actor: &str, id: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let path = DocPath::new(NOTICES, id);
        let _: Notice = self.fetch(&path).await?;
        self.store.delete(&path).await?;
        info!("notice {} deleted by {}", id, actor);
        Ok(())
    }
}
