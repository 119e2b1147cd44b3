use super::{clean_tags, page_size, required_text, ContentFacade, CONTENT_MAX_CHARS, TITLE_MAX_CHARS};
use crate::{
    error::{Error, ErrorKind},
    models::{self, format_timestamp, NewPost, Post, PostUpdate, Role, POSTS},
    platform::{Direction, DocPath, DocumentStore, Query},
    users::require_role,
};
use serde_json::Value;
use tracing::{debug, instrument};

impl<D: DocumentStore> ContentFacade<D> {
    /// Publish a post as `actor`. Author name and email come from the stored profile.
    ///
    /// # Errors
    /// `InvalidArgument` for blank fields, `PermissionDenied` without a profile.
    #[instrument(skip(self, post))]
    pub async fn create_post(&self, actor: &str, post: NewPost) -> Result<Post, Error> {
        self.ensure_ready()?;
        let title = required_text(&post.title, TITLE_MAX_CHARS)?;
        let content = required_text(&post.content, CONTENT_MAX_CHARS)?;
        let category = required_text(&post.category, TITLE_MAX_CHARS)?;
        let author = require_role(self.store.as_ref(), actor, Role::User).await?;

        let now = self.clock.now();
        let mut created = Post {
            id: String::new(),
            title,
            content,
            category,
            author_id: author.uid,
            author_name: author.display_name,
            author_email: author.email,
            created_at: now,
            updated_at: now,
            views: 0,
            likes: 0,
            comment_count: 0,
            is_published: post.is_published,
            tags: clean_tags(&post.tags),
        };
        created.id = self.store.add(POSTS, models::encode(&created)?).await?;
        debug!("created post {}", created.id);
        Ok(created)
    }

    /// Published posts, newest first, optionally restricted to `category`.
    ///
    /// # Errors
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn get_posts(&self, limit: usize, category: Option<&str>) -> Result<Vec<Post>, Error> {
        self.ensure_ready()?;
        let mut query = Query::new(POSTS).where_eq("isPublished", true);
        if let Some(category) = category.filter(|category| !category.is_empty()) {
            query = query.where_eq("category", category);
        }
        let query = query
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
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn get_posts_by_author(&self, author_id: &str, limit: usize) -> Result<Vec<Post>, Error> {
        self.ensure_ready()?;
        let query = Query::new(POSTS)
            .where_eq("authorId", author_id)
            .order_by("createdAt", Direction::Descending)
            .limit(page_size(limit));
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(models::decode)
            .collect()
    }

    /// Read a post and count the view.
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn get_post(&self, id: &str) -> Result<Post, Error> {
        self.ensure_ready()?;
        let path = DocPath::new(POSTS, id);
        let mut post: Post = self.fetch(&path).await?;
        if self.bump(&path, "views", 1).await {
            post.views += 1;
        }
        Ok(post)
    }

    /// # Errors
    /// `NotFound` for an unknown id, `PermissionDenied` unless `actor` wrote the post.
    #[instrument(skip(self, update))]
    pub async fn update_post(&self, actor: &str, id: &str, update: PostUpdate) -> Result<Post, Error> {
        self.ensure_ready()?;
        let path = DocPath::new(POSTS, id);
        let current: Post = self.fetch(&path).await?;
        if actor.is_empty() || current.author_id != actor {
            return Err(Error::Precondition(ErrorKind::PermissionDenied));
        }

        let update = PostUpdate {
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
            tags: update.tags.map(|tags| clean_tags(&tags)),
            is_published: update.is_published,
        };
        let mut fields = update.to_fields();
        fields.insert(
            "updatedAt".to_string(),
            Value::from(format_timestamp(&self.clock.now())),
        );
        self.store.update(&path, fields).await?;
        self.fetch(&path).await
    }

    /// # Errors
    /// `NotFound` for an unknown id, `PermissionDenied` unless `actor` wrote the post.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, actor: &str, id: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        let path = DocPath::new(POSTS, id);
        let current: Post = self.fetch(&path).await?;
        if actor.is_empty() || current.author_id != actor {
            return Err(Error::Precondition(ErrorKind::PermissionDenied));
        }
        self.store.delete(&path).await?;
        Ok(())
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn like_post(&self, id: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        self.store
            .increment(&DocPath::new(POSTS, id), "likes", 1)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        clock::ManualClock,
        content::ContentFacade,
        error::ErrorKind,
        models::{NewPost, PostUpdate, USERS},
        platform::{memory::MemoryStore, DocPath},
    };
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, ContentFacade<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (uid, name) in [("alice", "Alice"), ("bob", "Bob")] {
            store.insert(
                &DocPath::new(USERS, uid),
                json!({"uid": uid, "displayName": name, "email": format!("{uid}@x.com"), "role": "user"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            );
        }
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
        ));
        let content = ContentFacade::new(store.clone(), clock.clone());
        (store, clock, content)
    }

    fn new_post(title: &str, category: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "body".to_string(),
            category: category.to_string(),
            tags: vec!["rust".to_string()],
            is_published: true,
        }
    }

    #[tokio::test]
    async fn author_comes_from_profile() {
        let (_, _, content) = setup();
        let post = content.create_post("alice", new_post("Hello", "general")).await.unwrap();
        assert_eq!(post.author_name, "Alice");
        assert_eq!(post.author_email, "alice@x.com");
        assert!(!post.id.is_empty());

        let err = content
            .create_post("ghost", new_post("Hello", "general"))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_filtered() {
        let (_, clock, content) = setup();
        content.create_post("alice", new_post("first", "general")).await.unwrap();
        clock.advance(Duration::minutes(1));
        content.create_post("bob", new_post("second", "qna")).await.unwrap();
        clock.advance(Duration::minutes(1));
        let mut draft = new_post("draft", "general");
        draft.is_published = false;
        content.create_post("alice", draft).await.unwrap();

        let titles: Vec<String> = content
            .get_posts(10, None)
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);

        let general = content.get_posts(10, Some("general")).await.unwrap();
        assert_eq!(general.len(), 1);
        let by_alice = content.get_posts_by_author("alice", 10).await.unwrap();
        assert_eq!(by_alice.len(), 2);
        assert_eq!(by_alice[0].title, "draft");
    }

    #[tokio::test]
    async fn reading_counts_views() {
        let (_, _, content) = setup();
        let post = content.create_post("alice", new_post("Hello", "general")).await.unwrap();
        assert_eq!(content.get_post(&post.id).await.unwrap().views, 1);
        assert_eq!(content.get_post(&post.id).await.unwrap().views, 2);
        let err = content.get_post("missing").await.unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn owner_can_update() {
        let (_, clock, content) = setup();
        let post = content.create_post("alice", new_post("Hello", "general")).await.unwrap();
        clock.advance(Duration::minutes(5));
        let updated = content
            .update_post(
                "alice",
                &post.id,
                PostUpdate {
                    title: Some("Hello again".to_string()),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Hello again");
        assert_eq!(updated.content, "body");
        assert!(updated.updated_at > updated.created_at);
    }

    #[tokio::test]
    async fn likes_are_counted() {
        let (_, _, content) = setup();
        let post = content.create_post("alice", new_post("Hello", "general")).await.unwrap();
        content.like_post(&post.id).await.unwrap();
        content.like_post(&post.id).await.unwrap();
        assert_eq!(content.get_post(&post.id).await.unwrap().likes, 2);
        assert!(content.like_post("missing").await.unwrap_err().is(ErrorKind::NotFound));
    }
}
