use super::{page_size, required_text, ContentFacade, COMMENT_MAX_CHARS};
use crate::{
    error::{Error, ErrorKind},
    models::{self, Comment, Post, Role, COMMENTS, POSTS},
    platform::{Direction, DocPath, DocumentStore, Query},
    users::require_role,
};
use tracing::instrument;

impl<D: DocumentStore> ContentFacade<D> {
    /// Comment on a post as `actor`; the post's `commentCount` is bumped best-effort.
    ///
    /// # Errors
    /// `InvalidArgument` for blank content, `NotFound` for an unknown post,
    /// `PermissionDenied` without a profile.
    #[instrument(skip(self, content))]
    pub async fn add_comment(&self, post_id: &str, actor: &str, content: &str) -> Result<Comment, Error> {
        self.ensure_ready()?;
        let content = required_text(content, COMMENT_MAX_CHARS)?;
        let post_path = DocPath::new(POSTS, post_id);
        let _: Post = self.fetch(&post_path).await?;
        let author = require_role(self.store.as_ref(), actor, Role::User).await?;

        let mut comment = Comment {
            id: String::new(),
            content,
            author_id: author.uid,
            author_name: author.display_name,
            created_at: self.clock.now(),
        };
        comment.id = self
            .store
            .add(&post_path.child(COMMENTS), models::encode(&comment)?)
            .await?;
        self.bump(&post_path, "commentCount", 1).await;
        Ok(comment)
    }

    /// Comments of a post, oldest first.
    ///
    /// # Errors
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn get_comments(&self, post_id: &str, limit: usize) -> Result<Vec<Comment>, Error> {
        self.ensure_ready()?;
        let query = Query::new(DocPath::new(POSTS, post_id).child(COMMENTS))
            .order_by("createdAt", Direction::Ascending)
            .limit(page_size(limit));
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(models::decode)
            .collect()
    }

    /// Delete a comment. Allowed for its author and for admins.
    ///
    /// # Errors
    /// `NotFound` for an unknown comment, `PermissionDenied` for anyone else.
    #[instrument(skip(self))]
    pub async fn delete_comment(&self, post_id: &str, comment_id: &str, actor: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        let post_path = DocPath::new(POSTS, post_id);
        let path = DocPath::new(post_path.child(COMMENTS), comment_id);
        let comment: Comment = self.fetch(&path).await?;
        if actor.is_empty() {
            return Err(Error::Precondition(ErrorKind::NotAuthenticated));
        }
        if comment.author_id != actor {
            require_role(self.store.as_ref(), actor, Role::Admin).await?;
        }
        self.store.delete(&path).await?;
        self.bump(&post_path, "commentCount", -1).await;
        Ok(())
    }
}
