//! Generated content bookkeeping
//!
//! Content is produced upstream; this service stores it, serves it back to
//! its owner and keeps text immutable once anything was published.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{PagecastError, Result};
use crate::service::events::{Event, EventBus};
use crate::types::{ContentStatus, GeneratedContent};
use crate::Database;

#[derive(Clone)]
pub struct ContentService {
    db: Arc<Database>,
    event_bus: EventBus,
}

impl ContentService {
    pub fn new(db: Arc<Database>, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Store a new draft
    pub async fn create(&self, content: &GeneratedContent) -> Result<()> {
        if content.text.trim().is_empty() && content.image_url.is_none() {
            return Err(PagecastError::Validation(
                "Content must have text or an image".to_string(),
            ));
        }
        if content.status != ContentStatus::Draft {
            return Err(PagecastError::InvalidInput(format!(
                "New content must be a draft, got {}",
                content.status.as_str()
            )));
        }

        self.db.insert_content(content).await?;
        info!(content_id = %content.id, platform = %content.platform, "Stored content");
        self.invalidate(&content.user_id);
        Ok(())
    }

    pub async fn get(&self, user_id: &str, content_id: &str) -> Result<GeneratedContent> {
        let content = self
            .db
            .get_content(content_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Content {} not found", content_id)))?;

        if content.user_id != user_id {
            return Err(PagecastError::Unauthorized(format!(
                "Content {} belongs to another user",
                content_id
            )));
        }
        Ok(content)
    }

    /// Replace the text of unpublished content
    ///
    /// # Errors
    ///
    /// `Conflict` once the content has been published.
    pub async fn update_text(
        &self,
        user_id: &str,
        content_id: &str,
        text: &str,
    ) -> Result<GeneratedContent> {
        if text.trim().is_empty() {
            return Err(PagecastError::Validation("Text cannot be empty".to_string()));
        }

        self.get(user_id, content_id).await?;
        if !self
            .db
            .update_content_text(content_id, text, Utc::now().timestamp())
            .await?
        {
            return Err(PagecastError::Conflict(format!(
                "Content {} is published and can no longer be edited",
                content_id
            )));
        }

        self.invalidate(user_id);
        self.get(user_id, content_id).await
    }

    fn invalidate(&self, user_id: &str) {
        self.event_bus.emit(Event::LibraryInvalidated {
            user_id: user_id.to_string(),
        });
    }
}
