//! Notices published by staff and read by everyone.

use tracing::{info, instrument};

use crate::api::Scholar;
use crate::auth::{Caller, Permission, ensure_can_announce_to};
use crate::db;
use crate::error::AppError;
use crate::models::{Announcement, NewAnnouncement};
use crate::validation::ValidateExt;

impl Scholar {
    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_announcements(&self, caller: &Caller) -> Result<Vec<Announcement>, AppError> {
        caller.require_permission(Permission::ViewAnnouncements)?;
        db::list_active_announcements(self.pool()).await
    }

    /// Publishes an announcement. A teacher may tie it to a course only if
    /// they teach that course.
    #[instrument(skip(self, caller, announcement), fields(account_id = caller.account_id))]
    pub async fn create_announcement(
        &self,
        caller: &Caller,
        announcement: NewAnnouncement,
    ) -> Result<Announcement, AppError> {
        caller.require_permission(Permission::PublishAnnouncements)?;
        let announcement = announcement.validated()?;
        if announcement.content.trim().is_empty() {
            return Err(AppError::Validation(
                "content: content is required".to_string(),
            ));
        }

        let mut tx = self.pool().begin().await?;
        if let Some(course_id) = announcement.course_id {
            let course = db::get_course(&mut *tx, course_id).await?;
            ensure_can_announce_to(caller, &course)?;
        }
        let created = db::insert_announcement(&mut *tx, caller.account_id, &announcement).await?;
        tx.commit().await?;

        info!(
            announcement_id = created.id,
            kind = created.kind.as_str(),
            "Announcement published"
        );
        Ok(created)
    }
}
