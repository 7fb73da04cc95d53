use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use super::ContentStore;
use super::types::{DraftUpdate, NewTask, TaskRecord, TaskStatus, fmt_ts, parse_ts};
use crate::core::error::{Error, Result};

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let hashtags: String = row.get(3)?;
    let status: String = row.get(6)?;
    let scheduled_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(TaskRecord {
        task_id: row.get(0)?,
        title: row.get(1)?,
        caption: row.get(2)?,
        hashtags: serde_json::from_str(&hashtags).unwrap_or_default(),
        image_prompt: row.get(4)?,
        media_url: row.get(5)?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
        scheduled_at: scheduled_at.as_deref().and_then(parse_ts),
        notes: row.get(8)?,
        created_at: parse_ts(&created_at).unwrap_or_default(),
        updated_at: parse_ts(&updated_at).unwrap_or_default(),
    })
}

const TASK_COLUMNS: &str = "task_id, title, caption, hashtags, image_prompt, media_url, \
     status, scheduled_at, notes, created_at, updated_at";

impl ContentStore {
    pub async fn create_draft(&self, new: NewTask) -> Result<TaskRecord> {
        let task_id = Uuid::new_v4().to_string();
        let now = fmt_ts(Utc::now());
        let hashtags = serde_json::to_string(&new.hashtags).unwrap_or_else(|_| "[]".into());

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO task (task_id, title, caption, hashtags, image_prompt, media_url,
                               status, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?8, ?8)",
            params![
                task_id,
                new.title,
                new.caption,
                hashtags,
                new.image_prompt,
                new.media_url,
                new.notes,
                now
            ],
        )?;
        drop(db);

        self.get_task(&task_id)
            .await?
            .ok_or_else(|| Error::not_found("task vanished after insert"))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE task_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![task_id], row_to_task)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// `draft -> draft_approved`. Conditional update; exactly one approval
    /// can succeed.
    pub async fn approve_task(&self, task_id: &str) -> Result<TaskRecord> {
        let now = fmt_ts(Utc::now());
        let changed = {
            let db = self.db.lock().await;
            db.execute(
                "UPDATE task SET status = 'draft_approved', updated_at = ?2
                 WHERE task_id = ?1 AND status = 'draft'",
                params![task_id, now],
            )?
        };

        if changed == 1 {
            return self
                .get_task(task_id)
                .await?
                .ok_or_else(|| Error::not_found("Task not found"));
        }
        match self.get_task(task_id).await? {
            None => Err(Error::not_found("Task not found")),
            Some(task) => Err(Error::invalid_state(format!(
                "Task cannot be approved from status '{}'",
                task.status.as_str()
            ))),
        }
    }

    /// Draft-only edit. Fields left `None` are untouched.
    pub async fn update_draft(&self, task_id: &str, update: DraftUpdate) -> Result<TaskRecord> {
        let current = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("Task not found"))?;
        if current.status != TaskStatus::Draft {
            return Err(Error::invalid_state("Only draft tasks can be edited"));
        }

        let hashtags = update.hashtags.unwrap_or(current.hashtags);
        let hashtags_json = serde_json::to_string(&hashtags).unwrap_or_else(|_| "[]".into());
        let now = fmt_ts(Utc::now());

        let db = self.db.lock().await;
        db.execute(
            "UPDATE task SET title = ?2, caption = ?3, hashtags = ?4, image_prompt = ?5,
                             media_url = ?6, notes = ?7, updated_at = ?8
             WHERE task_id = ?1 AND status = 'draft'",
            params![
                task_id,
                update.title.or(current.title),
                update.caption.or(current.caption),
                hashtags_json,
                update.image_prompt.or(current.image_prompt),
                update.media_url.or(current.media_url),
                update.notes.or(current.notes),
                now
            ],
        )?;
        drop(db);

        self.get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("Task not found"))
    }

    pub async fn delete_draft(&self, task_id: &str) -> Result<()> {
        let current = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("Task not found"))?;
        if current.status != TaskStatus::Draft {
            return Err(Error::invalid_state("Only draft tasks can be deleted"));
        }

        let db = self.db.lock().await;
        db.execute("DELETE FROM task WHERE task_id = ?1", params![task_id])?;
        Ok(())
    }

    /// `draft_approved -> scheduled`, persisting the platform selection.
    /// Platform validation (existence, activity, expiry, future time) happens
    /// in the scheduling layer before this is called; this enforces the state
    /// transition itself.
    pub async fn schedule_task(
        &self,
        task_id: &str,
        platform_ids: &[String],
        scheduled_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<TaskRecord> {
        let now = fmt_ts(Utc::now());
        let scheduled = fmt_ts(scheduled_at);

        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE task SET status = 'scheduled', scheduled_at = ?2,
                             notes = COALESCE(?3, notes), updated_at = ?4
             WHERE task_id = ?1 AND status = 'draft_approved'",
            params![task_id, scheduled, notes, now],
        )?;
        if changed != 1 {
            drop(db);
            return match self.get_task(task_id).await? {
                None => Err(Error::not_found("Task not found")),
                Some(task) => Err(Error::invalid_state(format!(
                    "Task cannot be scheduled from status '{}'",
                    task.status.as_str()
                ))),
            };
        }

        db.execute(
            "DELETE FROM task_platform WHERE task_id = ?1",
            params![task_id],
        )?;
        for platform_id in platform_ids {
            db.execute(
                "INSERT INTO task_platform (task_id, platform_id, created_at) VALUES (?1, ?2, ?3)",
                params![task_id, platform_id, now],
            )?;
        }
        drop(db);

        self.get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("Task not found"))
    }

    /// Atomically claim a task for delivery. Transitions to `dispatching` and
    /// clears `scheduled_at`; succeeds for exactly one caller. Both post-now
    /// and the scheduler's release go through this, so a task is never
    /// delivered twice.
    pub async fn claim_task(&self, task_id: &str, from: &[TaskStatus]) -> Result<bool> {
        let placeholders: Vec<String> = from.iter().map(|s| format!("'{}'", s.as_str())).collect();
        let now = fmt_ts(Utc::now());

        let db = self.db.lock().await;
        let changed = db.execute(
            &format!(
                "UPDATE task SET status = 'dispatching', scheduled_at = NULL, updated_at = ?2
                 WHERE task_id = ?1 AND status IN ({})",
                placeholders.join(", ")
            ),
            params![task_id, now],
        )?;
        Ok(changed == 1)
    }

    /// `scheduled -> cancelled`. Rejected once the task has been claimed or
    /// reached a terminal state.
    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskRecord> {
        let now = fmt_ts(Utc::now());
        let changed = {
            let db = self.db.lock().await;
            db.execute(
                "UPDATE task SET status = 'cancelled', scheduled_at = NULL, updated_at = ?2
                 WHERE task_id = ?1 AND status = 'scheduled'",
                params![task_id, now],
            )?
        };

        if changed == 1 {
            return self
                .get_task(task_id)
                .await?
                .ok_or_else(|| Error::not_found("Task not found"));
        }
        match self.get_task(task_id).await? {
            None => Err(Error::not_found("Task not found")),
            Some(task) => Err(Error::invalid_state(format!(
                "Task cannot be cancelled from status '{}'",
                task.status.as_str()
            ))),
        }
    }

    /// Commit the final status of a delivery round (`dispatching -> posted|failed`).
    /// Callers must have written every attempt row of the round first.
    pub async fn finish_task(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        debug_assert!(matches!(status, TaskStatus::Posted | TaskStatus::Failed));
        let now = fmt_ts(Utc::now());

        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE task SET status = ?2, updated_at = ?3
             WHERE task_id = ?1 AND status = 'dispatching'",
            params![task_id, status.as_str(), now],
        )?;
        if changed != 1 {
            return Err(Error::invalid_state(
                "Task is not in a claimed state; delivery round cannot be committed",
            ));
        }
        Ok(())
    }

    /// Overwrite the task's notes (post-now can attach round notes without
    /// going through a draft edit).
    pub async fn set_task_notes(&self, task_id: &str, notes: &str) -> Result<()> {
        let now = fmt_ts(Utc::now());
        let db = self.db.lock().await;
        db.execute(
            "UPDATE task SET notes = ?2, updated_at = ?3 WHERE task_id = ?1",
            params![task_id, notes, now],
        )?;
        Ok(())
    }

    /// Replace the platform selection for a task (new delivery round via
    /// post-now).
    pub async fn set_platform_selection(
        &self,
        task_id: &str,
        platform_ids: &[String],
    ) -> Result<()> {
        let now = fmt_ts(Utc::now());
        let db = self.db.lock().await;
        db.execute(
            "DELETE FROM task_platform WHERE task_id = ?1",
            params![task_id],
        )?;
        for platform_id in platform_ids {
            db.execute(
                "INSERT INTO task_platform (task_id, platform_id, created_at) VALUES (?1, ?2, ?3)",
                params![task_id, platform_id, now],
            )?;
        }
        Ok(())
    }

    pub async fn selected_platforms(&self, task_id: &str) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT platform_id FROM task_platform WHERE task_id = ?1 ORDER BY created_at, platform_id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Paginated listing of tasks in one status, newest first.
    pub async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TaskRecord>, i64)> {
        let db = self.db.lock().await;
        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM task WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE status = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![status.as_str(), limit, offset], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok((tasks, total))
    }

    /// Listing backing the scheduled-tasks dashboard: scheduled, posted,
    /// failed and cancelled tasks, optionally narrowed to one status.
    pub async fn list_lifecycle_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TaskRecord>, i64)> {
        let filter = match status {
            Some(s) => format!("status = '{}'", s.as_str()),
            None => "status IN ('scheduled', 'posted', 'failed', 'cancelled')".to_string(),
        };

        let db = self.db.lock().await;
        let total: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM task WHERE {filter}"),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE {filter}
             ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok((tasks, total))
    }

    /// Tasks due for release: `scheduled` with `scheduled_at <= now`, oldest
    /// first, ties broken by creation time.
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM task
             WHERE status = 'scheduled' AND scheduled_at <= ?1
             ORDER BY scheduled_at ASC, created_at ASC"
        ))?;
        let rows = stmt.query_map(params![fmt_ts(now)], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use crate::core::store::types::AttemptStatus;
    use chrono::Duration;

    async fn draft(store: &ContentStore) -> TaskRecord {
        store
            .create_draft(NewTask {
                title: Some("Launch post".into()),
                caption: Some("We are live".into()),
                hashtags: vec!["launch".into(), "news".into()],
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn approved(store: &ContentStore) -> TaskRecord {
        let task = draft(store).await;
        store.approve_task(&task.task_id).await.unwrap()
    }

    #[tokio::test]
    async fn create_draft_starts_in_draft_without_schedule() {
        let store = test_store();
        let task = draft(&store).await;
        assert_eq!(task.status, TaskStatus::Draft);
        assert!(task.scheduled_at.is_none());
        assert_eq!(task.hashtags, vec!["launch", "news"]);
    }

    #[tokio::test]
    async fn approve_moves_draft_forward() {
        let store = test_store();
        let task = draft(&store).await;
        let approved = store.approve_task(&task.task_id).await.unwrap();
        assert_eq!(approved.status, TaskStatus::DraftApproved);
    }

    #[tokio::test]
    async fn double_approve_is_invalid_state() {
        let store = test_store();
        let task = draft(&store).await;
        store.approve_task(&task.task_id).await.unwrap();
        let err = store.approve_task(&task.task_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // Status unchanged by the failed call.
        let task = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DraftApproved);
    }

    #[tokio::test]
    async fn approve_unknown_task_is_not_found() {
        let store = test_store();
        let err = store.approve_task("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn schedule_sets_timestamp_and_selection() {
        let store = test_store();
        let task = approved(&store).await;
        let at = Utc::now() + Duration::hours(2);
        let scheduled = store
            .schedule_task(&task.task_id, &["p1".into(), "p2".into()], at, Some("Story"))
            .await
            .unwrap();
        assert_eq!(scheduled.status, TaskStatus::Scheduled);
        assert!(scheduled.scheduled_at.is_some());
        assert_eq!(scheduled.notes.as_deref(), Some("Story"));
        assert_eq!(
            store.selected_platforms(&task.task_id).await.unwrap(),
            vec!["p1".to_string(), "p2".to_string()]
        );
    }

    #[tokio::test]
    async fn schedule_from_draft_is_invalid_state() {
        let store = test_store();
        let task = draft(&store).await;
        let err = store
            .schedule_task(&task.task_id, &["p1".into()], Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn scheduled_at_set_iff_scheduled() {
        let store = test_store();
        let task = approved(&store).await;
        let at = Utc::now() + Duration::minutes(30);
        store
            .schedule_task(&task.task_id, &["p1".into()], at, None)
            .await
            .unwrap();

        // Claimed out of scheduled: timestamp cleared.
        assert!(
            store
                .claim_task(&task.task_id, &[TaskStatus::Scheduled])
                .await
                .unwrap()
        );
        let claimed = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Dispatching);
        assert!(claimed.scheduled_at.is_none());

        store
            .finish_task(&task.task_id, TaskStatus::Posted)
            .await
            .unwrap();
        let done = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Posted);
        assert!(done.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn claim_succeeds_for_exactly_one_caller() {
        let store = test_store();
        let task = approved(&store).await;
        store
            .schedule_task(
                &task.task_id,
                &["p1".into()],
                Utc::now() + Duration::minutes(1),
                None,
            )
            .await
            .unwrap();

        let first = store
            .claim_task(&task.task_id, &[TaskStatus::Scheduled, TaskStatus::DraftApproved])
            .await
            .unwrap();
        let second = store
            .claim_task(&task.task_id, &[TaskStatus::Scheduled, TaskStatus::DraftApproved])
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn cancel_scheduled_task_leaves_no_attempts() {
        let store = test_store();
        let task = approved(&store).await;
        store
            .schedule_task(
                &task.task_id,
                &["p1".into()],
                Utc::now() + Duration::hours(1),
                None,
            )
            .await
            .unwrap();

        let cancelled = store.cancel_task(&task.task_id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(cancelled.scheduled_at.is_none());
        assert!(
            store
                .attempts_for_task(&task.task_id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn cancel_after_claim_is_rejected() {
        let store = test_store();
        let task = approved(&store).await;
        store
            .schedule_task(
                &task.task_id,
                &["p1".into()],
                Utc::now() + Duration::hours(1),
                None,
            )
            .await
            .unwrap();
        assert!(
            store
                .claim_task(&task.task_id, &[TaskStatus::Scheduled])
                .await
                .unwrap()
        );

        let err = store.cancel_task(&task.task_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancel_terminal_task_is_rejected() {
        let store = test_store();
        let task = approved(&store).await;
        store
            .schedule_task(
                &task.task_id,
                &["p1".into()],
                Utc::now() + Duration::hours(1),
                None,
            )
            .await
            .unwrap();
        store.cancel_task(&task.task_id).await.unwrap();
        let err = store.cancel_task(&task.task_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn finish_requires_claimed_state() {
        let store = test_store();
        let task = approved(&store).await;
        let err = store
            .finish_task(&task.task_id, TaskStatus::Posted)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn edit_and_delete_are_draft_only() {
        let store = test_store();
        let task = approved(&store).await;
        let err = store
            .update_draft(
                &task.task_id,
                DraftUpdate {
                    caption: Some("new".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = store.delete_draft(&task.task_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn edit_draft_merges_fields() {
        let store = test_store();
        let task = draft(&store).await;
        let updated = store
            .update_draft(
                &task.task_id,
                DraftUpdate {
                    caption: Some("Revised caption".into()),
                    hashtags: Some(vec!["fresh".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.caption.as_deref(), Some("Revised caption"));
        assert_eq!(updated.hashtags, vec!["fresh"]);
        // Untouched field survives.
        assert_eq!(updated.title.as_deref(), Some("Launch post"));
    }

    #[tokio::test]
    async fn due_tasks_fifo_by_scheduled_then_created() {
        let store = test_store();
        let base = Utc::now() - Duration::minutes(10);

        let t1 = approved(&store).await;
        let t2 = approved(&store).await;
        let t3 = approved(&store).await;
        // t2 due earlier than t1; t3 shares t1's slot but was created after it.
        store
            .schedule_task(&t1.task_id, &["p".into()], base + Duration::minutes(5), None)
            .await
            .unwrap();
        store
            .schedule_task(&t2.task_id, &["p".into()], base, None)
            .await
            .unwrap();
        store
            .schedule_task(&t3.task_id, &["p".into()], base + Duration::minutes(5), None)
            .await
            .unwrap();

        let due = store.due_tasks(Utc::now()).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec![&t2.task_id, &t1.task_id, &t3.task_id]);

        // Nothing due before the earliest slot.
        let none = store.due_tasks(base - Duration::minutes(1)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn pagination_roundtrip_is_stable() {
        let store = test_store();
        for _ in 0..5 {
            draft(&store).await;
        }

        let (page, total) = store
            .list_tasks_by_status(TaskStatus::Draft, 2, 2)
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        let ids: Vec<String> = page.iter().map(|t| t.task_id.clone()).collect();

        // next page then back returns the same item set.
        let (next, _) = store
            .list_tasks_by_status(TaskStatus::Draft, 2, 4)
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        let (back, _) = store
            .list_tasks_by_status(TaskStatus::Draft, 2, 2)
            .await
            .unwrap();
        let back_ids: Vec<String> = back.iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, back_ids);
    }

    #[tokio::test]
    async fn lifecycle_listing_excludes_drafts() {
        let store = test_store();
        draft(&store).await;
        let task = approved(&store).await;
        store
            .schedule_task(
                &task.task_id,
                &["p".into()],
                Utc::now() + Duration::hours(1),
                None,
            )
            .await
            .unwrap();

        let (all, total) = store.list_lifecycle_tasks(None, 20, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(all[0].status, TaskStatus::Scheduled);

        let (posted, total) = store
            .list_lifecycle_tasks(Some(TaskStatus::Posted), 20, 0)
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(posted.is_empty());
    }

    #[tokio::test]
    async fn retried_round_appends_new_attempts() {
        let store = test_store();
        let task = approved(&store).await;
        store.set_platform_selection(&task.task_id, &["p1".into()]).await.unwrap();

        store
            .record_attempt(&task.task_id, "p1", AttemptStatus::Failed, None, Some(12), None)
            .await
            .unwrap();
        store
            .record_attempt(&task.task_id, "p1", AttemptStatus::Success, None, Some(40), None)
            .await
            .unwrap();

        let attempts = store.attempts_for_task(&task.task_id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[1].status, AttemptStatus::Success);
    }
}
