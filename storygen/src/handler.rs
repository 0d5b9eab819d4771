use anyhow::{Context, Result};
use rocket::http::Status;
use tracing::{error, info};

use crate::auth::key_matches;
use crate::content::{Clock, ContentProvider, PUBLISH_DATE_FORMAT};
use crate::storage::{DocumentStore, WriteBatch};

/// Build today's stories and write them to `collection` in one batch.
/// Returns the number of stories written.
pub async fn generate_stories(
    store: &dyn DocumentStore,
    provider: &dyn ContentProvider,
    clock: &dyn Clock,
    collection: &str,
) -> Result<usize> {
    let today = clock.today();
    info!("Generating stories for {}", today.format(PUBLISH_DATE_FORMAT));

    let stories = provider
        .stories_for(today)
        .context("failed to build story batch")?;

    let mut batch = WriteBatch::new();
    for story in &stories {
        let doc = store.doc(collection);
        batch
            .set(&doc, story)
            .with_context(|| format!("failed to stage story '{}'", story.title))?;
    }

    store.commit(batch).await.context("failed to commit story batch")?;
    Ok(stories.len())
}

/// Everything one invocation needs; borrowed from the server state.
pub struct GenerateContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub provider: &'a dyn ContentProvider,
    pub clock: &'a dyn Clock,
    pub collection: &'a str,
    pub secret: &'a str,
}

/// Gate on `key`, then generate and persist. Maps the outcome to a status and plain-text body.
pub async fn handle_generate(ctx: &GenerateContext<'_>, key: Option<&str>) -> (Status, String) {
    if !key_matches(key.unwrap_or_default(), ctx.secret) {
        return (Status::Forbidden, "Forbidden".to_string());
    }

    match generate_stories(ctx.store, ctx.provider, ctx.clock, ctx.collection).await {
        Ok(count) => (Status::Ok, format!("Success! Generated {} stories", count)),
        Err(e) => {
            error!("Error generating stories: {:#}", e);
            (Status::InternalServerError, format!("Error: {:#}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FixedClock, StaticContentProvider, StoryRecord};
    use anyhow::bail;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Keeps committed batches in memory.
    #[derive(Default)]
    struct RecordingStore {
        commits: Mutex<Vec<WriteBatch>>,
    }

    #[async_trait::async_trait]
    impl DocumentStore for RecordingStore {
        async fn commit(&self, batch: WriteBatch) -> Result<()> {
            self.commits.lock().unwrap().push(batch);
            Ok(())
        }
    }

    struct BrokenProvider;

    impl ContentProvider for BrokenProvider {
        fn stories_for(&self, _date: NaiveDate) -> Result<Vec<StoryRecord>> {
            bail!("story table unavailable")
        }
    }

    fn clock() -> FixedClock {
        FixedClock(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[tokio::test]
    async fn stages_one_document_per_story() {
        let store = RecordingStore::default();
        let count = generate_stories(&store, &StaticContentProvider, &clock(), "stories")
            .await
            .unwrap();
        assert_eq!(count, 5);

        let commits = store.commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        let writes = commits[0].writes();
        assert_eq!(writes.len(), 5);
        assert!(writes.iter().all(|(doc, _)| doc.collection == "stories"));
        for (i, (_, fields)) in writes.iter().enumerate() {
            assert_eq!(fields["dayIndex"], serde_json::json!(i));
            assert_eq!(fields["publishDate"], "2024-01-01");
        }
    }

    #[tokio::test]
    async fn missing_key_is_forbidden_without_generation() {
        let store = RecordingStore::default();
        let clock = clock();
        let ctx = GenerateContext {
            store: &store,
            provider: &BrokenProvider,
            clock: &clock,
            collection: "stories",
            secret: "test-key-123",
        };

        let (status, body) = handle_generate(&ctx, None).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body, "Forbidden");
        assert!(store.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_nothing_committed() {
        let store = RecordingStore::default();
        let clock = clock();
        let ctx = GenerateContext {
            store: &store,
            provider: &BrokenProvider,
            clock: &clock,
            collection: "stories",
            secret: "test-key-123",
        };

        let (status, body) = handle_generate(&ctx, Some("test-key-123")).await;
        assert_eq!(status, Status::InternalServerError);
        assert!(body.starts_with("Error: "));
        assert!(body.contains("story table unavailable"));
        assert!(store.commits.lock().unwrap().is_empty());
    }
}
