use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date format used for `publishDate`.
pub const PUBLISH_DATE_FORMAT: &str = "%Y-%m-%d";

/// One story in the daily batch. Serialized field names match the stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    pub title: String,
    pub content: String,
    pub day_index: u32,
    /// YYYY-MM-DD
    pub publish_date: String,
}

/// Source of "today" for generation.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local process clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Produces the batch of stories published on a given date.
pub trait ContentProvider: Send + Sync {
    fn stories_for(&self, date: NaiveDate) -> Result<Vec<StoryRecord>>;
}

/// (title, content) pairs, in dayIndex order.
const STORY_TABLE: [(&str, &str); 5] = [
    (
        "The Crystal Cave",
        "Deep in the mountains, a cave filled with singing crystals awaits discovery...",
    ),
    (
        "Merchant of Dreams",
        "In the night market, a mysterious vendor sells dreams in glass bottles...",
    ),
    (
        "The Last Library",
        "When all digital records failed, one ancient library held humanity's hope...",
    ),
    (
        "Stars Whisper",
        "The astronomer heard voices in the static between stars...",
    ),
    (
        "The Phoenix Gate",
        "Every thousand years, the gate opens for one worthy soul...",
    ),
];

/// The built-in five-story table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContentProvider;

impl ContentProvider for StaticContentProvider {
    fn stories_for(&self, date: NaiveDate) -> Result<Vec<StoryRecord>> {
        Ok(build_batch(&STORY_TABLE, date))
    }
}

/// Number each (title, content) pair by position and stamp it with `date`.
pub fn build_batch(entries: &[(&str, &str)], date: NaiveDate) -> Vec<StoryRecord> {
    let publish_date = date.format(PUBLISH_DATE_FORMAT).to_string();
    entries
        .iter()
        .zip(0u32..)
        .map(|(&(title, content), day_index)| StoryRecord {
            title: title.to_string(),
            content: content.to_string(),
            day_index,
            publish_date: publish_date.clone(),
        })
        .collect()
}
