//! Memory fetch and aggregation.
//!
//! The image host is the source of truth for which photos exist. Each upload
//! carries a `memory_id` context tag; images are grouped by that tag, merged
//! with the matching memory record (which holds the richer text fields) and
//! returned newest date first.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::defaults::MEMORY_ID_CONTEXT_KEY;
use crate::error::Result;
use crate::models::{Memory, MemoryImage, MemoryView, StoredImage};
use crate::traits::ImageStore;

/// Follow the listing cursor until exhausted or `max_pages` pages were read.
pub async fn collect_all(
    store: &dyn ImageStore,
    prefix: &str,
    max_pages: usize,
) -> Result<Vec<StoredImage>> {
    let mut images = Vec::new();
    let mut cursor: Option<String> = None;

    for page_number in 0..max_pages {
        let page = store.list_by_prefix(prefix, cursor.as_deref()).await?;
        debug!(
            subsystem = "gallery",
            op = "list_page",
            page = page_number,
            result_count = page.resources.len(),
            "Fetched image page"
        );
        images.extend(page.resources);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(images),
        }
    }

    warn!(
        subsystem = "gallery",
        prefix,
        max_pages,
        "Image listing truncated at page limit"
    );
    Ok(images)
}

struct Group {
    key: String,
    images: Vec<StoredImage>,
}

/// Group listed images into memories and merge stored record fields.
///
/// `records` is keyed by the memory id as it appears in the context tag.
pub fn aggregate_memories(
    images: Vec<StoredImage>,
    records: &HashMap<String, Memory>,
) -> Vec<MemoryView> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for image in images {
        let key = image
            .context
            .get(MEMORY_ID_CONTEXT_KEY)
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| image.public_id.clone());

        match index.get(&key) {
            Some(&i) => groups[i].images.push(image),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    images: vec![image],
                });
            }
        }
    }

    let mut views: Vec<(MemoryView, Option<DateTime<Utc>>)> = groups
        .into_iter()
        .map(|group| build_view(group, records))
        .collect();

    views.sort_by(|(a, a_latest), (b, b_latest)| {
        compare_dates(a.date, b.date)
            .then_with(|| b_latest.cmp(a_latest))
            .then_with(|| a.id.cmp(&b.id))
    });

    views.into_iter().map(|(view, _)| view).collect()
}

fn build_view(
    mut group: Group,
    records: &HashMap<String, Memory>,
) -> (MemoryView, Option<DateTime<Utc>>) {
    group.images.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let latest = group.images.iter().filter_map(|i| i.created_at).max();

    let context_value = |key: &str| -> Option<String> {
        group
            .images
            .iter()
            .find_map(|i| i.context.get(key).filter(|v| !v.is_empty()).cloned())
    };

    let mut view = MemoryView {
        id: group.key.clone(),
        title: context_value("title").unwrap_or_default(),
        text: context_value("text")
            .or_else(|| context_value("caption"))
            .unwrap_or_default(),
        date: context_value("date").as_deref().and_then(parse_context_date),
        images: Vec::new(),
        location_name: context_value("location"),
        latitude: context_value("latitude").and_then(|v| v.parse().ok()),
        longitude: context_value("longitude").and_then(|v| v.parse().ok()),
        has_record: false,
    };

    if view.date.is_none() {
        view.date = group.images.iter().find_map(|i| i.created_at).map(|t| t.date_naive());
    }

    if let Some(record) = records.get(&group.key) {
        if !record.title.is_empty() {
            view.title = record.title.clone();
        }
        if !record.text.is_empty() {
            view.text = record.text.clone();
        }
        view.date = Some(record.date);
        view.location_name = record.location_name.clone().or(view.location_name);
        view.latitude = record.latitude.or(view.latitude);
        view.longitude = record.longitude.or(view.longitude);
        view.has_record = true;
    }

    view.images = group
        .images
        .into_iter()
        .map(|i| MemoryImage {
            public_id: i.public_id,
            url: i.url,
        })
        .collect();

    (view, latest)
}

/// Newest first; undated memories sort last.
fn compare_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_context_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|t| t.with_timezone(&Utc).date_naive())
        })
}
