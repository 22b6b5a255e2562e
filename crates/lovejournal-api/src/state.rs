//! Shared handler state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use lovejournal_core::defaults::{GRACE_PERIOD_DAYS, IMAGE_LIST_MAX_PAGES, IMAGE_ROOT_FOLDER};
use lovejournal_core::{DocumentStore, IdentityProvider, ImageStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub images: Arc<dyn ImageStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Top-level image folder; user folders live directly under it.
    pub root_folder: String,
    /// How long a removed account may still be restored.
    pub grace_period: Duration,
    /// Page cap when listing a user's images.
    pub max_image_pages: usize,
    /// Uids allowed to read job run history.
    pub admin_uids: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(
        store: DocumentStore,
        images: Arc<dyn ImageStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            images,
            identity,
            root_folder: IMAGE_ROOT_FOLDER.to_string(),
            grace_period: Duration::days(GRACE_PERIOD_DAYS),
            max_image_pages: IMAGE_LIST_MAX_PAGES,
            admin_uids: Arc::new(HashSet::new()),
        }
    }

    pub fn with_root_folder(mut self, root_folder: impl Into<String>) -> Self {
        self.root_folder = root_folder.into();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_admin_uids<I, S>(mut self, uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_uids = Arc::new(uids.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_admin(&self, uid: &str) -> bool {
        self.admin_uids.contains(uid)
    }
}
