//! In-process image store and identity provider for deterministic tests.
//!
//! ```rust,ignore
//! use lovejournal_media::mock::{MockImageStore, MockIdentityProvider};
//!
//! let images = MockImageStore::new()
//!     .with_image("love-journal/u1/a")
//!     .with_failing("love-journal/u1/b");
//! let identity = MockIdentityProvider::new().with_token("token-1", "u1");
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lovejournal_core::defaults::IMAGE_LIST_PAGE_SIZE;
use lovejournal_core::{
    DeleteOutcome, Error, IdentityProvider, ImageStore, ResourcePage, Result, StoredImage,
};

#[derive(Default)]
struct ImageState {
    images: BTreeMap<String, StoredImage>,
    failing: HashSet<String>,
    listing_fails: bool,
    destroyed: Vec<String>,
    list_calls: usize,
}

/// Image store double. Clones share state.
#[derive(Clone)]
pub struct MockImageStore {
    state: Arc<Mutex<ImageState>>,
    page_size: usize,
}

impl Default for MockImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ImageState::default())),
            page_size: IMAGE_LIST_PAGE_SIZE as usize,
        }
    }

    /// Add a stored image with no context.
    pub fn with_image(self, public_id: impl Into<String>) -> Self {
        let public_id = public_id.into();
        let url = format!("https://res.cloudinary.com/mock/image/upload/v1/{public_id}.jpg");
        self.with_stored(StoredImage {
            public_id,
            url,
            created_at: None,
            context: BTreeMap::new(),
        })
    }

    pub fn with_stored(self, image: StoredImage) -> Self {
        self.insert(image);
        self
    }

    /// Make `destroy` fail for this public id.
    pub fn with_failing(self, public_id: impl Into<String>) -> Self {
        self.lock().failing.insert(public_id.into());
        self
    }

    /// Make every `list_by_prefix` call fail.
    pub fn with_failing_listing(self) -> Self {
        self.lock().listing_fails = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn insert(&self, image: StoredImage) {
        self.lock().images.insert(image.public_id.clone(), image);
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.lock().images.contains_key(public_id)
    }

    /// Public ids passed to `destroy`, in call order (including failures).
    pub fn destroy_calls(&self) -> Vec<String> {
        self.lock().destroyed.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ImageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn destroy(&self, public_id: &str) -> Result<DeleteOutcome> {
        let mut state = self.lock();
        state.destroyed.push(public_id.to_string());
        if state.failing.contains(public_id) {
            return Err(Error::ImageStore(format!(
                "destroy {public_id}: simulated failure"
            )));
        }
        Ok(match state.images.remove(public_id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn list_by_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<ResourcePage> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.listing_fails {
            return Err(Error::ImageStore(format!("list {prefix}: simulated failure")));
        }

        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| Error::ImageStore(format!("bad cursor {c}")))?,
            None => 0,
        };
        let matching: Vec<&StoredImage> = state
            .images
            .values()
            .filter(|img| img.public_id.starts_with(prefix))
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let resources = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|img| (*img).clone())
            .collect();
        let next_cursor = (end < matching.len()).then(|| end.to_string());

        Ok(ResourcePage {
            resources,
            next_cursor,
        })
    }
}

#[derive(Default)]
struct IdentityState {
    tokens: HashMap<String, String>,
    identities: HashSet<String>,
    failing: HashSet<String>,
    deleted: Vec<String>,
}

/// Identity provider double. Clones share state.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    state: Arc<Mutex<IdentityState>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as belonging to `uid` and register the identity.
    pub fn with_token(self, token: impl Into<String>, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        {
            let mut state = self.lock();
            state.identities.insert(uid.clone());
            state.tokens.insert(token.into(), uid);
        }
        self
    }

    /// Register an identity with no token.
    pub fn with_identity(self, uid: impl Into<String>) -> Self {
        self.lock().identities.insert(uid.into());
        self
    }

    /// Make `delete_identity` fail for this uid.
    pub fn with_failing(self, uid: impl Into<String>) -> Self {
        self.lock().failing.insert(uid.into());
        self
    }

    pub fn has_identity(&self, uid: &str) -> bool {
        self.lock().identities.contains(uid)
    }

    /// Uids passed to `delete_identity`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<String> {
        let state = self.lock();
        state
            .tokens
            .get(token)
            .filter(|uid| state.identities.contains(*uid))
            .cloned()
            .ok_or_else(|| Error::Unauthorized("INVALID_ID_TOKEN".to_string()))
    }

    async fn delete_identity(&self, uid: &str) -> Result<DeleteOutcome> {
        let mut state = self.lock();
        state.deleted.push(uid.to_string());
        if state.failing.contains(uid) {
            return Err(Error::Identity(format!("delete {uid}: simulated failure")));
        }
        Ok(if state.identities.remove(uid) {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}
