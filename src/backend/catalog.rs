use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: u32,
    pub name: String,
    pub types: Vec<String>,
    pub image_url: Option<String>,
}

/// Outcome of the summary stage. `Unavailable` is cached like a success so a
/// failing id is not fetched again during the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    Loaded(ItemSummary),
    Unavailable { id: u32 },
}

impl Summary {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Summary::Loaded(_))
    }

    pub fn as_loaded(&self) -> Option<&ItemSummary> {
        match self {
            Summary::Loaded(item) => Some(item),
            Summary::Unavailable { .. } => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        self.as_loaded()
            .and_then(|item| item.image_url.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    pub id: u32,
    pub name: String,
    pub image_url: Option<String>,
    pub types: Vec<String>,
    pub stats: Vec<Stat>,
    pub generation_name: String,
    pub generation_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub id: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogListing {
    pub count: u32,
    pub entries: Vec<CatalogEntry>,
}

/// Remote catalog the scheduler pulls items from.
///
/// Item-level calls never fail: the summary stage folds every error into
/// [`Summary::Unavailable`] and the detail stage into `None`.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_summary(&self, id: u32) -> Summary;

    /// Two round trips: the item record, then the species record it points to.
    async fn fetch_detail(&self, id: u32) -> Option<ItemDetail>;

    async fn fetch_listing(&self) -> Result<CatalogListing, FetchError>;

    async fn fetch_image(&self, url: &str) -> Option<DynamicImage>;
}
