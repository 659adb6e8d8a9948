//! External collaborator interfaces: gallery detection and image
//! extraction
//!
//! Both live outside the core: layout sniffing and tag/attribute
//! harvesting are DOM-specific glue. The engine only calls the
//! lazy-loading extraction variant, once per page, and treats the
//! returned records as that page's contribution.

use crate::pagination::types::{ImageRecord, LazyLoadOptions};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of the one-shot gallery probe at session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub is_gallery: bool,
    /// Detector-specific label, e.g. "grid" or "lightbox"
    pub gallery_type: Option<String>,
    /// Detector confidence in [0.0, 1.0]
    pub confidence: f64,
}

impl DetectionResult {
    #[must_use]
    pub fn gallery(gallery_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            is_gallery: true,
            gallery_type: Some(gallery_type.into()),
            confidence,
        }
    }

    #[must_use]
    pub fn not_a_gallery() -> Self {
        Self {
            is_gallery: false,
            gallery_type: None,
            confidence: 0.0,
        }
    }
}

/// One-shot structure probe, consulted only at session start to decide
/// whether to proceed; never polled during the loop
#[async_trait]
pub trait GalleryDetector: Send + Sync {
    async fn detect_gallery(&self) -> Result<DetectionResult>;
}

/// Image harvesting collaborator
#[async_trait]
pub trait ImageExtractor: Send + Sync {
    /// Extract what is currently in the DOM
    async fn extract_images(&self) -> Result<Vec<ImageRecord>>;

    /// Scroll-trigger deferred content, then extract. The engine calls
    /// this variant once per page.
    async fn extract_images_with_lazy_loading(
        &self,
        options: &LazyLoadOptions,
    ) -> Result<Vec<ImageRecord>>;
}
