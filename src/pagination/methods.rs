//! Page navigation capability and auto method selection
//!
//! The engine never touches a DOM directly. A host-supplied `PageDriver`
//! answers three questions: what does the page look like right now, is a
//! given pagination affordance present, and did performing it advance the
//! page. This keeps the pagination logic free of any rendering engine.

use crate::pagination::types::PaginationMethod;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};

/// DOM capability interface the engine drives the page through
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Textual content of the page, used as the fingerprint pre-image
    async fn snapshot_content(&self) -> Result<String>;

    /// Whether the given method's affordance is currently present
    async fn method_available(&self, method: PaginationMethod) -> Result<bool>;

    /// Perform the navigation action (click, URL rewrite, or
    /// scroll-to-bottom). Returns `false` when there are no further
    /// pages; that is normal completion, not an error.
    async fn advance(&self, method: PaginationMethod, current_page: u32) -> Result<bool>;
}

/// Resolve the method to run with
///
/// An explicit method is used as requested. `Auto` probes the detectors
/// in fixed priority order and picks the first one reporting
/// availability; `None` means no method is usable on this page.
pub async fn select_method(
    driver: &dyn PageDriver,
    requested: PaginationMethod,
) -> Result<Option<PaginationMethod>> {
    if requested != PaginationMethod::Auto {
        return Ok(Some(requested));
    }

    for candidate in PaginationMethod::AUTO_PRIORITY {
        if driver.method_available(candidate).await? {
            info!("Auto mode selected pagination method: {}", candidate.as_str());
            return Ok(Some(candidate));
        }
        debug!("Pagination method {} not available", candidate.as_str());
    }

    Ok(None)
}
