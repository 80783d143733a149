/// Multi-source review sync
///
/// A request walks the stages in order and stops at the first one that
/// returns reviews:
///
/// ```text
/// OFFICIAL_API -> PAID_API -> SCRAPER -> SYNTHETIC_FALLBACK
/// ```
///
/// Stages that do not apply to the request are recorded as `NotAttempted`.

pub mod orchestrator;

pub use orchestrator::{SyncOrchestrator, SyncReport};

use crate::{reviews::ReviewOrigin, sources::SourceBatch};
use serde::{Deserialize, Serialize};

/// Position in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    OfficialApi,
    PaidApi,
    Scraper,
    SyntheticFallback,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::OfficialApi => "official_api",
            SyncStage::PaidApi => "paid_api",
            SyncStage::Scraper => "scraper",
            SyncStage::SyntheticFallback => "synthetic_fallback",
        }
    }

    /// Value written to `reviews.source`
    pub fn origin(&self) -> ReviewOrigin {
        match self {
            SyncStage::OfficialApi => ReviewOrigin::OfficialApi,
            SyncStage::PaidApi => ReviewOrigin::PaidApi,
            SyncStage::Scraper => ReviewOrigin::Scraper,
            SyncStage::SyntheticFallback => ReviewOrigin::Synthetic,
        }
    }
}

/// One sync request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Lower-cased platform id
    pub platform: String,
    /// Profile URL or vendor id; blank input is `None`
    pub locator: Option<String>,
    /// Try the stored OAuth credential first
    pub use_token: bool,
}

impl SyncRequest {
    pub fn new(platform: &str, locator: Option<&str>, use_token: bool) -> Self {
        Self {
            platform: platform.trim().to_lowercase(),
            locator: locator
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            use_token,
        }
    }
}

/// Result of running one stage
#[derive(Debug)]
pub enum SyncOutcome {
    /// The stage does not apply to this request
    NotAttempted,
    /// The source answered with nothing
    Empty,
    Results(SourceBatch),
    /// The source errored; the reason has already been logged
    Failed(String),
}

impl SyncOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::NotAttempted => "not_attempted",
            SyncOutcome::Empty => "empty",
            SyncOutcome::Results(_) => "results",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_normalizes_input() {
        let request = SyncRequest::new("  Google ", Some("   "), true);
        assert_eq!(request.platform, "google");
        assert_eq!(request.locator, None);
        assert!(request.use_token);

        let request = SyncRequest::new("booking", Some(" 5936336 "), false);
        assert_eq!(request.locator.as_deref(), Some("5936336"));
    }

    #[test]
    fn test_synthetic_stage_is_labelled_synthetic() {
        assert_eq!(SyncStage::SyntheticFallback.origin(), ReviewOrigin::Synthetic);
        assert_eq!(SyncStage::PaidApi.origin().as_str(), "paid_api");
    }
}
