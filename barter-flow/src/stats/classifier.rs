use crate::error::FlowError;
use serde::{Deserialize, Serialize};

/// Order size bucket of a trade, by notional value in quote currency.
///
/// Buckets are half-open `[lower, upper)` intervals partitioning `[0, 1e8)`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum SizeBucket {
    #[serde(rename = "0-10k")]
    UpTo10k,
    #[serde(rename = "10k-100k")]
    UpTo100k,
    #[serde(rename = "100k-1m")]
    UpTo1m,
    #[serde(rename = "1m-10m")]
    UpTo10m,
    #[serde(rename = "10m-100m")]
    UpTo100m,
}

impl SizeBucket {
    /// Every bucket, smallest first.
    pub const ALL: [SizeBucket; 5] = [
        SizeBucket::UpTo10k,
        SizeBucket::UpTo100k,
        SizeBucket::UpTo1m,
        SizeBucket::UpTo10m,
        SizeBucket::UpTo100m,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SizeBucket::UpTo10k => "0-10k",
            SizeBucket::UpTo100k => "10k-100k",
            SizeBucket::UpTo1m => "100k-1m",
            SizeBucket::UpTo10m => "1m-10m",
            SizeBucket::UpTo100m => "10m-100m",
        }
    }

    /// Exclusive upper bound of the bucket.
    pub fn upper(&self) -> f64 {
        match self {
            SizeBucket::UpTo10k => 1e4,
            SizeBucket::UpTo100k => 1e5,
            SizeBucket::UpTo1m => 1e6,
            SizeBucket::UpTo10m => 1e7,
            SizeBucket::UpTo100m => 1e8,
        }
    }

    /// Position in [`SizeBucket::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Map a trade notional to its [`SizeBucket`].
///
/// Notionals of 1e8 and above (or `NaN`) have no bucket.
pub fn classify(notional: f64) -> Result<SizeBucket, FlowError> {
    SizeBucket::ALL
        .into_iter()
        .find(|bucket| notional < bucket.upper())
        .ok_or(FlowError::UnmappedNotional(notional))
}
