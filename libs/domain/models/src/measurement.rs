use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::AccountRef;

/// A single published reading for one meteringpoint over one interval.
/// Unique on `(gsrn, begin)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    pub gsrn: String,
    pub subject: AccountRef,
    pub sector: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub amount: i64,
}
