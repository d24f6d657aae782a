//! User-facing notices

use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;

/// Short toast-style message shown once per surfaced failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub code: ErrorCode,
}
