//! Topup transaction lifecycle states.
//!
//! PENDING -> UNPAID -> one of {PAID, EXPIRED, FAILED}. Transitions are
//! monotonic; a record never leaves a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TopupStatus {
    Pending,
    Unpaid,
    Paid,
    Expired,
    Failed,
}

impl TopupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopupStatus::Pending => "PENDING",
            TopupStatus::Unpaid => "UNPAID",
            TopupStatus::Paid => "PAID",
            TopupStatus::Expired => "EXPIRED",
            TopupStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TopupStatus::Pending),
            "UNPAID" => Some(TopupStatus::Unpaid),
            "PAID" => Some(TopupStatus::Paid),
            "EXPIRED" => Some(TopupStatus::Expired),
            "FAILED" => Some(TopupStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TopupStatus::Paid | TopupStatus::Expired | TopupStatus::Failed
        )
    }

    /// Maps a gateway-reported status string to the terminal state it
    /// implies, if any. UNPAID means "still waiting" and maps to nothing.
    pub fn terminal_from_gateway(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PAID" => Some(TopupStatus::Paid),
            "EXPIRED" => Some(TopupStatus::Expired),
            "FAILED" | "REFUND" => Some(TopupStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TopupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
