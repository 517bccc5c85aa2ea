//! Submission throttling for the contact form.
//!
//! Two independent cool-down windows apply: one per email address and a
//! shorter one per IP address. The email window is checked first and wins
//! when both are violated, so a decision names a single blocking reason.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const MINUTE_S: u64 = 60;
pub const FIVE_MINUTES_S: u64 = MINUTE_S * 5;
pub const HOUR_S: u64 = MINUTE_S * 60;
pub const HALF_HOUR_S: u64 = HOUR_S / 2;
pub const DAY_S: u64 = HOUR_S * 24;
pub const WEEK_S: u64 = DAY_S * 7;
pub const MONTH_S: u64 = DAY_S * 30;
pub const YEAR_S: u64 = DAY_S * 365;

/// Outcome of a rate-limit check. `wait_time` is in seconds and only
/// present when `can_send` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendStatus {
    pub can_send: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wait_time: Option<u64>,
}

impl SendStatus {
    pub fn allowed() -> Self {
        SendStatus { can_send: true, wait_time: None }
    }

    pub fn wait(seconds: u64) -> Self {
        SendStatus { can_send: false, wait_time: Some(seconds) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Minimum seconds between two messages from the same email address.
    pub email_window: u64,
    /// Minimum seconds between two messages from the same IP address.
    pub ip_window: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            email_window: HALF_HOUR_S,
            ip_window: FIVE_MINUTES_S,
        }
    }
}

/// Whole seconds from `last` to `now`; a `last` in the future counts as zero.
pub fn elapsed_seconds(now: NaiveDateTime, last: NaiveDateTime) -> u64 {
    (now - last).num_seconds().max(0) as u64
}

impl RateLimitPolicy {
    /// Decides from elapsed seconds. `None` means no prior message, which
    /// satisfies the window.
    pub fn decide(&self, since_email: Option<u64>, since_ip: Option<u64>) -> SendStatus {
        if let Some(elapsed) = since_email {
            if elapsed < self.email_window {
                return SendStatus::wait(self.email_window - elapsed);
            }
        }
        if let Some(elapsed) = since_ip {
            if elapsed < self.ip_window {
                return SendStatus::wait(self.ip_window - elapsed);
            }
        }
        SendStatus::allowed()
    }

    /// Decides from the latest submission times, measured against `now`.
    pub fn evaluate(
        &self,
        now: NaiveDateTime,
        last_email: Option<NaiveDateTime>,
        last_ip: Option<NaiveDateTime>,
    ) -> SendStatus {
        self.decide(
            last_email.map(|last| elapsed_seconds(now, last)),
            last_ip.map(|last| elapsed_seconds(now, last)),
        )
    }
}
