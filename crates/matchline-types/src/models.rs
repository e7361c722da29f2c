use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Picture assigned by the profile service when the user never uploaded one.
pub const DEFAULT_PROFILE_PICTURE: &str = "uploads/default-profile.png";

/// Storage layout for message timestamps. Fixed width, so lexical order is
/// chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A user profile. Written by the external profile service, read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub bio: String,
    pub age: i32,
    pub gender: String,
    pub looking_for: String,
    /// Comma-separated free text.
    pub interests: String,
    pub location: String,
    pub profile_picture: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Kilometres. When both sides have coordinates, candidates farther
    /// than this are rejected.
    pub preferred_radius: f64,
}

impl User {
    /// Both coordinates, when present and non-zero.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn has_custom_picture(&self) -> bool {
        let pic = self.profile_picture.trim();
        !pic.is_empty() && pic != DEFAULT_PROFILE_PICTURE
    }

    /// Recommendations need a name, bio, interests, location and a positive age.
    pub fn is_profile_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.bio.trim().is_empty()
            && !self.interests.trim().is_empty()
            && !self.location.trim().is_empty()
            && self.age > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            other => Err(format!("unknown connection status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.requester_id == user_id {
            self.target_id
        } else {
            self.requester_id
        }
    }
}

/// The single conversation thread for an unordered pair of users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.user_low == user_id {
            self.user_high
        } else {
            self.user_low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// Orders a pair so that (a, b) and (b, a) map to the same key.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Drops precision below what the store keeps.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Rounds up to the store's precision. A cursor finer than a microsecond
/// still compares correctly against stored values once formatted.
pub fn ceil_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = truncate_timestamp(ts);
    if truncated == ts {
        ts
    } else {
        truncated + Duration::microseconds(1)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp or a client-supplied cursor.
///
/// Accepts any RFC 3339 form. A space where the offset sign should be is read
/// as `+`, since an unescaped `+` in a query string decodes to a space.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(ts.and_utc());
    }
    let repaired = raw.replace(' ', "+");
    DateTime::parse_from_rfc3339(&repaired)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
