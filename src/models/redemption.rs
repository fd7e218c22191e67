//! Represents a redemption code (voucher) that grants account quota.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Lifecycle state of a redemption code.
///
/// Stored and serialized as its integer discriminant so existing clients that
/// speak `1/2/3` keep working.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum RedemptionStatus {
    Unused = 1,
    Disabled = 2,
    Used = 3,
}

impl TryFrom<i32> for RedemptionStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Unused),
            2 => Ok(Self::Disabled),
            3 => Ok(Self::Used),
            other => Err(format!("unknown redemption status {}", other)),
        }
    }
}

impl From<RedemptionStatus> for i32 {
    fn from(status: RedemptionStatus) -> Self {
        status as i32
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unused => "unused",
            Self::Disabled => "disabled",
            Self::Used => "used",
        };
        f.write_str(label)
    }
}

/// A persisted redemption code.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Redemption {
    /// Store-assigned identifier. Never reused after deletion.
    pub id: i64,

    /// Account that created the code.
    #[serde(rename = "user_id")]
    pub owner_id: i64,

    /// Display label, 1 to 20 characters.
    pub name: String,

    /// The redeemable secret. Unique across the store.
    #[serde(rename = "key")]
    pub code: String,

    /// Signed credit amount; negative values debit.
    pub quota: i64,

    pub is_gift: bool,

    /// Redemption limit; `0` means unlimited.
    pub max_uses: i64,

    pub used_count: i64,

    /// Unix seconds, `0` = no lower bound.
    pub valid_from: i64,

    /// Unix seconds, `0` = no upper bound.
    pub valid_until: i64,

    pub status: RedemptionStatus,

    /// Unix seconds at insertion.
    pub created_time: i64,
}

impl Redemption {
    /// Whether the usage limit has been reached. Unlimited codes never exhaust.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses > 0 && self.used_count >= self.max_uses
    }
}

/// Draft of a redemption code before the store assigns an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRedemption {
    pub owner_id: i64,
    pub name: String,
    pub code: String,
    pub quota: i64,
    pub is_gift: bool,
    pub max_uses: i64,
    pub valid_from: i64,
    pub valid_until: i64,
    pub created_time: i64,
}

impl NewRedemption {
    /// Build a draft from the shared creation fields, stamping `created_time` now.
    pub fn from_spec(spec: &CodeSpec, code: impl Into<String>, quota: i64) -> Self {
        Self {
            owner_id: spec.owner_id,
            name: spec.name.clone(),
            code: code.into(),
            quota,
            is_gift: spec.is_gift,
            max_uses: spec.max_uses,
            valid_from: spec.valid_from,
            valid_until: spec.valid_until,
            created_time: Utc::now().timestamp(),
        }
    }
}

/// Fields shared by every code produced in one creation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeSpec {
    pub name: String,
    pub is_gift: bool,
    pub max_uses: i64,
    pub valid_from: i64,
    pub valid_until: i64,
    pub owner_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_integers() {
        assert_eq!(RedemptionStatus::try_from(2), Ok(RedemptionStatus::Disabled));
        assert_eq!(i32::from(RedemptionStatus::Used), 3);
        assert!(RedemptionStatus::try_from(0).is_err());

        let json = serde_json::to_string(&RedemptionStatus::Unused).unwrap();
        assert_eq!(json, "1");
        let err = serde_json::from_str::<RedemptionStatus>("7");
        assert!(err.is_err());
    }

    #[test]
    fn unlimited_codes_never_exhaust() {
        let mut rec = Redemption {
            id: 1,
            owner_id: 1,
            name: "promo".into(),
            code: "abc".into(),
            quota: 10,
            is_gift: false,
            max_uses: 0,
            used_count: 1_000,
            valid_from: 0,
            valid_until: 0,
            status: RedemptionStatus::Unused,
            created_time: 0,
        };
        assert!(!rec.is_exhausted());

        rec.max_uses = 2;
        rec.used_count = 1;
        assert!(!rec.is_exhausted());
        rec.used_count = 2;
        assert!(rec.is_exhausted());
    }
}
