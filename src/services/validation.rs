//! Pure validation for redemption-code requests.
//!
//! Nothing here touches the store; every check runs before a mutation.

use crate::models::redemption::{CodeSpec, Redemption, RedemptionStatus};
use thiserror::Error;

pub const NAME_MIN_CHARS: usize = 1;
pub const NAME_MAX_CHARS: usize = 20;
pub const BATCH_MIN: usize = 1;
pub const BATCH_MAX: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must be between 1 and 20 characters, got {0}")]
    NameLength(usize),
    #[error("valid_from ({from}) must be earlier than valid_until ({until})")]
    InvalidWindow { from: i64, until: i64 },
    #[error("validity bounds must not be negative")]
    NegativeBound,
    #[error("count must be between 1 and 100, got {0}")]
    InvalidCount(usize),
    #[error("min_quota ({min}) must not exceed max_quota ({max})")]
    InvalidRange { min: i64, max: i64 },
    #[error("max_uses must not be negative, got {0}")]
    NegativeMaxUses(i64),
    #[error("code must not be empty")]
    EmptyCode,
    #[error("name must not be empty")]
    EmptyName,
    #[error("id list must not be empty")]
    EmptyIds,
}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// Length is counted in Unicode scalar values, not bytes.
pub fn validate_name(name: &str) -> ValidationResult {
    let len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        return Err(ValidationError::NameLength(len));
    }
    Ok(())
}

/// A zero bound on either side is unbounded and always legal.
pub fn validate_window(valid_from: i64, valid_until: i64) -> ValidationResult {
    if valid_from < 0 || valid_until < 0 {
        return Err(ValidationError::NegativeBound);
    }
    if valid_from > 0 && valid_until > 0 && valid_from >= valid_until {
        return Err(ValidationError::InvalidWindow {
            from: valid_from,
            until: valid_until,
        });
    }
    Ok(())
}

pub fn validate_count(count: usize) -> ValidationResult {
    if !(BATCH_MIN..=BATCH_MAX).contains(&count) {
        return Err(ValidationError::InvalidCount(count));
    }
    Ok(())
}

pub fn validate_quota_range(min_quota: i64, max_quota: i64) -> ValidationResult {
    if min_quota > max_quota {
        return Err(ValidationError::InvalidRange {
            min: min_quota,
            max: max_quota,
        });
    }
    Ok(())
}

/// `0` is unlimited; only negatives are rejected.
pub fn validate_max_uses(max_uses: i64) -> ValidationResult {
    if max_uses < 0 {
        return Err(ValidationError::NegativeMaxUses(max_uses));
    }
    Ok(())
}

/// Name-scoped bulk operations never treat an empty name as "match all".
pub fn require_name(name: &str) -> ValidationResult {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

pub fn require_ids(ids: &[i64]) -> ValidationResult {
    if ids.is_empty() {
        return Err(ValidationError::EmptyIds);
    }
    Ok(())
}

/// Checks shared by every creation path.
pub fn validate_spec(spec: &CodeSpec) -> ValidationResult {
    validate_name(&spec.name)?;
    validate_window(spec.valid_from, spec.valid_until)?;
    validate_max_uses(spec.max_uses)
}

/// Why a stored code cannot be redeemed right now.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedeemBlock {
    #[error("code is {0}")]
    NotUnused(RedemptionStatus),
    #[error("code is not valid yet")]
    NotYetValid,
    #[error("code has expired")]
    Expired,
    #[error("code has no uses left")]
    Exhausted,
}

/// Whether `record` may be redeemed at Unix time `now`.
pub fn check_redeemable(record: &Redemption, now: i64) -> Result<(), RedeemBlock> {
    if record.status != RedemptionStatus::Unused {
        return Err(RedeemBlock::NotUnused(record.status));
    }
    if record.valid_from > 0 && now < record.valid_from {
        return Err(RedeemBlock::NotYetValid);
    }
    if record.valid_until > 0 && now >= record.valid_until {
        return Err(RedeemBlock::Expired);
    }
    if record.is_exhausted() {
        return Err(RedeemBlock::Exhausted);
    }
    Ok(())
}
