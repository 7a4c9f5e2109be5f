//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Named, time-boxed discount rule.
///
/// This deployment interprets the discount value as a percentage of the
/// subtotal (0-100). The name is stored uppercase and matched
/// case-insensitively.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    id: Uuid,
    name: String,
    percent_off: Decimal,
    expires_at: DateTime<Utc>,
}

impl Coupon {
    pub fn create(name: impl Into<String>, percent_off: Decimal, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into().trim().to_uppercase(),
            percent_off,
            expires_at,
        }
    }

    pub fn from_parts(
        id: Uuid,
        name: String,
        percent_off: Decimal,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            percent_off,
            expires_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn percent_off(&self) -> Decimal {
        self.percent_off
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Usable at `now`: not expired, percentage within [0, 100].
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<()> {
        if self.expires_at < now {
            return Err(StoreError::ExpiredCoupon(self.name.clone()));
        }
        if self.percent_off < Decimal::ZERO || self.percent_off > Decimal::from(100) {
            return Err(StoreError::InvalidDiscount(self.percent_off));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_name_normalized() {
        let c = Coupon::create(" spring20 ", Decimal::from(20), Utc::now());
        assert_eq!(c.name(), "SPRING20");
    }

    #[test]
    fn test_expired_coupon_rejected() {
        let c = Coupon::create("OLD", Decimal::from(10), Utc::now() - Duration::days(1));
        assert!(matches!(
            c.ensure_usable(Utc::now()),
            Err(StoreError::ExpiredCoupon(_))
        ));
    }

    #[test]
    fn test_out_of_range_percentage_rejected() {
        let c = Coupon::create("BIG", Decimal::from(150), Utc::now() + Duration::days(1));
        assert!(matches!(
            c.ensure_usable(Utc::now()),
            Err(StoreError::InvalidDiscount(_))
        ));
    }
}
