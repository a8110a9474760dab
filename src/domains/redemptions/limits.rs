use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::models::{LimitScope, Offer, RedemptionError};

/// Counters an offer's limits are checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimitUsage {
    /// All redemptions of the offer.
    pub total: i64,
    /// Redemptions of the offer inside the current daily window.
    pub today: i64,
    /// Redemptions of the offer by the claiming user.
    pub by_user: i64,
}

/// Fails with the first limit that is already reached. Used both to gate
/// issuance and inside the atomic redeem.
pub fn check_limits(offer: &Offer, usage: &LimitUsage) -> Result<(), RedemptionError> {
    let checks = [
        (LimitScope::Total, offer.total_limit, usage.total),
        (LimitScope::Daily, offer.daily_limit, usage.today),
        (LimitScope::PerUser, offer.per_user_limit, usage.by_user),
    ];

    for (scope, limit, used) in checks {
        if let Some(limit) = limit {
            if used >= limit as i64 {
                return Err(RedemptionError::LimitReached { scope, limit });
            }
        }
    }
    Ok(())
}

/// UTC bounds of the local calendar day containing `now` in `tz`.
pub fn day_window(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = now.with_timezone(&tz).date_naive();
    let start = local_midnight(local_date, tz);
    let end = local_date
        .succ_opt()
        .map(|next| local_midnight(next, tz))
        .unwrap_or_else(|| start + Duration::days(1));
    (start, end)
}

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    // Zones that skip midnight on DST days start the day at the first valid
    // local instant.
    (0..3)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn offer() -> Offer {
        Offer {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            title: "Free dessert".to_string(),
            terms: None,
            starts_at: Utc::now() - Duration::days(1),
            ends_at: None,
            savings_amount: Decimal::new(500, 2),
            total_limit: None,
            daily_limit: None,
            per_user_limit: None,
            redeemed_count: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_unlimited_offer_passes() {
        let usage = LimitUsage { total: 10_000, today: 500, by_user: 40 };
        assert!(check_limits(&offer(), &usage).is_ok());
    }

    #[test]
    fn test_total_limit() {
        let mut o = offer();
        o.total_limit = Some(3);
        assert!(check_limits(&o, &LimitUsage { total: 2, ..Default::default() }).is_ok());
        assert_eq!(
            check_limits(&o, &LimitUsage { total: 3, ..Default::default() }),
            Err(RedemptionError::LimitReached { scope: LimitScope::Total, limit: 3 })
        );
    }

    #[test]
    fn test_daily_and_per_user_limits() {
        let mut o = offer();
        o.daily_limit = Some(5);
        o.per_user_limit = Some(1);

        let err = check_limits(&o, &LimitUsage { total: 7, today: 5, by_user: 0 }).unwrap_err();
        assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::Daily, limit: 5 });

        let err = check_limits(&o, &LimitUsage { total: 7, today: 1, by_user: 1 }).unwrap_err();
        assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::PerUser, limit: 1 });
    }

    #[test]
    fn test_day_window_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 17, 45, 0).unwrap();
        let (start, end) = day_window(now, chrono_tz::UTC);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_window_local_zone() {
        // 02:00 UTC is still the previous evening in Panama (UTC-5).
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 2, 0, 0).unwrap();
        let (start, end) = day_window(now, chrono_tz::America::Panama);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 5, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_day_window_dst_day_is_23_hours() {
        // US spring-forward.
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 18, 0, 0).unwrap();
        let (start, end) = day_window(now, chrono_tz::America::New_York);
        assert_eq!(end - start, Duration::hours(23));
    }
}
