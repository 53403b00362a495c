use chrono::{DateTime, Duration, Utc};

/// Offer expiry: a fixed window from creation, never extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: Duration,
}

impl ExpiryPolicy {
    pub const DEFAULT_WINDOW_HOURS: i64 = 48;

    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn expires_at(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.window
    }

    pub fn is_expired(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > expires_at
    }

    pub fn remaining(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (expires_at - now).max(Duration::zero())
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::from_hours(Self::DEFAULT_WINDOW_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::ExpiryPolicy;

    #[test]
    fn default_window_is_48_hours() {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap();
        let policy = ExpiryPolicy::default();

        assert_eq!(policy.expires_at(created), created + Duration::hours(48));
    }

    #[test]
    fn expiry_is_strictly_after_the_deadline() {
        let policy = ExpiryPolicy::default();
        let expires = Utc.with_ymd_and_hms(2025, 6, 4, 9, 30, 0).unwrap();

        assert!(!policy.is_expired(expires, expires));
        assert!(policy.is_expired(expires, expires + Duration::seconds(1)));
    }

    #[test]
    fn remaining_never_goes_negative() {
        let policy = ExpiryPolicy::from_hours(1);
        let expires = Utc.with_ymd_and_hms(2025, 6, 4, 9, 30, 0).unwrap();

        assert_eq!(policy.remaining(expires, expires + Duration::hours(3)), Duration::zero());
        assert_eq!(
            policy.remaining(expires, expires - Duration::minutes(5)),
            Duration::minutes(5)
        );
    }
}
