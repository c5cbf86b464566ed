//! Zone-aware wall clock for outbound timestamps

use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use tracing::error;

/// Resolves an IANA zone once and stamps events in it
///
/// If the zone cannot be resolved the failure is logged at error level and
/// every call to [`ZoneClock::now`] yields [`ZoneClock::sentinel`] instead.
#[derive(Debug, Clone)]
pub struct ZoneClock {
    name: String,
    zone: Option<Tz>,
}

impl ZoneClock {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let zone = match name.parse::<Tz>() {
            Ok(zone) => Some(zone),
            Err(e) => {
                error!(zone = %name, "Error loading time zone: {}", e);
                None
            }
        };
        Self { name, zone }
    }

    pub fn utc() -> Self {
        Self {
            name: "UTC".to_string(),
            zone: Some(Tz::UTC),
        }
    }

    /// Zone name as configured
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        self.zone.is_some()
    }

    /// Current time in the configured zone
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self.zone {
            Some(zone) => {
                let local = Utc::now().with_timezone(&zone);
                local.with_timezone(&local.offset().fix())
            }
            None => Self::sentinel(),
        }
    }

    /// The "zero" timestamp handed out when the zone is unknown: the Unix epoch in UTC
    pub fn sentinel() -> DateTime<FixedOffset> {
        DateTime::<Utc>::default().with_timezone(&Utc.fix())
    }
}

impl Default for ZoneClock {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_named_zone() {
        let clock = ZoneClock::new("Asia/Dhaka");
        assert!(clock.is_resolved());
        assert_eq!(clock.now().offset().local_minus_utc(), 6 * 3600);
    }

    #[test]
    fn test_unknown_zone_yields_sentinel() {
        let clock = ZoneClock::new("Mars/Olympus_Mons");
        assert!(!clock.is_resolved());
        assert_eq!(clock.now(), ZoneClock::sentinel());
        assert_eq!(clock.now().timestamp(), 0);
        assert_eq!(clock.name(), "Mars/Olympus_Mons");
    }

    #[test]
    fn test_utc_is_current() {
        let before = Utc::now();
        let now = ZoneClock::utc().now();
        assert_eq!(now.offset().local_minus_utc(), 0);
        assert!(now >= before.fixed_offset());
    }
}
