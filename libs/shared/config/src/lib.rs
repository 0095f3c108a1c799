use std::env;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::warn;

pub const DEFAULT_SLOT_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// IANA zone all wall-clock schedules are interpreted in.
    pub clinic_timezone: Tz,
    pub slot_duration_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            clinic_timezone: env::var("CLINIC_TIMEZONE")
                .ok()
                .and_then(|name| {
                    name.parse::<Tz>()
                        .map_err(|_| warn!("CLINIC_TIMEZONE '{}' is not a valid IANA zone, using UTC", name))
                        .ok()
                })
                .unwrap_or(Tz::UTC),
            slot_duration_minutes: env::var("SLOT_DURATION_MINUTES")
                .ok()
                .and_then(|raw| {
                    raw.parse::<i64>()
                        .map_err(|_| warn!("SLOT_DURATION_MINUTES '{}' is not a number, using default", raw))
                        .ok()
                })
                .filter(|minutes| {
                    if *minutes > 0 {
                        true
                    } else {
                        warn!("SLOT_DURATION_MINUTES must be positive, using default");
                        false
                    }
                })
                .unwrap_or(DEFAULT_SLOT_DURATION_MINUTES),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.slot_duration_minutes)
    }
}
