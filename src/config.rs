//! UA-level configuration consumed by the session core (§6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which method is used to refresh a session under RFC 4028.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMethod {
    Invite,
    Update,
}

/// UA-level configuration. Deserializable from YAML/JSON so a host
/// application can load it alongside its transport/media configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_timers: bool,
    pub session_timers_refresh_method: RefreshMethod,
    pub min_session_expires: u32,
    pub session_expires: u32,

    #[serde(with = "duration_millis")]
    pub t1: Duration,
    #[serde(with = "duration_millis")]
    pub t2: Duration,
    #[serde(with = "duration_millis")]
    pub timer_h: Duration,

    #[serde(with = "duration_millis")]
    pub dtmf_default_duration: Duration,
    #[serde(with = "duration_millis")]
    pub dtmf_default_inter_tone_gap: Duration,
    #[serde(with = "duration_millis")]
    pub dtmf_min_duration: Duration,
    #[serde(with = "duration_millis")]
    pub dtmf_max_duration: Duration,
    #[serde(with = "duration_millis")]
    pub dtmf_comma_pause: Duration,

    pub no_answer_timeout: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // RFC 3261 §17.1.1.1 defaults: T1 = 500ms, T2 = 4s, Timer H = 64*T1.
        let t1 = Duration::from_millis(500);
        Self {
            session_timers: true,
            session_timers_refresh_method: RefreshMethod::Invite,
            min_session_expires: 90,
            session_expires: 1800,
            t1,
            t2: Duration::from_secs(4),
            timer_h: t1 * 64,
            dtmf_default_duration: Duration::from_millis(100),
            dtmf_default_inter_tone_gap: Duration::from_millis(70),
            dtmf_min_duration: Duration::from_millis(70),
            dtmf_max_duration: Duration::from_millis(6000),
            dtmf_comma_pause: Duration::from_millis(2000),
            no_answer_timeout: 60,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
