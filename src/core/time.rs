//! Shared timestamp/event helpers and the injectable engine clock.

use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use ulid::Ulid;

pub const SECS_PER_DAY: u64 = 86_400;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    epoch_z(SystemClock.now_secs())
}

pub fn epoch_z(secs: u64) -> String {
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Unix day number of an epoch-seconds timestamp.
pub fn day_index(secs: u64) -> i64 {
    (secs / SECS_PER_DAY) as i64
}

/// Source of "now" for every engine decision that depends on time
/// (streak days, recurrence instances, rate-limit windows).
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;

    fn now_z(&self) -> String {
        epoch_z(self.now_secs())
    }

    fn today(&self) -> i64 {
        day_index(self.now_secs())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock {
    secs: AtomicU64,
}

impl FixedClock {
    pub fn at(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.advance(days * SECS_PER_DAY);
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
