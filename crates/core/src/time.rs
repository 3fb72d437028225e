use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts a `SystemTime` to unix milliseconds, the wire representation used
/// by the document store. Times before the epoch become negative.
#[must_use]
pub fn system_time_to_unix_millis(value: SystemTime) -> i64 {
    match value.duration_since(UNIX_EPOCH) {
        Ok(duration) => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        Err(error) => i64::try_from(error.duration().as_millis())
            .map(|millis| -millis)
            .unwrap_or(i64::MIN),
    }
}

#[must_use]
pub fn unix_millis_to_system_time(value: i64) -> SystemTime {
    let duration = Duration::from_millis(value.unsigned_abs());
    if value >= 0 {
        UNIX_EPOCH + duration
    } else {
        UNIX_EPOCH.checked_sub(duration).unwrap_or(UNIX_EPOCH)
    }
}

/// Serde adapter for `SystemTime` fields serialized as unix milliseconds.
pub mod millis {
    use std::time::SystemTime;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(super::system_time_to_unix_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(super::unix_millis_to_system_time(millis))
    }
}
