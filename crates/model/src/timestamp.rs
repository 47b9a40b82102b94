//! Serde helper for store-native instants.
//!
//! Timestamps are written as BSON datetimes (millisecond resolution). Older
//! documents carry epoch seconds, either as a bare integer or as a
//! `{seconds, nanoseconds}` map, so decoding accepts all three encodings.

use bson::{Bson, Document};
use chrono::{DateTime, TimeZone as _, Utc};
use serde::{de, Deserialize as _, Deserializer, Serialize as _, Serializer};

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    bson::DateTime::from_chrono(*value).serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Bson::deserialize(deserializer)?;
    from_bson(&raw).map_err(de::Error::custom)
}

pub fn from_bson(raw: &Bson) -> Result<DateTime<Utc>, String> {
    match raw {
        Bson::DateTime(date_time) => Ok(date_time.to_chrono()),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let seconds = as_int(raw).ok_or_else(|| format!("Invalid timestamp: {}", raw))?;
            from_seconds(seconds, 0)
        }
        Bson::Document(doc) => from_seconds_doc(doc),
        other => Err(format!("Unsupported timestamp encoding: {}", other)),
    }
}

fn from_seconds_doc(doc: &Document) -> Result<DateTime<Utc>, String> {
    let seconds = doc
        .get("seconds")
        .or_else(|| doc.get("_seconds"))
        .and_then(as_int)
        .ok_or_else(|| format!("Timestamp without seconds: {}", doc))?;
    let nanos = doc
        .get("nanoseconds")
        .or_else(|| doc.get("_nanoseconds"))
        .and_then(as_int)
        .unwrap_or(0);
    from_seconds(seconds, nanos)
}

fn from_seconds(seconds: i64, nanos: i64) -> Result<DateTime<Utc>, String> {
    let nanos = u32::try_from(nanos).map_err(|_| format!("Invalid nanoseconds: {}", nanos))?;
    Utc.timestamp_opt(seconds, nanos)
        .single()
        .ok_or_else(|| format!("Timestamp out of range: {}s {}ns", seconds, nanos))
}

fn as_int(raw: &Bson) -> Option<i64> {
    match raw {
        Bson::Int32(value) => Some(i64::from(*value)),
        Bson::Int64(value) => Some(*value),
        Bson::Double(value) if value.fract() == 0.0 => Some(*value as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_native_datetime() {
        let at = Utc.with_ymd_and_hms(2020, 5, 11, 18, 30, 0).single().unwrap();
        let raw = Bson::DateTime(bson::DateTime::from_chrono(at));
        assert_eq!(from_bson(&raw).unwrap(), at);
    }

    #[test]
    fn test_epoch_seconds() {
        let at = Utc.with_ymd_and_hms(2020, 5, 11, 18, 30, 0).single().unwrap();
        assert_eq!(from_bson(&Bson::Int64(at.timestamp())).unwrap(), at);
        assert_eq!(from_bson(&Bson::Double(at.timestamp() as f64)).unwrap(), at);
    }

    #[test]
    fn test_seconds_map() {
        let raw = Bson::Document(doc! { "seconds": 1_589_221_800_i64, "nanoseconds": 500 });
        let at = from_bson(&raw).unwrap();
        assert_eq!(at.timestamp(), 1_589_221_800);
        assert_eq!(at.timestamp_subsec_nanos(), 500);

        let raw = Bson::Document(doc! { "_seconds": 1_589_221_800_i64 });
        assert_eq!(from_bson(&raw).unwrap().timestamp(), 1_589_221_800);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(from_bson(&Bson::String("yesterday".to_owned())).is_err());
        assert!(from_bson(&Bson::Document(doc! { "nanoseconds": 1 })).is_err());
        assert!(from_bson(&Bson::Document(doc! { "seconds": 1, "nanoseconds": -1 })).is_err());
    }
}
