use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::bson::{Bson, Document};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not
/// numeric or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Whether a server reply indicates success, i.e. carries `ok: 1`.
pub(crate) fn is_success(reply: &Document) -> bool {
    reply
        .get("ok")
        .and_then(get_int)
        .map(|ok| ok == 1)
        .unwrap_or(false)
}

pub(crate) fn serialize_duration_option_as_int_millis<S: Serializer>(
    val: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(duration) if duration.as_millis() > i32::MAX as u128 => {
            serializer.serialize_i64(duration.as_millis() as i64)
        }
        Some(duration) => serializer.serialize_i32(duration.as_millis() as i32),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize_duration_option_from_u64_millis<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

#[cfg(test)]
mod test {
    use crate::bson::doc;

    use super::{get_int, is_success};

    #[test]
    fn get_int_coerces_lossless_numerics() {
        assert_eq!(get_int(&crate::bson::Bson::Int32(5)), Some(5));
        assert_eq!(get_int(&crate::bson::Bson::Int64(5)), Some(5));
        assert_eq!(get_int(&crate::bson::Bson::Double(5.0)), Some(5));
        assert_eq!(get_int(&crate::bson::Bson::Double(5.5)), None);
        assert_eq!(get_int(&crate::bson::Bson::String("5".to_string())), None);
    }

    #[test]
    fn is_success_requires_ok_one() {
        assert!(is_success(&doc! { "ok": 1 }));
        assert!(is_success(&doc! { "ok": 1.0 }));
        assert!(!is_success(&doc! { "ok": 0 }));
        assert!(!is_success(&doc! {}));
    }
}
