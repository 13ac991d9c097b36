//! Serde helpers for storing optional `chrono` timestamps as BSON dates.
//!
//! Required timestamps use `bson::serde_helpers::chrono_datetime_as_bson_datetime`
//! directly; this module covers the `Option` case the bson crate leaves out.

pub mod optional {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<bson::DateTime>::deserialize(deserializer).map(|v| v.map(|dt| dt.to_chrono()))
    }
}
