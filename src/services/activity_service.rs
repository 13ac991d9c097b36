use axum::http::HeaderMap;
use chrono::Utc;
use mongodb::{
    bson::{oid::ObjectId, Document},
    Collection, Database,
};

use crate::models::activity::{Activity, COLLECTION};

/// Builder for an activity log entry.
#[derive(Debug, Clone)]
pub struct NewActivity {
    user: Option<ObjectId>,
    action: String,
    target_type: Option<String>,
    target_id: Option<String>,
    metadata: Option<Document>,
    ip: Option<String>,
    user_agent: Option<String>,
}

impl NewActivity {
    pub fn new(action: impl Into<String>) -> Self {
        NewActivity {
            user: None,
            action: action.into(),
            target_type: None,
            target_id: None,
            metadata: None,
            ip: None,
            user_agent: None,
        }
    }

    pub fn by(mut self, user: ObjectId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn target(mut self, kind: &str, id: impl ToString) -> Self {
        self.target_type = Some(kind.to_string());
        self.target_id = Some(id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn request(mut self, headers: &HeaderMap) -> Self {
        self.ip = client_ip(headers);
        self.user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self
    }

    fn into_activity(self) -> Activity {
        Activity {
            id: ObjectId::new(),
            user: self.user,
            action: self.action,
            target_type: self.target_type,
            target_id: self.target_id,
            metadata: self.metadata,
            ip: self.ip,
            user_agent: self.user_agent,
            created_at: Utc::now(),
        }
    }
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

/// Writes the entry. Failures are logged and swallowed so that logging never
/// fails the request that triggered it.
pub async fn record(db: &Database, entry: NewActivity) {
    let collection: Collection<Activity> = db.collection(COLLECTION);
    let activity = entry.into_activity();
    if let Err(e) = collection.insert_one(&activity).await {
        tracing::warn!(action = %activity.action, "Failed to record activity: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use mongodb::bson::doc;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn builder_fills_every_field() {
        let user = ObjectId::new();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        let activity = NewActivity::new("booking.create")
            .by(user)
            .target("Booking", "abc")
            .metadata(doc! { "gig": "g1" })
            .request(&headers)
            .into_activity();

        assert_eq!(activity.user, Some(user));
        assert_eq!(activity.target_type.as_deref(), Some("Booking"));
        assert_eq!(activity.target_id.as_deref(), Some("abc"));
        assert_eq!(activity.user_agent.as_deref(), Some("curl/8.0"));
        assert!(activity.ip.is_none());
    }
}
