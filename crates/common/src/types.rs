use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Category of an in-app notification, as written by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Pm,
    Like,
    Comment,
    Share,
    Mention,
    Follow,
    Bingo,
    GameSoon,
    Win,
    Coins,
    Promo,
    System,
    Gift,
    /// A category this relay does not know about; carried through verbatim.
    Other(String),
}

impl NotificationType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pm" => NotificationType::Pm,
            "like" => NotificationType::Like,
            "comment" => NotificationType::Comment,
            "share" => NotificationType::Share,
            "mention" => NotificationType::Mention,
            "follow" => NotificationType::Follow,
            "bingo" => NotificationType::Bingo,
            "game_soon" => NotificationType::GameSoon,
            "win" => NotificationType::Win,
            "coins" => NotificationType::Coins,
            "promo" => NotificationType::Promo,
            "system" => NotificationType::System,
            "gift" => NotificationType::Gift,
            other => NotificationType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Pm => "pm",
            NotificationType::Like => "like",
            NotificationType::Comment => "comment",
            NotificationType::Share => "share",
            NotificationType::Mention => "mention",
            NotificationType::Follow => "follow",
            NotificationType::Bingo => "bingo",
            NotificationType::GameSoon => "game_soon",
            NotificationType::Win => "win",
            NotificationType::Coins => "coins",
            NotificationType::Promo => "promo",
            NotificationType::System => "system",
            NotificationType::Gift => "gift",
            NotificationType::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Haptic pattern and persistence hint for a web-push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VibrationProfile {
    /// Alternating on/off durations in milliseconds
    pub vibrate: Vec<u32>,
    /// Whether the notification stays until the user dismisses it
    pub require_interaction: bool,
}

/// Reasons a raw child value is rejected at the feed boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("record field `{0}` is not a scalar")]
    WrongType(&'static str),
}

/// A notification written under `notifications/{owner}/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub owner_uid: String,
    pub record_id: String,
    /// Full store path of the record, used for the delivered-flag write
    pub path: String,
    pub kind: NotificationType,
    pub message: Option<String>,
    pub sender_uid: Option<String>,
    pub post_key: Option<String>,
    pub url: Option<String>,
    /// Creation time in epoch milliseconds (`time`)
    pub created_at: i64,
    /// The `pushed` flag
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    msg: Option<Value>,
    #[serde(default)]
    from: Option<Value>,
    #[serde(default)]
    post_key: Option<Value>,
    #[serde(default)]
    url: Option<Value>,
    #[serde(default, deserialize_with = "lenient_millis")]
    time: Option<i64>,
    #[serde(default)]
    pushed: Option<Value>,
}

impl NotificationRecord {
    /// Validate a raw child value from the notifications feed.
    pub fn from_child(
        owner_uid: &str,
        record_id: &str,
        path: &str,
        value: &Value,
    ) -> Result<Self, RecordError> {
        if !value.is_object() {
            return Err(RecordError::NotAnObject);
        }
        let raw: RawNotification =
            serde_json::from_value(value.clone()).map_err(|_| RecordError::NotAnObject)?;
        let created_at = raw.time.ok_or(RecordError::MissingField("time"))?;

        Ok(Self {
            owner_uid: owner_uid.to_string(),
            record_id: record_id.to_string(),
            path: path.to_string(),
            kind: text_field(raw.kind, "type")?
                .map(|k| NotificationType::parse(&k))
                .unwrap_or(NotificationType::System),
            message: text_field(raw.msg, "msg")?,
            sender_uid: text_field(raw.from, "from")?,
            post_key: text_field(raw.post_key, "postKey")?,
            url: text_field(raw.url, "url")?,
            created_at,
            delivered: raw.pushed.as_ref().is_some_and(is_truthy),
        })
    }
}

/// What a direct message carries, resolved in display priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Image(String),
    Audio(String),
    Sticker,
    Empty,
}

/// A direct message written under `messages/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub record_id: String,
    pub path: String,
    pub sender_uid: String,
    pub recipient_uid: String,
    pub content: MessageContent,
    /// Creation time in epoch milliseconds (`timestamp`)
    pub created_at: i64,
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    from: Option<Value>,
    #[serde(default)]
    to: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    image: Option<Value>,
    #[serde(default)]
    audio: Option<Value>,
    #[serde(default)]
    is_sticker: Option<Value>,
    #[serde(default, deserialize_with = "lenient_millis")]
    timestamp: Option<i64>,
    #[serde(default)]
    pushed: Option<Value>,
}

impl MessageRecord {
    /// Validate a raw child value from the messages feed.
    pub fn from_child(record_id: &str, path: &str, value: &Value) -> Result<Self, RecordError> {
        if !value.is_object() {
            return Err(RecordError::NotAnObject);
        }
        let raw: RawMessage =
            serde_json::from_value(value.clone()).map_err(|_| RecordError::NotAnObject)?;

        let sender_uid = text_field(raw.from, "from")?.ok_or(RecordError::MissingField("from"))?;
        let recipient_uid = text_field(raw.to, "to")?.ok_or(RecordError::MissingField("to"))?;
        let created_at = raw.timestamp.ok_or(RecordError::MissingField("timestamp"))?;

        let content = if let Some(text) = text_field(raw.text, "text")? {
            MessageContent::Text(text)
        } else if let Some(image) = raw.image.as_ref().filter(|v| is_truthy(v)) {
            MessageContent::Image(value_as_ref(image))
        } else if let Some(audio) = raw.audio.as_ref().filter(|v| is_truthy(v)) {
            MessageContent::Audio(value_as_ref(audio))
        } else if raw.is_sticker.as_ref().is_some_and(is_truthy) {
            MessageContent::Sticker
        } else {
            MessageContent::Empty
        };

        Ok(Self {
            record_id: record_id.to_string(),
            path: path.to_string(),
            sender_uid,
            recipient_uid,
            content,
            created_at,
            delivered: raw.pushed.as_ref().is_some_and(is_truthy),
        })
    }

    pub fn is_self_message(&self) -> bool {
        self.sender_uid == self.recipient_uid
    }
}

/// A record observed on one of the change feeds.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRecord {
    Notification(NotificationRecord),
    Message(MessageRecord),
}

impl FeedRecord {
    pub fn created_at(&self) -> i64 {
        match self {
            FeedRecord::Notification(n) => n.created_at,
            FeedRecord::Message(m) => m.created_at,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FeedRecord::Notification(n) => &n.path,
            FeedRecord::Message(m) => &m.path,
        }
    }
}

/// A user profile stored at `users/{uid}`.
///
/// Only a malformed `fcmToken` makes a profile unreadable; a `name` that is
/// not a string is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "string_or_none")]
    pub name: Option<String>,

    #[serde(default, rename = "fcmToken")]
    pub fcm_token: Option<String>,
}

impl UserProfile {
    /// The current device token, if the user has granted push permission.
    pub fn device_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Loose truthiness for flags written by a dynamically typed client.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Coerce an optional scalar field to non-empty text.
///
/// Numbers and booleans are rendered as JSON text; arrays and objects are
/// rejected.
fn text_field(value: Option<Value>, field: &'static str) -> Result<Option<String>, RecordError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(_)) | Some(Value::Object(_)) => return Err(RecordError::WrongType(field)),
        Some(scalar) => value_as_ref(&scalar),
    };
    Ok(Some(text).filter(|s| !s.is_empty()))
}

fn value_as_ref(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Accept integer or floating-point epoch millis.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_defaults_to_system_type() {
        let record = NotificationRecord::from_child(
            "u1",
            "n1",
            "notifications/u1/n1",
            &json!({ "msg": "hello", "time": 42 }),
        )
        .unwrap();
        assert_eq!(record.kind, NotificationType::System);
        assert_eq!(record.message.as_deref(), Some("hello"));
        assert!(!record.delivered);
    }

    #[test]
    fn test_notification_requires_time() {
        let err = NotificationRecord::from_child("u1", "n1", "p", &json!({ "type": "like" }))
            .unwrap_err();
        assert_eq!(err, RecordError::MissingField("time"));
    }

    #[test]
    fn test_notification_rejects_scalar() {
        let err = NotificationRecord::from_child("u1", "n1", "p", &json!("oops")).unwrap_err();
        assert_eq!(err, RecordError::NotAnObject);
    }

    #[test]
    fn test_notification_float_time_and_pushed_flag() {
        let record = NotificationRecord::from_child(
            "u1",
            "n1",
            "p",
            &json!({ "type": "bingo", "time": 1700000000000.0, "pushed": true }),
        )
        .unwrap();
        assert_eq!(record.created_at, 1_700_000_000_000);
        assert_eq!(record.kind, NotificationType::Bingo);
        assert!(record.delivered);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        assert_eq!(
            NotificationType::parse("raffle"),
            NotificationType::Other("raffle".to_string())
        );
        assert_eq!(NotificationType::parse("raffle").as_str(), "raffle");
        assert_eq!(NotificationType::parse("game_soon"), NotificationType::GameSoon);
    }

    #[test]
    fn test_message_requires_recipient() {
        let err = MessageRecord::from_child("m1", "messages/m1", &json!({ "from": "a", "timestamp": 1 }))
            .unwrap_err();
        assert_eq!(err, RecordError::MissingField("to"));
    }

    #[test]
    fn test_message_empty_sender_is_missing() {
        let err = MessageRecord::from_child(
            "m1",
            "messages/m1",
            &json!({ "from": "", "to": "b", "timestamp": 1 }),
        )
        .unwrap_err();
        assert_eq!(err, RecordError::MissingField("from"));
    }

    #[test]
    fn test_message_content_priority() {
        let record = MessageRecord::from_child(
            "m1",
            "messages/m1",
            &json!({ "from": "a", "to": "b", "timestamp": 1, "text": "", "image": "img://1", "isSticker": true }),
        )
        .unwrap();
        assert_eq!(record.content, MessageContent::Image("img://1".to_string()));

        let record = MessageRecord::from_child(
            "m2",
            "messages/m2",
            &json!({ "from": "a", "to": "b", "timestamp": 1, "isSticker": true }),
        )
        .unwrap();
        assert_eq!(record.content, MessageContent::Sticker);
    }

    #[test]
    fn test_self_message_detected() {
        let record = MessageRecord::from_child(
            "m1",
            "messages/m1",
            &json!({ "from": "a", "to": "a", "timestamp": 1, "text": "me" }),
        )
        .unwrap();
        assert!(record.is_self_message());
    }

    #[test]
    fn test_notification_scalar_fields_coerced_to_text() {
        let record = NotificationRecord::from_child(
            "u1",
            "n1",
            "p",
            &json!({ "type": "like", "msg": "hi", "postKey": 42, "from": 7, "time": 10 }),
        )
        .unwrap();
        assert_eq!(record.post_key.as_deref(), Some("42"));
        assert_eq!(record.sender_uid.as_deref(), Some("7"));
        assert_eq!(record.message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_notification_structured_field_is_wrong_type() {
        let err = NotificationRecord::from_child(
            "u1",
            "n1",
            "p",
            &json!({ "type": "like", "url": { "href": "/" }, "time": 10 }),
        )
        .unwrap_err();
        assert_eq!(err, RecordError::WrongType("url"));
    }

    #[test]
    fn test_message_numeric_text_coerced() {
        let record = MessageRecord::from_child(
            "m1",
            "messages/m1",
            &json!({ "from": "a", "to": "b", "timestamp": 1, "text": 12345 }),
        )
        .unwrap();
        assert_eq!(record.content, MessageContent::Text("12345".to_string()));
    }

    #[test]
    fn test_profile_with_non_string_name_keeps_token() {
        let profile: UserProfile = serde_json::from_value(json!({ "name": 7, "fcmToken": "TB" })).unwrap();
        assert_eq!(profile.display_name(), None);
        assert_eq!(profile.device_token(), Some("TB"));
    }

    #[test]
    fn test_profile_token_ignores_empty() {
        let profile: UserProfile = serde_json::from_value(json!({ "name": "Ana", "fcmToken": "" })).unwrap();
        assert_eq!(profile.device_token(), None);
        assert_eq!(profile.display_name(), Some("Ana"));

        let profile: UserProfile = serde_json::from_value(json!({ "fcmToken": null, "coins": 5 })).unwrap();
        assert_eq!(profile.device_token(), None);
    }
}
