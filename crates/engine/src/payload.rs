//! Payload translation: records to human-readable pushes.
//!
//! The title table and the vibration profiles are rendered by the companion
//! web client; their values must stay exactly as they are.

use std::collections::BTreeMap;

use relay_common::types::{MessageContent, MessageRecord, NotificationRecord, NotificationType, VibrationProfile};
use relay_notifier::PushPayload;

/// Body used when a notification carries no message text.
pub const DEFAULT_BODY: &str = "You have a new notification!";

/// Maximum characters of message text shown before truncation.
pub const MESSAGE_PREVIEW_CHARS: usize = 80;

/// Display name used when the sender has no profile.
pub const FALLBACK_SENDER_NAME: &str = "Someone";

/// Deep link opened by direct-message pushes.
pub const MESSAGES_DEEP_LINK: &str = "/?section=messages";

/// Title for a known notification category.
pub fn title_for(kind: &NotificationType) -> Option<&'static str> {
    let title = match kind {
        NotificationType::Pm => "💬 New Message",
        NotificationType::Like => "❤️ Someone liked your post",
        NotificationType::Comment => "💬 New comment on your post",
        NotificationType::Share => "🔁 Someone shared your post",
        NotificationType::Mention => "🏷️ You were mentioned",
        NotificationType::Follow => "👤 New Follower",
        NotificationType::Bingo => "🎱 BINGO CALL!",
        NotificationType::GameSoon => "⏰ Game is starting soon!",
        NotificationType::Win => "🏆 You won!",
        NotificationType::Coins => "🪙 You received Coins!",
        NotificationType::Promo => "🎟️ You have a special promo!",
        NotificationType::System => "📢 Admin Announcement",
        NotificationType::Gift => "🎁 You received a Gift!",
        NotificationType::Other(_) => return None,
    };
    Some(title)
}

/// Vibration pattern and interaction requirement for a category.
pub fn vibration_profile(kind: &NotificationType) -> VibrationProfile {
    let (vibrate, require_interaction): (&[u32], bool) = match kind {
        NotificationType::Pm => (&[100, 50, 100], true),
        NotificationType::Bingo => (&[300, 100, 300, 100, 300, 100, 300], true),
        NotificationType::GameSoon => (&[200, 100, 200, 100, 200], true),
        NotificationType::Win => (&[100, 50, 100, 50, 100, 50, 400], true),
        NotificationType::Like => (&[100], false),
        NotificationType::Comment => (&[100, 50, 100], false),
        NotificationType::Follow => (&[100, 50, 100], false),
        NotificationType::Coins => (&[100, 50, 100, 50, 200], false),
        NotificationType::Promo => (&[200, 100, 200], true),
        NotificationType::System => (&[200, 100, 200], false),
        // share, mention, gift and unknown categories
        _ => (&[200, 100, 200], false),
    };
    VibrationProfile {
        vibrate: vibrate.to_vec(),
        require_interaction,
    }
}

/// Cut `text` to [`MESSAGE_PREVIEW_CHARS`] characters, appending `...` when cut.
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(MESSAGE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Body line for a direct message, by content priority.
pub fn message_body(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => truncate_preview(text),
        MessageContent::Image(_) => "📷 Sent a photo".to_string(),
        MessageContent::Audio(_) => "🎙️ Sent a voice note".to_string(),
        MessageContent::Sticker => "😄 Sent a sticker".to_string(),
        MessageContent::Empty => "Sent you a message".to_string(),
    }
}

/// Builds push payloads from feed records.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    fallback_title: String,
}

impl PayloadBuilder {
    pub fn new(app_name: &str) -> Self {
        Self {
            fallback_title: format!("🔔 {}", app_name),
        }
    }

    pub fn notification(&self, record: &NotificationRecord) -> PushPayload {
        let title = title_for(&record.kind)
            .map(str::to_string)
            .unwrap_or_else(|| self.fallback_title.clone());
        let body = record
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_BODY.to_string());

        let mut data = BTreeMap::new();
        data.insert("type".to_string(), record.kind.to_string());
        data.insert("senderUid".to_string(), record.sender_uid.clone().unwrap_or_default());
        data.insert("postKey".to_string(), record.post_key.clone().unwrap_or_default());
        data.insert("url".to_string(), record.url.clone().unwrap_or_else(|| "/".to_string()));

        PushPayload {
            title,
            body,
            data,
            profile: vibration_profile(&record.kind),
        }
    }

    pub fn message(&self, record: &MessageRecord, sender_name: &str) -> PushPayload {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), NotificationType::Pm.to_string());
        data.insert("senderUid".to_string(), record.sender_uid.clone());
        data.insert("url".to_string(), MESSAGES_DEEP_LINK.to_string());

        PushPayload {
            title: format!("💬 {}", sender_name),
            body: message_body(&record.content),
            data,
            profile: vibration_profile(&NotificationType::Pm),
        }
    }

    /// Manual test push sent from the HTTP surface.
    pub fn test_push(&self, title: Option<&str>, body: Option<&str>) -> PushPayload {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), NotificationType::System.to_string());

        PushPayload {
            title: title.filter(|t| !t.is_empty()).unwrap_or("🔔 Test").to_string(),
            body: body.filter(|b| !b.is_empty()).unwrap_or("Push is working!").to_string(),
            data,
            profile: vibration_profile(&NotificationType::System),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: NotificationType, message: Option<&str>) -> NotificationRecord {
        NotificationRecord {
            owner_uid: "u1".to_string(),
            record_id: "n1".to_string(),
            path: "notifications/u1/n1".to_string(),
            kind,
            message: message.map(str::to_string),
            sender_uid: None,
            post_key: None,
            url: None,
            created_at: 0,
            delivered: false,
        }
    }

    #[test]
    fn test_truncation_law() {
        let exact = "x".repeat(80);
        assert_eq!(truncate_preview(&exact), exact);

        let long = "y".repeat(85);
        let preview = truncate_preview(&long);
        assert_eq!(preview, format!("{}...", "y".repeat(80)));
        assert_eq!(preview.chars().count(), 83);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let text = "🎱".repeat(81);
        let preview = truncate_preview(&text);
        assert_eq!(preview.chars().count(), 83);
        assert!(preview.starts_with(&"🎱".repeat(80)));
    }

    #[test]
    fn test_bingo_notification_payload() {
        let builder = PayloadBuilder::new("Radio Bingo Live");
        let payload = builder.notification(&notification(NotificationType::Bingo, Some("B-7!")));
        assert!(payload.title.contains("BINGO"));
        assert_eq!(payload.body, "B-7!");
        assert_eq!(payload.data["type"], "bingo");
        assert_eq!(payload.data["senderUid"], "");
        assert_eq!(payload.data["postKey"], "");
        assert_eq!(payload.data["url"], "/");
        assert!(payload.profile.require_interaction);
        assert_eq!(payload.profile.vibrate, vec![300, 100, 300, 100, 300, 100, 300]);
    }

    #[test]
    fn test_unknown_type_gets_fallback_title_and_profile() {
        let builder = PayloadBuilder::new("Radio Bingo Live");
        let payload =
            builder.notification(&notification(NotificationType::Other("raffle".to_string()), None));
        assert_eq!(payload.title, "🔔 Radio Bingo Live");
        assert_eq!(payload.body, DEFAULT_BODY);
        assert_eq!(payload.data["type"], "raffle");
        assert_eq!(payload.profile.vibrate, vec![200, 100, 200]);
        assert!(!payload.profile.require_interaction);
    }

    #[test]
    fn test_social_types_do_not_force_interaction() {
        for kind in [NotificationType::Like, NotificationType::Comment, NotificationType::Follow] {
            assert!(!vibration_profile(&kind).require_interaction, "{}", kind);
        }
        for kind in [
            NotificationType::Pm,
            NotificationType::Bingo,
            NotificationType::GameSoon,
            NotificationType::Win,
        ] {
            assert!(vibration_profile(&kind).require_interaction, "{}", kind);
        }
    }

    #[test]
    fn test_message_payload() {
        let builder = PayloadBuilder::new("Radio Bingo Live");
        let record = MessageRecord {
            record_id: "m1".to_string(),
            path: "messages/m1".to_string(),
            sender_uid: "A".to_string(),
            recipient_uid: "B".to_string(),
            content: MessageContent::Audio("aud://1".to_string()),
            created_at: 0,
            delivered: false,
        };
        let payload = builder.message(&record, "Ana");
        assert_eq!(payload.title, "💬 Ana");
        assert_eq!(payload.body, "🎙️ Sent a voice note");
        assert_eq!(payload.data["type"], "pm");
        assert_eq!(payload.data["senderUid"], "A");
        assert_eq!(payload.data["url"], MESSAGES_DEEP_LINK);
        assert!(!payload.data.contains_key("postKey"));
    }

    #[test]
    fn test_message_placeholders() {
        assert_eq!(message_body(&MessageContent::Image("x".to_string())), "📷 Sent a photo");
        assert_eq!(message_body(&MessageContent::Sticker), "😄 Sent a sticker");
        assert_eq!(message_body(&MessageContent::Empty), "Sent you a message");
    }

    #[test]
    fn test_test_push_defaults() {
        let payload = PayloadBuilder::new("Radio Bingo Live").test_push(None, Some(""));
        assert_eq!(payload.title, "🔔 Test");
        assert_eq!(payload.body, "Push is working!");
        assert_eq!(payload.data["type"], "system");
    }
}
