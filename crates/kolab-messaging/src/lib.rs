use regex::Regex;
use uuid::Uuid;

use kolab_core::{Attachment, Conversation, DealError, Party, storage::MessageDraft};

/// Conversation previews keep the first 100 characters of the latest message.
pub const PREVIEW_MAX_CHARS: usize = 100;

pub fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Advisory scan for attempts to move a conversation off-platform. Matches
/// are reported back to the sender but never block the message; system
/// messages are not scanned at all.
pub struct ContactPolicy {
    patterns: Vec<(&'static str, Regex)>,
}

impl ContactPolicy {
    pub fn new() -> Self {
        let patterns = vec![
            ("an email address", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            ("a phone number", r"\+?[0-9][0-9 ().-]{7,}[0-9]"),
            (
                "an off-platform contact link",
                r"(?i)\b(?:wa\.me|api\.whatsapp\.com|t\.me|telegram\.me|discord\.gg)/\S+",
            ),
        ];

        Self {
            patterns: patterns
                .into_iter()
                .map(|(kind, pattern)| {
                    // the pattern set is fixed at compile time
                    let regex = Regex::new(pattern).unwrap_or_else(|err| {
                        panic!("invalid contact pattern {pattern}: {err}")
                    });
                    (kind, regex)
                })
                .collect(),
        }
    }

    pub fn scan(&self, content: &str) -> Option<String> {
        let hits: Vec<&'static str> = self
            .patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(content))
            .map(|(kind, _)| *kind)
            .collect();

        if hits.is_empty() {
            return None;
        }

        Some(format!(
            "This message appears to contain {}. Deals arranged off-platform are not covered by payment protection.",
            hits.join(" and ")
        ))
    }
}

impl Default for ContactPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a user message draft for a conversation, returning the draft plus
/// an advisory contact-info warning when the scan matched.
pub fn compose_user_message(
    policy: &ContactPolicy,
    conversation: &Conversation,
    sender_id: Uuid,
    sender_type: Party,
    content: String,
    attachments: Vec<Attachment>,
) -> Result<(MessageDraft, Option<String>), DealError> {
    if content.trim().is_empty() {
        return Err(DealError::validation("content is required"));
    }

    let expected_sender = match sender_type {
        Party::Creator => conversation.creator_id,
        Party::Brand => conversation.brand_id,
    };
    if sender_id != expected_sender {
        return Err(DealError::validation(format!(
            "sender is not the {sender_type} of this conversation"
        )));
    }

    let warning = policy.scan(&content);
    let draft = MessageDraft {
        conversation_id: conversation.id,
        sender_id,
        sender_type,
        content,
        attachments,
        is_system_message: false,
    };

    Ok((draft, warning))
}

/// Lifecycle-generated messages carry the acting party as author and skip
/// the contact scan; they are never editable once stored.
pub fn system_message(conversation: &Conversation, author: Party, content: String) -> MessageDraft {
    MessageDraft {
        conversation_id: conversation.id,
        sender_id: match author {
            Party::Creator => conversation.creator_id,
            Party::Brand => conversation.brand_id,
        },
        sender_type: author,
        content,
        attachments: Vec::new(),
        is_system_message: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            creator_unread: 0,
            brand_unread: 0,
            last_message_at: None,
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn preview_keeps_short_messages_whole() {
        assert_eq!(preview("hello there"), "hello there");
    }

    #[test]
    fn preview_truncates_at_one_hundred_characters() {
        let long = "x".repeat(240);
        assert_eq!(preview(&long).chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn preview_respects_multibyte_boundaries() {
        let long = "é".repeat(150);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_MAX_CHARS);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn scan_flags_emails_phones_and_links() {
        let policy = ContactPolicy::new();
        assert!(policy.scan("reach me at jo@example.com please").is_some());
        assert!(policy.scan("call +1 (415) 555-0137 anytime").is_some());
        assert!(policy.scan("join wa.me/4915123456 instead").is_some());
        assert!(policy.scan("the draft script is attached, feedback welcome").is_none());
    }

    #[test]
    fn scan_names_every_matched_kind() {
        let policy = ContactPolicy::new();
        let warning = policy
            .scan("jo@example.com or t.me/jo_handle")
            .unwrap();
        assert!(warning.contains("an email address"));
        assert!(warning.contains("an off-platform contact link"));
    }

    #[test]
    fn user_messages_from_the_wrong_sender_are_rejected() {
        let policy = ContactPolicy::new();
        let conversation = conversation();
        let err = compose_user_message(
            &policy,
            &conversation,
            Uuid::new_v4(),
            Party::Creator,
            "hello".to_string(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));
    }

    #[test]
    fn empty_messages_are_rejected() {
        let policy = ContactPolicy::new();
        let conversation = conversation();
        let err = compose_user_message(
            &policy,
            &conversation,
            conversation.creator_id,
            Party::Creator,
            "  ".to_string(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));
    }

    #[test]
    fn a_flagged_message_still_produces_a_draft() {
        let policy = ContactPolicy::new();
        let conversation = conversation();
        let (draft, warning) = compose_user_message(
            &policy,
            &conversation,
            conversation.brand_id,
            Party::Brand,
            "email me at team@brand.co".to_string(),
            Vec::new(),
        )
        .unwrap();
        assert!(warning.is_some());
        assert!(!draft.is_system_message);
        assert_eq!(draft.sender_type, Party::Brand);
    }

    #[test]
    fn system_messages_are_flagged_and_attributed() {
        let conversation = conversation();
        let draft = system_message(&conversation, Party::Brand, "Deal completed.".to_string());
        assert!(draft.is_system_message);
        assert_eq!(draft.sender_id, conversation.brand_id);
    }
}
