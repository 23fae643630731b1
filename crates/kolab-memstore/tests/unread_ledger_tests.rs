//! Unread-ledger behavior driven through the conversation store: counter
//! ownership, preview truncation, and the no-op safety of mark-read.

use uuid::Uuid;

use kolab_core::{
    Party,
    storage::{ConversationStore, MessageDraft},
};
use kolab_memstore::InMemoryConversations;
use kolab_messaging::PREVIEW_MAX_CHARS;

fn user_message(conversation_id: Uuid, sender_id: Uuid, sender: Party, content: &str) -> MessageDraft {
    MessageDraft {
        conversation_id,
        sender_id,
        sender_type: sender,
        content: content.to_string(),
        attachments: Vec::new(),
        is_system_message: false,
    }
}

#[tokio::test]
async fn a_first_message_bumps_only_the_recipients_counter() {
    let store = InMemoryConversations::default();
    let creator_id = Uuid::new_v4();
    let brand_id = Uuid::new_v4();
    let (conversation, created) = store.ensure(creator_id, brand_id).await.unwrap();
    assert!(created);
    assert_eq!(conversation.creator_unread, 0);
    assert_eq!(conversation.brand_unread, 0);

    store
        .append_message(user_message(
            conversation.id,
            creator_id,
            Party::Creator,
            "hey, excited to work together",
        ))
        .await
        .unwrap();

    let after = store.fetch(conversation.id).await.unwrap().unwrap();
    assert_eq!(after.unread_for(Party::Brand), 1);
    assert_eq!(after.unread_for(Party::Creator), 0);
    assert_eq!(
        after.last_message_preview.as_deref(),
        Some("hey, excited to work together")
    );
    assert!(after.last_message_at.is_some());
}

#[tokio::test]
async fn previews_are_cut_to_one_hundred_characters() {
    let store = InMemoryConversations::default();
    let creator_id = Uuid::new_v4();
    let (conversation, _) = store.ensure(creator_id, Uuid::new_v4()).await.unwrap();

    let long = "a".repeat(400);
    store
        .append_message(user_message(conversation.id, creator_id, Party::Creator, &long))
        .await
        .unwrap();

    let after = store.fetch(conversation.id).await.unwrap().unwrap();
    let preview = after.last_message_preview.unwrap();
    assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
    assert_eq!(preview, long.chars().take(PREVIEW_MAX_CHARS).collect::<String>());
}

#[tokio::test]
async fn mark_read_clears_only_the_readers_side() {
    let store = InMemoryConversations::default();
    let creator_id = Uuid::new_v4();
    let brand_id = Uuid::new_v4();
    let (conversation, _) = store.ensure(creator_id, brand_id).await.unwrap();

    for content in ["first", "second"] {
        store
            .append_message(user_message(conversation.id, creator_id, Party::Creator, content))
            .await
            .unwrap();
    }
    store
        .append_message(user_message(conversation.id, brand_id, Party::Brand, "reply"))
        .await
        .unwrap();

    let before = store.fetch(conversation.id).await.unwrap().unwrap();
    assert_eq!(before.brand_unread, 2);
    assert_eq!(before.creator_unread, 1);

    let marked = store.mark_read(conversation.id, Party::Brand).await.unwrap();
    assert_eq!(marked, 2);

    let after = store.fetch(conversation.id).await.unwrap().unwrap();
    assert_eq!(after.brand_unread, 0);
    assert_eq!(after.creator_unread, 1);

    let messages = store.messages(conversation.id).await.unwrap();
    for message in messages.iter().filter(|m| m.sender_type == Party::Creator) {
        assert!(message.is_read);
        assert!(message.read_at.is_some());
    }
    assert!(
        messages
            .iter()
            .filter(|m| m.sender_type == Party::Brand)
            .all(|m| !m.is_read)
    );
}

#[tokio::test]
async fn mark_read_with_nothing_unread_is_a_quiet_no_op() {
    let store = InMemoryConversations::default();
    let (conversation, _) = store.ensure(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();

    let marked = store.mark_read(conversation.id, Party::Creator).await.unwrap();
    assert_eq!(marked, 0);

    // unknown conversation ids are also a no-op, not an error
    let marked = store.mark_read(Uuid::new_v4(), Party::Brand).await.unwrap();
    assert_eq!(marked, 0);
}

#[tokio::test]
async fn ensure_returns_the_same_conversation_for_a_pair() {
    let store = InMemoryConversations::default();
    let creator_id = Uuid::new_v4();
    let brand_id = Uuid::new_v4();

    let (first, created_first) = store.ensure(creator_id, brand_id).await.unwrap();
    let (second, created_second) = store.ensure(creator_id, brand_id).await.unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn system_messages_flow_through_the_same_ledger() {
    let store = InMemoryConversations::default();
    let creator_id = Uuid::new_v4();
    let brand_id = Uuid::new_v4();
    let (conversation, _) = store.ensure(creator_id, brand_id).await.unwrap();

    let draft = kolab_messaging::system_message(
        &conversation,
        Party::Creator,
        "Delivery submitted for \"Spring drop\". Please review and approve.".to_string(),
    );
    let message = store.append_message(draft).await.unwrap();
    assert!(message.is_system_message);

    let after = store.fetch(conversation.id).await.unwrap().unwrap();
    assert_eq!(after.brand_unread, 1);
    assert_eq!(after.creator_unread, 0);
}
