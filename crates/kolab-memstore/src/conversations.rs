use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{
    Conversation, Message, Party,
    storage::{ConversationStore, MessageDraft},
};
use kolab_messaging::preview;

#[derive(Default)]
struct ConversationTable {
    conversations: HashMap<Uuid, Conversation>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
}

#[derive(Default)]
pub struct InMemoryConversations {
    table: RwLock<ConversationTable>,
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn ensure(
        &self,
        creator_id: Uuid,
        brand_id: Uuid,
    ) -> anyhow::Result<(Conversation, bool)> {
        let mut table = self.table.write().await;
        if let Some(existing_id) = table.by_pair.get(&(creator_id, brand_id)) {
            let conversation = table
                .conversations
                .get(existing_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("conversation index out of sync"))?;
            return Ok((conversation, false));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            creator_id,
            brand_id,
            creator_unread: 0,
            brand_unread: 0,
            last_message_at: None,
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        };
        table.by_pair.insert((creator_id, brand_id), conversation.id);
        table
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn fetch(&self, conversation_id: Uuid) -> anyhow::Result<Option<Conversation>> {
        let table = self.table.read().await;
        Ok(table.conversations.get(&conversation_id).cloned())
    }

    async fn list(
        &self,
        creator_id: Option<Uuid>,
        brand_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Conversation>> {
        let table = self.table.read().await;
        let mut conversations: Vec<Conversation> = table
            .conversations
            .values()
            .filter(|conversation| creator_id.is_none_or(|id| conversation.creator_id == id))
            .filter(|conversation| brand_id.is_none_or(|id| conversation.brand_id == id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| {
            b.last_message_at
                .unwrap_or(b.created_at)
                .cmp(&a.last_message_at.unwrap_or(a.created_at))
        });
        Ok(conversations)
    }

    // Append plus ledger update happen under one write lock: the increment on
    // the recipient's counter can never race another append.
    async fn append_message(&self, draft: MessageDraft) -> anyhow::Result<Message> {
        let mut table = self.table.write().await;
        let conversation = table
            .conversations
            .get_mut(&draft.conversation_id)
            .ok_or_else(|| anyhow::anyhow!("conversation {} not found", draft.conversation_id))?;

        let now = Utc::now();
        conversation.last_message_at = Some(now);
        conversation.last_message_preview = Some(preview(&draft.content));
        conversation.updated_at = now;
        *conversation.unread_mut(draft.sender_type.other()) += 1;

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: draft.conversation_id,
            sender_id: draft.sender_id,
            sender_type: draft.sender_type,
            content: draft.content,
            attachments: draft.attachments,
            is_read: false,
            read_at: None,
            is_system_message: draft.is_system_message,
            created_at: now,
        };
        table
            .messages
            .entry(draft.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn messages(&self, conversation_id: Uuid) -> anyhow::Result<Vec<Message>> {
        let table = self.table.read().await;
        Ok(table
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Party) -> anyhow::Result<u64> {
        let mut table = self.table.write().await;
        let Some(conversation) = table.conversations.get_mut(&conversation_id) else {
            return Ok(0);
        };
        *conversation.unread_mut(reader) = 0;

        let now = Utc::now();
        let mut marked = 0;
        if let Some(messages) = table.messages.get_mut(&conversation_id) {
            for message in messages
                .iter_mut()
                .filter(|message| message.sender_type != reader && !message.is_read)
            {
                message.is_read = true;
                message.read_at = Some(now);
                marked += 1;
            }
        }
        Ok(marked)
    }
}
