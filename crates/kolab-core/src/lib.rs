pub mod error;
pub mod events;
pub mod models;
pub mod storage;

pub use error::{DealError, PayoutError};
pub use events::{DomainEvent, DomainEventKind};
pub use models::{
    Attachment, AttachmentKind, BrandStats, Conversation, CreatorStats, Deal, DealStatus,
    Deliverable, Message, Party, Review, ServiceItem,
};
pub use storage::{
    ConversationStore, DealFilter, DealPatch, DealStore, DealUpdate, EventEnvelope, EventStore,
    MessageDraft, PayoutGateway, ProfileStore, ReviewStore,
};
