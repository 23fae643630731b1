pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    CancelRequest, ConversationDetailResponse, ConversationListResponse, ConversationResponse,
    CreateConversationRequest,
    CreateDealRequest, CreateReviewRequest, DealDetailResponse, DealEventsResponse,
    DealLifecycleNotice, DealListResponse, DealResponse, DeliverRequest, DisputeRequest,
    ListConversationsQuery, ListDealsQuery, ListMessagesQuery, ListReviewsQuery, MarkReadRequest,
    MarkReadResponse, MessageListResponse, MessageResponse, Pagination, ReviewListResponse,
    ReviewResponse, SendMessageRequest, UpdateDealRequest,
};
pub use db::connect_database;
pub use redis_bus::RedisBus;
