pub mod draft;
pub mod lifecycle;
pub mod reviews;

pub use draft::DealDraft;
pub use lifecycle::{PayoutInstruction, StatsDelta, TransitionCommand, TransitionPlan, plan};
pub use reviews::{ReviewDraft, aggregate_ratings};
