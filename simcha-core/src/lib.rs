//! SIMCHA Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no call-flow or storage logic.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod session;

pub use config::CallConfig;
pub use entities::{
    AssignmentRecord, ClassMembership, Event, EventGift, EventType, FamilyTeacherAssignment,
    FulfillmentResponse, Gift, LevelType, LotteryEntry, LotteryTrack, Student, SurveyAnswer,
};
pub use enums::{AssignmentSource, EntityKind, EntryKind, Flow, ReportOrigin};
pub use error::{
    CallError, CallResult, CatalogError, FlowError, GatewayError, IdentityError, InputError,
    StorageError,
};
pub use identity::{
    compute_content_hash, new_entity_id, ContentHash, EntityId, NationalId, NationalIdParseError,
    RawContent, Timestamp,
};
pub use session::{Answer, CallSession, CallerIdentity};
