//! # Data Models
//!
//! SeaORM entities for every tenant-scoped table. Each model implements
//! [`Record`](crate::record::Record); child collections also implement
//! [`ChildRecord`](crate::record::ChildRecord).

pub mod additional_charge;
pub mod comment_mention;
pub mod consolidation_group;
pub mod customer;
pub mod dedicated_lane;
pub mod document;
pub mod email_profile;
pub mod email_queue;
pub mod notification;
pub mod sequence;
pub mod shipment;
pub mod shipment_comment;
pub mod shipment_commodity;
pub mod shipment_move;
pub mod stop;
pub mod tractor;
pub mod worker;
pub mod worker_pto;

pub use additional_charge::Entity as AdditionalCharge;
pub use comment_mention::Entity as CommentMention;
pub use consolidation_group::Entity as ConsolidationGroup;
pub use customer::Entity as Customer;
pub use dedicated_lane::Entity as DedicatedLane;
pub use document::Entity as Document;
pub use email_profile::Entity as EmailProfile;
pub use email_queue::Entity as EmailQueue;
pub use notification::Entity as Notification;
pub use sequence::Entity as Sequence;
pub use shipment::Entity as Shipment;
pub use shipment_comment::Entity as ShipmentComment;
pub use shipment_commodity::Entity as ShipmentCommodity;
pub use shipment_move::Entity as ShipmentMove;
pub use stop::Entity as Stop;
pub use tractor::Entity as Tractor;
pub use worker::Entity as Worker;
pub use worker_pto::Entity as WorkerPto;
