//! Microsoft Graph v1.0 resources for mail, calendar and change notifications.

mod calendar;
mod mail;
mod subscription;

pub use calendar::{GraphDateTimeZone, GraphEvent, GraphEventList, GraphLocation};
pub use mail::{
    GraphEmailAddress, GraphItemBody, GraphMessage, GraphMessageList, GraphRecipient, GraphUser,
};
pub use subscription::{
    GraphNotification, GraphNotificationBatch, GraphSubscription, GraphSubscriptionCreate,
    GraphSubscriptionPatch,
};
