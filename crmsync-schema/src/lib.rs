//! Wire types for the upstream mail/calendar APIs and their push notifications.
//!
//! Only the fields the sync core reads are modelled; everything else is ignored on decode.

pub mod calendar;
pub mod gmail;
pub mod graph;

pub use calendar::{GoogleAttendee, GoogleEvent, GoogleEventDateTime, GoogleEventList};
pub use gmail::{
    GmailHeader, GmailMessage, GmailMessageList, GmailMessagePart, GmailMessageRef,
    GmailNotification, GmailProfile, GmailWatchRequest, GmailWatchResponse, PubSubEnvelope,
    PubSubMessage,
};
pub use graph::{
    GraphDateTimeZone, GraphEmailAddress, GraphEvent, GraphEventList, GraphItemBody,
    GraphLocation, GraphMessage, GraphMessageList, GraphNotification, GraphNotificationBatch,
    GraphRecipient, GraphSubscription, GraphSubscriptionCreate, GraphSubscriptionPatch, GraphUser,
};
