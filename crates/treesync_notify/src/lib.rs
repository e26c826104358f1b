//! Coalesces filesystem-notification events into `scanAgain` marks on the
//! sync-node tree, dropping events under the local debris directory,
//! absorbing events a sync-originated write expects to cause itself, and
//! debouncing bursty network shares behind a long quiet window.

mod coalescer;
mod event;
mod source;

pub use coalescer::Coalescer;
pub use event::{NotifyEvent, ScanRequirement};
pub use source::NotificationSource;
