//! Stream event fan-out.
//!
//! [`Dispatcher`] turns an authenticated provider delivery into chat
//! notifications, end markers and an optional cross-post. [`rules`] decides
//! which servers receive a given stream; [`compose`] renders what they see.

pub mod compose;
pub mod dispatcher;
pub mod rules;


pub use compose::{
    DEFAULT_CROSS_POST_PREFIX, DEFAULT_END_MARKER, RichMessage, cross_post_text,
    live_notification,
};
pub use dispatcher::{
    CrossPostConfig, DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig, FanOutReport,
    ServerOutcome, SkipReason,
};
pub use rules::{parse_rule_list, title_matches};
