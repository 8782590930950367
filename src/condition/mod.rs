//! Condition handles.
//!
//! This module groups the generic condition handle and the on/off alarm.

pub mod condition;
pub mod onoff;

pub use condition::{Condition, ConditionParams};
pub use onoff::{OnOffCondition, OnOffConditionConfig};
