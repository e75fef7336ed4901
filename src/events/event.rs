//! Event marker trait

use std::any::Any;
use std::fmt;

/// An immutable record of a state change that has already been applied
///
/// Any `'static + Debug` type is an event. Events are published by data
/// managers after a successful mutation and are dropped once dispatch ends.
pub trait Event: Any + fmt::Debug {}

impl<T: Any + fmt::Debug> Event for T {}
