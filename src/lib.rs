//! Parser and runtime evaluator for Biovision Hierarchy (.bvh) motion capture files.
//!
//! * [`parse`] turns the text of a file into a [`Skeleton`](types::Skeleton) and its
//!   [`Motion`](types::Motion).
//! * [`sample`] computes world space joint transforms at any fractional frame, and
//!   [`AnimationState`] drives looping playback from a clock.
//! * [`Loader`] parses files on a background thread and publishes them to [`Slot`]s.

mod cursor;
pub mod error;
pub mod loader;
mod motion;
pub mod parse;
pub mod sample;
pub mod types;
pub mod utils;
#[cfg(feature = "visualize")]
pub mod visualize;

pub use error::{ParseError, Result, Section};
pub use loader::{LoadSource, Loader, LoaderConfig, MemorySource, Slot, SlotState};
pub use motion::MAX_MOTION_TRANSFORMS;
pub use parse::{load_bvh_from_file, load_bvh_from_string, parse, parse_str, MAX_JOINT_DEPTH};
pub use sample::{sample, sample_into, AnimationState};
pub use types::{Bvh, Channel, ChannelLayout, Joint, JointTransform, Motion, Skeleton};
