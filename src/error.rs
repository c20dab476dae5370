//! Error types for the BVH parser and loader.

use std::fmt;
use std::io;
use thiserror::Error;

/// Top level section (or header line) a BVH file must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Hierarchy,
    Root,
    Motion,
    FrameCount,
    FrameTime,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Hierarchy => "HIERARCHY",
            Section::Root => "ROOT",
            Section::Motion => "MOTION",
            Section::FrameCount => "Frames:",
            Section::FrameTime => "Frame Time:",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when parsing a BVH file
#[derive(Debug, Error)]
pub enum ParseError {
    /// Structural error in the skeleton block (braces, offsets, end of file)
    #[error("Malformed hierarchy at line {line}: {reason}")]
    MalformedHierarchy { line: usize, reason: String },

    /// Channel name that is not one of the six known channels.
    /// Recoverable: the rest of the line is skipped and parsing continues.
    #[error("Unknown channel token '{token}' for joint '{joint}' at line {line}")]
    UnknownChannelToken {
        joint: String,
        line: usize,
        token: String,
    },

    /// Fewer numbers in the motion section than the declared frames and channels require
    #[error("Truncated motion data in frame {frame} at joint '{joint}': expected {expected} values, found {found}")]
    TruncatedMotionData {
        frame: usize,
        joint: String,
        expected: usize,
        found: usize,
    },

    /// A required section or header line is missing
    #[error("Missing section: {0}")]
    MissingSection(Section),

    /// The motion section declares zero frames
    #[error("Motion section declares no frames")]
    NoFrames,

    /// The declared frame count would need more joint transforms than a clip may hold
    #[error("Motion section declares {frames} frames, at most {limit} are supported for this skeleton")]
    TooManyFrames { frames: usize, limit: usize },

    /// I/O error while reading a source
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Whether parsing can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::UnknownChannelToken { .. })
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
