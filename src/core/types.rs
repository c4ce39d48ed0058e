//! Core types for pipeline operations and execution settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::utils::PipelineError;

/// Identity of an operation, independent of its parameters.
///
/// Two selections with the same kind are duplicates even when their
/// parameters differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Grayscale,
    Flip,
    Rotate,
    HighContrast,
    LowContrast,
    HighBrightness,
    LowBrightness,
    GaussianBlur,
    BackgroundRemove,
    EdgeDetect,
}

impl OperationKind {
    /// Every recognized operation, in menu order.
    pub const ALL: [OperationKind; 10] = [
        Self::Grayscale,
        Self::Flip,
        Self::Rotate,
        Self::HighContrast,
        Self::LowContrast,
        Self::HighBrightness,
        Self::LowBrightness,
        Self::GaussianBlur,
        Self::BackgroundRemove,
        Self::EdgeDetect,
    ];

    /// Short menu token (`g`, `f`, `r`, ...)
    pub fn short_token(&self) -> &'static str {
        match self {
            Self::Grayscale => "g",
            Self::Flip => "f",
            Self::Rotate => "r",
            Self::HighContrast => "hc",
            Self::LowContrast => "lc",
            Self::HighBrightness => "hb",
            Self::LowBrightness => "lb",
            Self::GaussianBlur => "gb",
            Self::BackgroundRemove => "br",
            Self::EdgeDetect => "ed",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Flip => "flip",
            Self::Rotate => "rotate",
            Self::HighContrast => "high-contrast",
            Self::LowContrast => "low-contrast",
            Self::HighBrightness => "high-brightness",
            Self::LowBrightness => "low-brightness",
            Self::GaussianBlur => "gaussian-blur",
            Self::BackgroundRemove => "background-remove",
            Self::EdgeDetect => "edge-detect",
        }
    }

    /// Whether the operation needs a parameter captured at selection time
    pub fn takes_parameter(&self) -> bool {
        matches!(self, Self::Flip | Self::Rotate)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = PipelineError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.short_token() == token || kind.name() == token)
            .ok_or(PipelineError::UnknownOperation(token))
    }
}

/// Flip direction, following the sign convention of the flip code:
/// `0` flips vertically, positive horizontally, negative both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    Vertical,
    Horizontal,
    Both,
}

impl FlipAxis {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Vertical,
            c if c > 0 => Self::Horizontal,
            _ => Self::Both,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Vertical => 0,
            Self::Horizontal => 1,
            Self::Both => -1,
        }
    }
}

/// One resolved pipeline step: an operation kind plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation {
    Grayscale,
    Flip { axis: FlipAxis },
    /// Anticlockwise rotation, normalized to `0..360`
    Rotate { degrees: u16 },
    HighContrast,
    LowContrast,
    HighBrightness,
    LowBrightness,
    GaussianBlur,
    BackgroundRemove,
    EdgeDetect,
}

impl Operation {
    pub fn rotate(degrees: i32) -> Self {
        Self::Rotate {
            degrees: degrees.rem_euclid(360) as u16,
        }
    }

    pub fn flip(code: i32) -> Self {
        Self::Flip {
            axis: FlipAxis::from_code(code),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Grayscale => OperationKind::Grayscale,
            Self::Flip { .. } => OperationKind::Flip,
            Self::Rotate { .. } => OperationKind::Rotate,
            Self::HighContrast => OperationKind::HighContrast,
            Self::LowContrast => OperationKind::LowContrast,
            Self::HighBrightness => OperationKind::HighBrightness,
            Self::LowBrightness => OperationKind::LowBrightness,
            Self::GaussianBlur => OperationKind::GaussianBlur,
            Self::BackgroundRemove => OperationKind::BackgroundRemove,
            Self::EdgeDetect => OperationKind::EdgeDetect,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flip { axis } => write!(f, "flip({})", axis.code()),
            Self::Rotate { degrees } => write!(f, "rotate({})", degrees),
            other => f.write_str(other.kind().name()),
        }
    }
}

/// How work is distributed across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Independent ranks, each owning a disjoint range and its own storage
    Distributed,
    /// One thread pool over a shared store guarded by the lock table
    #[default]
    SharedMemory,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distributed => f.write_str("distributed"),
            Self::SharedMemory => f.write_str("shared-memory"),
        }
    }
}
