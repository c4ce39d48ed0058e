//! Pipeline specification: the ordered, deduplicated list of operations
//! applied to every item of a run.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

use crate::core::{Operation, OperationKind};
use crate::utils::{PipelineError, PipelineResult};

/// Supplies parameters for order-sensitive operations at selection time.
///
/// Implemented by whatever front end collects the selection (an interactive
/// menu, a config file). `rejected` is called for every token that could not
/// be added; the source is expected to offer a replacement as its next token.
pub trait ParameterPrompt {
    /// Anticlockwise angle in degrees
    fn rotate_angle(&mut self) -> i32;
    /// `0` vertical, positive horizontal, negative both
    fn flip_code(&mut self) -> i32;
    fn rejected(&mut self, _token: &str, _reason: &PipelineError) {}
}

/// Parameters fixed up front, e.g. read from a config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedParameters {
    pub rotate_angle: i32,
    pub flip_code: i32,
}

impl ParameterPrompt for FixedParameters {
    fn rotate_angle(&mut self) -> i32 {
        self.rotate_angle
    }

    fn flip_code(&mut self) -> i32 {
        self.flip_code
    }
}

/// Immutable, ordered sequence of operations with no repeated kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Operation>", into = "Vec<Operation>")]
pub struct PipelineSpec {
    operations: Vec<Operation>,
}

impl PipelineSpec {
    /// Builds a spec from already-resolved operations, rejecting duplicates.
    pub fn from_operations(operations: Vec<Operation>) -> PipelineResult<Self> {
        let mut builder = PipelineBuilder::new();
        for op in operations {
            builder.push(op)?;
        }
        Ok(builder.finish())
    }

    /// Builds a spec from user tokens, skipping (and reporting) rejected ones.
    ///
    /// Unknown and duplicate tokens never fail the build: they are logged,
    /// handed to [`ParameterPrompt::rejected`], and the next token is tried.
    pub fn build<'t, I, P>(tokens: I, prompt: &mut P) -> Self
    where
        I: IntoIterator<Item = &'t str>,
        P: ParameterPrompt + ?Sized,
    {
        let mut builder = PipelineBuilder::new();
        for token in tokens {
            if let Err(e) = builder.select(token, prompt) {
                warn!("Rejected operation '{}': {}", token, e);
                prompt.rejected(token, &e);
            }
        }
        let spec = builder.finish();
        debug!("Built pipeline: {}", spec);
        spec
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.operations.iter().any(|op| op.kind() == kind)
    }

    /// Order- and parameter-sensitive digest used to verify replication.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.operations.hash(&mut hasher);
        hasher.finish()
    }

    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> PipelineResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl TryFrom<Vec<Operation>> for PipelineSpec {
    type Error = PipelineError;

    fn try_from(operations: Vec<Operation>) -> Result<Self, Self::Error> {
        Self::from_operations(operations)
    }
}

impl From<PipelineSpec> for Vec<Operation> {
    fn from(spec: PipelineSpec) -> Self {
        spec.operations
    }
}

impl<'a> IntoIterator for &'a PipelineSpec {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl std::fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operations.is_empty() {
            return f.write_str("[]");
        }
        let steps: Vec<String> = self.operations.iter().map(|op| op.to_string()).collect();
        write!(f, "[{}]", steps.join(" -> "))
    }
}

/// Incremental selection of operations.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    operations: Vec<Operation>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `token`, captures its parameters and appends it.
    ///
    /// The parameter prompt is only consulted once the token is known to be
    /// valid and not yet selected.
    pub fn select<P>(&mut self, token: &str, prompt: &mut P) -> PipelineResult<Operation>
    where
        P: ParameterPrompt + ?Sized,
    {
        let kind: OperationKind = token.parse()?;
        if self.contains(kind) {
            return Err(PipelineError::DuplicateOperation(kind));
        }

        let op = match kind {
            OperationKind::Rotate => Operation::rotate(prompt.rotate_angle()),
            OperationKind::Flip => Operation::flip(prompt.flip_code()),
            OperationKind::Grayscale => Operation::Grayscale,
            OperationKind::HighContrast => Operation::HighContrast,
            OperationKind::LowContrast => Operation::LowContrast,
            OperationKind::HighBrightness => Operation::HighBrightness,
            OperationKind::LowBrightness => Operation::LowBrightness,
            OperationKind::GaussianBlur => Operation::GaussianBlur,
            OperationKind::BackgroundRemove => Operation::BackgroundRemove,
            OperationKind::EdgeDetect => Operation::EdgeDetect,
        };
        self.operations.push(op);
        Ok(op)
    }

    /// Appends a resolved operation, rejecting a repeated kind.
    pub fn push(&mut self, op: Operation) -> PipelineResult<()> {
        if self.contains(op.kind()) {
            return Err(PipelineError::DuplicateOperation(op.kind()));
        }
        self.operations.push(op);
        Ok(())
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.operations.iter().any(|op| op.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn finish(self) -> PipelineSpec {
        PipelineSpec {
            operations: self.operations,
        }
    }
}
