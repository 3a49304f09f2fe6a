//! The candidate type ladder used by type inference.
//!
//! Inference walks a fixed, totally ordered sequence of kinds, from the narrowest
//! (`Null`) to the universally accepting `Binary`. A column only moves up the ladder
//! when some chunk has demonstrably failed to convert under the current kind, so the
//! final kind is the first rung that accepts every chunk.

use std::sync::Arc;

use arrow_schema::{DataType, TimeUnit};
use tabula_common::{Result, error::Error, verify_arg};

use crate::{
    converter::{Converter, make_converter},
    options::ConvertOptions,
};

/// One rung of the inference ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InferKind {
    Null,
    Int64,
    Boolean,
    Timestamp,
    Double,
    Text,
    Binary,
}

impl InferKind {
    /// All rungs, narrowest first.
    pub const ALL: [InferKind; 7] = [
        InferKind::Null,
        InferKind::Int64,
        InferKind::Boolean,
        InferKind::Timestamp,
        InferKind::Double,
        InferKind::Text,
        InferKind::Binary,
    ];

    pub fn data_type(self) -> DataType {
        match self {
            InferKind::Null => DataType::Null,
            InferKind::Int64 => DataType::Int64,
            InferKind::Boolean => DataType::Boolean,
            InferKind::Timestamp => DataType::Timestamp(TimeUnit::Nanosecond, None),
            InferKind::Double => DataType::Float64,
            InferKind::Text => DataType::Utf8,
            InferKind::Binary => DataType::Binary,
        }
    }

    /// The next rung up, or `None` for `Binary`, which accepts any input.
    pub fn next(self) -> Option<InferKind> {
        InferKind::ALL.get(self.index() + 1).copied()
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// The ladder as configured for one column: which rungs are enabled, and a converter
/// for each of them.
pub struct InferenceLadder {
    check_utf8: bool,
    converters: Vec<Arc<dyn Converter>>,
}

impl InferenceLadder {
    pub fn new(options: &ConvertOptions) -> Result<InferenceLadder> {
        let converters = InferKind::ALL
            .iter()
            .map(|kind| make_converter(&kind.data_type(), options))
            .collect::<Result<Vec<_>>>()?;
        Ok(InferenceLadder {
            check_utf8: options.check_utf8,
            converters,
        })
    }

    /// Builds a ladder from caller-supplied converters, one per [`InferKind::ALL`]
    /// entry in ladder order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the converters do not line up with the rungs.
    pub fn with_converters(
        check_utf8: bool,
        converters: Vec<Arc<dyn Converter>>,
    ) -> Result<InferenceLadder> {
        verify_arg!(converters, converters.len() == InferKind::ALL.len());
        if let Some(kind) = InferKind::ALL
            .iter()
            .zip(&converters)
            .find_map(|(kind, c)| (c.data_type() != &kind.data_type()).then_some(kind))
        {
            return Err(Error::invalid_arg(
                "converters",
                format!("the {kind:?} rung expects a {} converter", kind.data_type()),
            ));
        }
        Ok(InferenceLadder {
            check_utf8,
            converters,
        })
    }

    /// The narrowest rung.
    pub fn first(&self) -> InferKind {
        InferKind::Null
    }

    /// The next enabled rung strictly above `kind`.
    ///
    /// The `Text` rung is skipped when UTF-8 checking is disabled.
    pub fn next_enabled(&self, kind: InferKind) -> Option<InferKind> {
        let mut next = kind.next()?;
        if next == InferKind::Text && !self.check_utf8 {
            next = next.next()?;
        }
        Some(next)
    }

    pub fn converter(&self, kind: InferKind) -> &Arc<dyn Converter> {
        &self.converters[kind.index()]
    }
}
