// Copyright 2024 Cornell University
// released under MIT License

use thiserror::Error;

/// Errors that abort mover checking. Every variant except `Io` indicates an
/// input shape the pass does not support or a malformed action body.
#[derive(Debug, Error)]
pub enum MoverCheckError {
    /// Atomic actions must not be polymorphic
    #[error("atomic action `{proc_name}` has type parameters, which mover checking does not support")]
    TypeParameters { proc_name: String },

    /// A procedure has at most one mover-tagged postcondition
    #[error("procedure `{proc_name}` has more than one mover-tagged postcondition")]
    MultipleActions { proc_name: String },

    /// The code expression of an atomic action has no blocks
    #[error("atomic action `{proc_name}` has an empty body")]
    EmptyAction { proc_name: String },

    /// Only `assume` and `assign` may remain once the gate has been stripped
    #[error("unsupported `{kind}` command in block `{label}` while computing a transition relation")]
    UnsupportedCommand { label: String, kind: &'static str },

    /// A block of an atomic action ends in neither a `goto` nor a value return
    #[error("block `{label}` does not end in a goto or a value return")]
    UnrecognizedTransfer { label: String },

    /// A `goto` in an atomic action targets a block outside of that action
    #[error("block `{label}` of atomic action `{proc_name}` jumps outside of the action")]
    ForeignTarget { proc_name: String, label: String },

    /// Atomic actions are loop-free
    #[error("block `{label}` is reachable from itself inside an atomic action")]
    CyclicAction { label: String },

    #[error("failed to write the mover checker program: {0}")]
    Io(#[from] std::io::Error),
}

pub type MoverResult<T> = Result<T, MoverCheckError>;
