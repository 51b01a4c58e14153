//! Error types for diagram construction and effect identification.

use thiserror::Error;

use crate::engine::diagram::{CausalDiagram, VarSet};

/// Errors raised while constructing a causal diagram or while querying it
/// with vertices it does not contain.
///
/// These are precondition violations: they are reported at construction or
/// query-entry time and never surface from inside the identification
/// recursion.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DiagramError {
    /// A query referenced a vertex that is not in the diagram.
    #[error("unknown vertex `{0}`")]
    UnknownVertex(String),

    /// A confounding edge connected a vertex to itself.
    #[error("confounding edge `{latent}` must connect two distinct vertices, got `{vertex}` twice")]
    SelfConfounded {
        /// The latent variable labelling the edge.
        latent: String,
        /// The repeated endpoint.
        vertex: String,
    },

    /// The same latent variable labelled more than one confounding edge.
    #[error("latent variable `{0}` labels more than one confounding edge")]
    DuplicateLatent(String),

    /// The directed edges contain a cycle, so no topological order exists.
    #[error("directed edges contain a cycle through `{0}`")]
    CyclicDirected(String),
}

/// Outcome of an identification query that did not produce a formula.
///
/// `Hedge` and `Thicket` are expected, final answers ("the effect is not
/// identifiable"), not bugs, and callers must not retry them. The remaining
/// variants report malformed queries or internal invariant violations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// The effect is not identifiable from observational data: the diagram
    /// contains a hedge. Carries the diagram in which the hedge was detected
    /// and the induced sub-diagram witnessing it.
    #[error("causal effect not identifiable: a hedge was found")]
    Hedge {
        /// The diagram in which the hedge was detected.
        diagram: Box<CausalDiagram>,
        /// The induced sub-diagram over the offending c-component.
        witness: Box<CausalDiagram>,
    },

    /// The effect is not identifiable from the supplied surrogate
    /// experiments: every candidate set was exhausted without yielding an
    /// identifiable sub-problem.
    #[error("causal effect not identifiable: no surrogate experiment applies (thicket)")]
    Thicket {
        /// The surrogate intervention sets that were tried.
        surrogates: Vec<VarSet>,
    },

    /// The query was malformed (empty target, overlapping target and
    /// intervention sets, and similar).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A query set referenced vertices outside the diagram.
    #[error(transparent)]
    Diagram(#[from] DiagramError),

    /// An internal invariant was violated. This indicates a programmer
    /// error, not a property of the input.
    #[error("internal error: {0}")]
    Internal(String),
}
