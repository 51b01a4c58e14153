//! # Causalid - Symbolic Causal Effect Identification
//!
//! Causalid decides whether an interventional distribution `P(Y | do(X))`
//! is computable from available data over a semi-Markovian causal diagram
//! (a DAG with latent-confounding edges), and when it is, produces the
//! symbolic estimand as a simplified probability expression.
//!
//! ## Architecture
//!
//! The system is organized into one engine module with three layers:
//!
//! - **engine::diagram**: the causal diagram and its graph queries
//!   (ancestors, interventions, induced subgraphs, c-components)
//! - **engine::probability**: the symbolic expression tree and its
//!   fixpoint simplifier
//! - **engine::identify**: the recursive identification procedures,
//!   classic and surrogate-experiment generalized
//!
//! ## Usage
//!
//! ```rust,ignore
//! use causalid::{identify, CausalDiagram, VarSet};
//!
//! // Front-door diagram: X -> Z -> Y with X and Y confounded.
//! let g = CausalDiagram::new(
//!     &["X", "Z", "Y"],
//!     &[("X", "Z"), ("Z", "Y")],
//!     &[("X", "Y", "U")],
//! )?;
//! let y: VarSet = ["Y".to_owned()].into();
//! let x: VarSet = ["X".to_owned()].into();
//! let formula = identify(&y, &x, &g)?;
//! ```

#![forbid(unsafe_code)]

pub mod engine;

// Re-export the types and entry points callers actually use.
pub use engine::diagram::{CausalDiagram, ConfoundedEdge, VarSet};
pub use engine::errors::{DiagramError, IdentifyError};
pub use engine::identify::{generalized_identify, identify};
pub use engine::probability::{conditional_query, Probability, ProbabilityKind};
