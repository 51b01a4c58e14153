//! # Identification procedures
//!
//! This module implements the recursive case analyses that decide whether an
//! interventional distribution `P(Y | do(X))` can be computed from observed
//! data — and, in the generalized form, from a collection of surrogate
//! experiments — over a semi-Markovian causal diagram.
//!
//! ## Key components
//!
//! - **identify**: classic identification from the observational joint
//! - **generalized_identify**: identification with arbitrary surrogate
//!   intervention sets
//! - **sub_identify**: the shared helper driven by the surrogate search;
//!   its non-identifiable case is an explicit `None`, not an error, so the
//!   caller can try the next candidate experiment
//!
//! ## Design
//!
//! Each procedure is a guarded case analysis evaluated top to bottom. Every
//! recursive call either moves to a strictly smaller induced vertex set or
//! strictly grows the intervention set within a fixed vertex set, so the
//! recursion depth is bounded by the number of vertices; the shrink is
//! checked with `debug_assert!` at each recursive site. Diagrams and
//! expressions are passed as values: sibling branches never observe each
//! other's rewrites.

use crate::engine::diagram::{CausalDiagram, VarSet};
use crate::engine::errors::{DiagramError, IdentifyError};
use crate::engine::probability::{conditional_query, Probability};

/// Decides identifiability of `P(y | do(x))` in `g` from the observational
/// joint and, when identifiable, returns the symbolic formula.
///
/// Fails with [`IdentifyError::Hedge`] when the effect is provably not
/// identifiable; that outcome is final and must not be retried.
pub fn identify(
    y: &VarSet,
    x: &VarSet,
    g: &CausalDiagram,
) -> Result<Probability, IdentifyError> {
    validate_query(y, x, g)?;
    let p = Probability::joint(g.vertices().clone());
    let order = g.causal_order().to_vec();
    identify_rec(y, x, g, p, &order)
}

/// Decides identifiability of `P(y | do(x))` in `g` given a collection of
/// available surrogate experiments, each described by the intervention set
/// it fixes. Surrogate sets may mention variables outside the diagram; the
/// extra names survive only in the `do` decoration of the result.
///
/// Fails with [`IdentifyError::Thicket`] when no surrogate combination
/// identifies the effect.
pub fn generalized_identify(
    y: &VarSet,
    x: &VarSet,
    surrogates: &[VarSet],
    g: &CausalDiagram,
) -> Result<Probability, IdentifyError> {
    validate_query(y, x, g)?;
    let p = Probability::joint(g.vertices().clone());
    let order = g.causal_order().to_vec();
    generalized_rec(y, x, surrogates, g, p, &order)
}

fn validate_query(y: &VarSet, x: &VarSet, g: &CausalDiagram) -> Result<(), IdentifyError> {
    if y.is_empty() {
        return Err(IdentifyError::InvalidQuery(
            "target set must not be empty".into(),
        ));
    }
    if !y.is_disjoint(x) {
        return Err(IdentifyError::InvalidQuery(
            "target and intervention sets must be disjoint".into(),
        ));
    }
    for v in y.iter().chain(x) {
        if !g.contains(v) {
            return Err(IdentifyError::Diagram(DiagramError::UnknownVertex(
                v.clone(),
            )));
        }
    }
    Ok(())
}

fn identify_rec(
    y: &VarSet,
    x: &VarSet,
    g: &CausalDiagram,
    p: Probability,
    order: &[String],
) -> Result<Probability, IdentifyError> {
    let vs = g.vertices().clone();

    // No intervention left: marginalize down to the target.
    if x.is_empty() {
        tracing::debug!(?y, "identify: plain marginal");
        return Ok(p.marginalized(&vs - y).simplify());
    }

    // Restrict to the ancestors of the target.
    let an_y = g.ancestors_inclusive(y)?;
    if vs != an_y {
        tracing::debug!(?vs, ?an_y, "identify: restricting to target ancestors");
        debug_assert!(an_y.len() < vs.len());
        let p2 = p.marginalized(&vs - &an_y).simplify();
        return identify_rec(y, &(x & &an_y), &g.induced(&an_y)?, p2, order);
    }

    // Vertices that stop being relevant once X is forced join X.
    let w = &(&vs - x) - &g.intervene(x)?.ancestors_inclusive(y)?;
    if !w.is_empty() {
        tracing::debug!(?w, "identify: expanding intervention set");
        debug_assert!(w.is_disjoint(x));
        return identify_rec(y, &(x | &w), g, p, order);
    }

    // Decompose over the c-components of G[V - X].
    let sub = g.induced(&(&vs - x))?;
    let components = sub.c_components();
    if components.len() > 1 {
        tracing::debug!(?components, "identify: c-component split");
        let mut factors = Vec::with_capacity(components.len());
        for cc in components {
            factors.push(identify_rec(cc, &(&vs - cc), g, p.clone(), order)?);
        }
        return Ok(Probability::product(factors)
            .marginalized(&vs - &(y | x))
            .simplify());
    }
    let s = components
        .first()
        .cloned()
        .ok_or_else(|| IdentifyError::Internal("empty c-component partition".into()))?;

    // A single c-component spanning the whole diagram is a hedge.
    if g.is_single_c_component() {
        tracing::debug!(?s, "identify: hedge found");
        return Err(IdentifyError::Hedge {
            diagram: Box::new(g.clone()),
            witness: Box::new(g.induced(&s)?),
        });
    }

    // S is itself a c-component of G: read its factor off the chain rule.
    if g.c_components().iter().any(|cc| *cc == s) {
        tracing::debug!(?s, "identify: chain-rule factor");
        let q = chain_product(&p, &s, &vs, order);
        return Ok(q.marginalized(&s - y).simplify());
    }

    // Otherwise recurse into the c-component of G that strictly contains S.
    for s_prime in g.c_components() {
        if s.is_subset(s_prime) && s != *s_prime {
            tracing::debug!(?s, ?s_prime, "identify: descending into c-component");
            debug_assert!(s_prime.len() < vs.len());
            let q = chain_product(&p, s_prime, &vs, order)
                .with_scope(s_prime.clone())
                .simplify();
            return identify_rec(y, &(x & s_prime), &g.induced(s_prime)?, q, order);
        }
    }
    Err(IdentifyError::Internal(
        "no c-component contains the remaining subproblem".into(),
    ))
}

fn generalized_rec(
    y: &VarSet,
    x: &VarSet,
    surrogates: &[VarSet],
    g: &CausalDiagram,
    p: Probability,
    order: &[String],
) -> Result<Probability, IdentifyError> {
    let vs = g.vertices().clone();

    // A surrogate experiment that fixes exactly X answers the query directly.
    for z in surrogates {
        if (z & &vs) == *x {
            tracing::debug!(?z, "generalized_identify: exact surrogate match");
            let p2 = p
                .with_do(&(z - &vs) | x)
                .marginalized(&vs - y)
                .simplify();
            return Ok(p2);
        }
    }

    // Restrict to the ancestors of the target.
    let an_y = g.ancestors_inclusive(y)?;
    if vs != an_y {
        tracing::debug!(?vs, ?an_y, "generalized_identify: restricting to target ancestors");
        debug_assert!(an_y.len() < vs.len());
        let p2 = p.marginalized(&vs - &an_y).simplify();
        return generalized_rec(y, &(x & &an_y), surrogates, &g.induced(&an_y)?, p2, order);
    }

    // Vertices that stop being relevant once X is forced join X.
    let w = &(&vs - x) - &g.intervene(x)?.ancestors_inclusive(y)?;
    if !w.is_empty() {
        tracing::debug!(?w, "generalized_identify: expanding intervention set");
        debug_assert!(w.is_disjoint(x));
        return generalized_rec(y, &(x | &w), surrogates, g, p, order);
    }

    // Decompose over the c-components of G[V - X].
    let sub = g.induced(&(&vs - x))?;
    let components = sub.c_components();
    if components.len() > 1 {
        tracing::debug!(?components, "generalized_identify: c-component split");
        let mut factors = Vec::with_capacity(components.len());
        for cc in components {
            factors.push(generalized_rec(cc, &(&vs - cc), surrogates, g, p.clone(), order)?);
        }
        return Ok(Probability::product(factors)
            .marginalized(&vs - &(y | x))
            .simplify());
    }

    // Try each experiment whose in-diagram part is covered by X: express
    // the post-experiment distribution by the chain rule and hand the
    // residual problem to sub_identify.
    for z in surrogates {
        let zv = z & &vs;
        if !zv.is_subset(x) {
            continue;
        }
        tracing::debug!(?z, "generalized_identify: trying surrogate");
        let dom = &vs - &zv;
        let pz = p.clone().with_do(&(z - &vs) | &zv);
        let gz = g.induced(&dom)?;
        let sub_order = gz.causal_order().to_vec();
        let q = chain_product(&pz, &dom, &dom, &sub_order)
            .with_scope(dom.clone())
            .simplify();
        if let Some(found) = sub_identify(y, &(x - z), &gz, q, &sub_order)? {
            return Ok(found);
        }
    }

    tracing::debug!("generalized_identify: surrogates exhausted");
    Err(IdentifyError::Thicket {
        surrogates: surrogates.to_vec(),
    })
}

/// The helper driven by the surrogate search. Mirrors `identify_rec`, but
/// the hedge-shaped case returns `Ok(None)` ("this surrogate does not work")
/// instead of an error, so the caller's loop can continue.
fn sub_identify(
    y: &VarSet,
    x: &VarSet,
    g: &CausalDiagram,
    q: Probability,
    order: &[String],
) -> Result<Option<Probability>, IdentifyError> {
    let vs = g.vertices().clone();

    if x.is_empty() {
        tracing::debug!(?y, "sub_identify: plain marginal");
        return Ok(Some(q.marginalized(&vs - y).simplify()));
    }

    let an_y = g.ancestors_inclusive(y)?;
    if vs != an_y {
        tracing::debug!(?vs, ?an_y, "sub_identify: restricting to target ancestors");
        debug_assert!(an_y.len() < vs.len());
        let q2 = q.marginalized(&vs - &an_y).simplify();
        return sub_identify(y, &(x & &an_y), &g.induced(&an_y)?, q2, order);
    }

    // The c-component of V - X, fixed up front.
    let sub = g.induced(&(&vs - x))?;
    let components = sub.c_components();
    if components.len() > 1 {
        tracing::debug!(?components, "sub_identify: c-component split");
        let mut factors = Vec::with_capacity(components.len());
        for cc in components {
            match sub_identify(cc, &(&vs - cc), g, q.clone(), order)? {
                Some(f) => factors.push(f),
                None => return Ok(None),
            }
        }
        return Ok(Some(
            Probability::product(factors)
                .marginalized(&vs - &(y | x))
                .simplify(),
        ));
    }
    let s = components
        .first()
        .cloned()
        .ok_or_else(|| IdentifyError::Internal("empty c-component partition".into()))?;

    // Hedge-shaped: not identifiable under this surrogate, signal the
    // caller to move on rather than failing the whole query.
    if g.is_single_c_component() {
        tracing::debug!(?s, "sub_identify: no result under this surrogate");
        return Ok(None);
    }

    if g.c_components().iter().any(|cc| *cc == s) {
        tracing::debug!(?s, "sub_identify: chain-rule factor");
        let out = chain_product(&q, &s, &vs, order);
        return Ok(Some(out.marginalized(&s - y).simplify()));
    }

    for s_prime in g.c_components() {
        if s.is_subset(s_prime) && s != *s_prime {
            tracing::debug!(?s, ?s_prime, "sub_identify: descending into c-component");
            debug_assert!(s_prime.len() < vs.len());
            let q2 = chain_product(&q, s_prime, &vs, order)
                .with_scope(s_prime.clone())
                .simplify();
            return sub_identify(y, &(x & s_prime), &g.induced(s_prime)?, q2, order);
        }
    }
    Err(IdentifyError::Internal(
        "no c-component contains the remaining subproblem".into(),
    ))
}

/// Builds the chain-rule product of `p` over the vertices in `over`: one
/// conditional-query factor per vertex, conditioned on its predecessors in
/// `order` restricted to `vs`.
fn chain_product(
    p: &Probability,
    over: &VarSet,
    vs: &VarSet,
    order: &[String],
) -> Probability {
    let mut factors = Vec::with_capacity(over.len());
    let mut preceding = VarSet::new();
    for v in order.iter().filter(|v| vs.contains(v.as_str())) {
        if over.contains(v.as_str()) {
            let target: VarSet = std::iter::once(v.clone()).collect();
            factors.push(conditional_query(p, &target, &preceding));
        }
        preceding.insert(v.clone());
    }
    Probability::product(factors)
}
