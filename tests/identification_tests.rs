//! End-to-end identification tests on the classic diagrams.

use causalid::{
    generalized_identify, identify, CausalDiagram, IdentifyError, Probability, VarSet,
};

fn set(names: &[&str]) -> VarSet {
    names.iter().map(|s| (*s).to_owned()).collect()
}

/// X -> Z -> Y with X and Y confounded.
fn front_door() -> CausalDiagram {
    CausalDiagram::new(
        &["X", "Z", "Y"],
        &[("X", "Z"), ("Z", "Y")],
        &[("X", "Y", "U")],
    )
    .unwrap()
}

/// X -> Y with X and Y confounded.
fn bow() -> CausalDiagram {
    CausalDiagram::new(&["X", "Y"], &[("X", "Y")], &[("X", "Y", "U")]).unwrap()
}

#[test]
fn front_door_effect_has_the_two_stage_form() {
    let g = front_door();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g)
        .unwrap()
        .canonicalize();

    // Sum over Z of P(z|x) times the X-adjusted conditional of Y.
    assert!(e.is_product());
    assert_eq!(*e.sumset(), set(&["Z"]));
    assert_eq!(e.children().len(), 2);

    let outer = &e.children()[0];
    assert_eq!(outer.var(), Some(&set(&["Z"])));
    assert_eq!(outer.cond(), Some(&set(&["X"])));

    let inner = &e.children()[1];
    assert!(inner.is_product());
    assert_eq!(*inner.sumset(), set(&["X"]));
    assert_eq!(inner.children().len(), 2);
    assert_eq!(inner.children()[0].var(), Some(&set(&["X"])));
    assert_eq!(inner.children()[0].cond(), Some(&set(&[])));
    assert_eq!(inner.children()[1].var(), Some(&set(&["Y"])));
    assert_eq!(inner.children()[1].cond(), Some(&set(&["X", "Z"])));
}

#[test]
fn chain_effect_collapses_to_a_plain_conditional() {
    let g = CausalDiagram::new(&[], &[("X", "Z"), ("Z", "Y")], &[]).unwrap();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap();

    // The mediator integrates out entirely: P(y|x).
    assert!(!e.is_product());
    assert!(e.sumset().is_empty());
    assert_eq!(e.var(), Some(&set(&["Y"])));
    assert_eq!(e.cond(), Some(&set(&["X"])));
}

#[test]
fn backdoor_confounder_is_adjusted_for() {
    // W -> X -> Y with W and Y confounded: W joins the intervention set and
    // the result is the adjustment formula over W.
    let g = CausalDiagram::new(
        &[],
        &[("W", "X"), ("X", "Y")],
        &[("W", "Y", "U")],
    )
    .unwrap();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g)
        .unwrap()
        .canonicalize();

    assert!(e.is_product());
    assert_eq!(*e.sumset(), set(&["W"]));
    assert_eq!(e.children().len(), 2);
    assert_eq!(e.children()[0].var(), Some(&set(&["W"])));
    assert_eq!(e.children()[0].cond(), Some(&set(&[])));
    assert_eq!(e.children()[1].var(), Some(&set(&["Y"])));
    assert_eq!(e.children()[1].cond(), Some(&set(&["W", "X"])));
}

#[test]
fn hedge_carries_the_diagram_and_its_witness() {
    let g = bow();
    let err = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap_err();

    match err {
        IdentifyError::Hedge { diagram, witness } => {
            assert_eq!(*diagram, g);
            assert!(*witness <= g);
            assert_eq!(*witness.vertices(), set(&["Y"]));
        }
        other => panic!("expected hedge, got {other:?}"),
    }
}

#[test]
fn observational_surrogate_matches_plain_identification() {
    // An empty surrogate set means "observational data only", so the
    // generalized procedure must agree with the classic one wherever the
    // classic one succeeds.
    let g = front_door();
    let classic = identify(&set(&["Y"]), &set(&["X"]), &g)
        .unwrap()
        .canonicalize();
    let general = generalized_identify(&set(&["Y"]), &set(&["X"]), &[set(&[])], &g)
        .unwrap()
        .canonicalize();

    assert_eq!(general, classic);
}

#[test]
fn surrogate_experiment_resolves_a_confounded_mediator() {
    // X -> Z -> Y with Z and Y confounded. X itself is unconfounded, so
    // observational data suffices and the whole expression telescopes.
    let g = CausalDiagram::new(
        &[],
        &[("X", "Z"), ("Z", "Y")],
        &[("Z", "Y", "U")],
    )
    .unwrap();
    let e = generalized_identify(&set(&["Y"]), &set(&["X"]), &[set(&[])], &g).unwrap();

    assert!(!e.is_product());
    assert_eq!(e.var(), Some(&set(&["Y"])));
    assert_eq!(e.cond(), Some(&set(&["X"])));
    assert_eq!(e.do_set(), Some(&set(&[])));
}

#[test]
fn partial_experiment_identifies_a_joint_intervention() {
    // X1 -> Y, X2 -> Y, with X1 and Y confounded. P(y | do(x1, x2)) is not
    // identifiable from observations, but an experiment on X1 alone pins it
    // down: the answer is the X1-regime conditional P_{x1}(y | x2).
    let g = CausalDiagram::new(
        &[],
        &[("X1", "Y"), ("X2", "Y")],
        &[("X1", "Y", "U")],
    )
    .unwrap();

    let surrogates = [set(&["X2"]), set(&["X1"])];
    let e = generalized_identify(&set(&["Y"]), &set(&["X1", "X2"]), &surrogates, &g)
        .unwrap();

    assert_eq!(e.var(), Some(&set(&["Y"])));
    assert_eq!(e.cond(), Some(&set(&["X2"])));
    assert_eq!(e.do_set(), Some(&set(&["X1"])));
}

#[test]
fn inapplicable_surrogates_yield_a_thicket() {
    // The only experiment intervenes on Y, which is never a subset of the
    // intervention set, so the search exhausts and reports what it tried.
    let g = bow();
    let err = generalized_identify(&set(&["Y"]), &set(&["X"]), &[set(&["Y"])], &g)
        .unwrap_err();

    match err {
        IdentifyError::Thicket { surrogates } => {
            assert_eq!(surrogates, vec![set(&["Y"])]);
        }
        other => panic!("expected thicket, got {other:?}"),
    }
}

#[test]
fn identified_formulas_are_simplification_fixpoints() {
    let g = front_door();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap();
    assert_eq!(e.clone().simplify(), e);

    let g = CausalDiagram::new(&[], &[("W", "X"), ("X", "Y")], &[("W", "Y", "U")]).unwrap();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap();
    assert_eq!(e.clone().simplify(), e);
}

#[test]
fn disconnected_target_reduces_to_its_marginal() {
    // Y is upstream of nothing and X cannot reach it: do(x) is a no-op.
    let g = CausalDiagram::new(&["Y"], &[("X", "Z")], &[]).unwrap();
    let e = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap();

    assert_eq!(e.var(), Some(&set(&["Y"])));
    assert_eq!(e.cond(), Some(&set(&[])));
    assert!(e.free_variables() == set(&["Y"]));
}

#[test]
fn formulas_over_many_variables_stay_deterministic() {
    // Two runs over a wider diagram produce identical trees, including
    // child order after canonicalization with numeric-suffix names.
    let g = CausalDiagram::new(
        &[],
        &[("X1", "X2"), ("X2", "X10"), ("X10", "Y")],
        &[("X1", "X10", "U")],
    )
    .unwrap();

    let a = identify(&set(&["Y"]), &set(&["X2"]), &g)
        .unwrap()
        .canonicalize();
    let b = identify(&set(&["Y"]), &set(&["X2"]), &g)
        .unwrap()
        .canonicalize();
    assert_eq!(a, b);
}

#[test]
fn conditional_query_agrees_with_identification_on_chains() {
    // In a chain, conditioning on the direct parent equals intervening on it.
    let g = CausalDiagram::new(&[], &[("X", "Y")], &[]).unwrap();
    let p = Probability::joint(g.vertices().clone());

    let by_query = causalid::conditional_query(&p, &set(&["Y"]), &set(&["X"]));
    let by_id = identify(&set(&["Y"]), &set(&["X"]), &g).unwrap();
    assert_eq!(by_query.var(), by_id.var());
    assert_eq!(by_query.cond(), by_id.cond());
}
