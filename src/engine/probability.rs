//! # Symbolic probability expressions
//!
//! This module implements the recursive expression tree the identification
//! procedures build their answers out of.
//!
//! ## Key components
//!
//! - **Probability**: a node carrying marginalization (`sumset`), an optional
//!   divisor (fraction), and a declared `scope`
//! - **ProbabilityKind**: the closed node variants — a `Term` leaf
//!   (variables, conditioning set, forced interventions) or a `Product`
//!   of child expressions
//! - **simplify**: a fixpoint term-rewriting pass over four prioritized
//!   rules (sum absorption, fraction elimination, child fusion, sum push)
//! - **conditional_query**: derives "target conditioned on cond" from an
//!   existing expression
//!
//! ## Design
//!
//! Expressions are values: every operation consumes or clones, and
//! simplification returns a possibly different-shaped tree instead of
//! mutating nodes other holders can still see. Product children are
//! semantically an unordered set; `canonicalize` imposes the deterministic
//! order used when comparing trees, since the fusion rule may legally fire
//! in different orders on logically equivalent inputs.

use std::cmp::Ordering;

use crate::engine::diagram::VarSet;

/// The node variants of a probability expression.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbabilityKind {
    /// A leaf `P_{do}(var | cond)`.
    Term {
        /// The variables the term is a distribution over.
        var: VarSet,
        /// The conditioning set.
        cond: VarSet,
        /// Forced interventions decorating the distribution (experimental
        /// regime), possibly mentioning names outside the diagram.
        do_set: VarSet,
    },
    /// A product of child expressions.
    Product {
        /// The factors. Unordered semantically; see [`Probability::canonicalize`].
        children: Vec<Probability>,
    },
}

/// A symbolic probability expression.
///
/// Carries an optional marginalization set (`sumset`), an optional divisor
/// (making the node a fraction), and an explicit `scope`: the variables the
/// expression is considered defined over, which gates
/// [`free_variables`](Self::free_variables) so conditioning constants do not
/// leak out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Probability {
    kind: ProbabilityKind,
    sumset: VarSet,
    divisor: Option<Box<Probability>>,
    scope: VarSet,
}

impl Probability {
    /// The joint distribution `P(var)`.
    pub fn joint(var: VarSet) -> Self {
        let scope = var.clone();
        Self {
            kind: ProbabilityKind::Term {
                var,
                cond: VarSet::new(),
                do_set: VarSet::new(),
            },
            sumset: VarSet::new(),
            divisor: None,
            scope,
        }
    }

    /// The conditional term `P(var | cond)`. Scope defaults to `var ∪ cond`.
    pub fn term(var: VarSet, cond: VarSet) -> Self {
        let scope = &var | &cond;
        Self {
            kind: ProbabilityKind::Term {
                var,
                cond,
                do_set: VarSet::new(),
            },
            sumset: VarSet::new(),
            divisor: None,
            scope,
        }
    }

    /// A product of expressions. Scope defaults to the union of the
    /// children's scopes.
    pub fn product(children: Vec<Probability>) -> Self {
        let scope = children
            .iter()
            .fold(VarSet::new(), |acc, c| &acc | &c.scope);
        Self {
            kind: ProbabilityKind::Product { children },
            sumset: VarSet::new(),
            divisor: None,
            scope,
        }
    }

    /// Adds variables to the marginalization set.
    pub fn marginalized(mut self, extra: VarSet) -> Self {
        self.sumset.extend(extra);
        self
    }

    /// Replaces the forced-intervention decoration, recursing through
    /// products and divisors so every leaf carries the same regime.
    pub fn with_do(mut self, do_set: VarSet) -> Self {
        self.set_do(&do_set);
        self
    }

    fn set_do(&mut self, d: &VarSet) {
        match &mut self.kind {
            ProbabilityKind::Term { do_set, .. } => *do_set = d.clone(),
            ProbabilityKind::Product { children } => {
                for c in children.iter_mut() {
                    c.set_do(d);
                }
            }
        }
        if let Some(div) = &mut self.divisor {
            div.set_do(d);
        }
    }

    /// Overrides the declared scope.
    pub fn with_scope(mut self, scope: VarSet) -> Self {
        self.scope = scope;
        self
    }

    /// Marks this expression as the numerator over `divisor`.
    ///
    /// An already fractional expression is wrapped in a single-child product
    /// first, so the existing divisor is preserved.
    pub fn into_fraction(mut self, divisor: Probability) -> Self {
        if self.divisor.is_some() {
            let mut wrapped = Probability::product(vec![self]);
            wrapped.divisor = Some(Box::new(divisor));
            return wrapped;
        }
        self.divisor = Some(Box::new(divisor));
        self
    }

    /// The term's variable set; `None` for a product.
    pub fn var(&self) -> Option<&VarSet> {
        match &self.kind {
            ProbabilityKind::Term { var, .. } => Some(var),
            ProbabilityKind::Product { .. } => None,
        }
    }

    /// The term's conditioning set; `None` for a product.
    pub fn cond(&self) -> Option<&VarSet> {
        match &self.kind {
            ProbabilityKind::Term { cond, .. } => Some(cond),
            ProbabilityKind::Product { .. } => None,
        }
    }

    /// The term's forced-intervention set; `None` for a product.
    pub fn do_set(&self) -> Option<&VarSet> {
        match &self.kind {
            ProbabilityKind::Term { do_set, .. } => Some(do_set),
            ProbabilityKind::Product { .. } => None,
        }
    }

    /// The product's children; empty for a term.
    pub fn children(&self) -> &[Probability] {
        match &self.kind {
            ProbabilityKind::Product { children } => children,
            ProbabilityKind::Term { .. } => &[],
        }
    }

    /// The divisor when this node is a fraction.
    pub fn divisor(&self) -> Option<&Probability> {
        self.divisor.as_deref()
    }

    /// The marginalized-out variables.
    pub fn sumset(&self) -> &VarSet {
        &self.sumset
    }

    /// The variables this expression is declared over.
    pub fn scope(&self) -> &VarSet {
        &self.scope
    }

    /// The node variant, for exhaustive matching by external consumers.
    pub fn kind(&self) -> &ProbabilityKind {
        &self.kind
    }

    /// Whether this node is a product.
    pub fn is_product(&self) -> bool {
        matches!(self.kind, ProbabilityKind::Product { .. })
    }

    /// The variables this expression is actually a function of: leaf
    /// variables (union over products), minus the sumset, plus the
    /// divisor's free variables, intersected with the scope.
    pub fn free_variables(&self) -> VarSet {
        let mut free = match &self.kind {
            ProbabilityKind::Term { var, .. } => var.clone(),
            ProbabilityKind::Product { children } => children
                .iter()
                .fold(VarSet::new(), |acc, c| &acc | &c.free_variables()),
        };
        free = &free - &self.sumset;
        if let Some(div) = &self.divisor {
            free.extend(div.free_variables());
        }
        &free & &self.scope
    }

    /// Whether `v` occurs anywhere in this tree (variables, conditioning,
    /// interventions, sumsets or divisors).
    fn mentions(&self, v: &str) -> bool {
        if self.sumset.contains(v) {
            return true;
        }
        if let Some(div) = &self.divisor {
            if div.mentions(v) {
                return true;
            }
        }
        match &self.kind {
            ProbabilityKind::Term { var, cond, do_set } => {
                var.contains(v) || cond.contains(v) || do_set.contains(v)
            }
            ProbabilityKind::Product { children } => children.iter().any(|c| c.mentions(v)),
        }
    }

    /// Rewrites the expression to a fixpoint of the simplification rules
    /// and returns the (possibly different-shaped) result.
    ///
    /// Rules, in priority order:
    /// 1. sum absorption on terms: `Σ_c P(a,c) = P(a)`
    /// 2. fraction elimination on terms: `P(x,y)/P(y) = P(x|y)`, `P(x)/1 = P(x)`
    /// 3. child fusion in products: `P(y|x,z)·P(x|z) = P(y,x|z)`, collapsing
    ///    a product left with one child into that child
    /// 4. sum push into products: a marginalized variable held by exactly
    ///    one child and conditioned on by none moves into that child
    ///
    /// Divisors and product children are simplified recursively first.
    /// The result is a best-effort normal form; compare trees after
    /// [`canonicalize`](Self::canonicalize) rather than relying on rewrite
    /// order.
    #[must_use]
    pub fn simplify(mut self) -> Self {
        self.simplify_in_place();
        self
    }

    fn simplify_in_place(&mut self) {
        self.flatten_products();
        if let Some(div) = &mut self.divisor {
            div.simplify_in_place();
        }
        if let ProbabilityKind::Product { children } = &mut self.kind {
            for c in children.iter_mut() {
                c.simplify_in_place();
            }
        }
        loop {
            if self.rule_sum_absorb() {
                continue;
            }
            if self.rule_fraction_elim() {
                continue;
            }
            if self.rule_child_fusion() {
                continue;
            }
            if self.rule_collapse_singleton() {
                continue;
            }
            if self.rule_sum_push() {
                continue;
            }
            break;
        }
    }

    /// Splices product children that are themselves plain products (no
    /// sumset, no divisor) into their parent, so fusion can reach nested
    /// factors. Spliced children donate their scope to the parent.
    fn flatten_products(&mut self) {
        if let Some(div) = &mut self.divisor {
            div.flatten_products();
        }
        let ProbabilityKind::Product { children } = &mut self.kind else {
            return;
        };
        for c in children.iter_mut() {
            c.flatten_products();
        }
        if !children
            .iter()
            .any(|c| c.is_product() && c.sumset.is_empty() && c.divisor.is_none())
        {
            return;
        }
        let old = std::mem::take(children);
        let mut donated = VarSet::new();
        for c in old {
            if c.is_product() && c.sumset.is_empty() && c.divisor.is_none() {
                donated.extend(c.scope);
                if let ProbabilityKind::Product { children: sub } = c.kind {
                    children.extend(sub);
                }
            } else {
                children.push(c);
            }
        }
        self.scope.extend(donated);
    }

    /// `Σ_c P(a,c) = P(a)`: variables in both `sumset` and `var` vanish
    /// from both.
    fn rule_sum_absorb(&mut self) -> bool {
        let ProbabilityKind::Term { var, .. } = &mut self.kind else {
            return false;
        };
        let common = &*var & &self.sumset;
        if common.is_empty() {
            return false;
        }
        *var = &*var - &common;
        self.sumset = &self.sumset - &common;
        true
    }

    /// Drops a term's divisor when it is trivial (`P(x)/1`) or folds it
    /// into the conditioning set (`P(x,y)/P(y) = P(x|y)`).
    fn rule_fraction_elim(&mut self) -> bool {
        let ProbabilityKind::Term { var, do_set, .. } = &self.kind else {
            return false;
        };
        let Some(div) = self.divisor.as_deref() else {
            return false;
        };
        let ProbabilityKind::Term {
            var: dvar,
            cond: dcond,
            do_set: ddo,
        } = &div.kind
        else {
            return false;
        };
        if dvar.is_empty() {
            self.divisor = None;
            return true;
        }
        let foldable = dcond.is_empty()
            && div.sumset.is_empty()
            && div.divisor.is_none()
            && ddo == do_set
            && dvar.is_subset(var);
        if !foldable {
            return false;
        }
        let moved = dvar.clone();
        let ProbabilityKind::Term { var, cond, .. } = &mut self.kind else {
            return false;
        };
        *var = &*var - &moved;
        cond.extend(moved);
        self.divisor = None;
        true
    }

    /// `P(y|x,z)·P(x|z) = P(y,x|z)`: fuses a factor into the sibling that
    /// conditions on exactly its variables.
    fn rule_child_fusion(&mut self) -> bool {
        let ProbabilityKind::Product { children } = &self.kind else {
            return false;
        };
        let n = children.len();
        let mut found: Option<(usize, usize, VarSet, VarSet)> = None;
        'scan: for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (a, b) = (&children[i], &children[j]);
                let ProbabilityKind::Term {
                    cond: acond,
                    do_set: ado,
                    ..
                } = &a.kind
                else {
                    continue;
                };
                let ProbabilityKind::Term {
                    var: bvar,
                    cond: bcond,
                    do_set: bdo,
                } = &b.kind
                else {
                    continue;
                };
                // The absorbed factor must be a plain term in the same
                // experimental regime.
                if ado != bdo || !b.sumset.is_empty() || b.divisor.is_some() {
                    continue;
                }
                let b_all = bvar | bcond;
                if *acond != b_all {
                    continue;
                }
                // Pulling b under a's marginalization would change meaning.
                if !a.sumset.is_disjoint(&b_all) {
                    continue;
                }
                found = Some((i, j, bvar.clone(), b.scope.clone()));
                break 'scan;
            }
        }
        let Some((i, j, bvar, bscope)) = found else {
            return false;
        };
        let ProbabilityKind::Product { children } = &mut self.kind else {
            return false;
        };
        {
            let a = &mut children[i];
            if let ProbabilityKind::Term { var, cond, .. } = &mut a.kind {
                var.extend(bvar.iter().cloned());
                *cond = &*cond - &bvar;
            }
            a.scope.extend(bscope);
        }
        children.remove(j);
        true
    }

    /// Replaces a single-child product by that child, merging sumset,
    /// scope and (at most one) divisor. This is explicit tree replacement:
    /// the product node disappears instead of being edited in place.
    fn rule_collapse_singleton(&mut self) -> bool {
        let ProbabilityKind::Product { children } = &mut self.kind else {
            return false;
        };
        if children.len() != 1 {
            return false;
        }
        // Two stacked fractions cannot be merged into one node.
        if self.divisor.is_some() && children[0].divisor.is_some() {
            return false;
        }
        let mut child = children.pop().expect("exactly one child");
        child.sumset.extend(std::mem::take(&mut self.sumset));
        child.scope.extend(std::mem::take(&mut self.scope));
        if child.divisor.is_none() {
            child.divisor = self.divisor.take();
        }
        *self = child;
        true
    }

    /// Moves a marginalized variable into the single child that carries it,
    /// when no sibling conditions on it: `Σ_v P(a,v)·P(b) = P(a)·P(b)`.
    /// A child whose variable set empties out is dropped.
    fn rule_sum_push(&mut self) -> bool {
        if self.sumset.is_empty() {
            return false;
        }
        let ProbabilityKind::Product { children } = &self.kind else {
            return false;
        };
        if children.iter().any(Probability::is_product) {
            return false;
        }
        let mut push: Option<(String, usize)> = None;
        'vars: for v in &self.sumset {
            let mut holder: Option<usize> = None;
            for (idx, c) in children.iter().enumerate() {
                let ProbabilityKind::Term { var, cond, .. } = &c.kind else {
                    continue 'vars;
                };
                if cond.contains(v.as_str()) || c.sumset.contains(v.as_str()) {
                    continue 'vars;
                }
                if c.divisor.as_deref().is_some_and(|d| d.mentions(v)) {
                    continue 'vars;
                }
                if var.contains(v.as_str()) {
                    if holder.is_some() {
                        continue 'vars;
                    }
                    holder = Some(idx);
                }
            }
            if let Some(idx) = holder {
                push = Some((v.clone(), idx));
                break;
            }
        }
        let Some((v, idx)) = push else {
            return false;
        };
        self.sumset.remove(&v);
        let ProbabilityKind::Product { children } = &mut self.kind else {
            return false;
        };
        let mut drop_child = false;
        if let ProbabilityKind::Term { var, .. } = &mut children[idx].kind {
            var.remove(&v);
            drop_child = var.is_empty()
                && children[idx].sumset.is_empty()
                && children[idx].divisor.is_none();
        }
        if drop_child {
            children.remove(idx);
        }
        true
    }

    /// The canonical expression ordering used for deterministic child
    /// enumeration: expressions without a sumset sort first, then those
    /// without conditioning, then by ascending variable count, then by
    /// variable names compared as alphabetic prefix plus numeric suffix.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let empty = VarSet::new();
        let svar = self.var().unwrap_or(&empty);
        let ovar = other.var().unwrap_or(&empty);
        let scond = self.cond().unwrap_or(&empty);
        let ocond = other.cond().unwrap_or(&empty);
        let lead = (
            !self.sumset.is_empty(),
            !scond.is_empty(),
            svar.len(),
        )
            .cmp(&(!other.sumset.is_empty(), !ocond.is_empty(), ovar.len()));
        if lead != Ordering::Equal {
            return lead;
        }
        let names = cmp_name_sets(svar, ovar)
            .then_with(|| cmp_name_sets(scond, ocond))
            .then_with(|| cmp_name_sets(&self.sumset, &other.sumset));
        if names != Ordering::Equal {
            return names;
        }
        // Remaining tie-breaks keep product sorting total and deterministic.
        let sdo = self.do_set().unwrap_or(&empty);
        let odo = other.do_set().unwrap_or(&empty);
        cmp_name_sets(sdo, odo)
            .then_with(|| self.children().len().cmp(&other.children().len()))
            .then_with(|| {
                for (a, b) in self.children().iter().zip(other.children()) {
                    let o = a.canonical_cmp(b);
                    if o != Ordering::Equal {
                        return o;
                    }
                }
                Ordering::Equal
            })
            .then_with(|| match (&self.divisor, &other.divisor) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.canonical_cmp(b),
            })
    }

    /// Recursively sorts product children by [`canonical_cmp`](Self::canonical_cmp),
    /// producing the deterministic form tests should compare.
    #[must_use]
    pub fn canonicalize(mut self) -> Self {
        if let Some(div) = self.divisor.take() {
            self.divisor = Some(Box::new(div.canonicalize()));
        }
        if let ProbabilityKind::Product { children } = &mut self.kind {
            let mut sorted: Vec<Probability> = std::mem::take(children)
                .into_iter()
                .map(Probability::canonicalize)
                .collect();
            sorted.sort_by(Probability::canonical_cmp);
            *children = sorted;
        }
        self
    }
}

/// Builds the expression for `target` conditioned on `cond`, derived from
/// `p`: marginalize everything else out of a copy, and divide by the
/// marginal of `cond` when conditioning is requested.
pub fn conditional_query(p: &Probability, target: &VarSet, cond: &VarSet) -> Probability {
    let free = p.free_variables();
    if cond.is_empty() {
        return p.clone().marginalized(&free - target).simplify();
    }
    let numer = p
        .clone()
        .marginalized(&free - &(cond | target))
        .simplify();
    let denom = p.clone().marginalized(&free - cond).simplify();
    numer.into_fraction(denom).simplify()
}

/// Compares two name sets elementwise, splitting each name into an
/// alphabetic prefix and a numeric suffix (absent suffix compares as 0),
/// so `X2` sorts before `X10`.
fn cmp_name_sets(a: &VarSet, b: &VarSet) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let o = name_key(x).cmp(&name_key(y));
        if o != Ordering::Equal {
            return o;
        }
    }
    a.len().cmp(&b.len())
}

fn name_key(name: &str) -> (&str, u64) {
    let digits = name
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .count();
    let split = name.len() - digits;
    let (prefix, suffix) = name.split_at(split);
    let number = if suffix.is_empty() {
        0
    } else {
        suffix.parse().unwrap_or(u64::MAX)
    };
    (prefix, number)
}
