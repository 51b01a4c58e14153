//! # Causal diagram
//!
//! This module implements the semi-Markovian causal diagram: a directed
//! acyclic graph over named variables plus bidirected "confounding" edges,
//! each labelled by a latent variable that is not itself a vertex.
//!
//! ## Key components
//!
//! - **CausalDiagram**: immutable-after-construction graph answering
//!   parent/child, ancestor/descendant and c-component queries
//! - **ConfoundedEdge**: a latent-labelled unordered pair of vertices
//!
//! ## Design
//!
//! Every derived view (`intervene`, `induced`) is a fresh instance whose
//! caches are recomputed from the surviving edges, never inherited, so a
//! sibling branch of the identification recursion can keep using the source
//! diagram unchanged. Structural equality and hashing ignore latent variable
//! names and depend only on the vertex set, the directed edge set, and the
//! set of confounded vertex pairs.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::DiagramError;

/// A set of variable names with deterministic iteration order.
pub type VarSet = BTreeSet<String>;

/// A confounding edge: two distinct observed vertices sharing a latent cause.
///
/// The endpoint pair is stored in sorted order so that two edges over the
/// same vertices compare equal regardless of the order they were declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfoundedEdge {
    latent: String,
    a: String,
    b: String,
}

impl ConfoundedEdge {
    fn new(latent: String, x: String, y: String) -> Result<Self, DiagramError> {
        if x == y {
            return Err(DiagramError::SelfConfounded { latent, vertex: x });
        }
        let (a, b) = if x < y { (x, y) } else { (y, x) };
        Ok(Self { latent, a, b })
    }

    /// The latent variable labelling this edge.
    pub fn latent(&self) -> &str {
        &self.latent
    }

    /// The confounded vertex pair, in sorted order.
    pub fn pair(&self) -> (&str, &str) {
        (&self.a, &self.b)
    }

    fn touches(&self, vs: &VarSet) -> bool {
        vs.contains(&self.a) || vs.contains(&self.b)
    }
}

/// A semi-Markovian causal diagram.
///
/// Constructed once from a vertex/edge specification; all queries are pure
/// and all mutating operations (`intervene`, `induced`) return new instances.
/// Parent/child maps, ancestor/descendant closures, the topological order
/// and the c-component partition are computed eagerly at construction and
/// owned exclusively by this instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CausalDiagram {
    vertices: VarSet,
    directed: BTreeSet<(String, String)>,
    confounded: Vec<ConfoundedEdge>,
    parent_map: FxHashMap<String, VarSet>,
    child_map: FxHashMap<String, VarSet>,
    ancestor_map: FxHashMap<String, VarSet>,
    descendant_map: FxHashMap<String, VarSet>,
    order: Vec<String>,
    components: Vec<VarSet>,
}

impl CausalDiagram {
    /// Creates a diagram from vertex names, directed edges and confounding
    /// edges given as `(x, y, latent)` triples.
    ///
    /// Vertices mentioned only as edge endpoints are admitted into the
    /// vertex set. Construction rejects self-confounding, reused latent
    /// names, and cyclic directed edges.
    pub fn new(
        vertices: &[&str],
        directed: &[(&str, &str)],
        confounded: &[(&str, &str, &str)],
    ) -> Result<Self, DiagramError> {
        let mut vs: VarSet = vertices.iter().map(|v| (*v).to_owned()).collect();
        let mut dir = BTreeSet::new();
        for (x, y) in directed {
            vs.insert((*x).to_owned());
            vs.insert((*y).to_owned());
            dir.insert(((*x).to_owned(), (*y).to_owned()));
        }
        let mut conf = Vec::with_capacity(confounded.len());
        let mut latents = BTreeSet::new();
        for (x, y, u) in confounded {
            vs.insert((*x).to_owned());
            vs.insert((*y).to_owned());
            if !latents.insert((*u).to_owned()) {
                return Err(DiagramError::DuplicateLatent((*u).to_owned()));
            }
            conf.push(ConfoundedEdge::new(
                (*u).to_owned(),
                (*x).to_owned(),
                (*y).to_owned(),
            )?);
        }
        Self::build(vs, dir, conf)
    }

    /// Rebuilds all per-instance caches from the given edge sets.
    fn build(
        vertices: VarSet,
        directed: BTreeSet<(String, String)>,
        confounded: Vec<ConfoundedEdge>,
    ) -> Result<Self, DiagramError> {
        let mut parent_map: FxHashMap<String, VarSet> = vertices
            .iter()
            .map(|v| (v.clone(), VarSet::new()))
            .collect();
        let mut child_map = parent_map.clone();
        for (x, y) in &directed {
            child_map
                .get_mut(x.as_str())
                .expect("edge endpoint in vertex set")
                .insert(y.clone());
            parent_map
                .get_mut(y.as_str())
                .expect("edge endpoint in vertex set")
                .insert(x.clone());
        }
        let order = topological_order(&vertices, &parent_map, &child_map)?;
        let ancestor_map = transitive_closure(&parent_map, &vertices);
        let descendant_map = transitive_closure(&child_map, &vertices);
        let components = confounded_components(&vertices, &confounded);
        Ok(Self {
            vertices,
            directed,
            confounded,
            parent_map,
            child_map,
            ancestor_map,
            descendant_map,
            order,
            components,
        })
    }

    /// The observed vertex set V.
    pub fn vertices(&self) -> &VarSet {
        &self.vertices
    }

    /// The directed edge set as `(parent, child)` pairs.
    pub fn directed_edges(&self) -> &BTreeSet<(String, String)> {
        &self.directed
    }

    /// The confounding edges, with their latent labels.
    pub fn confounded_edges(&self) -> &[ConfoundedEdge] {
        &self.confounded
    }

    /// Whether `v` is one of the diagram's observed vertices.
    pub fn contains(&self, v: &str) -> bool {
        self.vertices.contains(v)
    }

    fn check_vertex(&self, v: &str) -> Result<(), DiagramError> {
        if self.vertices.contains(v) {
            Ok(())
        } else {
            Err(DiagramError::UnknownVertex(v.to_owned()))
        }
    }

    fn check_vertices(&self, vs: &VarSet) -> Result<(), DiagramError> {
        for v in vs {
            self.check_vertex(v)?;
        }
        Ok(())
    }

    /// Direct parents of a single vertex.
    pub fn parents_of(&self, v: &str) -> Result<&VarSet, DiagramError> {
        self.check_vertex(v)?;
        Ok(&self.parent_map[v])
    }

    /// Direct children of a single vertex.
    pub fn children_of(&self, v: &str) -> Result<&VarSet, DiagramError> {
        self.check_vertex(v)?;
        Ok(&self.child_map[v])
    }

    /// Union of direct parents over a vertex set.
    pub fn parents(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        self.check_vertices(vs)?;
        Ok(vs
            .iter()
            .flat_map(|v| self.parent_map[v.as_str()].iter().cloned())
            .collect())
    }

    /// Union of direct children over a vertex set.
    pub fn children(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        self.check_vertices(vs)?;
        Ok(vs
            .iter()
            .flat_map(|v| self.child_map[v.as_str()].iter().cloned())
            .collect())
    }

    /// Union of strict ancestors over a vertex set (excludes the arguments).
    pub fn ancestors(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        self.check_vertices(vs)?;
        Ok(vs
            .iter()
            .flat_map(|v| self.ancestor_map[v.as_str()].iter().cloned())
            .collect())
    }

    /// An(S): ancestors of S including S itself.
    pub fn ancestors_inclusive(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        Ok(&self.ancestors(vs)? | vs)
    }

    /// Union of strict descendants over a vertex set (excludes the arguments).
    pub fn descendants(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        self.check_vertices(vs)?;
        Ok(vs
            .iter()
            .flat_map(|v| self.descendant_map[v.as_str()].iter().cloned())
            .collect())
    }

    /// De(S): descendants of S including S itself.
    pub fn descendants_inclusive(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        Ok(&self.descendants(vs)? | vs)
    }

    /// A topological order of V consistent with the directed edges.
    ///
    /// Deterministic for a given edge set: ties are broken by vertex name,
    /// so recursive decompositions downstream are reproducible.
    pub fn causal_order(&self) -> &[String] {
        &self.order
    }

    /// Whether the directed edge `x -> y` is present.
    pub fn has_edge(&self, x: &str, y: &str) -> bool {
        self.child_map
            .get(x)
            .map(|cs| cs.contains(y))
            .unwrap_or(false)
    }

    /// Whether `x` and `y` share a latent cause.
    pub fn is_confounded(&self, x: &str, y: &str) -> bool {
        self.confounded
            .iter()
            .any(|e| (e.a == x && e.b == y) || (e.a == y && e.b == x))
    }

    /// Vertices connected to `v` by a confounding edge.
    pub fn confounded_with(&self, v: &str) -> Result<VarSet, DiagramError> {
        self.check_vertex(v)?;
        let mut partners = VarSet::new();
        for e in &self.confounded {
            if e.a == v {
                partners.insert(e.b.clone());
            } else if e.b == v {
                partners.insert(e.a.clone());
            }
        }
        Ok(partners)
    }

    /// The do-operator: a new diagram over the same vertex set in which
    /// every directed edge into `xs` and every confounding edge touching
    /// `xs` has been removed (latent labels drop with their edges).
    pub fn intervene(&self, xs: &VarSet) -> Result<Self, DiagramError> {
        self.check_vertices(xs)?;
        if xs.is_empty() {
            return Ok(self.clone());
        }
        let directed = self
            .directed
            .iter()
            .filter(|(_, y)| !xs.contains(y))
            .cloned()
            .collect();
        let confounded = self
            .confounded
            .iter()
            .filter(|e| !e.touches(xs))
            .cloned()
            .collect();
        Self::build(self.vertices.clone(), directed, confounded)
    }

    /// The vertex-induced subgraph over `s`: edges with an endpoint outside
    /// `s` are dropped and all caches are rebuilt restricted to `s`.
    ///
    /// Returns an unchanged copy when `s` equals the full vertex set.
    pub fn induced(&self, s: &VarSet) -> Result<Self, DiagramError> {
        self.check_vertices(s)?;
        if *s == self.vertices {
            return Ok(self.clone());
        }
        let directed = self
            .directed
            .iter()
            .filter(|(x, y)| s.contains(x) && s.contains(y))
            .cloned()
            .collect();
        let confounded = self
            .confounded
            .iter()
            .filter(|e| s.contains(&e.a) && s.contains(&e.b))
            .cloned()
            .collect();
        Self::build(s.clone(), directed, confounded)
    }

    /// The c-component partition of V: maximal sets of vertices connected
    /// through confounding edges, sorted by their smallest member.
    pub fn c_components(&self) -> &[VarSet] {
        &self.components
    }

    /// Whether the whole diagram is one c-component.
    pub fn is_single_c_component(&self) -> bool {
        self.components.len() == 1 && self.components[0] == self.vertices
    }

    /// Union of the c-components containing the given vertices.
    pub fn c_component_of(&self, vs: &VarSet) -> Result<VarSet, DiagramError> {
        self.check_vertices(vs)?;
        let mut acc = VarSet::new();
        for part in &self.components {
            if vs.iter().any(|v| part.contains(v)) {
                acc.extend(part.iter().cloned());
            }
        }
        Ok(acc)
    }

    /// The confounded vertex pairs with latent names erased. This is the
    /// representation used by structural equality, hashing and the subgraph
    /// order.
    fn confounded_pairs(&self) -> BTreeSet<(String, String)> {
        self.confounded
            .iter()
            .map(|e| (e.a.clone(), e.b.clone()))
            .collect()
    }

    fn is_subgraph_of(&self, other: &Self) -> bool {
        self.vertices.is_subset(&other.vertices)
            && self.directed.is_subset(&other.directed)
            && self
                .confounded_pairs()
                .is_subset(&other.confounded_pairs())
    }
}

impl PartialEq for CausalDiagram {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices
            && self.directed == other.directed
            && self.confounded_pairs() == other.confounded_pairs()
    }
}

impl Eq for CausalDiagram {}

impl Hash for CausalDiagram {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.vertices.hash(state);
        self.directed.hash(state);
        self.confounded_pairs().hash(state);
    }
}

/// Subgraph containment order: `a <= b` when `a`'s vertices, directed edges
/// and confounded pairs are all contained in `b`'s. Incomparable diagrams
/// yield `None`.
impl PartialOrd for CausalDiagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_subgraph_of(other) {
            Some(Ordering::Less)
        } else if other.is_subgraph_of(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

/// Kahn's algorithm with a lexicographic tie-break over the ready set.
fn topological_order(
    vertices: &VarSet,
    parent_map: &FxHashMap<String, VarSet>,
    child_map: &FxHashMap<String, VarSet>,
) -> Result<Vec<String>, DiagramError> {
    let mut indegree: FxHashMap<&str, usize> = vertices
        .iter()
        .map(|v| (v.as_str(), parent_map[v.as_str()].len()))
        .collect();
    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(v, _)| *v)
        .collect();
    let mut order = Vec::with_capacity(vertices.len());
    while let Some(v) = ready.iter().next().copied() {
        ready.remove(v);
        order.push(v.to_owned());
        for c in &child_map[v] {
            let d = indegree
                .get_mut(c.as_str())
                .expect("child is a known vertex");
            *d -= 1;
            if *d == 0 {
                ready.insert(c.as_str());
            }
        }
    }
    if order.len() != vertices.len() {
        let stuck = indegree
            .iter()
            .find(|(_, d)| **d > 0)
            .map(|(v, _)| (*v).to_owned())
            .unwrap_or_default();
        return Err(DiagramError::CyclicDirected(stuck));
    }
    Ok(order)
}

/// Per-vertex transitive closure of a one-step map, memoized across the
/// whole vertex set. The memo is local to this call and ends up owned by
/// the diagram instance being built.
fn transitive_closure(
    step: &FxHashMap<String, VarSet>,
    vertices: &VarSet,
) -> FxHashMap<String, VarSet> {
    let mut memo: FxHashMap<String, VarSet> = FxHashMap::default();
    for v in vertices {
        closure_of(v, step, &mut memo);
    }
    memo
}

fn closure_of(
    v: &str,
    step: &FxHashMap<String, VarSet>,
    memo: &mut FxHashMap<String, VarSet>,
) -> VarSet {
    if let Some(hit) = memo.get(v) {
        return hit.clone();
    }
    let direct = step[v].clone();
    let mut acc = direct.clone();
    for u in &direct {
        acc.extend(closure_of(u, step, memo));
    }
    memo.insert(v.to_owned(), acc.clone());
    acc
}

/// Partitions the vertex set by connectivity under confounding edges only.
///
/// Outer iteration follows the sorted vertex set, so the resulting parts are
/// ordered by their smallest member.
fn confounded_components(vertices: &VarSet, confounded: &[ConfoundedEdge]) -> Vec<VarSet> {
    let mut adjacency: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for e in confounded {
        adjacency.entry(&e.a).or_default().push(&e.b);
        adjacency.entry(&e.b).or_default().push(&e.a);
    }
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut parts = Vec::new();
    for v in vertices {
        if seen.contains(v.as_str()) {
            continue;
        }
        let mut part = VarSet::new();
        let mut stack: SmallVec<[&str; 8]> = SmallVec::new();
        stack.push(v.as_str());
        while let Some(u) = stack.pop() {
            if !seen.insert(u) {
                continue;
            }
            part.insert(u.to_owned());
            for w in adjacency.get(u).into_iter().flatten() {
                if !seen.contains(w) {
                    stack.push(w);
                }
            }
        }
        parts.push(part);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> VarSet {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn front_door() -> CausalDiagram {
        CausalDiagram::new(
            &["X", "Z", "Y"],
            &[("X", "Z"), ("Z", "Y")],
            &[("X", "Y", "U")],
        )
        .unwrap()
    }

    #[test]
    fn new_admits_edge_endpoints_into_vertex_set() {
        let g = CausalDiagram::new(&[], &[("A", "B")], &[("B", "C", "U")]).unwrap();
        assert_eq!(*g.vertices(), set(&["A", "B", "C"]));
    }

    #[test]
    fn new_rejects_self_confounding() {
        let err = CausalDiagram::new(&["A"], &[], &[("A", "A", "U")]).unwrap_err();
        assert!(matches!(err, DiagramError::SelfConfounded { .. }));
    }

    #[test]
    fn new_rejects_reused_latent_names() {
        let err =
            CausalDiagram::new(&[], &[], &[("A", "B", "U"), ("B", "C", "U")]).unwrap_err();
        assert!(matches!(err, DiagramError::DuplicateLatent(_)));
    }

    #[test]
    fn new_rejects_directed_cycles() {
        let err = CausalDiagram::new(&[], &[("A", "B"), ("B", "A")], &[]).unwrap_err();
        assert!(matches!(err, DiagramError::CyclicDirected(_)));
    }

    #[test]
    fn queries_reject_unknown_vertices() {
        let g = front_door();
        assert!(matches!(
            g.parents_of("Q"),
            Err(DiagramError::UnknownVertex(_))
        ));
        assert!(matches!(
            g.ancestors(&set(&["Q"])),
            Err(DiagramError::UnknownVertex(_))
        ));
        assert!(matches!(
            g.induced(&set(&["X", "Q"])),
            Err(DiagramError::UnknownVertex(_))
        ));
    }

    #[test]
    fn ancestor_queries_have_inclusive_variants() {
        let g = front_door();
        assert_eq!(g.ancestors(&set(&["Y"])).unwrap(), set(&["X", "Z"]));
        assert_eq!(
            g.ancestors_inclusive(&set(&["Y"])).unwrap(),
            set(&["X", "Z", "Y"])
        );
        assert_eq!(g.descendants(&set(&["X"])).unwrap(), set(&["Z", "Y"]));
        assert_eq!(
            g.descendants_inclusive(&set(&["X"])).unwrap(),
            set(&["X", "Z", "Y"])
        );
    }

    #[test]
    fn causal_order_is_topological_and_name_stable() {
        let g = CausalDiagram::new(&["C"], &[("B", "A")], &[]).unwrap();
        // B before A (edge), C placed by the lexicographic tie-break.
        assert_eq!(g.causal_order(), ["B", "A", "C"]);
        assert_eq!(front_door().causal_order(), ["X", "Z", "Y"]);
    }

    #[test]
    fn intervene_removes_incoming_and_confounding_edges() {
        let g = front_door();
        let gx = g.intervene(&set(&["Z"])).unwrap();
        assert_eq!(*gx.vertices(), *g.vertices());
        assert!(!gx.has_edge("X", "Z"));
        assert!(gx.has_edge("Z", "Y"));
        // X <-> Y does not touch Z, so it survives.
        assert!(gx.is_confounded("X", "Y"));

        let gy = g.intervene(&set(&["Y"])).unwrap();
        assert!(!gy.has_edge("Z", "Y"));
        assert!(!gy.is_confounded("X", "Y"));
        assert!(gy.confounded_edges().is_empty());
    }

    #[test]
    fn intervene_is_idempotent() {
        let g = front_door();
        let once = g.intervene(&set(&["X"])).unwrap();
        let twice = once.intervene(&set(&["X"])).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn induced_full_vertex_set_is_identity() {
        let g = front_door();
        let same = g.induced(g.vertices()).unwrap();
        assert_eq!(g, same);
    }

    #[test]
    fn induced_drops_edges_leaving_the_subset() {
        let g = front_door();
        let sub = g.induced(&set(&["X", "Y"])).unwrap();
        assert_eq!(*sub.vertices(), set(&["X", "Y"]));
        assert!(sub.directed_edges().is_empty());
        assert!(sub.is_confounded("X", "Y"));
    }

    #[test]
    fn c_components_partition_the_vertex_set() {
        let g = front_door();
        let parts = g.c_components();
        assert_eq!(parts, &[set(&["X", "Y"]), set(&["Z"])]);
        let union: VarSet = parts.iter().flatten().cloned().collect();
        assert_eq!(union, *g.vertices());
    }

    #[test]
    fn c_component_of_unions_containing_parts() {
        let g = front_door();
        assert_eq!(g.c_component_of(&set(&["Z"])).unwrap(), set(&["Z"]));
        assert_eq!(
            g.c_component_of(&set(&["X"])).unwrap(),
            set(&["X", "Y"])
        );
        assert_eq!(
            g.c_component_of(&set(&["X", "Z"])).unwrap(),
            set(&["X", "Y", "Z"])
        );
    }

    #[test]
    fn equality_ignores_latent_names() {
        let a = front_door();
        let b = CausalDiagram::new(
            &["X", "Z", "Y"],
            &[("X", "Z"), ("Z", "Y")],
            &[("Y", "X", "U_renamed")],
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn subgraph_order_compares_containment() {
        let g = front_door();
        let sub = g.induced(&set(&["X", "Y"])).unwrap();
        assert!(sub < g);
        assert!(g > sub);
        let other = CausalDiagram::new(&["A"], &[], &[]).unwrap();
        assert_eq!(g.partial_cmp(&other), None);
    }
}
