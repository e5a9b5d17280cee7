//! Reverse-mode automatic differentiation.
//!
//! A [`Tape`] is an append-only list of nodes. Each node stores its incoming
//! edges as `(parent, ∂node/∂parent)` pairs, so the backward sweep is a single
//! reverse pass accumulating adjoints:
//!
//! ```text
//!   adj[parent] += adj[node] * partial
//! ```
//!
//! Nodes may have any number of parents. Dense layers are recorded as one
//! fused `affine` node instead of `2n` binary nodes.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::scalar::Scalar;

#[derive(Debug, Clone, Copy)]
struct Node {
    first_edge: u32,
    n_edges: u32,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    parent: u32,
    partial: f64,
}

#[derive(Debug, Default)]
struct TapeInner {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Computation record for one differentiated evaluation.
#[derive(Debug, Default)]
pub struct Tape {
    inner: RefCell<TapeInner>,
}

impl Tape {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tape with room for `nodes` nodes.
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            inner: RefCell::new(TapeInner {
                nodes: Vec::with_capacity(nodes),
                edges: Vec::with_capacity(2 * nodes),
            }),
        }
    }

    /// Register an independent variable.
    pub fn var(&self, value: f64) -> Var<'_> {
        self.push(value, std::iter::empty())
    }

    /// Register several independent variables at once.
    pub fn vars(&self, values: &[f64]) -> Vec<Var<'_>> {
        values.iter().map(|&v| self.var(v)).collect()
    }

    /// A constant. Identical to a leaf; its adjoint is simply never read.
    pub fn constant(&self, value: f64) -> Var<'_> {
        self.push(value, std::iter::empty())
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().nodes.is_empty()
    }

    fn push<I>(&self, value: f64, edges: I) -> Var<'_>
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let mut inner = self.inner.borrow_mut();
        let index = inner.nodes.len();
        debug_assert!(index < u32::MAX as usize, "tape overflow");
        let first_edge = inner.edges.len() as u32;
        inner.edges.extend(
            edges
                .into_iter()
                .map(|(parent, partial)| Edge { parent, partial }),
        );
        let n_edges = inner.edges.len() as u32 - first_edge;
        inner.nodes.push(Node {
            first_edge,
            n_edges,
        });
        Var {
            tape: self,
            index: index as u32,
            value,
        }
    }

    /// Backward sweep from `output`.
    ///
    /// Only nodes recorded before `output` can contribute, so the sweep starts
    /// there instead of at the end of the tape.
    pub fn gradient(&self, output: Var<'_>) -> Gradients {
        debug_assert!(std::ptr::eq(self, output.tape), "output from another tape");
        let inner = self.inner.borrow();
        let mut adjoints = vec![0.0; inner.nodes.len()];
        adjoints[output.index as usize] = 1.0;

        for i in (0..=output.index as usize).rev() {
            let adj = adjoints[i];
            if adj == 0.0 {
                continue;
            }
            let node = inner.nodes[i];
            let start = node.first_edge as usize;
            let end = start + node.n_edges as usize;
            for edge in &inner.edges[start..end] {
                adjoints[edge.parent as usize] += adj * edge.partial;
            }
        }

        Gradients { adjoints }
    }
}

/// Adjoints of every node with respect to one output.
#[derive(Debug, Clone)]
pub struct Gradients {
    adjoints: Vec<f64>,
}

impl Gradients {
    /// ∂output/∂var.
    pub fn wrt(&self, var: Var<'_>) -> f64 {
        self.adjoints[var.index as usize]
    }

    /// ∂output/∂varᵢ for each variable.
    pub fn wrt_all(&self, vars: &[Var<'_>]) -> Vec<f64> {
        vars.iter().map(|&v| self.wrt(v)).collect()
    }
}

/// A value recorded on a [`Tape`].
#[derive(Clone, Copy)]
pub struct Var<'t> {
    tape: &'t Tape,
    index: u32,
    value: f64,
}

impl<'t> Var<'t> {
    /// The tape this value lives on.
    pub fn tape(&self) -> &'t Tape {
        self.tape
    }

    fn unary(self, value: f64, partial: f64) -> Self {
        self.tape.push(value, [(self.index, partial)])
    }

    fn binary(self, other: Self, value: f64, d_self: f64, d_other: f64) -> Self {
        debug_assert!(std::ptr::eq(self.tape, other.tape), "mixed tapes");
        self.tape
            .push(value, [(self.index, d_self), (other.index, d_other)])
    }
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var#{}({})", self.index, self.value)
    }
}

impl<'t> Add for Var<'t> {
    type Output = Var<'t>;
    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl<'t> Sub for Var<'t> {
    type Output = Var<'t>;
    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl<'t> Mul for Var<'t> {
    type Output = Var<'t>;
    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl<'t> Div for Var<'t> {
    type Output = Var<'t>;
    fn div(self, rhs: Self) -> Self {
        let value = self.value / rhs.value;
        self.binary(rhs, value, 1.0 / rhs.value, -value / rhs.value)
    }
}

impl<'t> Neg for Var<'t> {
    type Output = Var<'t>;
    fn neg(self) -> Self {
        self.unary(-self.value, -1.0)
    }
}

impl<'t> Add<f64> for Var<'t> {
    type Output = Var<'t>;
    fn add(self, rhs: f64) -> Self {
        self.unary(self.value + rhs, 1.0)
    }
}

impl<'t> Sub<f64> for Var<'t> {
    type Output = Var<'t>;
    fn sub(self, rhs: f64) -> Self {
        self.unary(self.value - rhs, 1.0)
    }
}

impl<'t> Mul<f64> for Var<'t> {
    type Output = Var<'t>;
    fn mul(self, rhs: f64) -> Self {
        self.unary(self.value * rhs, rhs)
    }
}

impl<'t> Div<f64> for Var<'t> {
    type Output = Var<'t>;
    fn div(self, rhs: f64) -> Self {
        self.unary(self.value / rhs, 1.0 / rhs)
    }
}

impl<'t> Add<Var<'t>> for f64 {
    type Output = Var<'t>;
    fn add(self, rhs: Var<'t>) -> Var<'t> {
        rhs + self
    }
}

impl<'t> Sub<Var<'t>> for f64 {
    type Output = Var<'t>;
    fn sub(self, rhs: Var<'t>) -> Var<'t> {
        rhs.unary(self - rhs.value, -1.0)
    }
}

impl<'t> Mul<Var<'t>> for f64 {
    type Output = Var<'t>;
    fn mul(self, rhs: Var<'t>) -> Var<'t> {
        rhs * self
    }
}

impl<'t> Div<Var<'t>> for f64 {
    type Output = Var<'t>;
    fn div(self, rhs: Var<'t>) -> Var<'t> {
        let value = self / rhs.value;
        rhs.unary(value, -value / rhs.value)
    }
}

impl Scalar for Var<'_> {
    #[inline]
    fn value(self) -> f64 {
        self.value
    }

    fn constant_like(self, c: f64) -> Self {
        self.tape.constant(c)
    }

    fn sin(self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.unary(s, c)
    }

    fn cos(self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.unary(c, -s)
    }

    fn tanh(self) -> Self {
        let t = self.value.tanh();
        self.unary(t, 1.0 - t * t)
    }

    fn exp(self) -> Self {
        let e = self.value.exp();
        self.unary(e, e)
    }

    fn ln(self) -> Self {
        self.unary(self.value.ln(), 1.0 / self.value)
    }

    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.unary(s, 0.5 / s)
    }

    fn powi(self, n: i32) -> Self {
        let value = self.value.powi(n);
        let partial = if n == 0 {
            0.0
        } else {
            n as f64 * self.value.powi(n - 1)
        };
        self.unary(value, partial)
    }

    fn clamp_straight_through(self, lo: f64, hi: f64) -> Self {
        self.unary(self.value.clamp(lo, hi), 1.0)
    }

    fn affine(weights: &[Self], inputs: &[Self], bias: Self) -> Self {
        debug_assert_eq!(weights.len(), inputs.len());
        let value = weights
            .iter()
            .zip(inputs)
            .fold(bias.value, |acc, (w, x)| acc + w.value * x.value);
        let edges = weights
            .iter()
            .zip(inputs)
            .flat_map(|(w, x)| [(w.index, x.value), (x.index, w.value)])
            .chain(std::iter::once((bias.index, 1.0)));
        bias.tape.push(value, edges)
    }
}

/// Evaluate `f` at `x` on a fresh tape and return `(f(x), ∇f(x))`.
pub fn tape_gradient<F>(f: F, x: &[f64]) -> (f64, Vec<f64>)
where
    F: for<'t> Fn(&'t Tape, &[Var<'t>]) -> Var<'t>,
{
    let tape = Tape::new();
    let inputs = tape.vars(x);
    let output = f(&tape, &inputs);
    let grads = tape.gradient(output);
    (output.value(), grads.wrt_all(&inputs))
}
