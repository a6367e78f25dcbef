//! # Transform Functions
//!
//! A small algebra of scalar functions of one variable (`GenFunction`) and of
//! transform-valued functions built from them (`TransFunction`). A serial
//! transformer evaluates its function at each copy index to get a placement.
//!
//! Functions round-trip through a textual form: [`persistify`] writes it and
//! [`interpret`] parses it back. `Native` closures have no textual form.

mod interpret;
mod persist;

pub use interpret::interpret;
pub use persist::persistify;

use std::fmt;
use std::ops;
use std::sync::Arc;

use crate::model::Transform3D;

// ============================================================================
// GenFunction
// ============================================================================

/// Scalar function `f(x)`.
#[derive(Debug, Clone, PartialEq)]
pub enum GenFunction {
    X,
    Const(f64),
    Sum(Box<GenFunction>, Box<GenFunction>),
    Diff(Box<GenFunction>, Box<GenFunction>),
    Prod(Box<GenFunction>, Box<GenFunction>),
    Quot(Box<GenFunction>, Box<GenFunction>),
    Neg(Box<GenFunction>),
    Sin(Box<GenFunction>),
    Cos(Box<GenFunction>),
    Sqrt(Box<GenFunction>),
}

impl GenFunction {
    pub fn x() -> Self {
        GenFunction::X
    }

    pub fn constant(v: f64) -> Self {
        GenFunction::Const(v)
    }

    pub fn sin(self) -> Self {
        GenFunction::Sin(Box::new(self))
    }

    pub fn cos(self) -> Self {
        GenFunction::Cos(Box::new(self))
    }

    pub fn sqrt(self) -> Self {
        GenFunction::Sqrt(Box::new(self))
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            GenFunction::X => x,
            GenFunction::Const(v) => *v,
            GenFunction::Sum(a, b) => a.eval(x) + b.eval(x),
            GenFunction::Diff(a, b) => a.eval(x) - b.eval(x),
            GenFunction::Prod(a, b) => a.eval(x) * b.eval(x),
            GenFunction::Quot(a, b) => a.eval(x) / b.eval(x),
            GenFunction::Neg(a) => -a.eval(x),
            GenFunction::Sin(a) => a.eval(x).sin(),
            GenFunction::Cos(a) => a.eval(x).cos(),
            GenFunction::Sqrt(a) => a.eval(x).sqrt(),
        }
    }
}

macro_rules! gen_binop {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for GenFunction {
            type Output = GenFunction;
            fn $method(self, rhs: GenFunction) -> GenFunction {
                GenFunction::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

gen_binop!(Add, add, Sum);
gen_binop!(Sub, sub, Diff);
gen_binop!(Mul, mul, Prod);
gen_binop!(Div, div, Quot);

impl ops::Neg for GenFunction {
    type Output = GenFunction;
    fn neg(self) -> GenFunction {
        GenFunction::Neg(Box::new(self))
    }
}

// ============================================================================
// Primitive transforms
// ============================================================================

/// One-parameter transform families, the building blocks of `Pow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    TranslateX3D,
    TranslateY3D,
    TranslateZ3D,
    RotateX3D,
    RotateY3D,
    RotateZ3D,
}

impl Primitive {
    pub const ALL: [Primitive; 6] = [
        Primitive::TranslateX3D,
        Primitive::TranslateY3D,
        Primitive::TranslateZ3D,
        Primitive::RotateX3D,
        Primitive::RotateY3D,
        Primitive::RotateZ3D,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::TranslateX3D => "TranslateX3D",
            Primitive::TranslateY3D => "TranslateY3D",
            Primitive::TranslateZ3D => "TranslateZ3D",
            Primitive::RotateX3D => "RotateX3D",
            Primitive::RotateY3D => "RotateY3D",
            Primitive::RotateZ3D => "RotateZ3D",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Transform for parameter value `v` (a length or an angle).
    pub fn apply(self, v: f64) -> Transform3D {
        match self {
            Primitive::TranslateX3D => Transform3D::translation(v, 0.0, 0.0),
            Primitive::TranslateY3D => Transform3D::translation(0.0, v, 0.0),
            Primitive::TranslateZ3D => Transform3D::translation(0.0, 0.0, v),
            Primitive::RotateX3D => Transform3D::rotation_x(v),
            Primitive::RotateY3D => Transform3D::rotation_y(v),
            Primitive::RotateZ3D => Transform3D::rotation_z(v),
        }
    }
}

// ============================================================================
// TransFunction
// ============================================================================

/// A closure-backed transform function. Evaluates fine, cannot be persisted.
#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    f: Arc<dyn Fn(f64) -> Transform3D + Send + Sync>,
}

impl NativeFn {
    pub fn new(name: impl Into<String>, f: impl Fn(f64) -> Transform3D + Send + Sync + 'static) -> Self {
        Self { name: name.into(), f: Arc::new(f) }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish_non_exhaustive()
    }
}

impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.f, &other.f)
    }
}

/// Transform-valued function `T(x)`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransFunction {
    /// `primitive(f(x))`
    Pow(Primitive, GenFunction),
    /// `a(x) * b(x)`
    Product(Box<TransFunction>, Box<TransFunction>),
    /// `T * f(x)`
    PreMult(Transform3D, Box<TransFunction>),
    /// `f(x) * T`
    PostMult(Box<TransFunction>, Transform3D),
    Native(NativeFn),
}

impl TransFunction {
    pub fn pow(primitive: Primitive, f: GenFunction) -> Self {
        TransFunction::Pow(primitive, f)
    }

    pub fn native(name: impl Into<String>, f: impl Fn(f64) -> Transform3D + Send + Sync + 'static) -> Self {
        TransFunction::Native(NativeFn::new(name, f))
    }

    pub fn eval(&self, x: f64) -> Transform3D {
        match self {
            TransFunction::Pow(p, f) => p.apply(f.eval(x)),
            TransFunction::Product(a, b) => a.eval(x) * b.eval(x),
            TransFunction::PreMult(t, f) => *t * f.eval(x),
            TransFunction::PostMult(f, t) => f.eval(x) * *t,
            TransFunction::Native(n) => (n.f)(x),
        }
    }
}

impl ops::Mul for TransFunction {
    type Output = TransFunction;
    fn mul(self, rhs: TransFunction) -> TransFunction {
        TransFunction::Product(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul<TransFunction> for Transform3D {
    type Output = TransFunction;
    fn mul(self, rhs: TransFunction) -> TransFunction {
        TransFunction::PreMult(self, Box::new(rhs))
    }
}

impl ops::Mul<Transform3D> for TransFunction {
    type Output = TransFunction;
    fn mul(self, rhs: Transform3D) -> TransFunction {
        TransFunction::PostMult(Box::new(self), rhs)
    }
}
