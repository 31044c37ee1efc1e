use super::{Gelu, Sigmoid};

/// An element-wise activation function.
#[derive(Clone, Copy, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Gelu(Gelu),
}

impl ActFn {
    pub fn sigmoid() -> Self {
        Self::Sigmoid(Sigmoid)
    }

    pub fn gelu() -> Self {
        Self::Gelu(Gelu)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(x),
            Self::Gelu(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(x),
            Self::Gelu(a) => a.df(x),
        }
    }
}
