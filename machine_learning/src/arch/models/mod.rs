mod deeponet;
mod deeponet_gru;
mod fno;
mod fno_gru;

use ndarray::{Array, Array2, ArrayView2, Dimension, ShapeArg};
use rand::Rng;

pub use deeponet::DeepONet;
pub use deeponet_gru::DeepONetGru;
pub use fno::{Fno, FnoBackbone};
pub use fno_gru::FnoGru;

use super::Model;
use crate::Result;

/// Reshapes an owned array in row-major order, copying it first if it isn't laid out that way.
pub(crate) fn reshape<D, E>(x: Array<f32, D>, shape: E) -> Result<Array<f32, E::Dim>>
where
    D: Dimension,
    E: ShapeArg,
{
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order(shape)?)
}

/// Every surrogate architecture the trainer knows how to build.
#[derive(Clone)]
pub enum Surrogate {
    DeepONet(DeepONet),
    Fno(Fno),
    FnoGru(FnoGru),
    DeepONetGru(DeepONetGru),
}

impl Surrogate {
    /// Returns the name of the architecture, as used by model selectors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeepONet(_) => "DeepONet",
            Self::Fno(_) => "FNO",
            Self::FnoGru(_) => "FNO+GRU",
            Self::DeepONetGru(_) => "DeepONet+GRU",
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $model:ident => $body:expr) => {
        match $self {
            Surrogate::DeepONet($model) => $body,
            Surrogate::Fno($model) => $body,
            Surrogate::FnoGru($model) => $body,
            Surrogate::DeepONetGru($model) => $body,
        }
    };
}

impl Model for Surrogate {
    fn size(&self) -> usize {
        dispatch!(self, m => m.size())
    }

    fn dims(&self) -> (usize, usize) {
        dispatch!(self, m => m.dims())
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        dispatch!(self, m => m.init(params, rng))
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        dispatch!(self, m => m.forward(params, x))
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        dispatch!(self, m => m.backward(params, grad, d))
    }
}

impl From<DeepONet> for Surrogate {
    fn from(model: DeepONet) -> Self {
        Self::DeepONet(model)
    }
}

impl From<Fno> for Surrogate {
    fn from(model: Fno) -> Self {
        Self::Fno(model)
    }
}

impl From<FnoGru> for Surrogate {
    fn from(model: FnoGru) -> Self {
        Self::FnoGru(model)
    }
}

impl From<DeepONetGru> for Surrogate {
    fn from(model: DeepONetGru) -> Self {
        Self::DeepONetGru(model)
    }
}
