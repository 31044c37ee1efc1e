mod loss_fn;
mod mse;
mod rel_l2;

pub use loss_fn::LossFn;
pub use mse::Mse;
pub use rel_l2::RelL2;
