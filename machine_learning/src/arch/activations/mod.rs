mod act_fn;
mod gelu;
mod sigmoid;

pub use act_fn::ActFn;
pub use gelu::Gelu;
pub use sigmoid::Sigmoid;
