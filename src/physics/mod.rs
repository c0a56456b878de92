pub mod flow;
pub mod mechanics;
pub mod porosity;
pub mod traits;

pub use flow::FlowKernel;
pub use mechanics::{ElasticModuli, MechanicsKernel};
pub use porosity::{KozenyCarman, PorosityLaw};
pub use traits::{KernelView, ResidualKernel};
