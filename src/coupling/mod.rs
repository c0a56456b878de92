pub mod manager;
pub mod stencil;

pub use manager::CouplingManager;
pub use stencil::CouplingStencil;
