pub mod assembler;
pub mod flux;
pub mod metadata;

pub use assembler::{AssemblyOutcome, CubeAssembler, CubeOptions, Redshifts};
pub use flux::{FluxConversion, UncertaintyModel};
pub use metadata::band_metadata;
