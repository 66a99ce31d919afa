pub mod dsp;
pub use dsp::*;
