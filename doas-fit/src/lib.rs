#![forbid(unsafe_code)]

//! # doas-fit
//!
//! Reference bundle file loading and instrument alignment (C3 extensions over
//! `doas-model`'s in-memory [doas_model::data::Reference]), the dark/offset
//! resolver (C4), and the DOAS nonlinear least-squares fit core (C5).

pub mod dark;
pub mod fit;
mod linalg;
pub mod reference_loader;
pub mod result;

pub use dark::resolve_dark;
pub use fit::fit;
pub use result::{Error, Result};
