#[macro_use]
extern crate serde_derive;

extern crate serde;

pub mod bitcoin;
mod rosetta;

pub use crate::bitcoin::*;
pub use crate::rosetta::*;
