#![forbid(unsafe_code)]

pub mod hash;
pub mod kdf;
pub mod keypair;
pub mod sign;
pub mod utils;

#[cfg(test)]
mod proptests;
