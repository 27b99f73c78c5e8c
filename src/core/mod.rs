pub mod components;
pub mod errors;
pub mod event;
pub mod execution;
pub mod fes;
pub mod parsim;
pub mod pattern;
pub mod rng;
pub mod scheduler;
pub mod time;
pub mod types;

#[cfg(test)]
mod tests;
