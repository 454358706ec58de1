pub mod bpl;
pub mod config;
pub mod keyboard;
pub mod messages;
pub mod runtime;
pub mod teleop;

#[cfg(test)]
mod mock;
