//! Core types: states, beliefs, depth images and camera data

pub mod belief;
pub mod image;
pub mod state;
