// Geometry and the frame forest
pub mod geometry;
pub mod color;
pub mod frame;
pub mod error;
pub mod registry;
pub mod transform;
pub mod config;

// Drawing and picking
pub mod render;
pub mod hit_test;
pub mod contour;

// Scripting
pub mod capture;
pub mod plot_target;
pub mod script_log;
pub mod script_diagnostics;
pub mod interpreter;
pub mod script_runner;

pub mod workspace;
pub mod scene;
pub mod cli;
