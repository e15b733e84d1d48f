// src/core/mod.rs

pub mod args;
pub mod decoder;
pub mod engine;
pub mod env;
pub mod executer;
pub mod graph_display;
pub mod help;
pub mod interpolator;
pub mod lexer;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod validate;
