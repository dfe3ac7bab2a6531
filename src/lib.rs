// Copyright 2024 Cornell University
// released under MIT License

pub mod action;
pub mod checkers;
pub mod diagnostic;
pub mod errors;
pub mod ir;
pub mod mover_check;
pub mod options;
pub mod ownership;
pub mod serialize;
pub mod subst;
pub mod transition;
