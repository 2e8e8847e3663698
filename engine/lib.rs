#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bootstrap;
pub mod float_serde;
pub mod ols;
pub mod pipeline;
pub mod progress;
pub mod pvalue;
pub mod ratio;
pub mod report;
pub mod subset;

// Study configuration and table loading live next to the engine.
#[path = "../study/mod.rs"]
pub mod study;
