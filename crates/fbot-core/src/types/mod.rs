//! Core data types: enums, symbol rules, order requests/outcomes, and
//! strategy runs.

pub mod enums;
pub mod rules;
pub mod run;
pub mod trading;

pub use enums::*;
pub use rules::*;
pub use run::*;
pub use trading::*;
