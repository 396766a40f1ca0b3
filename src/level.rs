//! Log level re-export.
//!
//! The five levels required by the engine (trace/debug/info/warn/error) map
//! exactly onto `log::Level`, so no bespoke level type is introduced.

pub use log::{Level, LevelFilter};
