//! Cross-module suites that exercise more than one component together,
//! as opposed to the `#[cfg(test)]` unit tests colocated in each leaf
//! module.

mod policy_pipeline;
mod process_safety;
mod redaction_and_formatting;
