//! Level gate and user filter chain (C6, steps 2 and 3).

use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{Level, LevelFilter};

use crate::error::{ErrorRecord, ErrorSource};
use crate::metrics::Metrics;
use crate::record::FieldMap;

/// A user-supplied predicate: `(level, rendered_message, fields) -> allow`.
/// The first filter to return `false` drops the record.
pub type FilterPredicate = Box<dyn Fn(Level, &str, &FieldMap) -> bool + Send + Sync>;

/// Ordered sequence of user filters, applied after the level gate.
#[derive(Default)]
pub struct FilterChain {
    predicates: Vec<FilterPredicate>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: FilterPredicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Runs every predicate in order. A panicking predicate is caught,
    /// counted with `source = "filter"`, and treated as "allow" (spec §4.6
    /// step 3) so one bad filter never silently swallows unrelated records.
    pub fn allows(&self, level: Level, message: &str, fields: &FieldMap, metrics: &Metrics) -> bool {
        for predicate in &self.predicates {
            let outcome = catch_unwind(AssertUnwindSafe(|| predicate(level, message, fields)));
            match outcome {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(_) => {
                    metrics.report_error(
                        ErrorRecord::new(ErrorSource::Filter, "filter-chain", "user filter panicked")
                            .with_severity(crate::error::Severity::Low),
                    );
                    continue;
                }
            }
        }
        true
    }
}

/// Level gate: drop if the record's level is below the configured minimum.
/// `log::Level` orders `Error < Warn < Info < Debug < Trace`, so "at least
/// this severe" reads as `level <= minimum` through `LevelFilter`.
#[inline]
pub fn passes_level_gate(level: Level, minimum: LevelFilter) -> bool {
    level <= minimum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_gate_drops_below_minimum() {
        assert!(passes_level_gate(Level::Warn, LevelFilter::Info));
        assert!(!passes_level_gate(Level::Debug, LevelFilter::Info));
        assert!(passes_level_gate(Level::Error, LevelFilter::Error));
    }

    #[test]
    fn first_false_predicate_drops() {
        let metrics = Metrics::new();
        let mut chain = FilterChain::new();
        chain.push(Box::new(|_, msg, _| !msg.contains("secret")));
        assert!(chain.allows(Level::Info, "hello", &FieldMap::new(), &metrics));
        assert!(!chain.allows(Level::Info, "a secret value", &FieldMap::new(), &metrics));
    }

    #[test]
    fn panicking_predicate_is_treated_as_allow() {
        let metrics = Metrics::new();
        let mut chain = FilterChain::new();
        chain.push(Box::new(|_, _, _| panic!("boom")));
        assert!(chain.allows(Level::Info, "hello", &FieldMap::new(), &metrics));
        assert_eq!(metrics.snapshot().errors_filter, 1);
    }
}
