//! Importance filter policy.
//!
//! Maps an [`ImportanceLevel`] onto a predicate over a signal's [`ImportanceTag`].
//! Unknown tags never match the narrow levels and are never treated as omitted.

use crate::level::ImportanceLevel;
use crate::signal::{Address, ImportanceTag, Signal};

impl ImportanceLevel {
    /// Returns true if a signal carrying `tag` takes part in the summary at this level.
    #[must_use]
    pub fn includes(self, tag: &ImportanceTag) -> bool {
        match self {
            Self::Hinted => matches!(tag, ImportanceTag::Hinted),
            Self::Normal => matches!(tag, ImportanceTag::Hinted | ImportanceTag::Normal),
            Self::Config => !matches!(tag, ImportanceTag::Omitted),
            Self::Omitted => true,
        }
    }
}

/// Selects the signals that participate in the summary at `level`.
#[must_use]
pub fn select(level: ImportanceLevel, signals: &[Signal]) -> Vec<&Signal> {
    signals.iter().filter(|s| level.includes(&s.importance)).collect()
}

/// Addresses of the selected signals, first occurrence order, without duplicates.
#[must_use]
pub fn selected_addresses(level: ImportanceLevel, signals: &[Signal]) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::new();
    for signal in select(level, signals) {
        if !out.contains(&signal.address) {
            out.push(signal.address.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> Vec<Signal> {
        vec![
            Signal::new("readback", "ca://M1:RBV", ImportanceTag::Hinted),
            Signal::new("setpoint", "ca://M1:VAL", ImportanceTag::Normal),
            Signal::new("velocity", "ca://M1:VELO", ImportanceTag::Config),
            Signal::new("raw", "ca://M1:RAW", ImportanceTag::Omitted),
            Signal::new("vendor", "ca://M1:VENDOR", ImportanceTag::Unknown("vendor".to_string())),
        ]
    }

    fn names(level: ImportanceLevel, signals: &[Signal]) -> Vec<&str> {
        select(level, signals).iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn each_level_keeps_expected_tags() {
        let signals = sample_signals();
        assert_eq!(names(ImportanceLevel::Hinted, &signals), vec!["readback"]);
        assert_eq!(names(ImportanceLevel::Normal, &signals), vec!["readback", "setpoint"]);
        assert_eq!(
            names(ImportanceLevel::Config, &signals),
            vec!["readback", "setpoint", "velocity", "vendor"]
        );
        assert_eq!(names(ImportanceLevel::Omitted, &signals).len(), signals.len());
    }

    #[test]
    fn levels_form_a_subset_chain() {
        let signals = sample_signals();
        for pair in ImportanceLevel::ALL.windows(2) {
            let narrow = select(pair[0], &signals);
            let wide = select(pair[1], &signals);
            for s in &narrow {
                assert!(wide.contains(s), "{} kept at {} but dropped at {}", s.name, pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn empty_input_selects_nothing() {
        for level in ImportanceLevel::ALL {
            assert!(select(level, &[]).is_empty());
        }
    }

    #[test]
    fn selected_addresses_are_deduplicated() {
        let signals = vec![
            Signal::new("a", "ca://SHARED", ImportanceTag::Hinted),
            Signal::new("b", "ca://OTHER", ImportanceTag::Hinted),
            Signal::new("c", "ca://SHARED", ImportanceTag::Normal),
        ];
        let addrs = selected_addresses(ImportanceLevel::Normal, &signals);
        assert_eq!(addrs, vec![Address::new("ca://SHARED"), Address::new("ca://OTHER")]);
    }
}
