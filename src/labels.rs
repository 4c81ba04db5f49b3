//! Label set canonicalization and fingerprinting
//!
//! Incoming label pairs arrive unordered; the canonical form sorts them
//! byte-lexicographically by name (ties broken by value), extracts the
//! reserved `__name__` label as the metric name, and derives a fingerprint
//! string that is injective over canonical label sets. The fingerprint is
//! the cache key for series-id lookups and the grouping order during flush.

use crate::{Error, Result};
use std::fmt::Write as _;

/// Reserved label whose value names the metric.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A canonical (sorted, validated) label set.
///
/// Names and values are kept as parallel arrays in the exact shape the
/// store's `get_series_id_for_key_value_array` routine consumes. The
/// `__name__` pair is included; it sorts first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
    values: Vec<String>,
    metric_name: String,
    fingerprint: String,
}

impl Labels {
    /// Canonicalize an unordered list of `(name, value)` pairs.
    ///
    /// Fails with [`Error::InvalidLabels`] if the metric-name label is
    /// missing or empty, any label name is empty, or a name occurs twice.
    pub fn new(mut pairs: Vec<(String, String)>) -> Result<Self> {
        pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut metric_name = None;
        for (i, (name, value)) in pairs.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::InvalidLabels("empty label name".to_string()));
            }
            if i > 0 && pairs[i - 1].0 == *name {
                return Err(Error::InvalidLabels(format!(
                    "duplicate label name {name:?}"
                )));
            }
            if name == METRIC_NAME_LABEL {
                if value.is_empty() {
                    return Err(Error::InvalidLabels("empty metric name".to_string()));
                }
                metric_name = Some(value.clone());
            }
        }
        let metric_name = metric_name.ok_or_else(|| {
            Error::InvalidLabels(format!("missing {METRIC_NAME_LABEL} label"))
        })?;

        let fingerprint = fingerprint(&pairs);
        let (names, values) = pairs.into_iter().unzip();

        Ok(Self {
            names,
            values,
            metric_name,
            fingerprint,
        })
    }

    /// The value of the reserved `__name__` label.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Deterministic string key over the canonical label set.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Sorted label names, including `__name__`.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Label values, parallel to [`Labels::names`].
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Number of label pairs.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the set holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Length-prefixing every component keeps the encoding injective even when
/// names or values contain separator characters.
fn fingerprint(pairs: &[(String, String)]) -> String {
    let mut out = String::with_capacity(pairs.iter().map(|(n, v)| n.len() + v.len() + 8).sum());
    for (name, value) in pairs {
        let _ = write!(out, "{}:{}{}:{};", name.len(), name, value.len(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn canonicalize_sorts_by_name() {
        let labels = Labels::new(pairs(&[
            ("zone", "eu"),
            ("__name__", "http_requests_total"),
            ("code", "200"),
        ]))
        .unwrap();

        assert_eq!(labels.names(), &["__name__", "code", "zone"]);
        assert_eq!(labels.values(), &["http_requests_total", "200", "eu"]);
        assert_eq!(labels.metric_name(), "http_requests_total");
    }

    #[test]
    fn equal_sets_share_fingerprint_regardless_of_input_order() {
        let a = Labels::new(pairs(&[("__name__", "m"), ("a", "1"), ("b", "2")])).unwrap();
        let b = Labels::new(pairs(&[("b", "2"), ("a", "1"), ("__name__", "m")])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_injective_over_separator_collisions() {
        // Concatenation without length prefixes would conflate these two.
        let a = Labels::new(pairs(&[("__name__", "m"), ("ab", "c")])).unwrap();
        let b = Labels::new(pairs(&[("__name__", "m"), ("a", "bc")])).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn missing_metric_name_rejected() {
        let err = Labels::new(pairs(&[("code", "200")])).unwrap_err();
        assert!(matches!(err, Error::InvalidLabels(_)));
    }

    #[test]
    fn empty_metric_name_rejected() {
        let err = Labels::new(pairs(&[("__name__", "")])).unwrap_err();
        assert!(matches!(err, Error::InvalidLabels(_)));
    }

    #[test]
    fn empty_label_name_rejected() {
        let err = Labels::new(pairs(&[("__name__", "m"), ("", "x")])).unwrap_err();
        assert!(matches!(err, Error::InvalidLabels(_)));
    }

    #[test]
    fn duplicate_label_name_rejected() {
        let err =
            Labels::new(pairs(&[("__name__", "m"), ("a", "1"), ("a", "2")])).unwrap_err();
        assert!(matches!(err, Error::InvalidLabels(_)));
    }
}
