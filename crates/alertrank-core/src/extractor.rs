//! Dimension extractors: map an alert's attribute snapshot to a grouping key.
//!
//! New dimensions are added by registering an extractor under a name; the
//! tracker and the index manager never need to know what a dimension means.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;
use crate::types::Attributes;

/// Reads the entity value for one dimension. `None` means "not attributable".
pub trait DimensionExtractor: Send + Sync {
    fn extract(&self, attributes: &Attributes) -> Option<String>;
}

impl<F> DimensionExtractor for F
where
    F: Fn(&Attributes) -> Option<String> + Send + Sync,
{
    fn extract(&self, attributes: &Attributes) -> Option<String> {
        self(attributes)
    }
}

/// Reads a single attribute key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeExtractor {
    key: String,
}

impl AttributeExtractor {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl DimensionExtractor for AttributeExtractor {
    fn extract(&self, attributes: &Attributes) -> Option<String> {
        non_empty(attributes.get(&self.key))
    }
}

/// Reads the first present key out of an ordered list of aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackExtractor {
    keys: Vec<String>,
}

impl FallbackExtractor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl DimensionExtractor for FallbackExtractor {
    fn extract(&self, attributes: &Attributes) -> Option<String> {
        self.keys
            .iter()
            .find_map(|key| non_empty(attributes.get(key)))
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

// ─── Registry ────────────────────────────────────────────────────────

/// Name → extractor mapping, iterated in name order.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Box<dyn DimensionExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        extractor: impl DimensionExtractor + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.extractors.contains_key(&name) {
            return Err(ConfigError::DuplicateDimension(name));
        }
        self.extractors.insert(name, Box::new(extractor));
        Ok(())
    }

    /// Apply the named extractor. Unknown names are a configuration error.
    pub fn resolve(&self, name: &str, attributes: &Attributes) -> Result<Option<String>, ConfigError> {
        self.extractors
            .get(name)
            .map(|extractor| extractor.extract(attributes))
            .ok_or_else(|| ConfigError::UnknownDimension(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extractors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extractors.keys().map(String::as_str)
    }

    /// Resolve every registered dimension at once, skipping unattributable ones.
    pub fn resolve_all<'a>(
        &'a self,
        attributes: &'a Attributes,
    ) -> impl Iterator<Item = (&'a str, String)> + 'a {
        self.extractors
            .iter()
            .filter_map(move |(name, extractor)| {
                extractor
                    .extract(attributes)
                    .map(|entity| (name.as_str(), entity))
            })
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("dimensions", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn attribute_extractor_reads_key() {
        let ex = AttributeExtractor::new("host");
        assert_eq!(ex.extract(&attrs(&[("host", "h1")])), Some("h1".into()));
        assert_eq!(ex.extract(&attrs(&[("dc", "dc1")])), None);
    }

    #[test]
    fn empty_value_is_not_attributable() {
        let ex = AttributeExtractor::new("host");
        assert_eq!(ex.extract(&attrs(&[("host", "")])), None);
    }

    #[test]
    fn fallback_extractor_takes_first_present() {
        let ex = FallbackExtractor::new(["node", "hostname"]);
        assert_eq!(
            ex.extract(&attrs(&[("hostname", "h2"), ("node", "n1")])),
            Some("n1".into())
        );
        assert_eq!(ex.extract(&attrs(&[("hostname", "h2")])), Some("h2".into()));
        assert_eq!(
            ex.extract(&attrs(&[("node", ""), ("hostname", "h2")])),
            Some("h2".into())
        );
        assert_eq!(ex.extract(&attrs(&[])), None);
    }

    #[test]
    fn closures_register_as_extractors() {
        let mut reg = ExtractorRegistry::new();
        reg.register("host_dc", |a: &Attributes| {
            Some(format!("{}/{}", a.get("dc")?, a.get("host")?))
        })
        .expect("register");
        assert_eq!(
            reg.resolve("host_dc", &attrs(&[("host", "h1"), ("dc", "dc1")]))
                .expect("registered"),
            Some("dc1/h1".into())
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = ExtractorRegistry::new();
        reg.register("host", AttributeExtractor::new("host"))
            .expect("first");
        let err = reg
            .register("host", AttributeExtractor::new("hostname"))
            .expect_err("second");
        assert!(matches!(err, ConfigError::DuplicateDimension(name) if name == "host"));
    }

    #[test]
    fn resolve_unknown_dimension_is_config_error() {
        let reg = ExtractorRegistry::new();
        let err = reg.resolve("rack", &attrs(&[])).expect_err("unknown");
        assert!(matches!(err, ConfigError::UnknownDimension(name) if name == "rack"));
    }

    #[test]
    fn resolve_all_skips_missing_and_is_name_ordered() {
        let mut reg = ExtractorRegistry::new();
        reg.register("volume", AttributeExtractor::new("volume"))
            .expect("volume");
        reg.register("host", AttributeExtractor::new("host"))
            .expect("host");
        reg.register("dc", AttributeExtractor::new("dc")).expect("dc");
        let a = attrs(&[("host", "h1"), ("volume", "v1")]);
        let resolved: Vec<_> = reg.resolve_all(&a).collect();
        assert_eq!(
            resolved,
            vec![("host", "h1".to_owned()), ("volume", "v1".to_owned())]
        );
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["dc", "host", "volume"]);
    }
}
