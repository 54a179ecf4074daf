//! Shader feature-flag sets.
//!
//! A [`ShaderFeatureSet`] names the optional behaviors a material wants from
//! an uber shader ("alpha test enabled", "instancing enabled", "N texture
//! slots active"). Flags outside a stage's declared vocabulary are ignored
//! during selection rather than rejected, so callers can pass one feature set
//! to shaders with different vocabularies.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::uber::FlagVocabulary;

/// Value carried by a feature flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureValue {
    /// Boolean flag; `false` behaves as if the flag were absent.
    Bool(bool),
    /// Integer-valued flag (texture slot counts and the like).
    Int(i32),
}

/// An ordered set of named feature flags.
///
/// Iteration order is the flag name order (`BTreeMap`), which keeps rendered
/// defines and cache keys independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderFeatureSet {
    flags: BTreeMap<String, FeatureValue>,
}

impl ShaderFeatureSet {
    /// Create an empty feature set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a boolean flag (builder form).
    pub fn with_flag(mut self, name: &str) -> Self {
        self.enable(name);
        self
    }

    /// Set an integer flag (builder form).
    pub fn with_value(mut self, name: &str, value: i32) -> Self {
        self.flags
            .insert(name.to_string(), FeatureValue::Int(value));
        self
    }

    /// Enable a boolean flag.
    pub fn enable(&mut self, name: &str) {
        self.flags
            .insert(name.to_string(), FeatureValue::Bool(true));
    }

    /// Disable a boolean flag. Equivalent to the flag being absent.
    pub fn disable(&mut self, name: &str) {
        self.flags
            .insert(name.to_string(), FeatureValue::Bool(false));
    }

    /// Check whether a boolean flag is enabled. Unset flags default to false.
    pub fn is_enabled(&self, name: &str) -> bool {
        matches!(self.flags.get(name), Some(FeatureValue::Bool(true)))
    }

    /// Number of set flags (including disabled ones).
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the set contains no flags.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate flags in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Retain only the flags a vocabulary recognizes.
    ///
    /// Unknown flags are dropped silently: they are ignored by selection, not
    /// an error.
    pub fn filtered(&self, vocabulary: &FlagVocabulary) -> Self {
        Self {
            flags: self
                .flags
                .iter()
                .filter(|(name, _)| vocabulary.contains(name))
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
        }
    }

    /// Render the active flags as preprocessor defines.
    ///
    /// `Bool(true)` becomes a bare define, `Bool(false)` is omitted, and
    /// integer flags carry their value.
    pub fn to_defines(&self) -> Vec<(String, String)> {
        let mut defines = Vec::new();
        for (name, value) in &self.flags {
            match value {
                FeatureValue::Bool(true) => defines.push((name.clone(), String::new())),
                FeatureValue::Bool(false) => {}
                FeatureValue::Int(v) => defines.push((name.clone(), v.to_string())),
            }
        }
        defines
    }

    /// Stable cache key for this set as seen through a vocabulary.
    ///
    /// Two sets that differ only in flags outside the vocabulary (or in
    /// explicitly disabled flags) produce the same key, matching the variant
    /// they would actually select.
    pub fn cache_key(&self, vocabulary: &FlagVocabulary) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        for (name, value) in &self.filtered(vocabulary).flags {
            // Disabled booleans hash like absent flags.
            if matches!(value, FeatureValue::Bool(false)) {
                continue;
            }
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl<const N: usize> From<[&str; N]> for ShaderFeatureSet {
    fn from(names: [&str; N]) -> Self {
        let mut set = Self::new();
        for name in names {
            set.enable(name);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(tokens: &str) -> FlagVocabulary {
        FlagVocabulary::parse(tokens)
    }

    #[test]
    fn test_enable_disable() {
        let mut set = ShaderFeatureSet::new();
        assert!(!set.is_enabled("ALPHA_TEST"));
        set.enable("ALPHA_TEST");
        assert!(set.is_enabled("ALPHA_TEST"));
        set.disable("ALPHA_TEST");
        assert!(!set.is_enabled("ALPHA_TEST"));
    }

    #[test]
    fn test_defines_ordered_by_name() {
        let set = ShaderFeatureSet::new()
            .with_flag("ZETA")
            .with_flag("ALPHA")
            .with_value("MID", 3);
        let defines = set.to_defines();
        let names: Vec<&str> = defines.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["ALPHA", "MID", "ZETA"]);
        assert_eq!(defines[1].1, "3");
    }

    #[test]
    fn test_filtered_drops_unknown() {
        let set = ShaderFeatureSet::from(["ALPHA_TEST", "NOT_IN_VOCABULARY"]);
        let filtered = set.filtered(&vocab("ALPHA_TEST SHADOW_MAPPING"));
        assert!(filtered.is_enabled("ALPHA_TEST"));
        assert!(!filtered.is_enabled("NOT_IN_VOCABULARY"));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_cache_key_ignores_unknown_flags() {
        let vocabulary = vocab("ALPHA_TEST SHADOW_MAPPING");
        let recognized = ShaderFeatureSet::from(["ALPHA_TEST"]);
        let with_extra = ShaderFeatureSet::from(["ALPHA_TEST", "SOMETHING_ELSE"]);
        assert_eq!(
            recognized.cache_key(&vocabulary),
            with_extra.cache_key(&vocabulary)
        );
    }

    #[test]
    fn test_cache_key_ignores_disabled_flags() {
        let vocabulary = vocab("ALPHA_TEST SHADOW_MAPPING");
        let mut with_disabled = ShaderFeatureSet::from(["ALPHA_TEST"]);
        with_disabled.disable("SHADOW_MAPPING");
        let without = ShaderFeatureSet::from(["ALPHA_TEST"]);
        assert_eq!(
            with_disabled.cache_key(&vocabulary),
            without.cache_key(&vocabulary)
        );
    }

    #[test]
    fn test_cache_key_distinguishes_values() {
        let vocabulary = vocab("LIGHT_COUNT");
        let two = ShaderFeatureSet::new().with_value("LIGHT_COUNT", 2);
        let three = ShaderFeatureSet::new().with_value("LIGHT_COUNT", 3);
        assert_ne!(two.cache_key(&vocabulary), three.cache_key(&vocabulary));
    }

    #[test]
    fn test_cache_key_insertion_order_independent() {
        let vocabulary = vocab("A B");
        let ab = ShaderFeatureSet::new().with_flag("A").with_flag("B");
        let ba = ShaderFeatureSet::new().with_flag("B").with_flag("A");
        assert_eq!(ab.cache_key(&vocabulary), ba.cache_key(&vocabulary));
    }
}
