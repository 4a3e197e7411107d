//! Instance-owned extension registry.
//!
//! Ids are dense and stable for the lifetime of the owning [`crate::Sieve`]
//! instance. Binaries never persist these ids - they reference extensions
//! by name through their dependency table - so registration order only has
//! to be stable within one instance.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Result, SieveError};
use crate::extension::{ExtId, Extension};

struct Registration {
    ext: Arc<dyn Extension>,
    enabled: bool,
    required: bool,
}

/// Registry of all extensions known to one engine instance.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Vec<Registration>,
    by_name: FxHashMap<&'static str, usize>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension, running its load hook. Registering the same
    /// name twice returns the existing id without reloading.
    pub fn register(&mut self, ext: Arc<dyn Extension>) -> Result<ExtId> {
        let name = ext.name();
        if let Some(&index) = self.by_name.get(name) {
            return Ok(ExtId(index as u32));
        }
        ext.load().map_err(|err| {
            tracing::error!(extension = name, %err, "failed to load sieve extension");
            err
        })?;
        let index = self.entries.len();
        self.entries.push(Registration {
            ext,
            enabled: true,
            required: false,
        });
        self.by_name.insert(name, index);
        tracing::debug!(extension = name, id = index, "sieve extension registered");
        Ok(ExtId(index as u32))
    }

    /// Register and mark non-disableable. Used for the preloaded trio and
    /// for anything the host cannot function without.
    pub fn register_required(&mut self, ext: Arc<dyn Extension>) -> Result<ExtId> {
        let id = self.register(ext)?;
        self.entries[id.index()].required = true;
        Ok(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up by id, enabled or not.
    #[must_use]
    pub fn get(&self, id: ExtId) -> Option<&Arc<dyn Extension>> {
        self.entries.get(id.index()).map(|r| &r.ext)
    }

    /// Public lookup: hidden (`@`) names and disabled extensions resolve
    /// to nothing.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<(ExtId, &Arc<dyn Extension>)> {
        if name.starts_with('@') {
            return None;
        }
        let &index = self.by_name.get(name)?;
        let reg = &self.entries[index];
        if !reg.enabled {
            return None;
        }
        Some((ExtId(index as u32), &reg.ext))
    }

    #[must_use]
    pub fn is_enabled(&self, id: ExtId) -> bool {
        self.entries.get(id.index()).is_some_and(|r| r.enabled)
    }

    /// Apply a `sieve_extensions` style specification.
    ///
    /// A list of bare names replaces the enabled set with exactly those
    /// names; `+name` / `-name` entries adjust the current set instead.
    /// Required and hidden extensions stay enabled regardless. Unknown
    /// names are ignored with a warning.
    pub fn set_enabled(&mut self, spec: &str) {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        let replace = tokens
            .iter()
            .any(|t| !t.starts_with('+') && !t.starts_with('-'));
        if replace {
            for reg in &mut self.entries {
                reg.enabled = reg.required || reg.ext.name().starts_with('@');
            }
        }
        for token in tokens {
            let (enable, name) = match token.split_at_checked(1) {
                Some(("+", rest)) => (true, rest),
                Some(("-", rest)) => (false, rest),
                _ => (true, token),
            };
            if name.is_empty() {
                continue;
            }
            match self.by_name.get(name) {
                Some(&index) => {
                    let reg = &mut self.entries[index];
                    if !enable && reg.required {
                        tracing::warn!(
                            extension = name,
                            "cannot disable required sieve extension"
                        );
                    } else {
                        reg.enabled = enable;
                    }
                }
                None => {
                    tracing::warn!(
                        extension = name,
                        "ignored unknown extension while configuring available extensions"
                    );
                }
            }
        }
    }

    /// Enabled extensions in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = (ExtId, &Arc<dyn Extension>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, r)| r.enabled)
            .map(|(i, r)| (ExtId(i as u32), &r.ext))
    }

    /// Space-separated names of enabled, non-hidden extensions in
    /// registration order - the managesieve capability string.
    #[must_use]
    pub fn capability_string(&self) -> String {
        let mut out = String::new();
        for reg in &self.entries {
            if !reg.enabled || reg.ext.name().starts_with('@') {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(reg.ext.name());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NamedExtension;

    fn named(name: &'static str) -> Arc<dyn Extension> {
        Arc::new(NamedExtension { name })
    }

    fn registry() -> ExtensionRegistry {
        let mut reg = ExtensionRegistry::new();
        reg.register_required(named("@hidden")).unwrap();
        reg.register(named("fileinto")).unwrap();
        reg.register(named("vacation")).unwrap();
        reg.register_required(named("envelope")).unwrap();
        reg
    }

    #[test]
    fn test_dense_stable_ids() {
        let mut reg = registry();
        let (fileinto, _) = reg.get_by_name("fileinto").unwrap();
        assert_eq!(fileinto.index(), 1);
        // Re-registering is a no-op returning the same id.
        let again = reg.register(named("fileinto")).unwrap();
        assert_eq!(again, fileinto);
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_hidden_names_not_public() {
        let reg = registry();
        assert!(reg.get_by_name("@hidden").is_none());
        assert_eq!(reg.capability_string(), "fileinto vacation envelope");
    }

    #[test]
    fn test_set_enabled_replace() {
        let mut reg = registry();
        reg.set_enabled("fileinto");
        assert!(reg.get_by_name("fileinto").is_some());
        assert!(reg.get_by_name("vacation").is_none());
        // Required survives a replacing list that omits it.
        assert!(reg.get_by_name("envelope").is_some());
        assert_eq!(reg.capability_string(), "fileinto envelope");
    }

    #[test]
    fn test_set_enabled_adjust() {
        let mut reg = registry();
        reg.set_enabled("-vacation");
        assert!(reg.get_by_name("fileinto").is_some());
        assert!(reg.get_by_name("vacation").is_none());
        reg.set_enabled("+vacation");
        assert!(reg.get_by_name("vacation").is_some());
    }

    #[test]
    fn test_cannot_disable_required() {
        let mut reg = registry();
        reg.set_enabled("-envelope");
        assert!(reg.get_by_name("envelope").is_some());
    }

    #[test]
    fn test_unknown_names_ignored() {
        let mut reg = registry();
        reg.set_enabled("+nonsense -alsonothing");
        assert_eq!(reg.capability_string(), "fileinto vacation envelope");
    }
}
