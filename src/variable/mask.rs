//! Secret masking for display text
//!
//! Secrets never reach console output or logs in cleartext. Display text
//! goes through three passes: secret references are replaced by masks,
//! ordinary substitution runs, then any raw secret value that slipped in
//! through another variable is masked too.

use crate::util::MASK_MAX_LEN;

use super::store::VariableStore;
use super::template::{self, Mode, Namespace};

/// Opaque mask for a secret: `min(20, len)` asterisks
pub fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count().min(MASK_MAX_LEN))
}

/// Replace `secrets.*` / `server.*` references with masks of their values
///
/// Unresolved secret references are left for the substitution pass.
pub fn mask_secret_references(text: &str, store: &VariableStore) -> String {
    let refs = template::references(text);
    if !refs.iter().any(|r| r.namespace.is_secret()) {
        return text.to_string();
    }

    let masked = template::substitute(text, Mode::Input, |path| {
        let is_secret = Namespace::of_path(path).is_some_and(|ns| ns.is_secret())
            || store.variable(path).is_some_and(|v| v.is_secret);
        if !is_secret {
            return None;
        }
        store
            .get(path)
            .map(|value| mask(&value.to_display_string()).into())
    });
    masked.value.to_display_string()
}

/// Mask raw occurrences of known secret values
pub fn mask_secret_values(text: &str, store: &VariableStore) -> String {
    let mut secrets = store.secret_values();
    // Longest first so a secret containing another is masked whole
    secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut result = text.to_string();
    for secret in secrets {
        if result.contains(&secret) {
            result = result.replace(&secret, &mask(&secret));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Value;

    #[test]
    fn mask_caps_at_twenty() {
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask(&"x".repeat(64)), "*".repeat(20));
        assert_eq!(mask(""), "");
    }

    #[test]
    fn secret_reference_becomes_mask() {
        let mut store = VariableStore::new();
        store.set("secrets.token", Value::from("abc123"));
        let out = mask_secret_references("token=${{ secrets.token }} ${{ vars.x }}", &store);
        assert_eq!(out, "token=****** ${{ vars.x }}");
    }

    #[test]
    fn raw_secret_values_are_masked() {
        let mut store = VariableStore::new();
        store.set_secret("steps.login.outputs.password", Value::from("pa55word"));
        let out = mask_secret_values("logged in with pa55word", &store);
        assert_eq!(out, "logged in with ********");
    }
}
