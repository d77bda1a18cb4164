//! Cache key layout.

use crate::domain::canvas::ContributorId;

/// Hash holding the latest placement per cell, keyed by `x:y`.
pub const CANVAS_HASH: &str = "canvas";

/// Marker key for a contributor's cooldown.
pub fn cooldown_key(contributor: &ContributorId) -> String {
    format!("cooldown:{contributor}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_keys_are_per_contributor() {
        let alice = ContributorId::parse("alice").expect("valid contributor");
        let bob = ContributorId::parse("bob").expect("valid contributor");
        assert_eq!(cooldown_key(&alice), "cooldown:alice");
        assert_ne!(cooldown_key(&alice), cooldown_key(&bob));
    }
}
