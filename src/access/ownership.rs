// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Family-scoped resources.
//!
//! A resource that belongs to a parent (and optionally one of their
//! children) may be accessed by those parties. Other principals need an
//! explicit oversight grant.

pub trait FamilyScoped {
    fn parent_id(&self) -> &str;

    fn child_id(&self) -> Option<&str>;

    /// Whether `principal_id` is the parent or the child on this resource.
    fn is_party(&self, principal_id: &str) -> bool {
        self.parent_id() == principal_id || self.child_id() == Some(principal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chore {
        parent: String,
        child: Option<String>,
    }

    impl FamilyScoped for Chore {
        fn parent_id(&self) -> &str {
            &self.parent
        }

        fn child_id(&self) -> Option<&str> {
            self.child.as_deref()
        }
    }

    #[test]
    fn parties() {
        let chore = Chore {
            parent: "p1".into(),
            child: Some("c1".into()),
        };
        assert!(chore.is_party("p1"));
        assert!(chore.is_party("c1"));
        assert!(!chore.is_party("p2"));
    }

    #[test]
    fn parent_only_resource() {
        let chore = Chore {
            parent: "p1".into(),
            child: None,
        };
        assert!(chore.is_party("p1"));
        assert!(!chore.is_party("c1"));
    }
}
