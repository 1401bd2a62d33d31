//! Opaque backend handle.

use uuid::Uuid;

/// Reference to a launched unit of work (process, application, container).
///
/// Only the lifecycle manager that created a handle may interpret it. The
/// label exists for logs; the token is what backends key their bookkeeping on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteHandle {
    token: Uuid,
    label: String,
}

impl RemoteHandle {
    /// Create a handle with a fresh token.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            token: Uuid::new_v4(),
            label: label.into(),
        }
    }

    /// Unique token of this handle.
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Display label (e.g. `pid 4242`, `application_1547_0001`).
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.label, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let a = RemoteHandle::new("pid 1");
        let b = RemoteHandle::new("pid 1");
        assert_ne!(a, b);
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn test_handle_display() {
        let handle = RemoteHandle::new("container abc");
        let display = handle.to_string();
        assert!(display.starts_with("container abc ["));
        assert!(display.contains(&handle.token().to_string()));
    }
}
