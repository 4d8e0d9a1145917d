//! Snapshot/rollback utility
//!
//! Captures a shallow copy of a value before an optimistic mutation so the
//! mutation can be undone if the remote side fails.

/// A copy of a value as it was before a mutation started.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    image: T,
}

impl<T: Clone> Snapshot<T> {
    /// Copy `value` as it is right now.
    pub fn capture(value: &T) -> Self {
        Self {
            image: value.clone(),
        }
    }
}

impl<T> Snapshot<T> {
    /// Overwrite `target` with the captured image.
    pub fn restore(self, target: &mut T) {
        *target = self.image;
    }

    pub fn image(&self) -> &T {
        &self.image
    }

    pub fn into_inner(self) -> T {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_undoes_mutation() {
        let mut names = vec!["Evening".to_string()];
        let snap = Snapshot::capture(&names);

        names.push("Morning".to_string());
        names[0] = "Night".to_string();

        snap.restore(&mut names);
        assert_eq!(names, vec!["Evening".to_string()]);
    }

    #[test]
    fn test_capture_is_independent_of_later_writes() {
        let mut value = 1u32;
        let snap = Snapshot::capture(&value);
        value += 41;
        assert_eq!(*snap.image(), 1);
        assert_eq!(value, 42);
    }
}
