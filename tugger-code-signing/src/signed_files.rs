// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracking of files signed during a run.

use {
    crate::{
        error::SigningError,
        file_identity::{FileIdentity, PathComparison},
    },
    dashmap::{mapref::entry::Entry, DashMap, DashSet},
    std::path::Path,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SignState {
    InProgress,
    Signed,
}

/// A concurrent set of files already signed in the current run.
///
/// The same file can be reached through several routes (e.g. listed twice
/// on the command line with different spellings). Only the first route signs
/// it. All operations canonicalize the path first, so any spelling of a
/// tracked file is recognized.
#[derive(Debug)]
pub struct SignedFileTracker {
    comparison: PathComparison,
    files: DashMap<FileIdentity, SignState>,
    containers: DashSet<FileIdentity>,
}

impl Default for SignedFileTracker {
    fn default() -> Self {
        Self::new(PathComparison::default())
    }
}

impl SignedFileTracker {
    pub fn new(comparison: PathComparison) -> Self {
        Self {
            comparison,
            files: DashMap::new(),
            containers: DashSet::new(),
        }
    }

    /// The path comparison strategy in use.
    pub fn comparison(&self) -> PathComparison {
        self.comparison
    }

    /// Resolve the identity of a path under this tracker's comparison rules.
    pub fn identify(&self, path: impl AsRef<Path>) -> Result<FileIdentity, SigningError> {
        Ok(FileIdentity::new(path, self.comparison)?)
    }

    /// Whether a file was signed.
    pub fn has_signed(&self, path: impl AsRef<Path>) -> Result<bool, SigningError> {
        let identity = self.identify(path)?;

        Ok(self.is_signed(&identity))
    }

    /// Record a file as signed.
    ///
    /// Returns whether the file was not previously recorded as signed.
    pub fn mark_signed(&self, path: impl AsRef<Path>) -> Result<bool, SigningError> {
        let identity = self.identify(path)?;

        Ok(self.complete(identity))
    }

    /// Number of files recorded as signed.
    pub fn signed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|entry| *entry.value() == SignState::Signed)
            .count()
    }

    pub(crate) fn is_signed(&self, identity: &FileIdentity) -> bool {
        matches!(
            self.files.get(identity).map(|entry| *entry.value()),
            Some(SignState::Signed)
        )
    }

    /// Claim a file for signing.
    ///
    /// Returns false if the file is signed or another worker holds the claim.
    pub(crate) fn try_claim(&self, identity: &FileIdentity) -> bool {
        match self.files.entry(identity.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(SignState::InProgress);
                true
            }
        }
    }

    /// Give up a claim after a failed signing attempt.
    pub(crate) fn release(&self, identity: &FileIdentity) {
        self.files
            .remove_if(identity, |_, state| *state == SignState::InProgress);
    }

    /// Record that a container is being opened.
    ///
    /// Returns false if the container was already opened during this run.
    pub(crate) fn try_open_container(&self, identity: FileIdentity) -> bool {
        self.containers.insert(identity)
    }

    /// Record a file as signed, converting any claim.
    pub(crate) fn complete(&self, identity: FileIdentity) -> bool {
        !matches!(
            self.files.insert(identity, SignState::Signed),
            Some(SignState::Signed)
        )
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rayon::prelude::*};

    #[test]
    fn membership_uses_canonical_paths() -> Result<(), SigningError> {
        let root = std::env::temp_dir().join("tracker");
        let tracker = SignedFileTracker::new(PathComparison::CaseSensitive);

        assert!(!tracker.has_signed(root.join("a.dll"))?);
        assert!(tracker.mark_signed(root.join("a.dll"))?);
        assert!(tracker.has_signed(root.join("x").join("..").join("a.dll"))?);
        assert!(tracker.has_signed(root.join(".").join("a.dll"))?);
        assert!(!tracker.has_signed(root.join("A.dll"))?);

        // Idempotent.
        assert!(!tracker.mark_signed(root.join("a.dll"))?);
        assert_eq!(tracker.signed_count(), 1);

        Ok(())
    }

    #[test]
    fn case_insensitive_tracking() -> Result<(), SigningError> {
        let root = std::env::temp_dir().join("tracker");
        let tracker = SignedFileTracker::new(PathComparison::CaseInsensitive);

        tracker.mark_signed(root.join("Lib").join("A.DLL"))?;
        assert!(tracker.has_signed(root.join("lib").join("a.dll"))?);

        Ok(())
    }

    #[test]
    fn concurrent_marks_do_not_duplicate() -> Result<(), SigningError> {
        let root = std::env::temp_dir().join("tracker");
        let tracker = SignedFileTracker::new(PathComparison::CaseSensitive);

        let newly_marked = (0..64)
            .into_par_iter()
            .map(|i| {
                let path = if i % 2 == 0 {
                    root.join("shared.dll")
                } else {
                    root.join("sub").join("..").join("shared.dll")
                };
                tracker.mark_signed(path)
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|v| *v)
            .count();

        assert_eq!(newly_marked, 1);
        assert_eq!(tracker.signed_count(), 1);

        Ok(())
    }

    #[test]
    fn claims_are_exclusive() -> Result<(), SigningError> {
        let tracker = SignedFileTracker::default();
        let identity = tracker.identify(std::env::temp_dir().join("claimed.dll"))?;

        assert!(tracker.try_claim(&identity));
        assert!(!tracker.try_claim(&identity));
        assert!(!tracker.is_signed(&identity));

        tracker.release(&identity);
        assert!(tracker.try_claim(&identity));

        assert!(tracker.complete(identity.clone()));
        assert!(tracker.is_signed(&identity));
        assert!(!tracker.try_claim(&identity));

        // Releasing does not forget a signed file.
        tracker.release(&identity);
        assert!(tracker.is_signed(&identity));

        Ok(())
    }

    #[test]
    fn containers_open_once() -> Result<(), SigningError> {
        let root = std::env::temp_dir().join("tracker");
        let tracker = SignedFileTracker::new(PathComparison::CaseSensitive);

        assert!(tracker.try_open_container(tracker.identify(root.join("app.nupkg"))?));
        assert!(!tracker.try_open_container(
            tracker.identify(root.join("x").join("..").join("app.nupkg"))?
        ));

        // Opening is tracked apart from signing.
        let identity = tracker.identify(root.join("app.nupkg"))?;
        assert!(tracker.try_claim(&identity));

        Ok(())
    }
}
