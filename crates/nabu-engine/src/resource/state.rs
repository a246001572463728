use core::fmt;

/// Lifecycle of a GPU resource created through the factory.
///
/// `Requested → Uploading → Live → PendingDestroy → Reclaimed`. A resource
/// may also be destroyed straight from `Uploading`; a reclaimed id returns to
/// `Requested` when it is reissued.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceState {
    /// Handle issued, GPU object not yet created.
    Requested,
    /// Copy from the upload stream recorded but not yet submitted.
    Uploading,
    /// Upload submitted; usable by any later command.
    Live,
    /// Destroy requested; waiting for the GPU to retire earlier work.
    PendingDestroy,
    /// GPU object released and id returned to the allocator.
    Reclaimed,
}

impl ResourceState {
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Requested, Uploading)
                | (Requested, Reclaimed)
                | (Uploading, Live)
                | (Uploading, PendingDestroy)
                | (Live, PendingDestroy)
                | (PendingDestroy, Reclaimed)
                | (Reclaimed, Requested)
        )
    }

    /// True while draws may reference the resource.
    #[inline]
    pub fn is_usable(self) -> bool {
        matches!(self, ResourceState::Uploading | ResourceState::Live)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Requested => "requested",
            ResourceState::Uploading => "uploading",
            ResourceState::Live => "live",
            ResourceState::PendingDestroy => "pending destroy",
            ResourceState::Reclaimed => "reclaimed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceState::*;

    #[test]
    fn forward_path() {
        let path = [Requested, Uploading, Live, PendingDestroy, Reclaimed, Requested];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_resurrection() {
        assert!(!PendingDestroy.can_transition_to(Live));
        assert!(!Reclaimed.can_transition_to(Live));
        assert!(!Live.can_transition_to(Uploading));
        assert!(!Live.can_transition_to(Reclaimed));
    }
}
