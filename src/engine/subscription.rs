use super::Inner;
use std::sync::Weak;

/// Handle for a registered snapshot callback.
///
/// The callback stays registered until this handle is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub(super) fn new(id: u64, inner: Weak<Inner>) -> Self {
        Self { id, inner }
    }

    /// Stop receiving snapshots.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
