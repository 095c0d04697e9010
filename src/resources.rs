//! Best-effort release of open resources.
//!
//! [`release_all`] walks a list of resources and attempts to release every one
//! of them. A failure is logged and the walk continues, so one broken sink can
//! never keep a file handle further down the list open. Nothing is propagated:
//! cleanup errors do not affect the computed result.

use anyhow::Result;
use tracing::warn;

/// Something that holds an OS resource (file handle, buffered writer, ...) and
/// can give it back explicitly.
///
/// Releasing twice must be harmless.
pub trait Release {
    /// Flush what is pending and free the resource.
    ///
    /// # Errors
    /// Returns whatever the underlying close reported.
    fn release(&mut self) -> Result<()>;

    /// Label used when reporting a failed release.
    fn resource_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Release every resource in `resources`, in order, regardless of earlier
/// failures.
///
/// Returns the number of resources whose release failed.
pub fn release_all(resources: &mut [&mut dyn Release]) -> usize {
    let mut failures = 0;
    for resource in resources.iter_mut() {
        if let Err(error) = resource.release() {
            failures += 1;
            warn!(
                resource = %resource.resource_name(),
                error = %format!("{error:#}"),
                "failed to release resource; ignoring"
            );
        }
    }
    failures
}
