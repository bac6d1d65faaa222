//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Owner-tagged zero-argument callbacks exposed by models."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A named, owner-tagged callable with no arguments and no return value.
///
/// Entry points are what models hand to the scheduler and the notification
/// hub. They are shared as `Arc<EntryPoint>` so a registered callback can
/// never dangle, regardless of who outlives whom.
///
/// Contract for the closure: it must return promptly and must not panic.
/// The kernel contains panics at every firing boundary (see
/// [`run_contained`]), but a callback that never returns will stall the
/// scheduler thread indefinitely.
pub struct EntryPoint {
    owner: String,
    name: String,
    action: Box<dyn Fn() + Send + Sync>,
}

impl EntryPoint {
    /// Create a shared entry point owned by `owner`.
    pub fn new<F>(owner: impl Into<String>, name: impl Into<String>, action: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            owner: owner.into(),
            name: name.into(),
            action: Box::new(action),
        })
    }

    /// Component that published this entry point.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name of the entry point within its owner.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner.name`, the identity used in logs and diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Invoke the callback directly, without panic containment.
    pub fn execute(&self) {
        (self.action)();
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Invoke an entry point with panic containment.
///
/// Returns the panic message when the callback panicked; the caller decides
/// how to report it. Used at every kernel firing boundary so a misbehaving
/// callback cannot take down the scheduler thread or a notification pass.
pub(crate) fn run_contained(entry_point: &EntryPoint) -> std::result::Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| entry_point.execute())) {
        Ok(()) => Ok(()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
