//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Object name validation rules."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use crate::errors::{KernelError, Result};

/// Maximum length of an object name, in characters.
pub const MAX_OBJECT_NAME_LEN: usize = 32;

/// Validate an object name against the kernel naming rules.
///
/// A valid name is non-empty, at most [`MAX_OBJECT_NAME_LEN`] characters,
/// starts with a letter, and contains only letters, digits, underscores and
/// square brackets (brackets allow array-style names such as `thruster[0]`).
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if name.chars().count() > MAX_OBJECT_NAME_LEN {
        return Err(invalid(name, "name exceeds 32 characters"));
    }
    let mut chars = name.chars();
    // Non-empty is established above.
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(name, "name must start with a letter"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '[' || c == ']') {
        return Err(invalid(
            name,
            "name may only contain letters, digits, underscores and brackets",
        ));
    }
    Ok(())
}

fn invalid(name: &str, reason: &'static str) -> KernelError {
    KernelError::InvalidObjectName {
        name: name.to_owned(),
        reason,
    }
}
