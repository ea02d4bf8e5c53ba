//! Reference plugins.
//!
//! - [`NoopPlugin`] passes every event through unchanged.
//! - [`DoublingPlugin`] doubles the duration of every event.

mod doubling;
mod noop;

pub use doubling::DoublingPlugin;
pub use noop::NoopPlugin;

use crate::framework::Plugin;

/// Names accepted by [`builtin`].
pub const BUILTIN_PLUGINS: &[&str] = &["noop", "double"];

/// Construct a built-in plugin by name.
pub fn builtin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "noop" => Some(Box::new(NoopPlugin)),
        "double" => Some(Box::new(DoublingPlugin::default())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        for name in BUILTIN_PLUGINS {
            assert!(builtin(name).is_some(), "{name} is not constructible");
        }
        assert!(builtin("triple").is_none());
    }
}
