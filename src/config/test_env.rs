use std::sync::{Mutex, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with each `(key, value)` applied to the process environment
/// (`None` removes the key). Previous values come back afterwards. Tests
/// touching the environment are serialized on one lock.
pub(super) fn with_env<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
    let _lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let saved: Vec<(&str, Option<String>)> = vars
        .iter()
        .map(|(key, _)| (*key, std::env::var(key).ok()))
        .collect();

    apply(vars.iter().map(|(key, value)| (*key, *value)));
    let result = f();
    apply(saved.iter().map(|(key, value)| (*key, value.as_deref())));
    result
}

fn apply<'a>(vars: impl Iterator<Item = (&'a str, Option<&'a str>)>) {
    for (key, value) in vars {
        // SAFETY: every writer holds ENV_LOCK.
        unsafe {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
