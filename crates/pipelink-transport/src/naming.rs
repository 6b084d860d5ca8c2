use crate::error::{Result, TransportError};

/// Namespace prefix that turns a short name into an addressable endpoint name.
#[cfg(windows)]
pub const CHANNEL_NAMESPACE: &str = r"\\.\pipe\";

/// Namespace prefix that turns a short name into an addressable endpoint name.
#[cfg(not(windows))]
pub const CHANNEL_NAMESPACE: &str = "/tmp/pipelink-";

/// Build the full endpoint name for an application-supplied short name.
///
/// Pure string transform: the same input always yields the same output.
/// Empty names and names containing path separators or NUL are rejected,
/// since neither platform can map them onto a single endpoint.
pub fn make_channel_name(simple_name: &str) -> Result<String> {
    validate_simple_name(simple_name)?;
    Ok(format!("{CHANNEL_NAMESPACE}{simple_name}"))
}

/// Whether `name` is already a full endpoint name produced by [`make_channel_name`].
pub fn is_channel_name(name: &str) -> bool {
    name.strip_prefix(CHANNEL_NAMESPACE)
        .is_some_and(|rest| validate_simple_name(rest).is_ok())
}

fn validate_simple_name(simple_name: &str) -> Result<()> {
    let reason = if simple_name.is_empty() {
        "name must not be empty"
    } else if simple_name.contains(['/', '\\']) {
        "name must not contain path separators"
    } else if simple_name.contains('\0') {
        "name must not contain NUL"
    } else {
        return Ok(());
    };

    Err(TransportError::InvalidName {
        name: simple_name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_namespace() {
        let full = make_channel_name("testchan").unwrap();
        assert_eq!(full, format!("{CHANNEL_NAMESPACE}testchan"));
    }

    #[test]
    fn deterministic_for_same_input() {
        let first = make_channel_name("worker-7").unwrap();
        let second = make_channel_name("worker-7").unwrap();
        assert_eq!(first, second);
    }

    #[cfg(windows)]
    #[test]
    fn windows_names_live_under_pipe_namespace() {
        assert_eq!(make_channel_name("abc").unwrap(), r"\\.\pipe\abc");
    }

    #[test]
    fn rejects_unaddressable_names() {
        for bad in ["", "a/b", r"a\b", "nul\0byte"] {
            let err = make_channel_name(bad).unwrap_err();
            assert!(matches!(err, TransportError::InvalidName { .. }), "{bad:?}");
        }
    }

    #[test]
    fn recognizes_full_names() {
        let full = make_channel_name("svc").unwrap();
        assert!(is_channel_name(&full));
        assert!(!is_channel_name("svc"));
        assert!(!is_channel_name(CHANNEL_NAMESPACE));
    }
}
