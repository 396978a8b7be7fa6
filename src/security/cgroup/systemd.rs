/*!
 * Systemd Slices
 */

use super::{CgroupError, CgroupResult};
use std::path::Path;

pub const SLICE_SUFFIX: &str = ".slice";

/// Whether a parent hint names a systemd slice
///
/// The hint must be longer than `/.slice` and its last path component must
/// end in `.slice`.
pub fn is_slice_name(parent: &str) -> bool {
    parent.len() > 6 && basename(parent).ends_with(SLICE_SUFFIX)
}

/// Last path component, or the input when it has none
pub(super) fn basename(parent: &str) -> &str {
    Path::new(parent)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(parent)
}

/// Expand a slice unit name into its hierarchy path
///
/// `a-b-c.slice` lives at `/a.slice/a-b.slice/a-b-c.slice`; `-.slice` is the
/// root slice.
pub fn expand_slice(slice: &str) -> CgroupResult<String> {
    let invalid = |reason| CgroupError::InvalidSlice {
        slice: slice.to_string(),
        reason,
    };

    let name = slice
        .strip_suffix(SLICE_SUFFIX)
        .ok_or_else(|| invalid("missing .slice suffix"))?;
    if slice.contains('/') {
        return Err(invalid("slice names cannot contain '/'"));
    }
    if name == "-" {
        return Ok("/".to_string());
    }

    let mut path = String::new();
    let mut prefix = String::new();
    for component in name.split('-') {
        if component.is_empty() {
            return Err(invalid("empty slice component"));
        }
        path.push('/');
        path.push_str(&prefix);
        path.push_str(component);
        path.push_str(SLICE_SUFFIX);

        prefix.push_str(component);
        prefix.push('-');
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_is_slice_name() {
        assert!(is_slice_name("foo.slice"));
        assert!(is_slice_name("/kubepods/burstable.slice"));
        assert!(!is_slice_name("foo"));
        assert!(!is_slice_name(".slice"));
        assert!(!is_slice_name("foo.slice/bar"));
    }

    #[test]
    fn test_expand_slice() {
        assert_eq!(expand_slice("foo.slice").unwrap(), "/foo.slice");
        assert_eq!(
            expand_slice("kubepods-burstable-pod1.slice").unwrap(),
            "/kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod1.slice"
        );
        assert_eq!(expand_slice("-.slice").unwrap(), "/");
    }

    #[test]
    fn test_expand_slice_rejects_malformed() {
        assert!(expand_slice("foo").is_err());
        assert!(expand_slice("a/b.slice").is_err());
        assert!(expand_slice("a--b.slice").is_err());
        assert!(expand_slice("-a.slice").is_err());
    }

    proptest! {
        #[test]
        fn expanded_path_ends_with_slice(parts in prop::collection::vec("[a-z0-9]{1,8}", 1..5)) {
            let slice = format!("{}{}", parts.join("-"), SLICE_SUFFIX);
            let expanded = expand_slice(&slice).unwrap();
            let expected_tail = format!("/{}", slice);
            prop_assert!(expanded.ends_with(&expected_tail));
            prop_assert_eq!(expanded.matches(SLICE_SUFFIX).count(), parts.len());
        }
    }
}
