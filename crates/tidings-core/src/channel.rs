//! Channel paths
//!
//! Channels form a tree rooted at `/root`: `/root/<lao>/<election>/...`.

use crate::{BrokerError, BrokerResult};

/// The root channel; it can be published to but never subscribed to
pub const ROOT_CHANNEL: &str = "/root";

/// Check that `path` names `/root` or a channel beneath it
pub fn validate_channel_path(path: &str) -> BrokerResult<()> {
    if path == ROOT_CHANNEL {
        return Ok(());
    }

    let Some(rest) = path.strip_prefix("/root/") else {
        return Err(BrokerError::InvalidResource(format!(
            "channel {path} is not under {ROOT_CHANNEL}"
        )));
    };

    if rest.split('/').any(str::is_empty) {
        return Err(BrokerError::InvalidResource(format!(
            "channel {path} has an empty segment"
        )));
    }

    Ok(())
}

/// Is this the root channel?
#[inline]
pub fn is_root_channel(path: &str) -> bool {
    path == ROOT_CHANNEL
}

/// Parent of a channel, `None` for the root
pub fn parent_channel(path: &str) -> Option<&str> {
    if is_root_channel(path) {
        return None;
    }
    path.rfind('/').map(|i| &path[..i]).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(validate_channel_path("/root").is_ok());
        assert!(validate_channel_path("/root/lao1").is_ok());
        assert!(validate_channel_path("/root/lao1/election").is_ok());
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "/", "/other", "/root/", "/root//x", "root/lao1"] {
            let err = validate_channel_path(path).unwrap_err();
            assert_eq!(err.code(), -2, "{path}");
        }
    }

    #[test]
    fn test_parent_channel() {
        assert_eq!(parent_channel("/root"), None);
        assert_eq!(parent_channel("/root/lao1"), Some("/root"));
        assert_eq!(parent_channel("/root/lao1/e1"), Some("/root/lao1"));
    }
}
