//! Parsing of the connect path `{prefix}/{userId}/{sessionId}`.

use rollplay_protocol::{SessionId, UserId};

/// Who is connecting to which session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTarget {
    pub user_id: UserId,
    pub session_id: SessionId,
}

/// Why a connect path was refused.
///
/// The `Display` text is sent as the WebSocket close reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The path doesn't start with the configured prefix or has the wrong
    /// number of segments.
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("Invalid userId or sessionId: must be unsigned integers")]
    InvalidIds,
}

/// Extracts the user and session ids from a connect path.
///
/// A single trailing slash is tolerated.
///
/// ```rust
/// use rollplay::{parse_connect_path, SessionId, UserId};
///
/// let target = parse_connect_path("/api/connect", "/api/connect/4/11").unwrap();
/// assert_eq!(target.user_id, UserId(4));
/// assert_eq!(target.session_id, SessionId(11));
/// ```
pub fn parse_connect_path(prefix: &str, path: &str) -> Result<ConnectTarget, RouteError> {
    let unknown = || RouteError::UnknownPath(path.to_owned());
    let rest = path
        .strip_prefix(prefix.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(unknown)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    let mut segments = rest.split('/');
    let (Some(user), Some(session), None) = (segments.next(), segments.next(), segments.next())
    else {
        return Err(unknown());
    };

    match (user.parse::<u64>(), session.parse::<u64>()) {
        (Ok(user), Ok(session)) => Ok(ConnectTarget {
            user_id: UserId(user),
            session_id: SessionId(session),
        }),
        _ => Err(RouteError::InvalidIds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/api/connect";

    #[test]
    fn test_parse_connect_path_valid() {
        let target = parse_connect_path(PREFIX, "/api/connect/1/2").unwrap();
        assert_eq!(
            target,
            ConnectTarget {
                user_id: UserId(1),
                session_id: SessionId(2),
            }
        );
    }

    #[test]
    fn test_parse_connect_path_trailing_slash() {
        assert!(parse_connect_path(PREFIX, "/api/connect/1/2/").is_ok());
        assert!(parse_connect_path("/api/connect/", "/api/connect/1/2").is_ok());
    }

    #[test]
    fn test_parse_connect_path_non_numeric_ids() {
        assert_eq!(
            parse_connect_path(PREFIX, "/api/connect/abc/2"),
            Err(RouteError::InvalidIds)
        );
        assert_eq!(
            parse_connect_path(PREFIX, "/api/connect/1/-2"),
            Err(RouteError::InvalidIds)
        );
        assert_eq!(
            parse_connect_path(PREFIX, "/api/connect/1/2x"),
            Err(RouteError::InvalidIds)
        );
    }

    #[test]
    fn test_parse_connect_path_wrong_prefix() {
        assert!(matches!(
            parse_connect_path(PREFIX, "/ws/1/2"),
            Err(RouteError::UnknownPath(_))
        ));
        assert!(matches!(
            parse_connect_path(PREFIX, "/api/connectx/1/2"),
            Err(RouteError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_parse_connect_path_wrong_segment_count() {
        assert!(matches!(
            parse_connect_path(PREFIX, "/api/connect/1"),
            Err(RouteError::UnknownPath(_))
        ));
        assert!(matches!(
            parse_connect_path(PREFIX, "/api/connect/1/2/3"),
            Err(RouteError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_invalid_ids_close_reason() {
        assert_eq!(
            RouteError::InvalidIds.to_string(),
            "Invalid userId or sessionId: must be unsigned integers"
        );
    }
}
