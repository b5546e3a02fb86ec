use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-success status or transport failure from either remote API.
    #[error("upstream error{}: {message}", status.map(|s| format!(" {s}")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("invalid data limit")]
    InvalidLimit,

    #[error("access key does not exist")]
    AccountNotFound,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Render(#[from] minijinja::Error),
}

impl Error {
    pub fn upstream_status(status: reqwest::StatusCode) -> Self {
        Self::Upstream {
            status: Some(status.as_u16()),
            message: format!("status code error, code: {}", status.as_u16()),
        }
    }

    /// HTTP status reported by the upstream, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::InvalidLimit => Some(400),
            Self::AccountNotFound => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_display_includes_status() {
        let e = Error::upstream_status(reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(e.to_string(), "upstream error 502: status code error, code: 502");
        assert_eq!(e.status(), Some(502));
    }

    #[test]
    fn upstream_display_without_status() {
        let e = Error::Upstream {
            status: None,
            message: "connection refused".into(),
        };
        assert_eq!(e.to_string(), "upstream error: connection refused");
        assert_eq!(e.status(), None);
    }

    #[test]
    fn limit_decodes_carry_their_status() {
        assert_eq!(Error::InvalidLimit.status(), Some(400));
        assert_eq!(Error::AccountNotFound.status(), Some(404));
    }
}
