use std::{error, fmt, io};

#[derive(Debug)]
pub enum Error {
    /// No OAuth client ID is configured.
    Configuration,
    /// The loopback callback listener could not bind its address.
    ServerBind(io::Error),
    /// The user (or the service) refused the authorization request.
    AuthorizationDenied(String),
    StateMismatch,
    MissingCode,
    TokenExchange { status: u16, body: String },
    TokenRefresh { status: u16, body: String },
    AuthTimeout,
    WebApi { status: u16, body: String },
    UnexpectedResponse,
    HttpError(Box<dyn error::Error + Send + Sync>),
    JsonError(Box<dyn error::Error + Send + Sync>),
    IoError(io::Error),
}

impl Error {
    /// True if the token endpoint explicitly refused the request, as opposed
    /// to failing for transport or server reasons.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::TokenExchange { status: 400 | 401, .. }
                | Self::TokenRefresh { status: 400 | 401, .. }
        )
    }

    /// Short message suitable for a user-visible notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration => "Set your Spotify client ID in the preferences".into(),
            Self::ServerBind(_) => {
                "The login callback port is busy, another login may be in progress".into()
            }
            Self::AuthorizationDenied(_) | Self::StateMismatch | Self::MissingCode => {
                "Spotify login failed, please try again".into()
            }
            Self::TokenExchange { .. } | Self::TokenRefresh { .. } => {
                "Spotify refused the login request".into()
            }
            Self::AuthTimeout => "Spotify login timed out".into(),
            other => other.to_string(),
        }
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Missing OAuth client ID"),
            Self::ServerBind(err) => write!(f, "Failed to bind callback listener: {err}"),
            Self::AuthorizationDenied(reason) => write!(f, "Authorization denied: {reason}"),
            Self::StateMismatch => write!(f, "OAuth state mismatch"),
            Self::MissingCode => write!(f, "Callback is missing the authorization code"),
            Self::TokenExchange { status, body } => {
                write!(f, "Token exchange failed ({status}): {body}")
            }
            Self::TokenRefresh { status, body } => {
                write!(f, "Token refresh failed ({status}): {body}")
            }
            Self::AuthTimeout => write!(f, "Timed out waiting for the authorization callback"),
            Self::WebApi { status, body } => write!(f, "Web API error ({status}): {body}"),
            Self::UnexpectedResponse => write!(f, "Unknown server response"),
            Self::HttpError(err) | Self::JsonError(err) => fmt::Display::fmt(err, f),
            Self::IoError(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(Box::new(err))
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::HttpError(Box::new(err))
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::IoError(err.error)
    }
}
