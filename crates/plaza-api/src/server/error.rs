#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: ApiError::new(
                ErrorCode::Unauthorized,
                "missing or invalid bearer token",
                None,
            ),
        }
    }

    fn not_found(player_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::NotFound,
                "no entity with this id",
                Some(format!("player_id={player_id}")),
            ),
        }
    }

    fn not_a_bot(player_id: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(
                ErrorCode::NotABot,
                "entity is not a registered bot",
                Some(format!("player_id={player_id}")),
            ),
        }
    }

    fn validation(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::ValidationError, message, details),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, None),
        }
    }

    fn from_space(err: SpaceError) -> Self {
        match err {
            SpaceError::Validation { message, details } => Self::validation(message, details),
            SpaceError::NotFound(player_id) => Self::not_found(&player_id),
            SpaceError::NotABot(player_id) => Self::not_a_bot(&player_id),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
