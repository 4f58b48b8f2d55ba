use crate::services::refresh_service::RefreshError;
use glance_core::{AppError, NetworkError, ReqwestErrorExt, RusqliteErrorExt, WeatherError};
use glance_weather::{FetchErrorKind, WeatherError as StorageError};

impl From<RefreshError> for AppError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::NoCoordinate => AppError::Weather(WeatherError::NoCoordinate),
            RefreshError::Stopped => AppError::Weather(WeatherError::ServiceUnavailable),
            RefreshError::Fetch(kind) => fetch_error(kind),
            RefreshError::Cache(e) => storage_error(e),
        }
    }
}

fn fetch_error(kind: FetchErrorKind) -> AppError {
    match kind {
        FetchErrorKind::HttpStatus(status) => AppError::Network(NetworkError::ServerError {
            status,
            message: kind.to_string(),
        }),
        FetchErrorKind::Transport => {
            AppError::Network(NetworkError::ConnectionFailed(kind.to_string()))
        }
        FetchErrorKind::Timeout => AppError::Network(NetworkError::Timeout),
        FetchErrorKind::MalformedBody => {
            AppError::Network(NetworkError::InvalidResponse(kind.to_string()))
        }
    }
}

fn storage_error(e: StorageError) -> AppError {
    match e {
        StorageError::Storage(e) => AppError::Database(e.into_database_error()),
        StorageError::Serialization(e) => {
            AppError::Weather(WeatherError::CacheError(e.to_string()))
        }
        StorageError::Io(e) => AppError::Io(e),
        StorageError::Client(e) => AppError::Network(e.into_network_error()),
    }
}
