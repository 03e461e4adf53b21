#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{provider} request failed: {status} - {body}")]
    Api {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{provider} returned no text")]
    EmptyResponse { provider: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
