use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error(transparent)]
    Download(#[from] teloxide::DownloadError),

    #[error(transparent)]
    Media(#[from] clirelay_media::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
