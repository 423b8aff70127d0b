use err_derive::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(display = "IO Error: {}", _0)]
    IoError(std::io::Error),

    #[error(display = "Image Error: {}", _0)]
    ImageError(image::ImageError),

    #[error(display = "Json Error: {}", _0)]
    JsonError(serde_json::Error),

    #[error(display = "Detector model failed to load: {}", _0)]
    ModelLoad(String),

    #[error(display = "Invalid configuration: {}", _0)]
    InvalidConfig(String),

    #[error(display = "Assignment solver failed: {}", _0)]
    Assignment(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err)
    }
}
