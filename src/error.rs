use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read configuration file '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed frame: {0}")]
    Frame(String),
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::Invalid(msg.into())
    }
}
