use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionsHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Excel parsing error: {0}")]
    ExcelError(#[from] calamine::Error),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, OptionsHubError>;

impl OptionsHubError {
    /// 判断是否为传输层超时（期权链抓取时需要原样重试一次）
    pub fn is_timeout(&self) -> bool {
        match self {
            OptionsHubError::RequestError(e) => e.is_timeout(),
            OptionsHubError::Timeout(_) => true,
            _ => false,
        }
    }
}

// 用于从字符串创建错误
impl From<String> for OptionsHubError {
    fn from(s: String) -> Self {
        OptionsHubError::Unknown(s)
    }
}

// 用于从&str创建错误
impl From<&str> for OptionsHubError {
    fn from(s: &str) -> Self {
        OptionsHubError::Unknown(s.to_string())
    }
}
