#[derive(Debug, Clone)]
pub enum ExtractError {
    InvalidImageSize { width: usize, height: usize },
    ImageTooSmall { width: usize, height: usize, min_size: usize },
    InvalidImageData { expected_len: usize, actual_len: usize },
    InvalidThreshold(u8),
    InvalidPatchSize { patch_size: usize, min_image_dim: usize },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::InvalidImageSize { width, height } => {
                write!(f, "invalid image dimensions: {}x{} (must be > 0)", width, height)
            }
            ExtractError::ImageTooSmall { width, height, min_size } => {
                write!(f, "image {}x{} too small (minimum {}x{})", width, height, min_size, min_size)
            }
            ExtractError::InvalidImageData { expected_len, actual_len } => {
                write!(f, "image buffer length mismatch: expected {}, got {}", expected_len, actual_len)
            }
            ExtractError::InvalidThreshold(t) => {
                write!(f, "invalid FAST threshold: {} (must be 1-127)", t)
            }
            ExtractError::InvalidPatchSize { patch_size, min_image_dim } => {
                write!(
                    f,
                    "patch size {} invalid for minimum image dimension {} (must be odd and smaller)",
                    patch_size, min_image_dim
                )
            }
        }
    }
}

impl std::error::Error for ExtractError {}

pub type ExtractResult<T> = Result<T, ExtractError>;
