/// Row-major 8-bit intensity image (channels already collapsed to luma)
pub type Image = Vec<u8>;

/// Key-point = corner location with subpixel precision + dominant
/// orientation (radians)
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

/// 256-bit binary descriptor = 32 bytes, compared by Hamming distance
pub type Descriptor = [u8; 32];

/// Number of bits in a [`Descriptor`]
pub const DESCRIPTOR_BITS: usize = 256;

/// A correspondence between descriptor `query` of one image and
/// descriptor `train` of the other. Lower distance is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Feature extraction parameters shared by detector and descriptor.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractorConfig {
    /// FAST ring intensity threshold (1-127)
    pub threshold: u8,
    /// Side of the square patch used for orientation and descriptor
    /// sampling, must be odd
    pub patch_size: usize,
    /// Keep at most this many best-response keypoints per image
    pub max_features: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 15,
            max_features: 2000,
        }
    }
}

/// Initialize the global Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .build_global()
}

/// Default thread count for the pipeline
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}
