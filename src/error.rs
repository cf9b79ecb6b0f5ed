use thiserror::Error;

/// Why a single frame could not be turned into a raster.
///
/// Load failures are recorded on the frame's descriptor and counted; they
/// never stop the rest of the sequence from loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The resource behind the URI could not be opened or read.
    #[error("failed to read frame {uri}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    /// The bytes were read but are not a decodable image.
    #[error("failed to decode frame {uri}")]
    Decode {
        uri: String,
        #[source]
        source: image::ImageError,
    },

    /// Decoding produced an image with no pixels.
    #[error("frame {uri} decoded to an empty image")]
    Empty { uri: String },

    /// The blocking decode job panicked or was torn down.
    #[error("decode job for frame {index} did not complete: {reason}")]
    Join { index: usize, reason: String },
}

/// Pixel-level failures while compositing. The render loop reports these as
/// skipped frames; they never reach the host.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pixel buffer length {len} is not a whole number of RGBA pixels")]
    PixelBuffer { len: usize },

    #[error("failed to scale frame {index} to {width}x{height}: {reason}")]
    Scale {
        index: usize,
        width: u32,
        height: u32,
        reason: String,
    },
}
