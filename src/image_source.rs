//! Loading the source image

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("image not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image {0} has no pixels")]
    Empty(PathBuf),
}

/// Decode the image at `path` into RGB8
pub fn load(path: &Path) -> Result<RgbImage, ImageLoadError> {
    if !path.is_file() {
        return Err(ImageLoadError::NotFound(path.to_path_buf()));
    }

    let img = image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(ImageLoadError::Empty(path.to_path_buf()));
    }

    tracing::info!("Loaded {:?} ({}x{})", path, rgb.width(), rgb.height());
    Ok(rgb)
}
