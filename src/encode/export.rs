use std::path::Path;

use image::RgbImage;

use crate::error::{Error, Result};

/// Writes the spectrogram to `path`. The format follows the file
/// extension (PNG, BMP, JPEG, ...).
pub fn save_spectrogram(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(Error::Source(format!(
                "output directory does not exist: {}",
                parent.display()
            )));
        }
    }

    image.save(path)?;
    log::info!(
        "Saved {}x{} spectrogram to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(())
}
