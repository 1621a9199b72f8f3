//! Binary assets: images and fonts.
//!
//! The two categories are independent. A category whose source directory
//! doesn't exist is skipped, which is not an error, and a failure in one
//! category never prevents the other from being copied.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::core::Environment;
use crate::error::TransformError;
use crate::transform::{Input, glob_inputs, write_output};

pub use optimizer::ImageOptimizer;

/// Output directory for images, relative to `dist`.
pub const DIR_IMAGES: &str = "assets/images";
/// Output directory for fonts, relative to `dist`.
pub const DIR_FONTS: &str = "assets/fonts";

/// What happened to one asset category.
#[derive(Debug, PartialEq, Eq)]
pub enum Category {
    /// The source directory doesn't exist.
    Skipped,
    /// Files written to the output tree.
    Copied(Vec<Utf8PathBuf>),
}

/// Outcome of [`copy_assets`], one result per category.
#[derive(Debug)]
pub struct AssetReport {
    pub images: Result<Category, TransformError>,
    pub fonts: Result<Category, TransformError>,
}

impl AssetReport {
    /// Fails when either category failed, naming both causes when both did.
    pub fn into_result(self) -> Result<(), TransformError> {
        match (self.images, self.fonts) {
            (Err(images), Err(fonts)) => Err(TransformError::Assets {
                images: Box::new(images),
                fonts: Box::new(fonts),
            }),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Ok(_), Ok(_)) => Ok(()),
        }
    }
}

/// Copies images (through the optimizer) and fonts (verbatim) into
/// `dist/assets`. The categories run side by side.
pub fn copy_assets(env: &Environment) -> AssetReport {
    let (images, fonts) = rayon::join(
        || {
            copy_tree(env, &env.config.assets.images, DIR_IMAGES, |input, data| {
                env.images.compress(&input.path, data, &env.cache())
            })
        },
        || copy_tree(env, &env.config.assets.fonts, DIR_FONTS, |_, data| Ok(data)),
    );

    AssetReport { images, fonts }
}

fn copy_tree<F>(
    env: &Environment,
    source: &Utf8Path,
    target: &str,
    process: F,
) -> Result<Category, TransformError>
where
    F: Fn(&Input, Vec<u8>) -> Result<Vec<u8>, TransformError> + Sync,
{
    if !env.source(source).is_dir() {
        tracing::debug!("{source} does not exist, skipping");
        return Ok(Category::Skipped);
    }

    let inputs = glob_inputs(&env.root, &format!("{source}/**/*"))?;
    let dir = env.dist().join(target);

    let written = inputs
        .par_iter()
        .map(|input| -> Result<_, TransformError> {
            let data = process(input, fs::read(&input.path)?)?;
            let path = dir.join(&input.relative);
            write_output(&path, data)?;
            Ok(path)
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("copied {} file(s) into {}", written.len(), dir);
    Ok(Category::Copied(written))
}

#[cfg(feature = "image")]
mod optimizer {
    use std::fs;
    use std::io::{Cursor, Write};

    use camino::Utf8Path;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use image::{DynamicImage, ImageFormat, ImageReader};
    use tempfile::NamedTempFile;

    use crate::core::Hash32;
    use crate::error::{TransformError, TsumikiError};

    const DIR_CACHE: &str = "img";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Codec {
        Png,
        Jpeg,
    }

    impl Codec {
        fn of(path: &Utf8Path) -> Option<Self> {
            match path.extension()?.to_ascii_lowercase().as_str() {
                "png" => Some(Codec::Png),
                "jpg" | "jpeg" => Some(Codec::Jpeg),
                _ => None,
            }
        }

        fn format(self) -> ImageFormat {
            match self {
                Codec::Png => ImageFormat::Png,
                Codec::Jpeg => ImageFormat::Jpeg,
            }
        }

        fn extension(self) -> &'static str {
            match self {
                Codec::Png => "png",
                Codec::Jpeg => "jpg",
            }
        }
    }

    /// Re-encodes PNG and JPEG images, keeping whichever of the original and
    /// the re-encoded bytes is smaller. Other formats pass through untouched.
    ///
    /// Results are cached by content hash in `.cache/img`, so unchanged
    /// images are not re-encoded on every watch run.
    #[derive(Debug, Clone, Copy)]
    pub struct ImageOptimizer {
        quality: u8,
    }

    impl ImageOptimizer {
        /// `quality` is used for lossy (JPEG) output, 1-100.
        pub fn new(quality: u8) -> Result<Self, TsumikiError> {
            if !(1..=100).contains(&quality) {
                return Err(TsumikiError::Capability(
                    "image",
                    format!("quality {quality} is outside 1-100"),
                ));
            }

            Ok(Self { quality })
        }

        /// Runs every codec once on a tiny image, so a broken codec is
        /// reported at startup rather than by the first image.
        pub fn ready(&self) -> Result<(), TsumikiError> {
            let probe = DynamicImage::new_rgba8(1, 1);

            for codec in [Codec::Png, Codec::Jpeg] {
                let data = self
                    .encode(&probe, codec)
                    .map_err(|e| TsumikiError::Capability("image", e.to_string()))?;

                ImageReader::with_format(Cursor::new(data), codec.format())
                    .decode()
                    .map_err(|e| TsumikiError::Capability("image", e.to_string()))?;
            }

            Ok(())
        }

        pub fn compress(
            &self,
            path: &Utf8Path,
            data: Vec<u8>,
            cache: &Utf8Path,
        ) -> Result<Vec<u8>, TransformError> {
            let Some(codec) = Codec::of(path) else {
                return Ok(data);
            };

            let hash = Hash32::hash(&data).to_hex();
            let cached = cache
                .join(DIR_CACHE)
                .join(format!("{hash}-q{}.{}", self.quality, codec.extension()));

            // If this hash exists it means the work is already done.
            if let Some(data) = self.cached(&cached, codec) {
                return Ok(data);
            }

            let rejected = |source| TransformError::Image {
                path: path.to_owned(),
                source,
            };

            let image = image::load_from_memory_with_format(&data, codec.format()).map_err(rejected)?;
            let encoded = self.encode(&image, codec).map_err(rejected)?;
            let best = if encoded.len() < data.len() { encoded } else { data };

            store(&cached, &best)?;
            Ok(best)
        }

        /// A cache entry that no longer decodes is treated as missing.
        fn cached(&self, path: &Utf8Path, codec: Codec) -> Option<Vec<u8>> {
            let data = fs::read(path).ok()?;

            match image::load_from_memory_with_format(&data, codec.format()) {
                Ok(_) => Some(data),
                Err(e) => {
                    tracing::warn!("discarding cached image {path}: {e}");
                    None
                }
            }
        }

        fn encode(&self, image: &DynamicImage, codec: Codec) -> image::ImageResult<Vec<u8>> {
            let mut out = Vec::new();

            match codec {
                Codec::Png => {
                    let encoder = PngEncoder::new_with_quality(
                        &mut out,
                        CompressionType::Best,
                        FilterType::Adaptive,
                    );
                    image.write_with_encoder(encoder)?;
                }
                Codec::Jpeg => {
                    // JPEG has no alpha channel
                    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                    let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
                    rgb.write_with_encoder(encoder)?;
                }
            }

            Ok(out)
        }
    }

    /// Writes a cache entry through a temporary file in the same directory,
    /// so readers only ever see a complete entry.
    fn store(path: &Utf8Path, data: &[u8]) -> Result<(), TransformError> {
        let dir = path.parent().unwrap_or(path);
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(not(feature = "image"))]
mod optimizer {
    use camino::Utf8Path;

    use crate::error::{TransformError, TsumikiError};

    /// Without the `image` feature images are copied verbatim.
    #[derive(Debug, Clone, Copy)]
    pub struct ImageOptimizer;

    impl ImageOptimizer {
        pub fn new(_quality: u8) -> Result<Self, TsumikiError> {
            Ok(Self)
        }

        pub fn ready(&self) -> Result<(), TsumikiError> {
            Ok(())
        }

        pub fn compress(
            &self,
            _path: &Utf8Path,
            data: Vec<u8>,
            _cache: &Utf8Path,
        ) -> Result<Vec<u8>, TransformError> {
            Ok(data)
        }
    }
}
