use kornia_image::{Image, ImageSize, allocator::CpuAllocator};

/// Errors raised while turning an uploaded payload into an rgb8 image.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    EmptyPayload,

    #[error(transparent)]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Image(#[from] kornia_image::ImageError),
}

/// Decode an encoded picture into a rgb8 image.
///
/// The container format is sniffed from the content, so the file name or content type
/// of the upload are not trusted. Grayscale, alpha and 16-bit pictures are converted to
/// 3 channels of 8 bits.
///
/// # Arguments
///
/// * `bytes` - The raw bytes of the encoded picture (jpeg, png, webp, ...)
///
/// # Returns
///
/// An image with shape [H, W, 3].
pub fn decode_image_rgb8(bytes: &[u8]) -> Result<Image<u8, 3, CpuAllocator>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };

    Ok(Image::new(size, rgb.into_raw(), CpuAllocator)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn decode_png_rgb8() -> Result<(), DecodeError> {
        let src = image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]));
        let bytes = encode(DynamicImage::ImageRgb8(src), ImageFormat::Png);

        let img = decode_image_rgb8(&bytes)?;
        assert_eq!(img.size().width, 4);
        assert_eq!(img.size().height, 3);
        assert_eq!(img.num_channels(), 3);
        assert_eq!(&img.as_slice()[..3], &[10, 20, 30]);

        Ok(())
    }

    #[test]
    fn decode_jpeg_rgb8() -> Result<(), DecodeError> {
        let src = image::RgbImage::from_pixel(16, 8, image::Rgb([128, 128, 128]));
        let bytes = encode(DynamicImage::ImageRgb8(src), ImageFormat::Jpeg);

        let img = decode_image_rgb8(&bytes)?;
        assert_eq!(img.size().width, 16);
        assert_eq!(img.size().height, 8);
        assert_eq!(img.as_slice().len(), 16 * 8 * 3);

        Ok(())
    }

    #[test]
    fn gray_and_alpha_are_converted() -> Result<(), DecodeError> {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([200]));
        let img = decode_image_rgb8(&encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png))?;
        assert_eq!(img.as_slice(), &[200u8; 2 * 2 * 3]);

        let rgba = image::RgbaImage::from_pixel(2, 1, image::Rgba([1, 2, 3, 0]));
        let img = decode_image_rgb8(&encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png))?;
        assert_eq!(img.as_slice(), &[1, 2, 3, 1, 2, 3]);

        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_image_rgb8(b"definitely not a picture").unwrap_err();
        assert!(matches!(err, DecodeError::Decode(_)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = decode_image_rgb8(&[]).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyPayload));
        assert_eq!(err.to_string(), "empty image payload");
    }
}
