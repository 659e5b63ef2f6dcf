use image::png::PngEncoder;
use image::{ColorType, Luma};
use qrcode::QrCode;

use crate::errors::BackendError;

/// Renders the given data as a QR code and returns it as a
/// `data:image/png;base64,...` URI, ready to embed in JSON responses and
/// `<img>` tags.
pub fn data_uri(data: &str) -> Result<String, BackendError> {
    let code =
        QrCode::new(data.as_bytes()).map_err(|source| BackendError::QrEncoding { source })?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(240, 240)
        .build();
    let (width, height) = image.dimensions();

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .encode(image.as_raw(), width, height, ColorType::L8)
        .map_err(|source| BackendError::QrImage { source })?;

    Ok(format!("data:image/png;base64,{}", base64::encode(&png)))
}

#[cfg(test)]
mod tests {
    use super::data_uri;

    #[test]
    fn encodes_to_a_png_data_uri() {
        let uri = data_uri("http://attendance.test/scan/some-session").unwrap();

        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.len() > "data:image/png;base64,".len());
        // the payload must be valid base64
        base64::decode(&uri["data:image/png;base64,".len()..]).unwrap();
    }
}
