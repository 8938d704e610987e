//! QR codes for badges. The code encodes the public verification address
//! of the worker's active credential.

use crate::error::{BadgeError, BadgeResult};
use crate::status::WorkerWithCredentials;
use crate::utils::Base64Byte;
use entity::workers::Model as Worker;
use image::{DynamicImage, ImageFormat, Rgb};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Smallest edge of the png, quiet zone included
pub const QR_PNG_SIZE: u32 = 400;
pub const QR_SVG_SIZE: u32 = 200;

const DARK: [u8; 3] = [0x1a, 0x6b, 0x47];
const LIGHT: [u8; 3] = [0xff, 0xff, 0xff];
const DARK_HEX: &str = "#1a6b47";
const LIGHT_HEX: &str = "#ffffff";

/// Printable QR of a worker's active credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialQr {
    pub credential_id: String,
    pub file_name: String,
    pub verification_url: String,
    pub png: Base64Byte,
    pub svg: String,
}

/// Public address of a credential's verification page
pub fn verification_url(public_base_url: &str, token: &str) -> String {
    format!("{}/verify/{}", public_base_url.trim_end_matches('/'), token)
}

/// `QR_<internal id>_<last name>.png`, path separators replaced
pub fn file_name(worker: &Worker) -> String {
    let last_name: String = worker
        .last_name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("QR_{}_{}.png", worker.internal_id, last_name)
}

fn encode(url: &str) -> BadgeResult<QrCode> {
    QrCode::with_error_correction_level(url.as_bytes(), EcLevel::H)
        .map_err(|e| BadgeError::validation(format!("{} does not fit a qr code: {}", url, e)))
}

pub fn render_png(url: &str) -> BadgeResult<Vec<u8>> {
    let image = encode(url)?
        .render::<Rgb<u8>>()
        .dark_color(Rgb(DARK))
        .light_color(Rgb(LIGHT))
        .min_dimensions(QR_PNG_SIZE, QR_PNG_SIZE)
        .build();

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| BadgeError::storage(format!("encode qr png: {}", e)))?;
    Ok(buf)
}

pub fn render_svg(url: &str) -> BadgeResult<String> {
    Ok(encode(url)?
        .render::<svg::Color>()
        .dark_color(svg::Color(DARK_HEX))
        .light_color(svg::Color(LIGHT_HEX))
        .min_dimensions(QR_SVG_SIZE, QR_SVG_SIZE)
        .build())
}

/// Render the active credential of `worker`, `NotFound` when it holds none
pub fn credential_qr(
    worker: &WorkerWithCredentials,
    public_base_url: &str,
) -> BadgeResult<CredentialQr> {
    let credential = worker.active_credential().ok_or_else(|| {
        BadgeError::not_found(format!("active credential of worker {}", worker.worker.id))
    })?;
    let url = verification_url(public_base_url, &credential.token);
    Ok(CredentialQr {
        credential_id: credential.id.clone(),
        file_name: file_name(&worker.worker),
        png: Base64Byte::new(render_png(&url)?),
        svg: render_svg(&url)?,
        verification_url: url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::fixtures::{credential, worker};
    use chrono::NaiveDate;
    use entity::WorkerStatus;

    fn badge(revoked: bool) -> WorkerWithCredentials {
        let until = NaiveDate::from_ymd_opt(2030, 12, 31).unwrap();
        WorkerWithCredentials::new(
            worker("w1", WorkerStatus::Activo, until),
            vec![credential("c1", "w1", revoked)],
        )
    }

    #[test]
    fn verification_url_joins_base() {
        assert_eq!(
            verification_url("https://carnet.example.org/", "abc"),
            "https://carnet.example.org/verify/abc"
        );
    }

    #[test]
    fn file_name_uses_internal_id_and_last_name() {
        let until = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let mut w = worker("w1", WorkerStatus::Activo, until);
        assert_eq!(file_name(&w), "QR_TRB-W1_Pérez.png");
        w.last_name = "de/la\\Cruz".to_owned();
        assert_eq!(file_name(&w), "QR_TRB-W1_de_la_Cruz.png");
    }

    #[test]
    fn png_is_square_and_branded() {
        let png = render_png("http://127.0.0.1:18891/verify/tok-c1").unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.width(), decoded.height());
        assert!(decoded.width() >= QR_PNG_SIZE);
        assert_eq!(decoded.get_pixel(0, 0), &Rgb(LIGHT));
        assert!(decoded.pixels().any(|p| *p == Rgb(DARK)));
    }

    #[test]
    fn svg_carries_the_colors() {
        let svg = render_svg("http://127.0.0.1:18891/verify/tok-c1").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains(DARK_HEX));
    }

    #[test]
    fn credential_qr_encodes_active_token() {
        let qr = credential_qr(&badge(false), "https://carnet.example.org").unwrap();
        assert_eq!(qr.credential_id, "c1");
        assert_eq!(qr.verification_url, "https://carnet.example.org/verify/tok-c1");
        assert_eq!(qr.file_name, "QR_TRB-W1_Pérez.png");
        assert_eq!(image::guess_format(&qr.png.0).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn revoked_only_worker_has_no_qr() {
        let err = credential_qr(&badge(true), "https://carnet.example.org").unwrap_err();
        assert!(err.is_not_found());
    }
}
