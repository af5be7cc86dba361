use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{Rng, rng};
use std::{fmt::Write, sync::Arc, time::Duration};
use tracing::debug;

use app_cache::Cache;
use app_config::CaptchaConfig;
use app_error::AppResult;
use app_utils::generate_token_id;

const CAPTCHA_PREFIX: &str = "captcha:";

// No 0/O, 1/I/L: easy to misread once distorted
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const GLYPH_WIDTH: usize = 28;
const IMAGE_HEIGHT: usize = 48;
const NOISE_LINES: usize = 5;

/// A freshly issued challenge. `code` is what the image shows.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub id: String,
    pub code: String,
    pub expires_in: u64,
}

impl CaptchaChallenge {
    /// The code rendered as an inline SVG data URI.
    pub fn image(&self) -> String {
        format!(
            "data:image/svg+xml;base64,{}",
            STANDARD.encode(render_svg(&self.code))
        )
    }
}

/// Single-use image challenges kept in the shared cache under
/// `captcha:{id}` until they expire or are checked once.
pub struct CaptchaStore {
    cache: Arc<dyn Cache>,
    length: usize,
    ttl: Duration,
}

impl CaptchaStore {
    pub fn new(cache: Arc<dyn Cache>, config: &CaptchaConfig) -> Self {
        Self {
            cache,
            length: config.length,
            ttl: config.ttl(),
        }
    }

    fn key(id: &str) -> String {
        format!("{}{}", CAPTCHA_PREFIX, id)
    }

    pub async fn issue(&self) -> AppResult<CaptchaChallenge> {
        let id = generate_token_id();
        let code = random_code(self.length);
        self.cache.set(&Self::key(&id), &code, self.ttl).await?;

        debug!(captcha_id = %id, "captcha issued");
        Ok(CaptchaChallenge {
            id,
            code,
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Check `code` against challenge `id`, case-insensitively. The challenge
    /// is consumed whether or not the code matches.
    pub async fn verify(&self, id: &str, code: &str) -> AppResult<bool> {
        if id.is_empty() {
            return Ok(false);
        }
        let stored = self.cache.take(&Self::key(id)).await?;
        let matched = stored.is_some_and(|expected| expected.eq_ignore_ascii_case(code.trim()));

        debug!(captcha_id = id, matched, "captcha checked");
        Ok(matched)
    }
}

fn random_code(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Jittered glyphs over a few noise lines.
fn render_svg(code: &str) -> String {
    let mut rng = rng();
    let width = GLYPH_WIDTH * code.chars().count() + 16;
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="#f4f4f4"/>"##,
        w = width,
        h = IMAGE_HEIGHT
    );

    for _ in 0..NOISE_LINES {
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            rng.random_range(0..width),
            rng.random_range(0..IMAGE_HEIGHT),
            rng.random_range(0..width),
            rng.random_range(0..IMAGE_HEIGHT),
            random_color(&mut rng),
        );
    }

    for (i, glyph) in code.chars().enumerate() {
        let x = 8 + i * GLYPH_WIDTH + rng.random_range(0..6);
        let y = 32 + rng.random_range(0..8);
        let angle: i32 = rng.random_range(-25..=25);
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" font-family="monospace" font-size="28" font-weight="bold" fill="{}" transform="rotate({angle} {x} {y})">{glyph}</text>"#,
            random_color(&mut rng),
        );
    }

    svg.push_str("</svg>");
    svg
}

fn random_color(rng: &mut impl Rng) -> String {
    format!(
        "#{:02x}{:02x}{:02x}",
        rng.random_range(20..140u8),
        rng.random_range(20..140u8),
        rng.random_range(20..140u8)
    )
}
