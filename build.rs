//! Embeds the lite `lid.176.ftz` model into the library
//!
//! Uses `resources/lid.176.ftz` when present, otherwise downloads it unless
//! `FTLANG_OFFLINE` or `DOCS_RS` is set. A build without the model still
//! succeeds; the lite tier then needs `lite_model_path` or `$FTLANG_LITE_MODEL`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LITE_MODEL_URL: &str =
    "https://dl.fbaipublicfiles.com/fasttext/supervised-models/lid.176.ftz";
const FASTTEXT_MAGIC: i32 = 793_712_314;
/// The published file is ~917 KB; anything far smaller is an error page
const MIN_MODEL_BYTES: usize = 100_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo::rustc-check-cfg=cfg(bundled_lite_model)");
    println!("cargo::rerun-if-changed=resources");
    println!("cargo::rerun-if-env-changed=FTLANG_OFFLINE");

    let out = PathBuf::from(env::var("OUT_DIR")?).join("lid.176.ftz");
    let local = Path::new("resources/lid.176.ftz");

    let model = if local.is_file() {
        fs::read(local).map_err(|e| format!("cannot read {}: {}", local.display(), e))
    } else if env::var_os("FTLANG_OFFLINE").is_some() || env::var_os("DOCS_RS").is_some() {
        Err("offline build".to_string())
    } else {
        download(LITE_MODEL_URL)
    };

    match model.and_then(check_model) {
        Ok(bytes) => {
            fs::write(&out, bytes)?;
            println!("cargo::rustc-cfg=bundled_lite_model");
        }
        Err(reason) => println!(
            "cargo::warning=lite model not embedded ({}); set lite_model_path or FTLANG_LITE_MODEL at runtime",
            reason
        ),
    }

    Ok(())
}

fn download(url: &str) -> Result<Vec<u8>, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| e.to_string())?;
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("download of {} failed: {}", url, e))?;
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

fn check_model(bytes: Vec<u8>) -> Result<Vec<u8>, String> {
    let magic = bytes
        .get(..4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(i32::from_le_bytes);
    if magic != Some(FASTTEXT_MAGIC) || bytes.len() < MIN_MODEL_BYTES {
        return Err("file is not a fastText model".to_string());
    }
    Ok(bytes)
}
