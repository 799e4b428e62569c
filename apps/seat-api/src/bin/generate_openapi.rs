use std::path::PathBuf;

use utoipa::OpenApi;

/// Writes the seat-api OpenAPI document, by default to `specs/seat-api.json`
/// at the workspace root. Pass a path to write somewhere else.
fn main() {
    let out = std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs/seat-api.json")
    });

    let doc = seat_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("serialize OpenAPI document");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("create output directory");
    }
    std::fs::write(&out, doc).expect("write OpenAPI document");
    println!("Wrote {}", out.display());
}
