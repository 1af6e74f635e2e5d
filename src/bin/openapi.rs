use anyhow::Result;

// Prints the admin/auth OpenAPI document, for client generation.
fn main() -> Result<()> {
    let doc = gatewarden::api::openapi();
    let json = serde_json::to_string_pretty(&doc)?;
    println!("{json}");
    Ok(())
}
