use axum::extract::Multipart;

use rulecheck_core::{CheckInput, Upload};

/// Read every field of the multipart form into a [`CheckInput`].
///
/// Nothing is validated here beyond the multipart framing itself; the checker
/// decides which problem to report first. Later duplicates of a field replace
/// earlier ones.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<CheckInput, String> {
    let mut input = CheckInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read form field: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "pdf" => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Failed to read file data: {}", e))?
                    .to_vec();

                input.file = Some(Upload {
                    filename,
                    content_type,
                    data,
                });
            }
            "rules" => {
                let val = field
                    .text()
                    .await
                    .map_err(|e| format!("Failed to read rules: {}", e))?;
                input.rules = Some(val);
            }
            _ => {
                // Ignore unknown fields
                let _ = field.bytes().await;
            }
        }
    }

    Ok(input)
}
