//! Content block conversion between Anthropic and Google formats.
//!
//! Ported from `providers/transform/gemini/content.rs`.
//!
//! | Anthropic      | Google                                          |
//! |----------------|--------------------------------------------------|
//! | Text           | `{ text }`                                      |
//! | ToolUse        | `{ functionCall: { name, args, id? } }`          |
//! | ToolResult     | `{ functionResponse: { name, response, id? } }` |
//! | Thinking       | `{ text, thought: true, thoughtSignature? }`    |
//! | Image (base64) | `{ inlineData: { mimeType, data } }`             |
//! | Image (url)     | `{ fileData: { fileUri } }`                     |
//! | Document       | `{ inlineData: { mimeType, data } }`             |
//!
//! Role mapping: `user` -> `user`, `assistant` -> `model`.

use serde_json::json;

use crate::dispatch::constants::{get_model_family, ModelFamily, GEMINI_SKIP_SIGNATURE, MIN_SIGNATURE_LENGTH};
use crate::thinking::GLOBAL_SIGNATURE_CACHE;

use super::anthropic::{ContentBlock, ImageSource, Role, ToolResultContent};
use super::google::{Content, FileData, FunctionCall, FunctionResponse, InlineData, Part};

pub fn convert_role(role: Role) -> String {
    match role {
        Role::User => "user".to_string(),
        Role::Assistant => "model".to_string(),
    }
}

pub fn google_role_to_anthropic(role: &str) -> Role {
    match role {
        "model" => Role::Assistant,
        _ => Role::User,
    }
}

/// Convert Anthropic content blocks to Google Parts for a given target model.
pub fn convert_content_to_parts(content: &[ContentBlock], model: &str) -> Vec<Part> {
    let model_family = get_model_family(model);
    let is_claude = model_family == ModelFamily::Claude;
    let is_gemini = model_family == ModelFamily::Gemini;

    let mut parts = Vec::new();
    let mut deferred_inline_data = Vec::new();

    for block in content {
        match block {
            ContentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    parts.push(Part::text(text));
                }
            }

            ContentBlock::ToolUse { id, name, input } => {
                let mut call = FunctionCall::new(name, input.clone());
                if is_claude {
                    call.id = Some(id.clone());
                }

                let mut part = Part::function_call(call);

                if is_gemini {
                    let signature = GLOBAL_SIGNATURE_CACHE
                        .get_tool_signature(id)
                        .unwrap_or_else(|| GEMINI_SKIP_SIGNATURE.to_string());
                    part.thought_signature = Some(signature);
                }

                parts.push(part);
            }

            ContentBlock::ToolResult {
                tool_use_id,
                content: result_content,
                is_error,
            } => {
                let (response_text, mut image_parts) = extract_tool_result_content(result_content, *is_error);

                let mut response = FunctionResponse::with_id(tool_use_id, response_text, tool_use_id.clone());
                if !is_claude {
                    response.id = None;
                }

                parts.push(Part::function_response(response));

                // Deferred so functionResponse parts stay consecutive (Claude requires this).
                deferred_inline_data.append(&mut image_parts);
            }

            ContentBlock::Thinking { thinking, signature } => {
                if let Some(sig) = signature {
                    if sig.len() >= MIN_SIGNATURE_LENGTH {
                        if is_gemini && !GLOBAL_SIGNATURE_CACHE.is_signature_compatible(sig, ModelFamily::Gemini) {
                            continue;
                        }
                        parts.push(Part::thought(thinking, Some(sig.clone())));
                    }
                }
                // Unsigned thinking blocks are dropped.
            }

            ContentBlock::Image { source } => match source {
                ImageSource::Base64 { media_type, data } => {
                    parts.push(Part::inline_data(InlineData::new(media_type, data)));
                }
                ImageSource::Url { url } => {
                    parts.push(Part::file_data(FileData::new(url)));
                }
            },

            ContentBlock::Document { source } => {
                let super::anthropic::DocumentSource::Base64 { media_type, data } = source;
                parts.push(Part::inline_data(InlineData::new(media_type, data)));
            }
        }
    }

    parts.extend(deferred_inline_data);
    parts
}

fn extract_tool_result_content(content: &Option<ToolResultContent>, is_error: Option<bool>) -> (String, Vec<Part>) {
    let is_error = is_error.unwrap_or(false);

    match content {
        None => {
            let result = if is_error { json!({ "error": "" }) } else { json!({ "result": "" }) };
            (result.to_string(), vec![])
        }
        Some(ToolResultContent::Text(text)) => {
            let result = if is_error { json!({ "error": text }) } else { json!({ "result": text }) };
            (result.to_string(), vec![])
        }
        Some(ToolResultContent::Blocks(blocks)) => {
            let mut texts = Vec::new();
            let mut image_parts = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text.clone()),
                    ContentBlock::Image { source: ImageSource::Base64 { media_type, data } } => {
                        image_parts.push(Part::inline_data(InlineData::new(media_type, data)));
                    }
                    _ => {}
                }
            }

            let text_content = texts.join("\n");
            let has_images = !image_parts.is_empty();

            let result = if is_error {
                json!({ "error": text_content })
            } else if text_content.is_empty() && has_images {
                json!({ "result": "Image attached" })
            } else {
                json!({ "result": text_content })
            };

            (result.to_string(), image_parts)
        }
    }
}

/// Convert Google Parts back to Anthropic content blocks, caching any
/// thought signatures seen along the way.
pub fn convert_parts_to_content(parts: &[Part], model: &str) -> Vec<ContentBlock> {
    let model_family = get_model_family(model);
    let mut blocks = Vec::new();

    for part in parts {
        if let Some(text) = &part.text {
            if part.is_thought() {
                let signature = part.thought_signature.clone().unwrap_or_default();

                if signature.len() >= MIN_SIGNATURE_LENGTH {
                    GLOBAL_SIGNATURE_CACHE.store_thinking_signature(text, &signature, model_family);
                }

                blocks.push(ContentBlock::Thinking {
                    thinking: text.clone(),
                    signature: if signature.is_empty() { None } else { Some(signature) },
                });
            } else {
                blocks.push(ContentBlock::Text { text: text.clone() });
            }
        }

        if let Some(fc) = &part.function_call {
            let tool_id = fc.id.clone().unwrap_or_else(generate_tool_use_id);

            if let Some(sig) = &part.thought_signature {
                if sig.len() >= MIN_SIGNATURE_LENGTH {
                    GLOBAL_SIGNATURE_CACHE.store_tool_signature(&tool_id, sig, model_family);
                }
            }

            blocks.push(ContentBlock::ToolUse {
                id: tool_id,
                name: fc.name.clone(),
                input: fc.args.clone(),
            });
        }

        if let Some(inline) = &part.inline_data {
            blocks.push(ContentBlock::Image {
                source: ImageSource::Base64 {
                    media_type: inline.mime_type.clone(),
                    data: inline.data.clone(),
                },
            });
        }
    }

    blocks
}

fn generate_tool_use_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("toolu_{:024x}", timestamp)
}

pub fn text_to_parts(text: &str) -> Vec<Part> {
    vec![Part::text(text)]
}

pub fn create_content(role: Role, parts: Vec<Part>) -> Content {
    Content { role: Some(convert_role(role)), parts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_role() {
        assert_eq!(convert_role(Role::User), "user");
        assert_eq!(convert_role(Role::Assistant), "model");
    }

    #[test]
    fn test_google_role_to_anthropic() {
        assert_eq!(google_role_to_anthropic("user"), Role::User);
        assert_eq!(google_role_to_anthropic("model"), Role::Assistant);
        assert_eq!(google_role_to_anthropic("unknown"), Role::User);
    }

    #[test]
    fn test_convert_text_block() {
        let blocks = vec![ContentBlock::text("Hello, world!")];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text, Some("Hello, world!".to_string()));
    }

    #[test]
    fn test_skip_empty_text_blocks() {
        let blocks = vec![ContentBlock::text(""), ContentBlock::text("   "), ContentBlock::text("Hello")];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text, Some("Hello".to_string()));
    }

    #[test]
    fn test_convert_tool_use_claude() {
        let blocks = vec![ContentBlock::tool_use("toolu_123", "get_weather", json!({"location": "NYC"}))];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        let fc = parts[0].function_call.as_ref().unwrap();
        assert_eq!(fc.name, "get_weather");
        assert_eq!(fc.id, Some("toolu_123".to_string()));
        assert!(parts[0].thought_signature.is_none());
    }

    #[test]
    fn test_convert_tool_use_gemini() {
        GLOBAL_SIGNATURE_CACHE.clear_all();
        let blocks = vec![ContentBlock::tool_use("toolu_456", "search", json!({"query": "rust"}))];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        let fc = parts[0].function_call.as_ref().unwrap();
        assert!(fc.id.is_none());
        assert_eq!(parts[0].thought_signature, Some(GEMINI_SKIP_SIGNATURE.to_string()));
    }

    #[test]
    fn test_convert_tool_result_text() {
        let blocks = vec![ContentBlock::tool_result("toolu_123", "Sunny, 72F")];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        let fr = parts[0].function_response.as_ref().unwrap();
        assert_eq!(fr.name, "toolu_123");
        assert!(fr.response.content.contains("Sunny, 72F"));
    }

    #[test]
    fn test_convert_image_base64() {
        let blocks = vec![ContentBlock::Image {
            source: ImageSource::Base64 { media_type: "image/png".into(), data: "iVBORw0KGgo=".into() },
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        let inline = parts[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
    }

    #[test]
    fn test_convert_image_url_emits_file_data() {
        let blocks = vec![ContentBlock::Image {
            source: ImageSource::Url { url: "https://example.com/cat.png".into() },
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts.len(), 1);
        let file_data = parts[0].file_data.as_ref().unwrap();
        assert_eq!(file_data.file_uri, "https://example.com/cat.png");
        assert!(parts[0].inline_data.is_none());
    }

    #[test]
    fn test_convert_thinking_with_signature() {
        GLOBAL_SIGNATURE_CACHE.store_thinking_signature("Let me think about this...", "x".repeat(100), ModelFamily::Gemini);
        let blocks = vec![ContentBlock::thinking("Let me think about this...", Some("x".repeat(100)))];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].thought.unwrap_or(false));
    }

    #[test]
    fn test_convert_thinking_drops_unsigned() {
        let blocks = vec![ContentBlock::thinking("Thinking without signature", None)];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_convert_parts_to_content_function_call() {
        let call = FunctionCall::with_id("search", json!({"q": "test"}), "toolu_999");
        let parts = vec![Part::function_call(call)];
        let blocks = convert_parts_to_content(&parts, "claude-sonnet-4-5");
        assert!(blocks[0].is_tool_use());
        let (id, name, input) = blocks[0].as_tool_use().unwrap();
        assert_eq!(id, "toolu_999");
        assert_eq!(name, "search");
        assert_eq!(input["q"], "test");
    }

    #[test]
    fn test_roundtrip_text() {
        let original = vec![ContentBlock::text("Hello, roundtrip!")];
        let parts = convert_content_to_parts(&original, "claude-sonnet-4-5");
        let result = convert_parts_to_content(&parts, "claude-sonnet-4-5");
        assert_eq!(result[0].as_text(), original[0].as_text());
    }

    #[test]
    fn test_tool_result_with_images() {
        let blocks = vec![
            ContentBlock::text("Here's the image:"),
            ContentBlock::Image { source: ImageSource::Base64 { media_type: "image/png".into(), data: "imgdata".into() } },
        ];
        let content = Some(ToolResultContent::Blocks(blocks));
        let (text, images) = extract_tool_result_content(&content, Some(false));
        assert!(text.contains("Here's the image:"));
        assert_eq!(images.len(), 1);
    }
}
