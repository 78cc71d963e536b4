//! Anthropic `MessagesRequest` -> Google `GoogleRequest` conversion.
//!
//! Ported from `providers/transform/gemini/request.rs`.
//!
//! - Messages become `contents`; role mapping is `user -> user`, `assistant -> model`.
//! - `system` becomes `systemInstruction` with no role (Google requirement).
//! - For Claude thinking models with tools, an interleaved-thinking hint is
//!   appended to the system instruction so the model knows it may think
//!   between tool calls.
//! - `max_tokens` is bumped to `budget_tokens + 8192` when it would otherwise
//!   leave no room for a response after the thinking budget.
//! - Gemini models have `maxOutputTokens` capped at `GEMINI_MAX_OUTPUT_TOKENS`.
//! - Claude tool calls get `tool_config` forced to `VALIDATED` for strict
//!   parameter checking; Anthropic's `tool_choice` otherwise drives `tool_config`.

use crate::dispatch::constants::{get_model_family, is_thinking_model, ModelFamily, GEMINI_MAX_OUTPUT_TOKENS};

use super::anthropic::{Message, MessageContent, MessagesRequest, SystemBlock, SystemPrompt, Tool, ToolChoice};
use super::content::{convert_content_to_parts, convert_role, text_to_parts};
use super::google::{
    Content, FunctionCallingConfig, FunctionDeclaration, GenerationConfig, GoogleRequest, GoogleThinkingConfig,
    GoogleTool, Part, ToolConfig,
};
use super::schema::sanitize_schema;

const INTERLEAVED_THINKING_HINT: &str = "Interleaved thinking is enabled. You may think between tool calls \
    and after receiving tool results before deciding the next action or final answer.";

/// Convert an Anthropic `MessagesRequest` into a Google `GoogleRequest`.
pub fn convert_request(request: &MessagesRequest) -> GoogleRequest {
    let model_family = get_model_family(&request.model);
    let is_claude = model_family == ModelFamily::Claude;
    let is_gemini = model_family == ModelFamily::Gemini;
    let is_thinking = is_thinking_model(&request.model);

    let mut google_request = GoogleRequest::new();

    if let Some(system) = &request.system {
        let mut parts = convert_system_prompt(system);
        if !parts.is_empty() {
            if is_claude && is_thinking && request.has_tools() {
                if let Some(last) = parts.last_mut() {
                    if let Some(text) = &last.text {
                        last.text = Some(format!("{}\n\n{}", text, INTERLEAVED_THINKING_HINT));
                    }
                } else {
                    parts.push(Part::text(INTERLEAVED_THINKING_HINT));
                }
            }
            google_request.system_instruction = Some(Content::system(parts));
        }
    }

    google_request.contents = convert_messages(&request.messages, &request.model);

    let mut gen_config = GenerationConfig::new(request.max_tokens);
    if let Some(temp) = request.temperature {
        gen_config.temperature = Some(temp);
    }
    if let Some(top_p) = request.top_p {
        gen_config.top_p = Some(top_p);
    }
    if let Some(top_k) = request.top_k {
        gen_config.top_k = Some(top_k);
    }
    if let Some(stop_seqs) = &request.stop_sequences {
        if !stop_seqs.is_empty() {
            gen_config.stop_sequences = Some(stop_seqs.clone());
        }
    }

    if is_thinking {
        let thinking_budget = request.thinking.as_ref().map(|t| t.budget_tokens);

        if is_claude {
            let thinking_config = GoogleThinkingConfig::claude(thinking_budget.unwrap_or(10000));

            if let Some(budget) = thinking_budget {
                if let Some(max) = gen_config.max_output_tokens {
                    if max <= budget {
                        gen_config.max_output_tokens = Some(budget + 8192);
                    }
                }
            }

            google_request.thinking_config = Some(thinking_config);
        } else if is_gemini {
            google_request.thinking_config = Some(GoogleThinkingConfig::gemini(thinking_budget.unwrap_or(16000)));
        }
    }

    if is_gemini {
        if let Some(max) = gen_config.max_output_tokens {
            if max > GEMINI_MAX_OUTPUT_TOKENS {
                gen_config.max_output_tokens = Some(GEMINI_MAX_OUTPUT_TOKENS);
            }
        }
    }

    google_request.generation_config = Some(gen_config);

    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            let declarations = convert_tools(tools);
            google_request.tools = Some(vec![GoogleTool::new(declarations)]);

            if is_claude {
                google_request.tool_config = Some(ToolConfig {
                    function_calling_config: FunctionCallingConfig {
                        mode: "VALIDATED".to_string(),
                        allowed_function_names: None,
                    },
                });
            }
        }
    }

    if let Some(tool_choice) = &request.tool_choice {
        google_request.tool_config = Some(convert_tool_choice(tool_choice));
    }

    google_request
}

fn convert_system_prompt(system: &SystemPrompt) -> Vec<Part> {
    match system {
        SystemPrompt::Text(text) => {
            if text.is_empty() {
                vec![]
            } else {
                vec![Part::text(text)]
            }
        }
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| {
                let SystemBlock::Text { text, .. } = block;
                if text.is_empty() {
                    None
                } else {
                    Some(Part::text(text))
                }
            })
            .collect(),
    }
}

fn convert_messages(messages: &[Message], model: &str) -> Vec<Content> {
    let mut contents = Vec::new();

    for msg in messages {
        let parts = convert_message_content(&msg.content, model);
        let parts = if parts.is_empty() { vec![Part::text(".")] } else { parts };

        contents.push(Content { role: Some(convert_role(msg.role)), parts });
    }

    contents
}

fn convert_message_content(content: &MessageContent, model: &str) -> Vec<Part> {
    match content {
        MessageContent::Text(text) => {
            if text.trim().is_empty() {
                vec![]
            } else {
                text_to_parts(text)
            }
        }
        MessageContent::Blocks(blocks) => convert_content_to_parts(blocks, model),
    }
}

fn convert_tools(tools: &[Tool]) -> Vec<FunctionDeclaration> {
    tools
        .iter()
        .enumerate()
        .map(|(idx, tool)| {
            let name = sanitize_tool_name(&tool.name, idx);
            let parameters = sanitize_schema(&tool.input_schema);
            FunctionDeclaration::new(name, tool.description.clone(), Some(parameters))
        })
        .collect()
}

fn sanitize_tool_name(name: &str, fallback_idx: usize) -> String {
    if name.is_empty() {
        return format!("tool_{}", fallback_idx);
    }

    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();

    if sanitized.len() > 64 {
        sanitized[..64].to_string()
    } else {
        sanitized
    }
}

fn convert_tool_choice(choice: &ToolChoice) -> ToolConfig {
    match choice {
        ToolChoice::Auto => ToolConfig::auto(),
        ToolChoice::Any => ToolConfig::any(),
        ToolChoice::None => ToolConfig::none(),
        ToolChoice::Tool { name } => ToolConfig::force(name),
    }
}
